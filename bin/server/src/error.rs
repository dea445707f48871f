//! Error type for HTTP handlers.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dentalis_access::{AccessError, AccessTier};
use serde_json::json;
use std::fmt;

/// Failures surfaced by the API.
#[derive(Debug)]
pub enum ApiError {
    /// No usable bearer token.
    Unauthenticated,
    /// The caller's tier is below the resource's minimum.
    TierRequired {
        resource: String,
        required: AccessTier,
    },
    /// The access core refused the operation.
    Access(AccessError),
    /// The request was malformed.
    InvalidRequest { reason: String },
    /// Too many identities are active to take on another.
    Overloaded,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "not authenticated"),
            Self::TierRequired { resource, required } => {
                write!(f, "resource '{resource}' requires tier {required}")
            }
            Self::Access(e) => write!(f, "{e}"),
            Self::InvalidRequest { reason } => write!(f, "invalid request: {reason}"),
            Self::Overloaded => write!(f, "access context capacity reached"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Access(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AccessError> for ApiError {
    fn from(e: AccessError) -> Self {
        Self::Access(e)
    }
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::TierRequired { .. } => StatusCode::FORBIDDEN,
            Self::Access(AccessError::CredentialMismatch { .. }) => StatusCode::FORBIDDEN,
            Self::Access(AccessError::CredentialNotConfigured { .. }) => StatusCode::CONFLICT,
            Self::Access(AccessError::InvalidConfig { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Access(AccessError::StorageUnavailable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message safe to show to the caller.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Unauthenticated => "Not authenticated".to_string(),
            Self::TierRequired { required, .. } => format!("Requires {required} access"),
            Self::Access(AccessError::CredentialMismatch { .. }) => {
                "Incorrect credential".to_string()
            }
            Self::Access(AccessError::CredentialNotConfigured { .. }) => {
                "No credential configured for this tier".to_string()
            }
            Self::Access(AccessError::InvalidConfig { reason }) => {
                format!("Invalid access config: {reason}")
            }
            Self::Access(AccessError::StorageUnavailable { .. }) => {
                "Access config could not be saved".to_string()
            }
            Self::InvalidRequest { reason } => format!("Invalid request: {reason}"),
            Self::Overloaded => "Too many active users, try again shortly".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let mut body = json!({ "error": self.public_message() });
        if let Self::TierRequired { required, .. } = &self {
            body["required"] = json!(required);
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_required_display() {
        let err = ApiError::TierRequired {
            resource: "payroll".to_string(),
            required: AccessTier::Elevated3,
        };
        assert_eq!(err.to_string(), "resource 'payroll' requires tier elevated3");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn storage_details_stay_private() {
        let err = ApiError::from(AccessError::StorageUnavailable {
            reason: "/srv/dentalis/data/access.json: disk full".to_string(),
        });
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!err.public_message().contains("/srv"));
    }

    #[test]
    fn unauthenticated_is_401() {
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
    }
}
