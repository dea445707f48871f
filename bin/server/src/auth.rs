//! Identity extraction for API routes.
//!
//! Authentication itself belongs to the upstream identity provider. The
//! server only checks that a bearer token is present (and, when configured,
//! that it matches the shared token) and then scopes access state by the
//! `X-User-Key` header.

use crate::error::ApiError;
use crate::state::AppState;
use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use dentalis_core::Identity;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Header naming the identity whose access state a request uses.
pub const USER_KEY_HEADER: &str = "x-user-key";

/// Checks bearer tokens presented to the API.
#[async_trait]
pub trait TokenVerifier: Send + Sync + std::fmt::Debug {
    /// Returns the identity for `token`, or `None` to reject the request.
    async fn verify(&self, token: &str, user_hint: Option<&str>) -> Option<Identity>;
}

/// Accepts any non-empty token, trusting the upstream provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughVerifier;

#[async_trait]
impl TokenVerifier for PassthroughVerifier {
    async fn verify(&self, token: &str, user_hint: Option<&str>) -> Option<Identity> {
        if token.trim().is_empty() {
            return None;
        }
        Some(Identity::new(user_hint.map(str::to_string), None, token))
    }
}

/// Accepts only one shared token.
#[derive(Clone)]
pub struct SharedTokenVerifier {
    token: String,
}

impl SharedTokenVerifier {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for SharedTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTokenVerifier")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl TokenVerifier for SharedTokenVerifier {
    async fn verify(&self, token: &str, user_hint: Option<&str>) -> Option<Identity> {
        if !bool::from(token.as_bytes().ct_eq(self.token.as_bytes())) {
            return None;
        }
        Some(Identity::new(user_hint.map(str::to_string), None, token))
    }
}

/// Extractor for requiring an authenticated identity.
pub struct RequireIdentity(pub Identity);

impl<S> FromRequestParts<S> for RequireIdentity
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::Unauthenticated)?;

        let user_hint = parts
            .headers
            .get(USER_KEY_HEADER)
            .and_then(|v| v.to_str().ok());

        let identity = app_state
            .verifier()
            .verify(bearer.token(), user_hint)
            .await
            .ok_or(ApiError::Unauthenticated)?;

        Ok(RequireIdentity(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passthrough_uses_hint_as_user() {
        let identity = PassthroughVerifier
            .verify("tok", Some("dr.ahmed"))
            .await
            .expect("identity");
        assert_eq!(identity.user_key().as_str(), "dr.ahmed");
        assert_eq!(identity.token(), "tok");
    }

    #[tokio::test]
    async fn passthrough_without_hint_falls_back() {
        let identity = PassthroughVerifier
            .verify("tok", None)
            .await
            .expect("identity");
        assert!(identity.user_key().is_fallback());
    }

    #[tokio::test]
    async fn passthrough_rejects_blank_token() {
        assert!(PassthroughVerifier.verify("  ", None).await.is_none());
    }

    #[tokio::test]
    async fn shared_token_must_match() {
        let verifier = SharedTokenVerifier::new("clinic-token");
        assert!(verifier.verify("clinic-token", None).await.is_some());
        assert!(verifier.verify("clinic-tokenx", None).await.is_none());
        assert!(!format!("{verifier:?}").contains("clinic-token"));
    }
}
