//! Identity handed over by the upstream authentication provider.
//!
//! The provider is a black box that yields a user id, an email and a bearer
//! token. Access control only needs a stable key to scope per-user state, so
//! the identity is reduced to a [`UserKey`] as soon as it enters the system.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque key scoping per-user access state.
///
/// The value is never validated beyond being used as a storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserKey(String);

impl UserKey {
    /// Key used when the identity is unknown.
    pub const FALLBACK: &'static str = "default";

    /// Creates a key from any string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the fallback key used for unknown identities.
    #[must_use]
    pub fn fallback() -> Self {
        Self(Self::FALLBACK.to_string())
    }

    /// Resolves an optional key, substituting the fallback when absent or blank.
    #[must_use]
    pub fn or_fallback(key: Option<&str>) -> Self {
        match key.map(str::trim) {
            Some(k) if !k.is_empty() => Self::new(k),
            _ => Self::fallback(),
        }
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this is the fallback key.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.0 == Self::FALLBACK
    }
}

impl Default for UserKey {
    fn default() -> Self {
        Self::fallback()
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The `(user id, email, token)` triple produced by the identity provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-assigned user id, if known.
    user_id: Option<String>,
    /// Email address, if known.
    email: Option<String>,
    /// Bearer credential carried on calls to the remote data API.
    #[serde(skip_serializing)]
    token: String,
}

impl Identity {
    /// Creates an identity from the provider's triple.
    #[must_use]
    pub fn new(user_id: Option<String>, email: Option<String>, token: impl Into<String>) -> Self {
        Self {
            user_id,
            email,
            token: token.into(),
        }
    }

    /// Returns the provider-assigned user id.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Returns the email address.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Derives the storage key: user id, then email, then the fallback.
    #[must_use]
    pub fn user_key(&self) -> UserKey {
        UserKey::or_fallback(self.user_id().or(self.email()))
    }
}

// The token must never end up in logs.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_key_display() {
        let key = UserKey::new("dr.lee");
        assert_eq!(key.to_string(), "dr.lee");
    }

    #[test]
    fn user_key_fallback_for_missing_or_blank() {
        assert!(UserKey::or_fallback(None).is_fallback());
        assert!(UserKey::or_fallback(Some("   ")).is_fallback());
        assert_eq!(UserKey::or_fallback(Some(" usr_9 ")).as_str(), "usr_9");
    }

    #[test]
    fn identity_prefers_user_id() {
        let identity = Identity::new(
            Some("uid-42".to_string()),
            Some("front@clinic.example".to_string()),
            "tok",
        );
        assert_eq!(identity.user_key().as_str(), "uid-42");
    }

    #[test]
    fn identity_falls_back_to_email_then_default() {
        let by_email = Identity::new(None, Some("front@clinic.example".to_string()), "tok");
        assert_eq!(by_email.user_key().as_str(), "front@clinic.example");

        let anonymous = Identity::new(None, None, "tok");
        assert!(anonymous.user_key().is_fallback());
    }

    #[test]
    fn identity_debug_redacts_token() {
        let identity = Identity::new(Some("uid".to_string()), None, "secret-token");
        let debug = format!("{identity:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn identity_serialization_omits_token() {
        let identity = Identity::new(Some("uid".to_string()), None, "secret-token");
        let json = serde_json::to_string(&identity).expect("serialize");
        assert!(!json.contains("secret-token"));
    }
}
