//! User-facing messages derived from access outcomes.
//!
//! Nothing in the access core raises a notice. Callers turn the result of
//! an operation into a [`Notice`] and decide how to show it.

use crate::control::{AccessControl, TierChange};
use crate::error::AccessError;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
    Info,
}

/// A message for the person at the keyboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    /// Confirms a switch, naming the tier by its display label.
    #[must_use]
    pub fn tier_switched(control: &AccessControl, change: &TierChange) -> Self {
        let label = control.tier_label(change.to);
        if change.from == change.to {
            Self::new(NoticeLevel::Info, format!("Already using {label} access"))
        } else {
            Self::new(NoticeLevel::Success, format!("Switched to {label} access"))
        }
    }

    /// Explains a refused switch or config update without revealing secrets.
    #[must_use]
    pub fn switch_failed(control: &AccessControl, error: &AccessError) -> Self {
        let message = match error {
            AccessError::CredentialNotConfigured { tier } => format!(
                "No credential is configured for {} access. An administrator must set one first.",
                control.tier_label(*tier)
            ),
            AccessError::CredentialMismatch { tier } => {
                format!("Incorrect credential for {} access", control.tier_label(*tier))
            }
            AccessError::InvalidConfig { reason } => format!("Settings not saved: {reason}"),
            AccessError::StorageUnavailable { .. } => {
                "Settings could not be saved. Please try again.".to_string()
            }
        };
        Self::new(NoticeLevel::Error, message)
    }

    #[must_use]
    pub fn config_saved() -> Self {
        Self::new(NoticeLevel::Success, "Access settings saved")
    }

    #[must_use]
    pub fn config_reset() -> Self {
        Self::new(NoticeLevel::Info, "Access settings restored to defaults")
    }

    #[must_use]
    pub fn logged_out() -> Self {
        Self::new(NoticeLevel::Info, "Returned to standard access")
    }

    /// Reports a locked guard with the remaining cool-down in whole seconds.
    #[must_use]
    pub fn locked_out(retry_after: Duration) -> Self {
        let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        Self::new(
            NoticeLevel::Error,
            format!("Too many failed attempts. Try again in {secs}s."),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::ConfigStore;
    use crate::session_store::SessionStore;
    use crate::storage::MemoryStore;
    use crate::tier::AccessTier;
    use std::sync::Arc;

    fn control() -> AccessControl {
        AccessControl::new(
            Arc::new(ConfigStore::new(Arc::new(MemoryStore::new()))),
            SessionStore::volatile(),
            None,
        )
    }

    #[test]
    fn switched_notice_uses_label() {
        let change = TierChange {
            from: AccessTier::Base,
            to: AccessTier::Elevated2,
            verified: true,
        };
        let notice = Notice::tier_switched(&control(), &change);
        assert_eq!(notice.level, NoticeLevel::Success);
        assert_eq!(notice.message, "Switched to Owner access");
    }

    #[test]
    fn failure_notices_name_the_kind() {
        let control = control();
        let mismatch = Notice::switch_failed(
            &control,
            &AccessError::CredentialMismatch {
                tier: AccessTier::Elevated3,
            },
        );
        assert_eq!(mismatch.level, NoticeLevel::Error);
        assert!(mismatch.message.contains("Incorrect credential"));
        assert!(mismatch.message.contains("Administrator"));

        let unset = Notice::switch_failed(
            &control,
            &AccessError::CredentialNotConfigured {
                tier: AccessTier::Elevated1,
            },
        );
        assert!(unset.message.contains("No credential is configured for Clinical"));
    }

    #[test]
    fn storage_failure_hides_the_reason() {
        let notice = Notice::switch_failed(
            &control(),
            &AccessError::StorageUnavailable {
                reason: "/var/lib/dentalis/access.json: permission denied".to_string(),
            },
        );
        assert!(!notice.message.contains("/var/lib"));
    }

    #[test]
    fn locked_out_rounds_up() {
        let notice = Notice::locked_out(Duration::from_millis(29_100));
        assert_eq!(notice.message, "Too many failed attempts. Try again in 30s.");
    }

    #[test]
    fn notice_serializes_level_lowercase() {
        let json = serde_json::to_value(Notice::config_saved()).expect("serialize");
        assert_eq!(json["level"], "success");
    }
}
