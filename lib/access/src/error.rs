//! Error types for the access crate.
//!
//! Errors are layered the rootcause way:
//! - `StorageError`: backend failures, carried in a `Report` and recovered
//!   inside the config and session stores
//! - `AccessError`: the terminal outcome of a core operation, turned into a
//!   success flag plus a notice by the caller

use crate::tier::AccessTier;
use std::fmt;

/// Errors from a storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backend could not be read or written.
    Unavailable { reason: String },
    /// A stored value could not be parsed.
    Corrupt { key: String, reason: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "storage unavailable: {reason}"),
            Self::Corrupt { key, reason } => {
                write!(f, "stored value '{key}' is corrupt: {reason}")
            }
        }
    }
}

impl std::error::Error for StorageError {}

/// Failures of access control operations.
///
/// None of these are fatal; the worst case is staying at the current tier,
/// and `logout` always steps back to `Base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// The target tier has no usable credential configured.
    CredentialNotConfigured { tier: AccessTier },
    /// The supplied credential does not match the configured one.
    CredentialMismatch { tier: AccessTier },
    /// A configuration update was rejected.
    InvalidConfig { reason: String },
    /// The configuration could not be persisted.
    StorageUnavailable { reason: String },
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CredentialNotConfigured { tier } => {
                write!(f, "no credential configured for tier {tier}")
            }
            Self::CredentialMismatch { tier } => {
                write!(f, "credential mismatch for tier {tier}")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid access config: {reason}"),
            Self::StorageUnavailable { reason } => {
                write!(f, "access config could not be saved: {reason}")
            }
        }
    }
}

impl std::error::Error for AccessError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_corrupt_display() {
        let err = StorageError::Corrupt {
            key: "dentalis.access.config".to_string(),
            reason: "expected value at line 1".to_string(),
        };
        assert!(err.to_string().contains("dentalis.access.config"));
        assert!(err.to_string().contains("corrupt"));
    }

    #[test]
    fn access_error_names_tier() {
        let err = AccessError::CredentialMismatch {
            tier: AccessTier::Elevated2,
        };
        assert!(err.to_string().contains("elevated2"));
    }

    #[test]
    fn not_configured_display() {
        let err = AccessError::CredentialNotConfigured {
            tier: AccessTier::Elevated3,
        };
        assert!(err.to_string().contains("no credential configured"));
    }
}
