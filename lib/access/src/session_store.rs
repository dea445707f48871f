//! Volatile records of elevated sessions.
//!
//! A session record remembers which elevated tier a user holds and until
//! when. Records live in volatile storage only, so a restart always drops
//! every elevation. Expiry is checked lazily when a record is read.

use crate::config::SessionPolicy;
use crate::storage::{KeyValueStore, MemoryStore};
use crate::tier::AccessTier;
use chrono::{DateTime, Utc};
use dentalis_core::UserKey;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Key prefix shared by every session record.
pub const SESSION_PREFIX: &str = "dentalis.access.session.";

/// The short-lived memo of a user's elevated tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// The elevated tier held.
    pub tier: AccessTier,
    /// When the tier was granted.
    pub issued_at: DateTime<Utc>,
    /// When the record stops being trusted.
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Returns true if the record has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Reads and writes [`SessionRecord`]s keyed by user.
#[derive(Debug, Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    /// Creates a store over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Creates a store over a fresh in-memory backend.
    #[must_use]
    pub fn volatile() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    fn key(user_key: &UserKey) -> String {
        format!("{SESSION_PREFIX}{user_key}")
    }

    /// Records `tier` for `user_key`, expiring after the policy's lifetime.
    ///
    /// Does nothing for `Base` or when the policy does not record sessions.
    pub fn save(&self, user_key: &UserKey, tier: AccessTier, policy: &SessionPolicy) {
        self.save_at(user_key, tier, policy, Utc::now());
    }

    /// Like [`save`](Self::save) with an explicit issue time.
    pub fn save_at(
        &self,
        user_key: &UserKey,
        tier: AccessTier,
        policy: &SessionPolicy,
        now: DateTime<Utc>,
    ) {
        if !tier.is_elevated() || !policy.require_credential_per_session {
            return;
        }

        let record = SessionRecord {
            tier,
            issued_at: now,
            expires_at: now + policy.expiry(),
        };
        let raw = match serde_json::to_string(&record) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(user = %user_key, error = %e, "could not encode session record");
                return;
            }
        };
        match self.backend.set(&Self::key(user_key), raw) {
            Ok(()) => debug!(user = %user_key, %tier, expires_at = %record.expires_at, "session recorded"),
            Err(e) => warn!(user = %user_key, error = %e, "could not record session"),
        }
    }

    /// Returns the live record for `user_key`.
    ///
    /// Expired and unreadable records are removed and reported as absent.
    #[must_use]
    pub fn load(&self, user_key: &UserKey) -> Option<SessionRecord> {
        self.load_at(user_key, Utc::now())
    }

    /// Like [`load`](Self::load) with an explicit current time.
    #[must_use]
    pub fn load_at(&self, user_key: &UserKey, now: DateTime<Utc>) -> Option<SessionRecord> {
        let raw = match self.backend.get(&Self::key(user_key)) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(user = %user_key, error = %e, "could not read session record");
                return None;
            }
        };

        match serde_json::from_str::<SessionRecord>(&raw) {
            Ok(record) if !record.is_expired_at(now) => Some(record),
            Ok(_) => {
                debug!(user = %user_key, "session record expired");
                self.clear(user_key);
                None
            }
            Err(e) => {
                warn!(user = %user_key, error = %e, "discarding corrupt session record");
                self.clear(user_key);
                None
            }
        }
    }

    /// Removes the record for `user_key`.
    pub fn clear(&self, user_key: &UserKey) {
        if let Err(e) = self.backend.remove(&Self::key(user_key)) {
            warn!(user = %user_key, error = %e, "could not clear session record");
        }
    }

    /// Removes every session record, leaving unrelated keys alone.
    ///
    /// Returns the number of records removed.
    pub fn clear_all(&self) -> usize {
        let keys = match self.backend.keys_with_prefix(SESSION_PREFIX) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "could not list session records");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys {
            match self.backend.remove(&key) {
                Ok(()) => removed += 1,
                Err(e) => warn!(%key, error = %e, "could not clear session record"),
            }
        }
        if removed > 0 {
            debug!(removed, "cleared session records");
        }
        removed
    }
}
