//! Durable persistence of the access configuration.
//!
//! The store fails soft: a missing, unreadable or corrupt record yields the
//! built-in defaults and a warning, never an error for the caller.

use crate::config::AccessConfig;
use crate::error::StorageError;
use crate::storage::KeyValueStore;
use dentalis_core::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, instrument, warn};

/// Namespace key of the configuration record.
pub const CONFIG_KEY: &str = "dentalis.access.config";

/// Loads, saves and resets the [`AccessConfig`] record.
///
/// Every write through the store bumps a revision counter so that access
/// contexts sharing one store can tell when their copy is stale.
#[derive(Debug)]
pub struct ConfigStore {
    backend: Arc<dyn KeyValueStore>,
    revision: AtomicU64,
}

impl ConfigStore {
    /// Creates a store over a durable backend.
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            revision: AtomicU64::new(0),
        }
    }

    /// Returns the number of writes made through this store.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    fn read(&self) -> Result<Option<AccessConfig>, StorageError> {
        let Some(raw) = self.backend.get(CONFIG_KEY)? else {
            return Ok(None);
        };
        let config: AccessConfig =
            serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt {
                key: CONFIG_KEY.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Some(config.merged_over_defaults()))
    }

    /// Returns the persisted config merged over the defaults.
    ///
    /// Falls back to the defaults when nothing usable is stored.
    #[must_use]
    pub fn load(&self) -> AccessConfig {
        match self.read() {
            Ok(Some(config)) => config,
            Ok(None) => AccessConfig::default(),
            Err(e) => {
                warn!(error = %e, "access config unreadable, using defaults");
                AccessConfig::default()
            }
        }
    }

    /// Like [`load`](Self::load), but persists the defaults when no record
    /// exists yet. A corrupt record is left in place.
    #[must_use]
    pub fn load_or_init(&self) -> AccessConfig {
        self.load_or_init_at_revision().0
    }

    /// Like [`load_or_init`](Self::load_or_init), also returning the
    /// revision the returned config is known to be at least as new as.
    ///
    /// The revision is read before the record, so a write racing the read
    /// shows up as stale on the caller's next revision check.
    #[must_use]
    pub fn load_or_init_at_revision(&self) -> (AccessConfig, u64) {
        let revision = self.revision();
        match self.read() {
            Ok(Some(config)) => (config, revision),
            Ok(None) => {
                let config = AccessConfig::default();
                match self.save(&config) {
                    Ok(written) => {
                        info!("initialized default access config");
                        (config, written)
                    }
                    Err(e) => {
                        warn!(error = %e, "could not persist default access config");
                        (config, revision)
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "access config unreadable, using defaults");
                (AccessConfig::default(), revision)
            }
        }
    }

    /// Persists the full config, replacing the previous record.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be encoded or the backend
    /// rejects the write.
    ///
    /// On success returns the revision this write produced.
    #[instrument(skip_all)]
    pub fn save(&self, config: &AccessConfig) -> Result<u64, StorageError> {
        let raw = serde_json::to_string(config).map_err(|e| StorageError::Unavailable {
            reason: format!("encode access config: {e}"),
        })?;
        self.backend.set(CONFIG_KEY, raw)?;
        let revision = self.revision.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(revision, "access config saved");
        Ok(revision)
    }

    /// Discards the persisted config and writes the defaults back.
    #[instrument(skip_all)]
    pub fn reset(&self) -> AccessConfig {
        if let Err(e) = self.backend.remove(CONFIG_KEY) {
            warn!(error = %e, "could not discard access config");
        }
        let config = AccessConfig::default();
        if let Err(e) = self.save(&config) {
            warn!(error = %e, "could not persist default access config");
        }
        info!("access config reset to defaults");
        config
    }
}
