//! The access control state machine.
//!
//! An [`AccessControl`] is one access context: the tier currently held by
//! one identity in one browser context, the configuration it is checked
//! against, and the stores both are persisted to. It is constructed once and
//! handed to every consumer by reference; there is no global instance.
//!
//! Every context starts at `Base`. Stepping down or staying is always free,
//! stepping up needs the target tier's credential unless that tier is
//! configured credential-free.

use crate::config::{AccessConfig, AccessConfigPatch, TierAppearance};
use crate::config_store::ConfigStore;
use crate::error::AccessError;
use crate::session_store::SessionStore;
use crate::tier::AccessTier;
use chrono::{DateTime, Utc};
use dentalis_core::UserKey;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{debug, info, instrument, warn};

/// Simulated processing time of a credential check.
pub const DEFAULT_VERIFY_DELAY: Duration = Duration::from_millis(300);

/// A completed tier switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierChange {
    /// Tier held before the switch.
    pub from: AccessTier,
    /// Tier held after the switch.
    pub to: AccessTier,
    /// Whether a credential was checked.
    pub verified: bool,
}

impl TierChange {
    /// Returns true if the switch raised the tier.
    #[must_use]
    pub fn is_step_up(&self) -> bool {
        self.to > self.from
    }
}

/// One access context.
#[derive(Debug)]
pub struct AccessControl {
    config_store: Arc<ConfigStore>,
    session_store: SessionStore,
    config: AccessConfig,
    config_revision: u64,
    current_tier: AccessTier,
    user_key: UserKey,
    verify_delay: Duration,
}

impl AccessControl {
    /// Creates a context for `user_key` (the fallback key when `None`).
    ///
    /// Loads the config, persisting defaults on first run, wipes every
    /// session record in `session_store` and starts at `Base`.
    #[must_use]
    pub fn new(
        config_store: Arc<ConfigStore>,
        session_store: SessionStore,
        user_key: Option<UserKey>,
    ) -> Self {
        let mut control = Self {
            config_store,
            session_store,
            config: AccessConfig::default(),
            config_revision: 0,
            current_tier: AccessTier::Base,
            user_key: user_key.unwrap_or_default(),
            verify_delay: DEFAULT_VERIFY_DELAY,
        };
        control.initialize();
        control
    }

    /// Sets the simulated credential check delay.
    #[must_use]
    pub fn with_verify_delay(mut self, delay: Duration) -> Self {
        self.verify_delay = delay;
        self
    }

    fn initialize(&mut self) {
        (self.config, self.config_revision) = self.config_store.load_or_init_at_revision();
        let cleared = self.session_store.clear_all();
        self.current_tier = AccessTier::Base;
        info!(user = %self.user_key, cleared_sessions = cleared, "access context initialized");
    }

    /// Rebinds the context to another identity and re-initializes it.
    pub fn set_identity(&mut self, user_key: Option<UserKey>) {
        self.user_key = user_key.unwrap_or_default();
        self.initialize();
    }

    /// Returns the tier currently held.
    #[must_use]
    pub fn current_tier(&self) -> AccessTier {
        self.current_tier
    }

    /// Returns the identity this context is bound to.
    #[must_use]
    pub fn user_key(&self) -> &UserKey {
        &self.user_key
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    /// Returns true if the current tier satisfies `required`.
    #[must_use]
    pub fn has_access(&self, required: AccessTier) -> bool {
        self.current_tier.satisfies(required)
    }

    /// Returns the minimum tier of a resource, `Base` when unlisted.
    #[must_use]
    pub fn resource_tier(&self, resource: &str) -> AccessTier {
        self.config.resource_tier(resource)
    }

    /// Returns true if the current tier may use `resource`.
    #[must_use]
    pub fn can_access(&self, resource: &str) -> bool {
        self.has_access(self.resource_tier(resource))
    }

    /// Returns true if switching to `target` would need a credential.
    #[must_use]
    pub fn requires_credential(&self, target: AccessTier) -> bool {
        target > self.current_tier && !self.config.is_credential_free(target)
    }

    /// Returns true if `tier` has a usable credential. Always true for `Base`.
    #[must_use]
    pub fn is_credential_set(&self, tier: AccessTier) -> bool {
        self.config.is_credential_set(tier)
    }

    /// Returns the appearance of a tier.
    #[must_use]
    pub fn appearance(&self, tier: AccessTier) -> &TierAppearance {
        self.config.appearance(tier)
    }

    /// Returns the display name of a tier.
    #[must_use]
    pub fn tier_label(&self, tier: AccessTier) -> &str {
        &self.appearance(tier).label
    }

    /// Returns the icon name of a tier.
    #[must_use]
    pub fn tier_icon(&self, tier: AccessTier) -> &str {
        &self.appearance(tier).icon
    }

    /// Returns the color of a tier.
    #[must_use]
    pub fn tier_color(&self, tier: AccessTier) -> &str {
        &self.appearance(tier).color
    }

    /// Switches to `target`.
    ///
    /// Stepping down, staying, and entering a credential-free tier always
    /// succeed. Stepping up otherwise checks `credential` against the target's
    /// configured secret after the simulated verification delay. On success
    /// the tier is updated before the session record is written, and both
    /// happen before this returns.
    ///
    /// # Errors
    ///
    /// - `CredentialNotConfigured` if the target's credential is unset
    /// - `CredentialMismatch` if `credential` does not match
    ///
    /// The current tier is unchanged on error.
    #[instrument(skip(self, credential), fields(user = %self.user_key, from = %self.current_tier))]
    pub async fn switch_tier(
        &mut self,
        target: AccessTier,
        credential: Option<&str>,
    ) -> Result<TierChange, AccessError> {
        if target <= self.current_tier || self.config.is_credential_free(target) {
            return Ok(self.commit(target, false));
        }

        tokio::time::sleep(self.verify_delay).await;

        let Some(expected) = self.config.credential(target) else {
            warn!(%target, "step-up refused: no credential configured");
            return Err(AccessError::CredentialNotConfigured { tier: target });
        };

        let supplied = credential.unwrap_or_default();
        if !bool::from(supplied.as_bytes().ct_eq(expected.as_bytes())) {
            warn!(%target, "step-up refused: credential mismatch");
            return Err(AccessError::CredentialMismatch { tier: target });
        }

        Ok(self.commit(target, true))
    }

    fn commit(&mut self, target: AccessTier, verified: bool) -> TierChange {
        let change = TierChange {
            from: self.current_tier,
            to: target,
            verified,
        };
        self.current_tier = target;
        self.persist_session();
        info!(user = %self.user_key, from = %change.from, to = %change.to, "access tier switched");
        change
    }

    fn persist_session(&self) {
        let policy = &self.config.session_policy;
        if self.current_tier.is_elevated() && policy.require_credential_per_session {
            self.session_store
                .save(&self.user_key, self.current_tier, policy);
        } else {
            self.session_store.clear(&self.user_key);
        }
    }

    /// Steps down to `Base` and forgets this identity's session record.
    ///
    /// The authenticated identity itself is kept.
    pub fn logout(&mut self) {
        let from = self.current_tier;
        self.current_tier = AccessTier::Base;
        self.session_store.clear(&self.user_key);
        info!(user = %self.user_key, %from, "stepped down to base");
    }

    /// Demotes to `Base` when the elevated session has lapsed.
    ///
    /// Only applies while the session policy both records sessions and has
    /// auto logout enabled. Returns true if the tier was lowered.
    pub fn enforce_expiry(&mut self) -> bool {
        self.enforce_expiry_at(Utc::now())
    }

    /// Like [`enforce_expiry`](Self::enforce_expiry) with an explicit time.
    pub fn enforce_expiry_at(&mut self, now: DateTime<Utc>) -> bool {
        if !self.current_tier.is_elevated() || !self.config.session_policy.enforces_expiry() {
            return false;
        }
        if self.session_store.load_at(&self.user_key, now).is_some() {
            return false;
        }

        info!(user = %self.user_key, from = %self.current_tier, "elevated session expired");
        self.current_tier = AccessTier::Base;
        true
    }

    /// Applies a shallow config update and persists it.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if the patch breaks an invariant; nothing changes
    /// - `StorageUnavailable` if persisting fails; the in-memory config keeps
    ///   the update
    #[instrument(skip_all, fields(user = %self.user_key))]
    pub fn update_config(&mut self, patch: AccessConfigPatch) -> Result<(), AccessError> {
        patch.validate()?;
        if patch.is_empty() {
            debug!("empty config patch ignored");
            return Ok(());
        }

        self.config.apply(patch);
        self.config = std::mem::take(&mut self.config).merged_over_defaults();

        self.config_revision =
            self.config_store
                .save(&self.config)
                .map_err(|e| AccessError::StorageUnavailable {
                    reason: e.to_string(),
                })?;
        info!(revision = self.config_revision, "access config updated");
        Ok(())
    }

    /// Resets the persisted config to the defaults and adopts them.
    ///
    /// The revision is taken before the reset so a concurrent write is never
    /// mistaken for this one.
    pub fn reset_config(&mut self) {
        self.config_revision = self.config_store.revision();
        self.config = self.config_store.reset();
    }

    /// Reloads the config if another context wrote a newer one.
    ///
    /// Returns true if the config was reloaded.
    pub fn sync_config(&mut self) -> bool {
        let revision = self.config_store.revision();
        if revision == self.config_revision {
            return false;
        }
        self.config = self.config_store.load();
        self.config_revision = revision;
        debug!(user = %self.user_key, revision, "access config reloaded");
        true
    }
}
