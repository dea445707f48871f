//! Gate a named resource behind its required tier.
//!
//! A [`Guard`] decides between showing the protected content and asking for
//! a step-up. It also owns the attempt counter: after too many failed
//! submissions it refuses input until a cool-down passes. The counter is an
//! [`AttemptTracker`] local to the guard; the access core never counts
//! attempts.

use crate::control::AccessControl;
use crate::error::AccessError;
use crate::tier::AccessTier;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

/// How many failures lock a guard, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Consecutive failures that trigger the lock.
    pub max_failures: u32,
    /// How long submission stays locked.
    pub cooldown: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failures: 3,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// What a guard shows for its resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuardView {
    /// The current tier is sufficient.
    Content,
    /// A step-up is needed.
    Prompt {
        required: AccessTier,
        /// False when a single "switch" action is enough.
        needs_credential: bool,
        /// False when the tier cannot be reached until a credential is configured.
        credential_set: bool,
        /// Remaining cool-down, if submission is locked.
        #[serde(skip_serializing_if = "Option::is_none", with = "opt_secs")]
        locked_for: Option<Duration>,
    },
    /// The prompt was dismissed without stepping up.
    Dismissed { required: AccessTier },
}

/// Result of a guard submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Access is held; show the content.
    Granted,
    /// The switch failed. `attempts_left == 0` means the guard just locked.
    Rejected {
        error: AccessError,
        attempts_left: u32,
    },
    /// Submission is locked; the core was not consulted.
    LockedOut { retry_after: Duration },
}

/// Consecutive-failure counter with a cool-down lock.
///
/// Shared by [`Guard`] and any other caller that lets a person retry a
/// credential.
#[derive(Debug, Clone)]
pub struct AttemptTracker {
    policy: LockoutPolicy,
    failures: u32,
    locked_until: Option<Instant>,
}

impl AttemptTracker {
    #[must_use]
    pub fn new(policy: LockoutPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            locked_until: None,
        }
    }

    /// Returns the consecutive failure count.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Returns the remaining cool-down, if attempts are locked.
    #[must_use]
    pub fn locked_for(&self) -> Option<Duration> {
        self.locked_until
            .map(|until| until.saturating_duration_since(Instant::now()))
            .filter(|remaining| !remaining.is_zero())
    }

    /// Returns true if the tracker behaves like a fresh one.
    ///
    /// An expired lock counts as clear since the next attempt resets it.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.locked_for().is_none() && (self.failures == 0 || self.locked_until.is_some())
    }

    /// Admits an attempt, or returns the remaining cool-down.
    ///
    /// An expired lock is lifted and the counter starts over.
    pub fn begin(&mut self) -> Result<(), Duration> {
        if let Some(retry_after) = self.locked_for() {
            return Err(retry_after);
        }
        if self.locked_until.take().is_some() {
            self.failures = 0;
        }
        Ok(())
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// Counts a failure and returns the attempts left; zero means locked.
    pub fn record_failure(&mut self) -> u32 {
        self.failures += 1;
        let attempts_left = self.policy.max_failures.saturating_sub(self.failures);
        if attempts_left == 0 {
            self.locked_until = Some(Instant::now() + self.policy.cooldown);
            info!(failures = self.failures, cooldown = ?self.policy.cooldown, "attempts locked after repeated failures");
        }
        attempts_left
    }
}

impl Default for AttemptTracker {
    fn default() -> Self {
        Self::new(LockoutPolicy::default())
    }
}

/// Per-resource gate with its own attempt counter.
#[derive(Debug, Clone)]
pub struct Guard {
    resource: String,
    attempts: AttemptTracker,
    dismissed: bool,
}

impl Guard {
    /// Creates a guard for `resource` with the default lockout policy.
    #[must_use]
    pub fn new(resource: impl Into<String>) -> Self {
        Self::with_policy(resource, LockoutPolicy::default())
    }

    /// Creates a guard for `resource` with a custom lockout policy.
    #[must_use]
    pub fn with_policy(resource: impl Into<String>, policy: LockoutPolicy) -> Self {
        Self {
            resource: resource.into(),
            attempts: AttemptTracker::new(policy),
            dismissed: false,
        }
    }

    /// Returns the guarded resource.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Returns the consecutive failure count.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.attempts.failures()
    }

    /// Returns the remaining cool-down, if submission is locked.
    #[must_use]
    pub fn locked_for(&self) -> Option<Duration> {
        self.attempts.locked_for()
    }

    /// Returns true if the guard behaves like a fresh one: no failures worth
    /// remembering and no dismissed prompt.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        !self.dismissed && self.attempts.is_clear()
    }

    /// Decides what to show for the current tier.
    #[must_use]
    pub fn view(&self, control: &AccessControl) -> GuardView {
        let required = control.resource_tier(&self.resource);
        if control.has_access(required) {
            return GuardView::Content;
        }
        if self.dismissed {
            return GuardView::Dismissed { required };
        }
        GuardView::Prompt {
            required,
            needs_credential: control.requires_credential(required),
            credential_set: control.is_credential_set(required),
            locked_for: self.locked_for(),
        }
    }

    /// Attempts the step-up to the resource's required tier.
    ///
    /// Succeeds immediately when access is already held. A locked guard
    /// answers without touching `control`.
    #[instrument(skip(self, control, credential), fields(resource = %self.resource))]
    pub async fn submit(
        &mut self,
        control: &mut AccessControl,
        credential: Option<&str>,
    ) -> GuardOutcome {
        self.dismissed = false;
        let required = control.resource_tier(&self.resource);
        if control.has_access(required) {
            return GuardOutcome::Granted;
        }

        if let Err(retry_after) = self.attempts.begin() {
            debug!(?retry_after, "guard locked");
            return GuardOutcome::LockedOut { retry_after };
        }

        match control.switch_tier(required, credential).await {
            Ok(_) => {
                self.attempts.record_success();
                GuardOutcome::Granted
            }
            Err(error) => GuardOutcome::Rejected {
                error,
                attempts_left: self.attempts.record_failure(),
            },
        }
    }

    /// Dismisses the prompt. The tier and the attempt counter are left alone.
    pub fn cancel(&mut self) {
        self.dismissed = true;
    }

    /// Brings a dismissed prompt back.
    pub fn reopen(&mut self) {
        self.dismissed = false;
    }
}

mod opt_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64().ceil()),
            None => s.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::ConfigStore;
    use crate::session_store::SessionStore;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn control() -> AccessControl {
        AccessControl::new(
            Arc::new(ConfigStore::new(Arc::new(MemoryStore::new()))),
            SessionStore::volatile(),
            None,
        )
    }

    #[test]
    fn base_resource_shows_content() {
        let control = control();
        assert_eq!(Guard::new("patients").view(&control), GuardView::Content);
        assert_eq!(Guard::new("unknown-page").view(&control), GuardView::Content);
    }

    #[test]
    fn elevated_resource_prompts() {
        let control = control();
        assert_eq!(
            Guard::new("billing").view(&control),
            GuardView::Prompt {
                required: AccessTier::Elevated2,
                needs_credential: true,
                credential_set: true,
                locked_for: None,
            }
        );
        assert_eq!(
            Guard::new("treatments").view(&control),
            GuardView::Prompt {
                required: AccessTier::Elevated1,
                needs_credential: false,
                credential_set: false,
                locked_for: None,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn correct_credential_grants_content() {
        let mut control = control();
        let mut guard = Guard::new("billing");

        let outcome = guard.submit(&mut control, Some("owner456")).await;

        assert_eq!(outcome, GuardOutcome::Granted);
        assert_eq!(control.current_tier(), AccessTier::Elevated2);
        assert_eq!(guard.view(&control), GuardView::Content);
    }

    #[tokio::test(start_paused = true)]
    async fn three_failures_lock_the_guard() {
        let mut control = control();
        let mut guard = Guard::new("payroll");

        for expected_left in [2, 1, 0] {
            let outcome = guard.submit(&mut control, Some("guess")).await;
            assert_eq!(
                outcome,
                GuardOutcome::Rejected {
                    error: AccessError::CredentialMismatch {
                        tier: AccessTier::Elevated3
                    },
                    attempts_left: expected_left,
                }
            );
        }

        let outcome = guard.submit(&mut control, Some("admin789")).await;
        assert!(matches!(outcome, GuardOutcome::LockedOut { .. }));
        assert_eq!(control.current_tier(), AccessTier::Base);
        assert!(matches!(
            guard.view(&control),
            GuardView::Prompt {
                locked_for: Some(_),
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn lock_expires_and_resets_counter() {
        let mut control = control();
        let mut guard = Guard::new("payroll");
        for _ in 0..3 {
            guard.submit(&mut control, None).await;
        }
        assert!(guard.locked_for().is_some());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(guard.locked_for(), None);

        let outcome = guard.submit(&mut control, Some("nope")).await;
        assert!(matches!(
            outcome,
            GuardOutcome::Rejected {
                attempts_left: 2,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_counter() {
        let mut control = control();
        let mut guard = Guard::new("reports");

        guard.submit(&mut control, Some("x")).await;
        guard.submit(&mut control, Some("y")).await;
        assert_eq!(guard.failures(), 2);

        assert_eq!(
            guard.submit(&mut control, Some("owner456")).await,
            GuardOutcome::Granted
        );
        assert_eq!(guard.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn credential_free_tier_switches_without_input() {
        let mut control = control();
        let mut guard = Guard::new("lab-orders");
        assert_eq!(guard.submit(&mut control, None).await, GuardOutcome::Granted);
        assert_eq!(control.current_tier(), AccessTier::Elevated1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_leaves_tier_and_lockout_alone() {
        let mut control = control();
        let mut guard = Guard::with_policy(
            "audit-log",
            LockoutPolicy {
                max_failures: 1,
                cooldown: Duration::from_secs(5),
            },
        );
        guard.submit(&mut control, Some("bad")).await;

        guard.cancel();

        assert_eq!(control.current_tier(), AccessTier::Base);
        assert_eq!(
            guard.view(&control),
            GuardView::Dismissed {
                required: AccessTier::Elevated3
            }
        );
        guard.reopen();
        assert!(guard.locked_for().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn tracker_locks_and_clears() {
        let mut tracker = AttemptTracker::new(LockoutPolicy {
            max_failures: 2,
            cooldown: Duration::from_secs(10),
        });
        assert!(tracker.is_clear());
        assert_eq!(tracker.begin(), Ok(()));
        assert_eq!(tracker.record_failure(), 1);
        assert!(!tracker.is_clear());
        assert_eq!(tracker.record_failure(), 0);
        assert!(tracker.begin().is_err());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(tracker.is_clear());
        assert_eq!(tracker.begin(), Ok(()));
        assert_eq!(tracker.failures(), 0);
    }

    #[test]
    fn prompt_serializes_lock_in_seconds() {
        let view = GuardView::Prompt {
            required: AccessTier::Elevated2,
            needs_credential: true,
            credential_set: true,
            locked_for: Some(Duration::from_millis(12_300)),
        };
        let json = serde_json::to_value(&view).expect("serialize");
        assert_eq!(json["kind"], "prompt");
        assert_eq!(json["required"], "elevated2");
        assert_eq!(json["locked_for"], 13.0);
    }
}
