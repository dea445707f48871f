//! Shared application state and per-identity access contexts.

use crate::auth::{PassthroughVerifier, SharedTokenVerifier, TokenVerifier};
use crate::config::ServerConfig;
use crate::error::ApiError;
use dentalis_access::{
    AccessControl, AccessTier, AttemptTracker, ConfigStore, FileStore, Guard, GuardView,
    LockoutPolicy, MenuCatalog, SessionStore, TierMap,
};
use dentalis_core::UserKey;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Contexts kept before idle ones are evicted.
pub const DEFAULT_MAX_CONTEXTS: usize = 1024;

/// Access state of one identity: its context plus the attempt counters it
/// has accumulated.
///
/// Guards are only kept while they remember something. A resource that is
/// merely looked at never allocates one.
#[derive(Debug)]
pub struct UserContext {
    pub control: AccessControl,
    guards: HashMap<String, Guard>,
    switch_attempts: TierMap<AttemptTracker>,
    lockout: LockoutPolicy,
    last_seen: Instant,
}

impl UserContext {
    fn new(control: AccessControl, lockout: LockoutPolicy) -> Self {
        Self {
            control,
            guards: HashMap::new(),
            switch_attempts: TierMap::from_fn(|_| AttemptTracker::new(lockout)),
            lockout,
            last_seen: Instant::now(),
        }
    }

    /// Picks up config written by other identities and drops lapsed elevation.
    pub fn refresh(&mut self) {
        self.last_seen = Instant::now();
        self.control.sync_config();
        self.control.enforce_expiry();
    }

    /// Decides what `resource` shows without tracking it.
    #[must_use]
    pub fn view(&self, resource: &str) -> GuardView {
        match self.guards.get(resource) {
            Some(guard) => guard.view(&self.control),
            None => Guard::with_policy(resource, self.lockout).view(&self.control),
        }
    }

    /// Returns the guard for `resource`, creating it on first use.
    pub fn guard(&mut self, resource: &str) -> &mut Guard {
        self.guard_and_control(resource).0
    }

    /// Splits the context so a guard can drive the access control.
    ///
    /// Call [`prune`](Self::prune) once the guard is done with.
    pub fn guard_and_control(&mut self, resource: &str) -> (&mut Guard, &mut AccessControl) {
        let lockout = self.lockout;
        let guard = self
            .guards
            .entry(resource.to_string())
            .or_insert_with(|| Guard::with_policy(resource, lockout));
        (guard, &mut self.control)
    }

    /// Splits the context so a tier switch can be attempt-limited.
    pub fn switch_attempts_and_control(
        &mut self,
        target: AccessTier,
    ) -> (&mut AttemptTracker, &mut AccessControl) {
        (&mut self.switch_attempts[target], &mut self.control)
    }

    /// Drops guards that hold nothing, and guards of resources the config no
    /// longer lists.
    pub fn prune(&mut self) {
        let listed = &self.control.config().resource_access;
        self.guards
            .retain(|resource, guard| !guard.is_clear() && listed.contains_key(resource));
    }

    /// Number of guards currently tracked.
    #[must_use]
    pub fn tracked_guards(&self) -> usize {
        self.guards.len()
    }

    /// Returns true if some attempt counter is inside its cool-down.
    #[must_use]
    pub fn is_locked_out(&self) -> bool {
        self.guards.values().any(|g| g.locked_for().is_some())
            || self.switch_attempts.iter().any(|(_, t)| t.locked_for().is_some())
    }

    /// Returns true if dropping the context would lose nothing: it sits at
    /// `Base` and remembers no failures.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.control.current_tier() == AccessTier::Base
            && self.guards.values().all(Guard::is_clear)
            && self.switch_attempts.iter().all(|(_, t)| t.is_clear())
    }
}

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    config_store: Arc<ConfigStore>,
    verifier: Arc<dyn TokenVerifier>,
    catalog: MenuCatalog,
    verify_delay: Duration,
    lockout: LockoutPolicy,
    max_contexts: usize,
    contexts: Mutex<HashMap<UserKey, Arc<Mutex<UserContext>>>>,
}

impl AppState {
    /// Creates state over an existing config store.
    #[must_use]
    pub fn new(config_store: Arc<ConfigStore>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            config_store,
            verifier,
            catalog: MenuCatalog::clinic(),
            verify_delay: dentalis_access::DEFAULT_VERIFY_DELAY,
            lockout: LockoutPolicy::default(),
            max_contexts: DEFAULT_MAX_CONTEXTS,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Builds state from the server configuration, backing the access
    /// config with the document under `data_dir`.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        let backend = FileStore::new(config.access_document());
        let verifier: Arc<dyn TokenVerifier> = match &config.auth_token {
            Some(token) if !token.trim().is_empty() => Arc::new(SharedTokenVerifier::new(token)),
            _ => Arc::new(PassthroughVerifier),
        };
        Self::new(Arc::new(ConfigStore::new(Arc::new(backend))), verifier)
            .with_verify_delay(config.access.verify_delay())
            .with_lockout(config.access.lockout())
            .with_max_contexts(config.access.max_contexts)
    }

    #[must_use]
    pub fn with_verify_delay(mut self, delay: Duration) -> Self {
        self.verify_delay = delay;
        self
    }

    #[must_use]
    pub fn with_lockout(mut self, lockout: LockoutPolicy) -> Self {
        self.lockout = lockout;
        self
    }

    /// Caps the number of access contexts held at once. At least one.
    #[must_use]
    pub fn with_max_contexts(mut self, max_contexts: usize) -> Self {
        self.max_contexts = max_contexts.max(1);
        self
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: MenuCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    #[must_use]
    pub fn verifier(&self) -> &dyn TokenVerifier {
        self.verifier.as_ref()
    }

    #[must_use]
    pub fn catalog(&self) -> &MenuCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn config_store(&self) -> &Arc<ConfigStore> {
        &self.config_store
    }

    /// Number of access contexts currently held.
    pub async fn context_count(&self) -> usize {
        self.contexts.lock().await.len()
    }

    /// Returns the access context of `user_key`, creating it at `Base` on
    /// first use.
    ///
    /// Each identity gets its own volatile session store; all of them share
    /// the durable config store. When the cap is reached, idle contexts are
    /// evicted first, then the least recently seen ones. Contexts in use or
    /// inside a lockout cool-down are never evicted.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Overloaded` when the cap is reached and nothing
    /// can be evicted.
    pub async fn context(&self, user_key: &UserKey) -> Result<Arc<Mutex<UserContext>>, ApiError> {
        let mut contexts = self.contexts.lock().await;
        if let Some(existing) = contexts.get(user_key) {
            return Ok(Arc::clone(existing));
        }

        if contexts.len() >= self.max_contexts {
            evict(&mut contexts, self.max_contexts);
            if contexts.len() >= self.max_contexts {
                warn!(active = contexts.len(), "no access context could be evicted");
                return Err(ApiError::Overloaded);
            }
        }

        let control = AccessControl::new(
            Arc::clone(&self.config_store),
            SessionStore::volatile(),
            Some(user_key.clone()),
        )
        .with_verify_delay(self.verify_delay);
        let context = Arc::new(Mutex::new(UserContext::new(control, self.lockout)));
        contexts.insert(user_key.clone(), Arc::clone(&context));
        debug!(user = %user_key, active = contexts.len(), "access context created");
        Ok(context)
    }
}

/// Makes room for one more context.
fn evict(contexts: &mut HashMap<UserKey, Arc<Mutex<UserContext>>>, max_contexts: usize) {
    let before = contexts.len();
    let mut candidates = Vec::new();
    for (key, context) in contexts.iter() {
        // Someone else holds a handle: the context is in use.
        if Arc::strong_count(context) > 1 {
            continue;
        }
        let Ok(context) = context.try_lock() else {
            continue;
        };
        if context.is_idle() {
            candidates.push((true, context.last_seen, key.clone()));
        } else if !context.is_locked_out() {
            candidates.push((false, context.last_seen, key.clone()));
        }
    }

    // Idle first, then oldest first.
    candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    let idle = candidates.iter().take_while(|c| c.0).count();
    let needed = before + 1 - max_contexts;
    for (_, _, key) in candidates.into_iter().take(idle.max(needed)) {
        contexts.remove(&key);
    }
    info!(evicted = before - contexts.len(), active = contexts.len(), "access contexts evicted");
}
