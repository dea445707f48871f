//! Centralized server configuration.
//!
//! Loaded via the `config` crate from `DENTALIS_`-prefixed environment
//! variables, with `__` separating nested keys, e.g.
//! `DENTALIS_ACCESS__VERIFY_DELAY_MS=0`.

use dentalis_access::LockoutPolicy;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Directory holding the durable access config document.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Shared bearer token. When unset any non-empty bearer token is
    /// accepted and identity comes from the `X-User-Key` header alone.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Access control tuning.
    #[serde(default)]
    pub access: AccessSettings,
}

/// Tuning knobs for step-up verification and per-identity state.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessSettings {
    /// Simulated credential check delay, in milliseconds.
    #[serde(default = "default_verify_delay_ms")]
    pub verify_delay_ms: u64,

    /// Failed unlocks before a resource prompt locks.
    #[serde(default = "default_lockout_max_failures")]
    pub lockout_max_failures: u32,

    /// How long a locked prompt stays locked, in seconds.
    #[serde(default = "default_lockout_cooldown_secs")]
    pub lockout_cooldown_secs: u64,

    /// Access contexts held in memory before idle ones are evicted.
    #[serde(default = "default_max_contexts")]
    pub max_contexts: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_verify_delay_ms() -> u64 {
    300
}

fn default_lockout_max_failures() -> u32 {
    3
}

fn default_lockout_cooldown_secs() -> u64 {
    30
}

fn default_max_contexts() -> usize {
    crate::state::DEFAULT_MAX_CONTEXTS
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            verify_delay_ms: default_verify_delay_ms(),
            lockout_max_failures: default_lockout_max_failures(),
            lockout_cooldown_secs: default_lockout_cooldown_secs(),
            max_contexts: default_max_contexts(),
        }
    }
}

impl AccessSettings {
    #[must_use]
    pub fn verify_delay(&self) -> Duration {
        Duration::from_millis(self.verify_delay_ms)
    }

    #[must_use]
    pub fn lockout(&self) -> LockoutPolicy {
        LockoutPolicy {
            max_failures: self.lockout_max_failures.max(1),
            cooldown: Duration::from_secs(self.lockout_cooldown_secs),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_dir: default_data_dir(),
            auth_token: None,
            access: AccessSettings::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_config(
            config::Config::builder()
                .add_source(
                    config::Environment::with_prefix("DENTALIS")
                        .prefix_separator("_")
                        .separator("__")
                        .try_parsing(true),
                )
                .build()?,
        )
    }

    /// Deserializes an already-built configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a value has the wrong type.
    pub fn from_config(config: config::Config) -> Result<Self, config::ConfigError> {
        config.try_deserialize()
    }

    /// Path of the durable access config document.
    #[must_use]
    pub fn access_document(&self) -> PathBuf {
        self.data_dir.join("access.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = ServerConfig::from_config(
            config::Config::builder().build().expect("build"),
        )
        .expect("deserialize");

        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.access_document(), PathBuf::from("data/access.json"));
        assert_eq!(config.auth_token, None);
        assert_eq!(config.access.verify_delay(), Duration::from_millis(300));
        assert_eq!(config.access.lockout(), LockoutPolicy::default());
        assert_eq!(config.access.max_contexts, 1024);
    }

    #[test]
    fn nested_overrides_apply() {
        let config = ServerConfig::from_config(
            config::Config::builder()
                .set_override("access.verify_delay_ms", 0)
                .expect("override")
                .set_override("access.lockout_max_failures", 5)
                .expect("override")
                .set_override("auth_token", "front-desk-token")
                .expect("override")
                .build()
                .expect("build"),
        )
        .expect("deserialize");

        assert_eq!(config.access.verify_delay(), Duration::ZERO);
        assert_eq!(config.access.lockout().max_failures, 5);
        assert_eq!(config.access.lockout_cooldown_secs, 30);
        assert_eq!(config.auth_token.as_deref(), Some("front-desk-token"));
    }

    #[test]
    fn zero_failures_still_allows_one_attempt() {
        let settings = AccessSettings {
            lockout_max_failures: 0,
            ..AccessSettings::default()
        };
        assert_eq!(settings.lockout().max_failures, 1);
    }
}
