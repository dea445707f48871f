//! Tiered access control for dentalis.
//!
//! This crate provides:
//! - Privilege tiers (`AccessTier`) and tier-indexed tables (`TierMap`)
//! - The persisted access configuration (`AccessConfig`, `ConfigStore`)
//! - Short-lived elevated session records (`SessionStore`)
//! - The access context that switches tiers (`AccessControl`)
//! - Consumers of the context: `Guard`, `TierSwitcher`, and the menu composer
//!
//! # Access Model
//!
//! Every authenticated user holds `Base` access. Higher tiers are entered
//! by presenting the tier's credential, except for tiers configured as
//! credential-free. Stepping down is always free. A resource is usable when
//! the current tier is at least the resource's configured minimum; unknown
//! resources need only `Base`.
//!
//! # Example
//!
//! ```
//! use dentalis_access::{AccessControl, AccessTier, ConfigStore, MemoryStore, SessionStore};
//! use std::sync::Arc;
//!
//! let config_store = Arc::new(ConfigStore::new(Arc::new(MemoryStore::new())));
//! let control = AccessControl::new(config_store, SessionStore::volatile(), None);
//!
//! assert_eq!(control.current_tier(), AccessTier::Base);
//! assert!(control.can_access("patients"));
//! assert!(!control.can_access("payroll"));
//! ```

pub mod config;
pub mod config_store;
pub mod control;
pub mod error;
pub mod guard;
pub mod menu;
pub mod notice;
pub mod session_store;
pub mod storage;
pub mod switcher;
pub mod tier;

pub use config::{AccessConfig, AccessConfigPatch, SETTINGS_RESOURCE, SessionPolicy, TierAppearance};
pub use config_store::{CONFIG_KEY, ConfigStore};
pub use control::{AccessControl, DEFAULT_VERIFY_DELAY, TierChange};
pub use error::{AccessError, StorageError};
pub use guard::{AttemptTracker, Guard, GuardOutcome, GuardView, LockoutPolicy};
pub use menu::{MenuCatalog, MenuEntry, MenuGroup, compose};
pub use notice::{Notice, NoticeLevel};
pub use session_store::{SESSION_PREFIX, SessionRecord, SessionStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use switcher::{TierOption, TierSwitcher};
pub use tier::{AccessTier, ParseTierError, TierMap};
