//! Access control configuration.
//!
//! One `AccessConfig` record holds everything an administrator can change:
//! tier credentials, which tiers are credential-free, the minimum tier of
//! every resource, the session policy and the tier appearance. Every field
//! has a hard-coded default so that older or partial records always load.

use crate::error::AccessError;
use crate::tier::{AccessTier, TierMap};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum tiers of the clinic's known resources.
const DEFAULT_RESOURCE_TIERS: &[(&str, AccessTier)] = &[
    ("dashboard", AccessTier::Base),
    ("patients", AccessTier::Base),
    ("appointments", AccessTier::Base),
    ("medical-forms", AccessTier::Base),
    ("treatments", AccessTier::Elevated1),
    ("doctors", AccessTier::Elevated1),
    ("products", AccessTier::Elevated1),
    ("lab-orders", AccessTier::Elevated1),
    ("billing", AccessTier::Elevated2),
    ("payments", AccessTier::Elevated2),
    ("reports", AccessTier::Elevated2),
    ("expenses", AccessTier::Elevated2),
    ("payroll", AccessTier::Elevated3),
    ("access-settings", AccessTier::Elevated3),
    ("audit-log", AccessTier::Elevated3),
];

/// Resource whose tier gates editing of this configuration.
///
/// Always requires [`AccessTier::TOP`]; the mapping cannot be lowered.
pub const SETTINGS_RESOURCE: &str = "access-settings";

/// How elevated sessions are recorded and when they lapse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    /// Lifetime of an elevated session record, in minutes. Must be positive.
    pub expiry_minutes: u32,
    /// Whether elevated tiers are recorded in the session store at all.
    pub require_credential_per_session: bool,
    /// Whether an expired session record demotes the holder to `Base`.
    pub auto_logout_enabled: bool,
}

impl SessionPolicy {
    /// Returns the session lifetime as a duration.
    #[must_use]
    pub fn expiry(&self) -> Duration {
        Duration::minutes(i64::from(self.expiry_minutes))
    }

    /// Returns true if elevated sessions should lapse on expiry.
    #[must_use]
    pub fn enforces_expiry(&self) -> bool {
        self.auto_logout_enabled && self.require_credential_per_session
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            expiry_minutes: 30,
            require_credential_per_session: true,
            auto_logout_enabled: true,
        }
    }
}

/// Display metadata for a tier.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TierAppearance {
    /// Human-readable tier name.
    pub label: String,
    /// Icon name understood by the front end.
    pub icon: String,
    /// CSS color used for badges and menu group headers.
    pub color: String,
}

impl TierAppearance {
    /// Returns the built-in appearance of a tier.
    #[must_use]
    pub fn for_tier(tier: AccessTier) -> Self {
        let (label, icon, color) = match tier {
            AccessTier::Base => ("Reception", "user", "#64748b"),
            AccessTier::Elevated1 => ("Clinical", "stethoscope", "#0ea5e9"),
            AccessTier::Elevated2 => ("Owner", "briefcase", "#f59e0b"),
            AccessTier::Elevated3 => ("Administrator", "shield", "#dc2626"),
        };
        Self {
            label: label.to_string(),
            icon: icon.to_string(),
            color: color.to_string(),
        }
    }

    fn fill_blanks_from(&mut self, fallback: TierAppearance) {
        if self.label.trim().is_empty() {
            self.label = fallback.label;
        }
        if self.icon.trim().is_empty() {
            self.icon = fallback.icon;
        }
        if self.color.trim().is_empty() {
            self.color = fallback.color;
        }
    }
}

/// The complete access control configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Tier recorded as the deployment default. Contexts still start at `Base`.
    pub default_tier: AccessTier,
    /// Secret per tier. The `Base` slot is never consulted.
    pub credentials: TierMap<String>,
    /// Non-`Base` tiers that may be entered without a credential.
    pub credential_free_tiers: Vec<AccessTier>,
    /// Minimum tier per resource. Unlisted resources are `Base`.
    pub resource_access: BTreeMap<String, AccessTier>,
    /// Session recording and expiry policy.
    pub session_policy: SessionPolicy,
    /// Label, icon and color per tier.
    pub appearance: TierMap<TierAppearance>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            default_tier: AccessTier::Base,
            credentials: TierMap::from_fn(|tier| match tier {
                AccessTier::Base | AccessTier::Elevated1 => String::new(),
                AccessTier::Elevated2 => "owner456".to_string(),
                AccessTier::Elevated3 => "admin789".to_string(),
            }),
            credential_free_tiers: vec![AccessTier::Elevated1],
            resource_access: default_resource_access(),
            session_policy: SessionPolicy::default(),
            appearance: TierMap::from_fn(TierAppearance::for_tier),
        }
    }
}

/// Returns the built-in resource map.
#[must_use]
pub fn default_resource_access() -> BTreeMap<String, AccessTier> {
    DEFAULT_RESOURCE_TIERS
        .iter()
        .map(|(resource, tier)| ((*resource).to_string(), *tier))
        .collect()
}

impl AccessConfig {
    /// Returns the minimum tier of a resource, `Base` when unlisted.
    #[must_use]
    pub fn resource_tier(&self, resource: &str) -> AccessTier {
        self.resource_access
            .get(resource)
            .copied()
            .unwrap_or(AccessTier::Base)
    }

    /// Returns the usable credential of a tier.
    ///
    /// `Base` never has one; blank credentials count as unset.
    #[must_use]
    pub fn credential(&self, tier: AccessTier) -> Option<&str> {
        if !tier.is_elevated() {
            return None;
        }
        let secret = self.credentials[tier].as_str();
        (!secret.trim().is_empty()).then_some(secret)
    }

    /// Returns true if the tier's credential is usable. Always true for `Base`.
    #[must_use]
    pub fn is_credential_set(&self, tier: AccessTier) -> bool {
        !tier.is_elevated() || self.credential(tier).is_some()
    }

    /// Returns true if the tier can be entered without a credential.
    #[must_use]
    pub fn is_credential_free(&self, tier: AccessTier) -> bool {
        !tier.is_elevated() || self.credential_free_tiers.contains(&tier)
    }

    /// Returns the appearance of a tier.
    #[must_use]
    pub fn appearance(&self, tier: AccessTier) -> &TierAppearance {
        &self.appearance[tier]
    }

    /// Layers a loaded record over the built-in defaults.
    ///
    /// Resource entries missing from the record keep their default tier and
    /// blank appearance fields take the built-in values.
    #[must_use]
    pub fn merged_over_defaults(mut self) -> Self {
        let mut resources = default_resource_access();
        resources.append(&mut self.resource_access);
        resources.insert(SETTINGS_RESOURCE.to_string(), AccessTier::TOP);
        self.resource_access = resources;

        for tier in AccessTier::ALL {
            self.appearance[tier].fill_blanks_from(TierAppearance::for_tier(tier));
        }

        self.credential_free_tiers.retain(|t| t.is_elevated());
        self.credential_free_tiers.sort();
        self.credential_free_tiers.dedup();
        self
    }

    /// Applies a patch, replacing every field the patch carries.
    pub fn apply(&mut self, patch: AccessConfigPatch) {
        let AccessConfigPatch {
            default_tier,
            credentials,
            credential_free_tiers,
            resource_access,
            session_policy,
            appearance,
        } = patch;

        if let Some(default_tier) = default_tier {
            self.default_tier = default_tier;
        }
        if let Some(credentials) = credentials {
            self.credentials = credentials;
        }
        if let Some(mut tiers) = credential_free_tiers {
            tiers.sort();
            tiers.dedup();
            self.credential_free_tiers = tiers;
        }
        if let Some(resource_access) = resource_access {
            self.resource_access = resource_access;
        }
        if let Some(session_policy) = session_policy {
            self.session_policy = session_policy;
        }
        if let Some(appearance) = appearance {
            self.appearance = appearance;
        }
    }
}

/// A shallow update to [`AccessConfig`]: each present field replaces the
/// whole corresponding field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessConfigPatch {
    pub default_tier: Option<AccessTier>,
    pub credentials: Option<TierMap<String>>,
    pub credential_free_tiers: Option<Vec<AccessTier>>,
    pub resource_access: Option<BTreeMap<String, AccessTier>>,
    pub session_policy: Option<SessionPolicy>,
    pub appearance: Option<TierMap<TierAppearance>>,
}

impl AccessConfigPatch {
    /// Rejects patches that would break a configuration invariant.
    ///
    /// # Errors
    ///
    /// Returns `AccessError::InvalidConfig` when the session expiry is not
    /// positive or `Base` is listed as credential-free.
    pub fn validate(&self) -> Result<(), AccessError> {
        if self
            .session_policy
            .as_ref()
            .is_some_and(|policy| policy.expiry_minutes == 0)
        {
            return Err(AccessError::InvalidConfig {
                reason: "session expiry must be at least one minute".to_string(),
            });
        }
        if self
            .credential_free_tiers
            .as_ref()
            .is_some_and(|tiers| tiers.contains(&AccessTier::Base))
        {
            return Err(AccessError::InvalidConfig {
                reason: "base tier cannot be listed as credential-free".to_string(),
            });
        }
        if self
            .resource_access
            .as_ref()
            .and_then(|resources| resources.get(SETTINGS_RESOURCE))
            .is_some_and(|tier| *tier != AccessTier::TOP)
        {
            return Err(AccessError::InvalidConfig {
                reason: format!("{SETTINGS_RESOURCE} always requires the top tier"),
            });
        }
        Ok(())
    }

    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
