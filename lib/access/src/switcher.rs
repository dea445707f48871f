//! The explicit tier picker.

use crate::control::{AccessControl, TierChange};
use crate::error::AccessError;
use crate::tier::AccessTier;
use serde::Serialize;

/// One entry of the tier picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierOption {
    pub tier: AccessTier,
    pub label: String,
    pub icon: String,
    pub color: String,
    /// The tier currently held.
    pub current: bool,
    /// Selecting it asks for a credential.
    pub needs_credential: bool,
    /// False when the tier needs a credential that is not configured.
    pub reachable: bool,
}

/// Lists tiers and performs user-requested switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct TierSwitcher;

impl TierSwitcher {
    /// Returns every tier in ascending order with its state for `control`.
    #[must_use]
    pub fn options(control: &AccessControl) -> Vec<TierOption> {
        AccessTier::ALL
            .into_iter()
            .map(|tier| {
                let appearance = control.appearance(tier);
                let needs_credential = control.requires_credential(tier);
                TierOption {
                    tier,
                    label: appearance.label.clone(),
                    icon: appearance.icon.clone(),
                    color: appearance.color.clone(),
                    current: tier == control.current_tier(),
                    needs_credential,
                    reachable: !needs_credential || control.is_credential_set(tier),
                }
            })
            .collect()
    }

    /// Switches to `target`; same rules as [`AccessControl::switch_tier`].
    ///
    /// # Errors
    ///
    /// Returns the core's error when the switch is refused.
    pub async fn request(
        control: &mut AccessControl,
        target: AccessTier,
        credential: Option<&str>,
    ) -> Result<TierChange, AccessError> {
        control.switch_tier(target, credential).await
    }
}
