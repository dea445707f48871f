//! Navigation menu composition.
//!
//! The menu is derived, never stored: every call to [`compose`] asks the
//! access context which catalog entries are reachable right now and groups
//! them by the minimum tier each one requires.

use crate::control::AccessControl;
use crate::tier::{AccessTier, TierMap};
use serde::Serialize;

/// A navigable resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuEntry {
    /// Resource identifier checked against the access map.
    pub resource: String,
    pub label: String,
    /// Free-form grouping hint for the renderer.
    pub section: String,
}

impl MenuEntry {
    #[must_use]
    pub fn new(
        resource: impl Into<String>,
        label: impl Into<String>,
        section: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            label: label.into(),
            section: section.into(),
        }
    }
}

/// The set of resources the menu may show, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuCatalog {
    entries: Vec<MenuEntry>,
}

impl MenuCatalog {
    #[must_use]
    pub fn new(entries: Vec<MenuEntry>) -> Self {
        Self { entries }
    }

    /// The clinic's standard navigation.
    #[must_use]
    pub fn clinic() -> Self {
        const ENTRIES: &[(&str, &str, &str)] = &[
            ("dashboard", "Dashboard", "front-desk"),
            ("patients", "Patients", "front-desk"),
            ("appointments", "Appointments", "front-desk"),
            ("medical-forms", "Medical Forms", "front-desk"),
            ("treatments", "Treatments", "clinical"),
            ("doctors", "Doctors", "clinical"),
            ("products", "Products", "clinical"),
            ("lab-orders", "Lab Orders", "clinical"),
            ("billing", "Billing", "finance"),
            ("payments", "Payments", "finance"),
            ("reports", "Reports", "finance"),
            ("expenses", "Expenses", "finance"),
            ("payroll", "Payroll", "administration"),
            ("access-settings", "Access Settings", "administration"),
            ("audit-log", "Audit Log", "administration"),
        ];
        Self::new(
            ENTRIES
                .iter()
                .map(|(resource, label, section)| MenuEntry::new(*resource, *label, *section))
                .collect(),
        )
    }

    #[must_use]
    pub fn entries(&self) -> &[MenuEntry] {
        &self.entries
    }

    pub fn push(&mut self, entry: MenuEntry) {
        self.entries.push(entry);
    }
}

impl Default for MenuCatalog {
    fn default() -> Self {
        Self::clinic()
    }
}

/// Reachable entries sharing one minimum tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuGroup {
    pub tier: AccessTier,
    pub label: String,
    pub color: String,
    /// The group's tier is the one currently held. Styling only.
    pub active: bool,
    pub entries: Vec<MenuEntry>,
}

/// Groups the reachable catalog entries by required tier.
///
/// Groups come in ascending tier order and empty groups are omitted.
#[must_use]
pub fn compose(control: &AccessControl, catalog: &MenuCatalog) -> Vec<MenuGroup> {
    let mut buckets: TierMap<Vec<MenuEntry>> = TierMap::default();
    for entry in catalog.entries() {
        let required = control.resource_tier(&entry.resource);
        if control.has_access(required) {
            buckets[required].push(entry.clone());
        }
    }

    AccessTier::ALL
        .into_iter()
        .filter_map(|tier| {
            let entries = std::mem::take(&mut buckets[tier]);
            if entries.is_empty() {
                return None;
            }
            let appearance = control.appearance(tier);
            Some(MenuGroup {
                tier,
                label: appearance.label.clone(),
                color: appearance.color.clone(),
                active: tier == control.current_tier(),
                entries,
            })
        })
        .collect()
}
