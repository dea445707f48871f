//! Privilege tiers and tier-indexed tables.
//!
//! Tiers form a total order; "has access" is always `current >= required`.
//! Per-tier data (credentials, appearance) lives in a [`TierMap`], a fixed
//! array indexed by the tier enum, so every lookup is exhaustive.

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

/// A rung in the privilege ladder, ascending.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    /// Everyday access held by every authenticated user.
    #[default]
    Base,
    /// First elevated tier.
    Elevated1,
    /// Second elevated tier.
    Elevated2,
    /// Highest tier; the only one allowed to edit access settings.
    Elevated3,
}

impl AccessTier {
    /// Number of tiers.
    pub const COUNT: usize = 4;

    /// All tiers in ascending order.
    pub const ALL: [AccessTier; Self::COUNT] =
        [Self::Base, Self::Elevated1, Self::Elevated2, Self::Elevated3];

    /// The highest tier.
    pub const TOP: AccessTier = Self::Elevated3;

    /// Returns the position of this tier in [`AccessTier::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Base => 0,
            Self::Elevated1 => 1,
            Self::Elevated2 => 2,
            Self::Elevated3 => 3,
        }
    }

    /// Returns the stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Elevated1 => "elevated1",
            Self::Elevated2 => "elevated2",
            Self::Elevated3 => "elevated3",
        }
    }

    /// Returns true for every tier above `Base`.
    #[must_use]
    pub const fn is_elevated(self) -> bool {
        !matches!(self, Self::Base)
    }

    /// Returns true if holding `self` satisfies a `required` tier.
    #[must_use]
    pub fn satisfies(self, required: AccessTier) -> bool {
        self >= required
    }

    /// Iterates the non-`Base` tiers in ascending order.
    pub fn elevated() -> impl Iterator<Item = AccessTier> {
        Self::ALL.into_iter().filter(|t| t.is_elevated())
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a tier name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTierError {
    /// The rejected input.
    pub input: String,
}

impl fmt::Display for ParseTierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown access tier: {}", self.input)
    }
}

impl std::error::Error for ParseTierError {}

impl FromStr for AccessTier {
    type Err = ParseTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseTierError {
                input: s.to_string(),
            })
    }
}

/// A total function from [`AccessTier`] to `T`, backed by a fixed array.
///
/// Serialized as a JSON object keyed by tier name. Tiers missing from a
/// serialized object take `T::default()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierMap<T>([T; AccessTier::COUNT]);

impl<T> TierMap<T> {
    /// Builds a map by evaluating `f` for every tier.
    pub fn from_fn(mut f: impl FnMut(AccessTier) -> T) -> Self {
        Self(std::array::from_fn(|i| f(AccessTier::ALL[i])))
    }

    /// Returns the value for a tier.
    #[must_use]
    pub fn get(&self, tier: AccessTier) -> &T {
        &self.0[tier.index()]
    }

    /// Replaces the value for a tier.
    pub fn set(&mut self, tier: AccessTier, value: T) {
        self.0[tier.index()] = value;
    }

    /// Iterates `(tier, value)` pairs in ascending tier order.
    pub fn iter(&self) -> impl Iterator<Item = (AccessTier, &T)> {
        AccessTier::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T: Default> Default for TierMap<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<AccessTier> for TierMap<T> {
    type Output = T;

    fn index(&self, tier: AccessTier) -> &T {
        self.get(tier)
    }
}

impl<T> IndexMut<AccessTier> for TierMap<T> {
    fn index_mut(&mut self, tier: AccessTier) -> &mut T {
        &mut self.0[tier.index()]
    }
}

impl<T: Serialize> Serialize for TierMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(AccessTier::COUNT))?;
        for (tier, value) in self.iter() {
            map.serialize_entry(&tier, value)?;
        }
        map.end()
    }
}

impl<'de, T> Deserialize<'de> for TierMap<T>
where
    T: Deserialize<'de> + Default,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = BTreeMap::<AccessTier, T>::deserialize(deserializer)?;
        let mut map = Self::default();
        for (tier, value) in entries {
            map[tier] = value;
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_totally_ordered() {
        assert!(AccessTier::Base < AccessTier::Elevated1);
        assert!(AccessTier::Elevated1 < AccessTier::Elevated2);
        assert!(AccessTier::Elevated2 < AccessTier::Elevated3);
        assert_eq!(AccessTier::TOP, AccessTier::Elevated3);
    }

    #[test]
    fn satisfies_is_greater_or_equal() {
        for held in AccessTier::ALL {
            for required in AccessTier::ALL {
                assert_eq!(held.satisfies(required), held >= required);
            }
        }
    }

    #[test]
    fn index_matches_all_order() {
        for (i, tier) in AccessTier::ALL.into_iter().enumerate() {
            assert_eq!(tier.index(), i);
        }
    }

    #[test]
    fn elevated_skips_base() {
        let tiers: Vec<_> = AccessTier::elevated().collect();
        assert_eq!(
            tiers,
            vec![
                AccessTier::Elevated1,
                AccessTier::Elevated2,
                AccessTier::Elevated3
            ]
        );
    }

    #[test]
    fn parse_tier_names() {
        assert_eq!("base".parse::<AccessTier>(), Ok(AccessTier::Base));
        assert_eq!(" Elevated2 ".parse::<AccessTier>(), Ok(AccessTier::Elevated2));
        assert!("root".parse::<AccessTier>().is_err());
    }

    #[test]
    fn tier_serialization_format() {
        let json = serde_json::to_string(&AccessTier::Elevated1).expect("serialize");
        assert_eq!(json, "\"elevated1\"");
        let parsed: AccessTier = serde_json::from_str("\"elevated3\"").expect("deserialize");
        assert_eq!(parsed, AccessTier::Elevated3);
    }

    #[test]
    fn tier_map_serializes_as_object() {
        let map = TierMap::from_fn(|t| t.index() as u32);
        let json = serde_json::to_value(&map).expect("serialize");
        assert_eq!(json["base"], 0);
        assert_eq!(json["elevated3"], 3);
    }

    #[test]
    fn tier_map_fills_missing_tiers_with_default() {
        let map: TierMap<String> =
            serde_json::from_str(r#"{"elevated2": "owner456"}"#).expect("deserialize");
        assert_eq!(map[AccessTier::Elevated2], "owner456");
        assert_eq!(map[AccessTier::Elevated1], "");
        assert_eq!(map[AccessTier::Base], "");
    }

    #[test]
    fn tier_map_index_mut() {
        let mut map: TierMap<u8> = TierMap::default();
        map[AccessTier::Elevated1] = 9;
        map.set(AccessTier::Base, 1);
        assert_eq!(map.get(AccessTier::Elevated1), &9);
        assert_eq!(map[AccessTier::Base], 1);
    }
}
