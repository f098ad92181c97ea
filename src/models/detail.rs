//! Per-entity detail harvest results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lowest pass level that is counted; anything at or below the floor ends a scan.
pub const PASS_LEVEL_FLOOR: u8 = 2;
/// Highest pass level.
pub const PASS_LEVEL_MAX: u8 = 7;

/// Count of passes per level (3..=7).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassDistribution(BTreeMap<u8, u32>);

impl PassDistribution {
    /// All tracked levels at zero.
    pub fn new() -> Self {
        Self(
            (PASS_LEVEL_FLOOR + 1..=PASS_LEVEL_MAX)
                .map(|level| (level, 0))
                .collect(),
        )
    }

    /// Count one pass. Levels outside the tracked range are ignored.
    pub fn record(&mut self, level: u8) {
        if let Some(count) = self.0.get_mut(&level) {
            *count += 1;
        }
    }

    pub fn absorb(&mut self, other: &PassDistribution) {
        for (level, count) in &other.0 {
            if let Some(total) = self.0.get_mut(level) {
                *total += count;
            }
        }
    }

    pub fn get(&self, level: u8) -> u32 {
        self.0.get(&level).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl Default for PassDistribution {
    fn default() -> Self {
        Self::new()
    }
}

/// Detail fields harvested for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_distribution: Option<PassDistribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
}

impl DetailRecord {
    /// Attribute map entries to merge into an [`EntityRecord`](super::EntityRecord).
    pub fn attributes(&self) -> BTreeMap<String, serde_json::Value> {
        let mut attributes = BTreeMap::new();
        if let Some(distribution) = &self.pass_distribution {
            if let Ok(value) = serde_json::to_value(distribution) {
                attributes.insert("pass_distribution".to_string(), value);
            }
        }
        if let Some(age) = self.age {
            attributes.insert("age".to_string(), serde_json::Value::from(age));
        }
        attributes
    }
}
