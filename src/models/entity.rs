//! Harvested entities and listing pages.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity used to key entities in maps and checkpoints.
///
/// Serializes as `id:<id>` or `name:<name>` so it can be a JSON map key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EntityKey {
    Id(String),
    Name(String),
}

impl EntityKey {
    /// Key by id when one is present, falling back to the display name.
    pub fn new(id: Option<&str>, name: &str) -> Self {
        match id {
            Some(id) if !id.trim().is_empty() => Self::Id(id.trim().to_string()),
            _ => Self::Name(name.trim().to_string()),
        }
    }

    pub fn is_name(&self) -> bool {
        matches!(self, Self::Name(_))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id:{id}"),
            Self::Name(name) => write!(f, "name:{name}"),
        }
    }
}

impl From<EntityKey> for String {
    fn from(key: EntityKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for EntityKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if let Some(id) = value.strip_prefix("id:") {
            Ok(Self::Id(id.to_string()))
        } else if let Some(name) = value.strip_prefix("name:") {
            Ok(Self::Name(name.to_string()))
        } else {
            Err(format!("entity key '{value}' has no id:/name: prefix"))
        }
    }
}

/// One entity from a listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Source identifier, when the listing exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Display name
    pub name: String,

    /// Listing value (e.g. market value)
    pub value: i64,

    /// Extra fields filled in by detail harvests
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl EntityRecord {
    pub fn new(id: Option<String>, name: impl Into<String>, value: i64) -> Self {
        Self {
            id,
            name: name.into(),
            value,
            attributes: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.id.as_deref(), &self.name)
    }
}

/// Two distinct id-less records that share a display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameCollision {
    pub name: String,
    pub kept: EntityRecord,
    pub rejected: EntityRecord,
}

/// Entities merged across pages, keyed by [`EntityKey`].
///
/// Re-merging an identical record is a no-op, so refetched pages are
/// harmless. An id-less record whose name is already taken by a different
/// record is not merged; the clash is kept in `collisions` for the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMap {
    pub records: BTreeMap<EntityKey, EntityRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collisions: Vec<NameCollision>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &EntityKey) -> Option<&EntityRecord> {
        self.records.get(key)
    }

    pub fn get_mut(&mut self, key: &EntityKey) -> Option<&mut EntityRecord> {
        self.records.get_mut(key)
    }

    /// Merge one record. Returns `false` when it was rejected as a name collision.
    pub fn merge(&mut self, record: EntityRecord) -> bool {
        let key = record.key();
        match self.records.get_mut(&key) {
            None => {
                self.records.insert(key, record);
                true
            }
            Some(existing) if key.is_name() && !same_listing(existing, &record) => {
                log::warn!(
                    "Name collision for '{}' (values {} vs {}); keeping the first",
                    record.name,
                    existing.value,
                    record.value
                );
                let collision = NameCollision {
                    name: record.name.clone(),
                    kept: existing.clone(),
                    rejected: record,
                };
                if !self.collisions.contains(&collision) {
                    self.collisions.push(collision);
                }
                false
            }
            Some(existing) => {
                // Same entity seen again: refresh the listing fields, keep
                // attributes gathered by detail harvests.
                existing.name = record.name;
                existing.value = record.value;
                existing.attributes.extend(record.attributes);
                true
            }
        }
    }

    pub fn merge_all(&mut self, records: impl IntoIterator<Item = EntityRecord>) -> usize {
        records
            .into_iter()
            .map(|record| self.merge(record))
            .filter(|merged| *merged)
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &EntityRecord)> {
        self.records.iter()
    }
}

fn same_listing(a: &EntityRecord, b: &EntityRecord) -> bool {
    a.name == b.name && a.value == b.value
}

/// Request for one listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageRequest {
    pub cursor: u64,
}

/// Parsed listing page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResult {
    pub entities: Vec<EntityRecord>,
    /// `false` is the only signal that ends pagination
    pub has_more: bool,
}
