//! Normalized store
//!
//! Two-level mapping type name -> identifier -> entity, plus the root aliases that
//! remember which identifiers each top-level response field produced. Entities are
//! addressed by (type, id) into this single table; nested objects never live here.

mod entity;
mod merge;

pub use entity::{Entity, RelationRef};
pub use merge::{merge_entities, UpsertOutcome};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entities of one type, keyed by identifier
pub type TypeBucket = BTreeMap<String, Entity>;

/// Serializable image of the store
///
/// `types` is the plain nested mapping type name -> identifier -> record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub types: BTreeMap<String, TypeBucket>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub roots: BTreeMap<String, RelationRef>,
}

impl Snapshot {
    pub fn entity_count(&self) -> usize {
        self.types.values().map(BTreeMap::len).sum()
    }
}

/// Every entity ever ingested, until cleared
#[derive(Debug, Default)]
pub struct Store {
    types: BTreeMap<String, TypeBucket>,
    roots: BTreeMap<String, RelationRef>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            types: snapshot.types,
            roots: snapshot.roots,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            types: self.types.clone(),
            roots: self.roots.clone(),
        }
    }

    /// Insert or merge one identity
    ///
    /// A record deeply equal to the stored one, or one whose merge leaves the stored
    /// record as it was, is a no-op.
    pub fn upsert(&mut self, type_name: &str, id: &str, entity: Entity) -> UpsertOutcome {
        let bucket = self.types.entry(type_name.to_string()).or_default();

        let outcome = match bucket.get_mut(id) {
            None => {
                bucket.insert(id.to_string(), entity);
                UpsertOutcome::Inserted
            }
            Some(existing) if *existing == entity => UpsertOutcome::Unchanged,
            Some(existing) => {
                let merged = merge_entities(existing, entity);
                if merged == *existing {
                    UpsertOutcome::Unchanged
                } else {
                    *existing = merged;
                    UpsertOutcome::Merged
                }
            }
        };

        tracing::debug!(type_name, id, outcome = outcome.as_str(), "Upsert");
        crate::metrics::record_entity_write(outcome.as_str());
        outcome
    }

    pub fn get(&self, type_name: &str, id: &str) -> Option<&Entity> {
        self.types.get(type_name)?.get(id)
    }

    pub fn bucket(&self, type_name: &str) -> Option<&TypeBucket> {
        self.types.get(type_name)
    }

    /// Remember what a top-level response field resolved to
    pub fn set_root(&mut self, alias: impl Into<String>, relation: RelationRef) {
        self.roots.insert(alias.into(), relation);
    }

    pub fn root(&self, alias: &str) -> Option<&RelationRef> {
        self.roots.get(alias)
    }

    /// Entity counts per type
    pub fn type_counts(&self) -> BTreeMap<String, usize> {
        self.types
            .iter()
            .map(|(name, bucket)| (name.clone(), bucket.len()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.types.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.roots.is_empty()
    }

    pub fn clear(&mut self) {
        self.types.clear();
        self.roots.clear();
    }
}
