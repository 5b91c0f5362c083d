//! Relation conflict table
//!
//! Some schemas expose two relation fields on one type that both target the same
//! entity type (a join row pointing at two activities, say). Naming the stored relation
//! after the target type would make them overwrite each other, so these fields are
//! registered here with the name the target type uses for the inverse relation.

use crate::config::ConflictEntry;
use std::collections::HashMap;

/// Ambiguous relation field -> partner relation on the target type
#[derive(Debug, Clone, Default)]
pub struct RelationConflicts {
    entries: HashMap<String, String>,
}

impl RelationConflicts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[ConflictEntry]) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.register(&entry.field, &entry.partner);
        }
        table
    }

    /// Register one direction only
    pub fn register(&mut self, field: impl Into<String>, partner: impl Into<String>) {
        self.entries.insert(field.into(), partner.into());
    }

    /// Register a field and its partner in both directions
    pub fn register_pair(&mut self, field: &str, partner: &str) {
        self.register(field, partner);
        self.register(partner, field);
    }

    /// Partner relation for an ambiguous field
    pub fn partner(&self, field: &str) -> Option<&str> {
        self.entries.get(field).map(String::as_str)
    }

    pub fn is_registered(&self, field: &str) -> bool {
        self.entries.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
