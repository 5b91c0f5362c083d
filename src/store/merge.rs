//! Merge policy for repeated writes of one identity
//!
//! Array-valued fields accumulate (ordered set union) so that pages of a to-many
//! relation discovered by separate responses add up instead of replacing each other.
//! Every other field takes the incoming value.

use super::entity::Entity;
use serde_json::Value;

/// Result of writing an entity into the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Identity was not stored before
    Inserted,
    /// Stored record changed
    Merged,
    /// Incoming record added nothing new
    Unchanged,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "inserted",
            UpsertOutcome::Merged => "merged",
            UpsertOutcome::Unchanged => "unchanged",
        }
    }

    /// Whether subscribers must hear about this write
    pub fn is_change(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

/// Merge `incoming` over `existing`, returning the combined record
pub fn merge_entities(existing: &Entity, incoming: Entity) -> Entity {
    let mut merged = existing.clone();
    for (field, value) in incoming.into_fields() {
        let slot = merged.fields_mut().entry(field).or_insert(Value::Null);
        match (slot, value) {
            (Value::Array(current), Value::Array(additions)) => union_into(current, additions),
            // an array only grows; a scalar cannot shrink it
            (Value::Array(_), _) => {}
            (slot, value) => *slot = value,
        }
    }
    merged
}

/// Ordered set union: keeps first-seen order, skips duplicates
fn union_into(current: &mut Vec<Value>, additions: Vec<Value>) {
    for value in additions {
        if !current.contains(&value) {
            current.push(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(value: Value) -> Entity {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_arrays_union_in_first_seen_order() {
        let existing = entity(json!({"nodeId": "u1", "Activity": ["a1", "a2"]}));
        let incoming = entity(json!({"nodeId": "u1", "Activity": ["a2", "a3", "a1", "a4"]}));
        let merged = merge_entities(&existing, incoming);
        assert_eq!(merged.get("Activity"), Some(&json!(["a1", "a2", "a3", "a4"])));
    }

    #[test]
    fn test_scalars_take_incoming_value() {
        let existing = entity(json!({"nodeId": "a1", "title": "Old", "done": false}));
        let incoming = entity(json!({"nodeId": "a1", "title": "New", "done": null}));
        let merged = merge_entities(&existing, incoming);
        assert_eq!(merged.get("title"), Some(&json!("New")));
        assert_eq!(merged.get("done"), Some(&Value::Null));
    }

    #[test]
    fn test_existing_only_fields_survive() {
        let existing = entity(json!({"nodeId": "a1", "title": "Run", "notes": "x"}));
        let incoming = entity(json!({"nodeId": "a1", "title": "Run"}));
        let merged = merge_entities(&existing, incoming);
        assert_eq!(merged, existing);
    }

    #[test]
    fn test_array_not_replaced_by_scalar() {
        let existing = entity(json!({"nodeId": "u1", "tags": ["a"]}));
        let incoming = entity(json!({"nodeId": "u1", "tags": "b"}));
        let merged = merge_entities(&existing, incoming);
        assert_eq!(merged.get("tags"), Some(&json!(["a"])));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(UpsertOutcome::Inserted.as_str(), "inserted");
        assert!(UpsertOutcome::Merged.is_change());
        assert!(!UpsertOutcome::Unchanged.is_change());
    }
}
