//! Flat entity records and relation references

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A flat, identity-addressable record
///
/// Attributes are scalars (arrays of scalars included) or relation references:
/// an identifier string for to-one, an array of identifier strings for to-many.
/// The type discriminator and the identifier field stay inside the record so they
/// can be queried like any other leaf.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Map<String, Value>);

impl Entity {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// String value of a field, if it is a string
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Relation reference stored under a key
    pub fn relation(&self, key: &str) -> Option<RelationRef> {
        self.0.get(key).and_then(RelationRef::from_value)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub(crate) fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Entity {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Identifier(s) a relation points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationRef {
    /// To-one
    One(String),
    /// To-many, in first-seen order
    Many(Vec<String>),
}

impl RelationRef {
    /// Read a stored relation value; anything but a string or an array of strings
    /// is not a relation
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(id) => Some(RelationRef::One(id.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(RelationRef::Many),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            RelationRef::One(id) => Value::String(id.clone()),
            RelationRef::Many(ids) => Value::Array(ids.iter().cloned().map(Value::String).collect()),
        }
    }

    /// Same identifiers, as a to-many reference
    pub fn into_many(self) -> Self {
        match self {
            RelationRef::One(id) => RelationRef::Many(vec![id]),
            many => many,
        }
    }

    pub fn ids(&self) -> Vec<&str> {
        match self {
            RelationRef::One(id) => vec![id.as_str()],
            RelationRef::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }

    pub fn first(&self) -> Option<&str> {
        match self {
            RelationRef::One(id) => Some(id),
            RelationRef::Many(ids) => ids.first().map(String::as_str),
        }
    }

    pub fn is_many(&self) -> bool {
        matches!(self, RelationRef::Many(_))
    }
}

impl fmt::Display for RelationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationRef::One(id) => write!(f, "{}", id),
            RelationRef::Many(ids) => write!(f, "[{}]", ids.join(", ")),
        }
    }
}
