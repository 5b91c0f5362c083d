//! Schema knowledge consumed by the cache
//!
//! The cache never validates against a schema. It only needs to know the declared
//! type of a relation field, the element type of a connection, and which relation
//! names are ambiguous.

mod conflicts;
mod type_map;

pub use conflicts::RelationConflicts;
pub use type_map::TypeMap;

use crate::config::NormalizeConfig;

/// Type-name lookup service
pub trait TypeResolver: Send + Sync {
    /// Declared result type of a field
    fn resolve_type(&self, field: &str) -> Option<String>;

    /// Element type of a connection type
    fn infer_element_type(&self, connection_type: &str) -> Option<String>;
}

/// Reserved keys and type-name conventions, checked once per object
#[derive(Debug, Clone)]
pub struct Conventions {
    pub id_field: String,
    pub typename_field: String,
    payload_suffix: String,
    root_marker: String,
    connection_suffix: String,
}

impl Conventions {
    pub fn from_config(config: &NormalizeConfig) -> Self {
        Self {
            id_field: config.id_field.clone(),
            typename_field: config.typename_field.clone(),
            payload_suffix: config.payload_suffix.clone(),
            root_marker: config.root_marker.clone(),
            connection_suffix: config.connection_suffix.clone(),
        }
    }

    /// Mutation payloads and the query root are never stored
    pub fn is_wrapper(&self, type_name: &str) -> bool {
        type_name.ends_with(&self.payload_suffix)
            || type_name.eq_ignore_ascii_case(&self.root_marker)
    }

    pub fn is_connection(&self, type_name: &str) -> bool {
        type_name.ends_with(&self.connection_suffix)
    }
}

impl Default for Conventions {
    fn default() -> Self {
        Self::from_config(&NormalizeConfig::default())
    }
}
