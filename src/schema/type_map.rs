//! Config-driven type resolver

use super::TypeResolver;
use crate::config::TypesConfig;
use std::collections::HashMap;

/// Field type lookup backed by explicit tables plus the connection naming convention
///
/// `ActivitiesConnection` infers `Activity`, `UsersConnection` infers `User`, unless
/// an explicit element entry says otherwise.
#[derive(Debug, Clone, Default)]
pub struct TypeMap {
    fields: HashMap<String, String>,
    elements: HashMap<String, String>,
    connection_suffix: String,
}

impl TypeMap {
    pub fn new(connection_suffix: impl Into<String>) -> Self {
        Self {
            fields: HashMap::new(),
            elements: HashMap::new(),
            connection_suffix: connection_suffix.into(),
        }
    }

    pub fn from_config(types: &TypesConfig, connection_suffix: &str) -> Self {
        Self {
            fields: types
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            elements: types
                .elements
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            connection_suffix: connection_suffix.to_string(),
        }
    }

    /// Declare the result type of a field
    pub fn with_field(mut self, field: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.fields.insert(field.into(), type_name.into());
        self
    }

    /// Override the element type of a connection
    pub fn with_element(
        mut self,
        connection: impl Into<String>,
        element: impl Into<String>,
    ) -> Self {
        self.elements.insert(connection.into(), element.into());
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl TypeResolver for TypeMap {
    fn resolve_type(&self, field: &str) -> Option<String> {
        self.fields.get(field).cloned()
    }

    fn infer_element_type(&self, connection_type: &str) -> Option<String> {
        if let Some(element) = self.elements.get(connection_type) {
            return Some(element.clone());
        }
        let plural = connection_type.strip_suffix(self.connection_suffix.as_str())?;
        if plural.is_empty() {
            return None;
        }
        Some(singularize(plural))
    }
}

/// English plural -> singular for generated connection names
fn singularize(plural: &str) -> String {
    if let Some(stem) = plural.strip_suffix("ies") {
        return format!("{}y", stem);
    }
    for suffix in ["sses", "xes", "ches", "shes"] {
        if plural.ends_with(suffix) {
            return plural[..plural.len() - 2].to_string();
        }
    }
    if plural.ends_with("ss") {
        return plural.to_string();
    }
    plural.strip_suffix('s').unwrap_or(plural).to_string()
}
