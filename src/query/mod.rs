//! Reference query executor
//!
//! Walks a pre-parsed selection tree and asks a [`FieldResolver`] for every field.
//! Query text is never parsed here: selections arrive as data (usually JSON).

use crate::resolve::{FieldResolver, Parent, Resolved};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One field of a selection set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub arguments: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selections: Vec<Selection>,
}

impl Selection {
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    pub fn select(mut self, selections: Vec<Selection>) -> Self {
        self.selections = selections;
        self
    }

    /// A field without sub-selections
    pub fn is_leaf(&self) -> bool {
        self.selections.is_empty()
    }

    /// Key the field's value is written under in the result
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Outcome of a cache read that never fails outright
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl From<Result<Value>> for QueryResult {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(data) => QueryResult {
                data: Some(data),
                error: None,
            },
            Err(e) => QueryResult {
                data: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Parse a JSON selection set (a single selection or an array of them)
pub fn parse_selections(json: &str) -> Result<Vec<Selection>> {
    let value: Value = serde_json::from_str(json)?;
    if value.is_array() {
        Ok(serde_json::from_value(value)?)
    } else {
        Ok(vec![serde_json::from_value(value)?])
    }
}

/// Execute a selection set from the query root
pub fn execute<'s, R>(resolver: &R, selections: &[Selection]) -> Result<Value>
where
    R: FieldResolver<'s>,
{
    execute_with_variables(resolver, selections, &Map::new())
}

/// Execute with `"$name"` argument values bound from `variables`
pub fn execute_with_variables<'s, R>(
    resolver: &R,
    selections: &[Selection],
    variables: &Map<String, Value>,
) -> Result<Value>
where
    R: FieldResolver<'s>,
{
    let executor = Executor {
        resolver,
        variables,
    };
    executor.select(&Parent::Root, selections)
}

struct Executor<'a, R> {
    resolver: &'a R,
    variables: &'a Map<String, Value>,
}

impl<'a, 's, R: FieldResolver<'s>> Executor<'a, R> {
    fn select(&self, parent: &Parent<'s>, selections: &[Selection]) -> Result<Value> {
        let mut object = Map::new();
        for selection in selections {
            let arguments = self.bind(&selection.arguments);
            let resolved =
                self.resolver
                    .resolve(&selection.name, parent, &arguments, selection.is_leaf())?;
            let value = self.complete(resolved, &selection.selections)?;
            object.insert(selection.response_key().to_string(), value);
        }
        Ok(Value::Object(object))
    }

    fn complete(&self, resolved: Resolved<'s>, selections: &[Selection]) -> Result<Value> {
        match resolved {
            Resolved::Leaf(value) => Ok(value),
            Resolved::Null => Ok(Value::Null),
            Resolved::Entity(entity) => self.select(&Parent::Entity(entity), selections),
            Resolved::Connection(entities) => {
                self.select(&Parent::Connection(entities), selections)
            }
            Resolved::List(entities) => entities
                .into_iter()
                .map(|entity| self.select(&Parent::Entity(entity), selections))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Resolved::Edges(entities) => entities
                .into_iter()
                .map(|entity| self.select(&Parent::Edge(entity), selections))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
        }
    }

    fn bind(&self, arguments: &Map<String, Value>) -> Map<String, Value> {
        arguments
            .iter()
            .map(|(name, value)| (name.clone(), bind_value(value, self.variables)))
            .collect()
    }
}

fn bind_value(value: &Value, variables: &Map<String, Value>) -> Value {
    match value {
        Value::String(s) => match s.strip_prefix('$').and_then(|name| variables.get(name)) {
            Some(bound) => bound.clone(),
            None => value.clone(),
        },
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), bind_value(v, variables)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| bind_value(v, variables)).collect()),
        other => other.clone(),
    }
}
