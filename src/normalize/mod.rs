//! Response normalization
//!
//! Walks a nested response tree and flattens it into the store. Each object is
//! classified once into a [`Shape`]; nested objects are replaced by identifier
//! references named after the target type (or after the field itself when the field
//! is registered in the relation conflict table), and every child records a
//! back-reference to the object that contained it.

use crate::schema::{Conventions, RelationConflicts, TypeResolver};
use crate::store::{Entity, RelationRef, Store, UpsertOutcome};
use crate::{CacheError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// How an object in a response is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Mutation payload or query root: only its children are stored
    Wrapper,
    /// Paginated collection: only its members are stored
    Connection,
    /// Entity without nested objects
    Leaf,
    /// Entity with nested objects to flatten
    Composite,
}

/// Counts of what one ingest wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    pub merged: usize,
    pub unchanged: usize,
    /// Types with at least one inserted or merged entity
    pub changed_types: BTreeSet<String>,
}

impl IngestReport {
    pub fn written(&self) -> usize {
        self.inserted + self.merged + self.unchanged
    }
}

/// Back-reference a child records to the object that contained it
#[derive(Debug, Clone)]
struct ParentLink {
    key: String,
    target: RelationRef,
}

impl ParentLink {
    fn to_many(&self) -> Self {
        Self {
            key: self.key.clone(),
            target: self.target.clone().into_many(),
        }
    }
}

/// What a nested field value holds
enum Child<'v> {
    Object(&'v str),
    Connection(&'v str, &'v Map<String, Value>),
    List(&'v str),
}

/// Flattens responses into a store
///
/// Records are built into a pending list and only upserted once the whole payload
/// has normalized, so a malformed response leaves the store untouched.
pub struct Normalizer<'a> {
    store: &'a mut Store,
    conventions: &'a Conventions,
    types: &'a dyn TypeResolver,
    conflicts: &'a RelationConflicts,
    pending: Vec<(String, String, Entity)>,
    roots: Vec<(String, RelationRef)>,
}

impl<'a> Normalizer<'a> {
    pub fn new(
        store: &'a mut Store,
        conventions: &'a Conventions,
        types: &'a dyn TypeResolver,
        conflicts: &'a RelationConflicts,
    ) -> Self {
        Self {
            store,
            conventions,
            types,
            conflicts,
            pending: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Normalize every top-level field of a response data payload
    ///
    /// Each field's resulting reference is kept as a root alias under the field name.
    pub fn ingest(mut self, data: &Value) -> Result<IngestReport> {
        let fields = data.as_object().ok_or_else(|| {
            CacheError::MalformedResponse("response data must be an object".to_string())
        })?;

        for (field, value) in fields {
            if *field == self.conventions.typename_field {
                continue;
            }
            if let Some(relation) = self.normalize_value(value, None)? {
                self.roots.push((field.clone(), relation));
            }
        }

        Ok(self.commit())
    }

    /// Apply the pending records and root aliases in the order they were built
    fn commit(self) -> IngestReport {
        let mut report = IngestReport::default();
        for (type_name, id, record) in self.pending {
            let outcome = self.store.upsert(&type_name, &id, record);
            match outcome {
                UpsertOutcome::Inserted => report.inserted += 1,
                UpsertOutcome::Merged => report.merged += 1,
                UpsertOutcome::Unchanged => report.unchanged += 1,
            }
            if outcome.is_change() {
                report.changed_types.insert(type_name);
            }
        }
        for (alias, relation) in self.roots {
            self.store.set_root(alias, relation);
        }
        report
    }

    /// Classify an object by its type name and contents
    pub fn classify(&self, type_name: &str, object: &Map<String, Value>) -> Shape {
        if self.conventions.is_wrapper(type_name) {
            Shape::Wrapper
        } else if self.conventions.is_connection(type_name) {
            Shape::Connection
        } else if object.values().any(is_nested) {
            Shape::Composite
        } else {
            Shape::Leaf
        }
    }

    fn normalize_value(
        &mut self,
        value: &Value,
        link: Option<&ParentLink>,
    ) -> Result<Option<RelationRef>> {
        match value {
            Value::Object(object) => self.normalize_object(object, link),
            Value::Array(items) if items.iter().any(Value::is_object) => {
                let ids = self.normalize_members(items.iter(), link)?;
                Ok(Some(RelationRef::Many(ids)))
            }
            _ => Ok(None),
        }
    }

    fn normalize_object(
        &mut self,
        object: &Map<String, Value>,
        link: Option<&ParentLink>,
    ) -> Result<Option<RelationRef>> {
        let type_name = self.type_name(object)?;
        let shape = self.classify(type_name, object);
        tracing::trace!(type_name, ?shape, "Classified object");

        match shape {
            Shape::Wrapper => {
                for (field, value) in object {
                    if *field != self.conventions.typename_field {
                        self.normalize_value(value, None)?;
                    }
                }
                Ok(None)
            }
            Shape::Connection => {
                let ids = self.normalize_members(connection_members(object), link)?;
                Ok(Some(RelationRef::Many(ids)))
            }
            Shape::Leaf => {
                let id = self.identifier(type_name, object)?;
                let mut record = Entity::default();
                if let Some(link) = link {
                    record.insert(link.key.clone(), link.target.to_value());
                }
                for (field, value) in object {
                    record.insert(field.clone(), value.clone());
                }
                self.write(type_name, &id, record);
                Ok(Some(RelationRef::One(id)))
            }
            Shape::Composite => {
                let id = self.identifier(type_name, object)?;
                let mut record = Entity::default();
                if let Some(link) = link {
                    record.insert(link.key.clone(), link.target.to_value());
                }
                for (field, value) in object {
                    if *field == self.conventions.typename_field || !is_nested(value) {
                        record.insert(field.clone(), value.clone());
                        continue;
                    }
                    let (relation_key, child_link) = self.relation_for(field, value, type_name, &id)?;
                    if let Some(relation) = self.normalize_value(value, Some(&child_link))? {
                        record.insert(relation_key, relation.to_value());
                    }
                }
                self.write(type_name, &id, record);
                Ok(Some(RelationRef::One(id)))
            }
        }
    }

    /// Normalize collection members, each linked to-many to the owner
    fn normalize_members<'v>(
        &mut self,
        members: impl Iterator<Item = &'v Value>,
        link: Option<&ParentLink>,
    ) -> Result<Vec<String>> {
        let member_link = link.map(ParentLink::to_many);
        let mut ids = Vec::new();
        for member in members {
            let Value::Object(object) = member else {
                return Err(CacheError::MalformedResponse(format!(
                    "collection member is not an object: {}",
                    member
                )));
            };
            match self.normalize_object(object, member_link.as_ref())? {
                Some(RelationRef::One(id)) => ids.push(id),
                _ => {
                    return Err(CacheError::MalformedResponse(format!(
                        "collection member of type '{}' did not produce a single identifier",
                        self.type_name(object)?
                    )))
                }
            }
        }
        Ok(ids)
    }

    /// Relation key stored on the parent, and the back-reference the child receives
    fn relation_for(
        &self,
        field: &str,
        value: &Value,
        parent_type: &str,
        parent_id: &str,
    ) -> Result<(String, ParentLink)> {
        let child = self.child_kind(field, value)?;
        let child_is_many = !matches!(child, Child::Object(_));

        if let Some(partner) = self.conflicts.partner(field) {
            let partner_is_many = self
                .types
                .resolve_type(partner)
                .is_some_and(|t| self.conventions.is_connection(&t));
            let target = if child_is_many || partner_is_many {
                RelationRef::Many(vec![parent_id.to_string()])
            } else {
                RelationRef::One(parent_id.to_string())
            };
            let link = ParentLink {
                key: partner.to_string(),
                target,
            };
            return Ok((field.to_string(), link));
        }

        let relation_key = match child {
            Child::Object(type_name) | Child::List(type_name) => type_name.to_string(),
            Child::Connection(type_name, object) => self
                .types
                .infer_element_type(type_name)
                .or_else(|| {
                    connection_members(object)
                        .find_map(|m| m.get(&self.conventions.typename_field))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .ok_or_else(|| {
                    CacheError::MalformedResponse(format!(
                        "cannot infer element type of connection '{}' at field '{}'",
                        type_name, field
                    ))
                })?,
        };

        let target = if child_is_many {
            RelationRef::Many(vec![parent_id.to_string()])
        } else {
            RelationRef::One(parent_id.to_string())
        };
        let link = ParentLink {
            key: parent_type.to_string(),
            target,
        };
        Ok((relation_key, link))
    }

    fn child_kind<'v>(&self, field: &str, value: &'v Value) -> Result<Child<'v>> {
        match value {
            Value::Object(object) => {
                let type_name = self.type_name(object)?;
                if self.conventions.is_connection(type_name) {
                    Ok(Child::Connection(type_name, object))
                } else {
                    Ok(Child::Object(type_name))
                }
            }
            Value::Array(items) => items
                .iter()
                .find_map(Value::as_object)
                .map(|object| self.type_name(object).map(Child::List))
                .unwrap_or_else(|| {
                    Err(CacheError::MalformedResponse(format!(
                        "list field '{}' holds no objects",
                        field
                    )))
                }),
            _ => Err(CacheError::MalformedResponse(format!(
                "field '{}' is not a nested object",
                field
            ))),
        }
    }

    fn write(&mut self, type_name: &str, id: &str, record: Entity) {
        self.pending
            .push((type_name.to_string(), id.to_string(), record));
    }

    fn type_name<'v>(&self, object: &'v Map<String, Value>) -> Result<&'v str> {
        object
            .get(&self.conventions.typename_field)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CacheError::MalformedResponse(format!(
                    "object without a '{}' discriminator",
                    self.conventions.typename_field
                ))
            })
    }

    fn identifier(&self, type_name: &str, object: &Map<String, Value>) -> Result<String> {
        match object.get(&self.conventions.id_field) {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(CacheError::MalformedResponse(format!(
                "{} object is missing its '{}' field",
                type_name, self.conventions.id_field
            ))),
        }
    }
}

/// Objects, and arrays holding objects, are flattened; everything else is a scalar
fn is_nested(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().any(Value::is_object),
        _ => false,
    }
}

/// Members under `nodes`, else the `node` of each entry under `edges`
fn connection_members(object: &Map<String, Value>) -> Box<dyn Iterator<Item = &Value> + '_> {
    if let Some(Value::Array(nodes)) = object.get("nodes") {
        return Box::new(nodes.iter());
    }
    if let Some(Value::Array(edges)) = object.get("edges") {
        return Box::new(edges.iter().filter_map(|edge| edge.get("node")));
    }
    Box::new(std::iter::empty())
}
