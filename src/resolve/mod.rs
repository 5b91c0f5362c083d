//! Field resolution against the normalized store
//!
//! A resolver answers one field access at a time. The executor walks the selection
//! tree and hands each field the value its parent resolved to, so a nested query is
//! rebuilt from flat entities one hop at a time.

pub mod filter;

pub use filter::{filter_by_args, filter_by_identity, parse_timestamp};

use crate::schema::{Conventions, RelationConflicts, TypeResolver};
use crate::store::{Entity, Store};
use crate::{CacheError, Result};
use serde_json::{Map, Value};

/// What a field is being resolved on
#[derive(Debug, Clone)]
pub enum Parent<'s> {
    /// The query root
    Root,
    Entity(&'s Entity),
    /// A connection result: the entities it holds
    Connection(Vec<&'s Entity>),
    /// One entry of a connection's `edges`
    Edge(&'s Entity),
}

/// Result of resolving one field
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<'s> {
    Leaf(Value),
    Entity(&'s Entity),
    /// Selections apply to the connection itself
    Connection(Vec<&'s Entity>),
    /// Selections apply to each entity
    List(Vec<&'s Entity>),
    /// Selections apply to each edge
    Edges(Vec<&'s Entity>),
    Null,
}

/// Resolves field accesses for the executor
pub trait FieldResolver<'s> {
    fn resolve(
        &self,
        field: &str,
        parent: &Parent<'s>,
        args: &Map<String, Value>,
        is_leaf: bool,
    ) -> Result<Resolved<'s>>;
}

/// Resolver reading straight from a store
pub struct CacheResolver<'s> {
    store: &'s Store,
    conventions: &'s Conventions,
    types: &'s dyn TypeResolver,
    conflicts: &'s RelationConflicts,
}

impl<'s> CacheResolver<'s> {
    pub fn new(
        store: &'s Store,
        conventions: &'s Conventions,
        types: &'s dyn TypeResolver,
        conflicts: &'s RelationConflicts,
    ) -> Self {
        Self {
            store,
            conventions,
            types,
            conflicts,
        }
    }

    fn resolve_leaf(&self, field: &str, parent: &Parent<'s>) -> Result<Resolved<'s>> {
        let value = match parent {
            Parent::Entity(entity) => entity.get(field).cloned(),
            Parent::Root => self.store.root(field).map(|relation| relation.to_value()),
            Parent::Connection(entities) if field == "totalCount" => {
                Some(Value::from(entities.len()))
            }
            Parent::Connection(_) | Parent::Edge(_) => None,
        };
        match value {
            Some(value) => {
                crate::metrics::record_cache_hit();
                Ok(Resolved::Leaf(value))
            }
            None => {
                crate::metrics::record_cache_miss();
                Err(CacheError::miss(field))
            }
        }
    }

    fn resolve_connection(
        &self,
        field: &str,
        connection_type: &str,
        parent: &Parent<'s>,
        args: &Map<String, Value>,
    ) -> Result<Resolved<'s>> {
        let element_type = self
            .types
            .infer_element_type(connection_type)
            .ok_or_else(|| CacheError::UnknownField(format!("{} ({})", field, connection_type)))?;
        let bucket = self.store.bucket(&element_type);

        let entity = match parent {
            Parent::Root => {
                let all = bucket.map(|b| b.values().collect()).unwrap_or_default();
                return Ok(Resolved::Connection(filter_by_args(all, args)));
            }
            Parent::Entity(entity) => *entity,
            Parent::Connection(_) | Parent::Edge(_) => return Err(CacheError::miss(field)),
        };

        let accessor = if self.conflicts.is_registered(field) {
            field
        } else {
            element_type.as_str()
        };

        match entity.get(accessor) {
            Some(Value::Array(items)) => {
                let ids: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                let members = filter_by_identity(bucket, &ids);
                Ok(Resolved::Connection(filter_by_args(members, args)))
            }
            Some(Value::String(id)) => Ok(self
                .store
                .get(&element_type, id)
                .map_or(Resolved::Null, Resolved::Entity)),
            _ => Ok(Resolved::Null),
        }
    }

    fn resolve_single(
        &self,
        field: &str,
        type_name: &str,
        parent: &Parent<'s>,
        args: &Map<String, Value>,
    ) -> Result<Resolved<'s>> {
        let id = match parent {
            // root lookups go by an explicit identifier argument, else by the alias
            Parent::Root => args
                .get(&self.conventions.id_field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| {
                    self.store
                        .root(field)
                        .and_then(|relation| relation.first().map(str::to_string))
                }),
            Parent::Entity(entity) => {
                let accessor = if self.conflicts.is_registered(field) {
                    field
                } else {
                    type_name
                };
                entity
                    .relation(accessor)
                    .and_then(|relation| relation.first().map(str::to_string))
            }
            Parent::Connection(_) | Parent::Edge(_) => return Err(CacheError::miss(field)),
        };

        Ok(id
            .and_then(|id| self.store.get(type_name, &id))
            .map_or(Resolved::Null, Resolved::Entity))
    }
}

impl<'s> FieldResolver<'s> for CacheResolver<'s> {
    fn resolve(
        &self,
        field: &str,
        parent: &Parent<'s>,
        args: &Map<String, Value>,
        is_leaf: bool,
    ) -> Result<Resolved<'s>> {
        if is_leaf {
            return self.resolve_leaf(field, parent);
        }

        match (field, parent) {
            ("nodes", Parent::Connection(entities)) => return Ok(Resolved::List(entities.clone())),
            ("edges", Parent::Connection(entities)) => return Ok(Resolved::Edges(entities.clone())),
            ("node", Parent::Edge(entity)) => return Ok(Resolved::Entity(*entity)),
            _ => {}
        }

        let type_name = self
            .types
            .resolve_type(field)
            .ok_or_else(|| CacheError::UnknownField(field.to_string()))?;

        if self.conventions.is_connection(&type_name) {
            self.resolve_connection(field, &type_name, parent, args)
        } else {
            self.resolve_single(field, &type_name, parent, args)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Normalizer;
    use crate::schema::TypeMap;
    use serde_json::json;

    struct Fixture {
        store: Store,
        conventions: Conventions,
        types: TypeMap,
        conflicts: RelationConflicts,
    }

    fn fixture() -> Fixture {
        let mut conflicts = RelationConflicts::new();
        conflicts.register_pair("activityByActivity", "activityPrerequisitesByActivity");
        let types = TypeMap::new("Connection")
            .with_field("allActivities", "ActivitiesConnection")
            .with_field("activitiesByOwner", "ActivitiesConnection")
            .with_field("userByOwner", "User")
            .with_field("activity", "Activity")
            .with_field("activityByActivity", "Activity")
            .with_field("activityPrerequisitesByActivity", "ActivityPrerequisitesConnection");
        let mut fx = Fixture {
            store: Store::new(),
            conventions: Conventions::default(),
            types,
            conflicts,
        };
        let data = json!({
            "user": {
                "__typename": "User",
                "nodeId": "u1",
                "name": "Ada",
                "activitiesByOwner": {
                    "__typename": "ActivitiesConnection",
                    "nodes": [
                        {"__typename": "Activity", "nodeId": "a2", "createdAt": "2024-06-01"},
                        {"__typename": "Activity", "nodeId": "a1", "createdAt": "2024-01-01"}
                    ]
                }
            }
        });
        Normalizer::new(&mut fx.store, &fx.conventions, &fx.types, &fx.conflicts)
            .ingest(&data)
            .unwrap();
        fx
    }

    fn resolver(fx: &Fixture) -> CacheResolver<'_> {
        CacheResolver::new(&fx.store, &fx.conventions, &fx.types, &fx.conflicts)
    }

    fn no_args() -> Map<String, Value> {
        Map::new()
    }

    #[test]
    fn test_leaf_on_entity_and_miss() {
        let fx = fixture();
        let resolver = resolver(&fx);
        let user = fx.store.get("User", "u1").unwrap();
        let parent = Parent::Entity(user);

        assert_eq!(
            resolver.resolve("name", &parent, &no_args(), true).unwrap(),
            Resolved::Leaf(json!("Ada"))
        );
        let err = resolver.resolve("email", &parent, &no_args(), true).unwrap_err();
        assert!(err.is_cache_miss());
    }

    #[test]
    fn test_leaf_on_root_uses_alias() {
        let fx = fixture();
        let resolver = resolver(&fx);
        assert_eq!(
            resolver.resolve("user", &Parent::Root, &no_args(), true).unwrap(),
            Resolved::Leaf(json!("u1"))
        );
        assert!(resolver.resolve("other", &Parent::Root, &no_args(), true).is_err());
    }

    #[test]
    fn test_connection_on_entity_in_relation_order() {
        let fx = fixture();
        let resolver = resolver(&fx);
        let user = fx.store.get("User", "u1").unwrap();
        let resolved = resolver
            .resolve("activitiesByOwner", &Parent::Entity(user), &no_args(), false)
            .unwrap();
        let Resolved::Connection(members) = resolved else {
            panic!("expected a connection");
        };
        let ids: Vec<_> = members.iter().map(|e| e.str_field("nodeId").unwrap()).collect();
        assert_eq!(ids, vec!["a2", "a1"]);

        let parent = Parent::Connection(members);
        assert_eq!(
            resolver.resolve("totalCount", &parent, &no_args(), true).unwrap(),
            Resolved::Leaf(json!(2))
        );
        assert!(matches!(
            resolver.resolve("nodes", &parent, &no_args(), false).unwrap(),
            Resolved::List(list) if list.len() == 2
        ));
    }

    #[test]
    fn test_root_connection_with_filter() {
        let fx = fixture();
        let resolver = resolver(&fx);
        let args = json!({"filter": {"createdAt": {"lessThanOrEqualTo": "2024-03-01"}}});
        let resolved = resolver
            .resolve("allActivities", &Parent::Root, args.as_object().unwrap(), false)
            .unwrap();
        let Resolved::Connection(members) = resolved else {
            panic!("expected a connection");
        };
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].str_field("nodeId"), Some("a2"));
    }

    #[test]
    fn test_to_one_from_array_back_reference() {
        let fx = fixture();
        let resolver = resolver(&fx);
        let activity = fx.store.get("Activity", "a1").unwrap();
        let resolved = resolver
            .resolve("userByOwner", &Parent::Entity(activity), &no_args(), false)
            .unwrap();
        assert_eq!(resolved, Resolved::Entity(fx.store.get("User", "u1").unwrap()));
    }

    #[test]
    fn test_root_lookup_by_identifier_argument() {
        let fx = fixture();
        let resolver = resolver(&fx);
        let args = json!({"nodeId": "a1"});
        let resolved = resolver
            .resolve("activity", &Parent::Root, args.as_object().unwrap(), false)
            .unwrap();
        assert_eq!(resolved, Resolved::Entity(fx.store.get("Activity", "a1").unwrap()));

        let missing = json!({"nodeId": "zzz"});
        assert_eq!(
            resolver
                .resolve("activity", &Parent::Root, missing.as_object().unwrap(), false)
                .unwrap(),
            Resolved::Null
        );
    }

    #[test]
    fn test_absent_relation_is_null() {
        let fx = fixture();
        let resolver = resolver(&fx);
        let activity = fx.store.get("Activity", "a1").unwrap();
        assert_eq!(
            resolver
                .resolve(
                    "activityPrerequisitesByActivity",
                    &Parent::Entity(activity),
                    &no_args(),
                    false
                )
                .unwrap(),
            Resolved::Null
        );
    }

    #[test]
    fn test_unknown_field() {
        let fx = fixture();
        let resolver = resolver(&fx);
        let err = resolver
            .resolve("mystery", &Parent::Root, &no_args(), false)
            .unwrap_err();
        assert!(matches!(err, CacheError::UnknownField(_)));
    }

    #[test]
    fn test_edges_and_node() {
        let fx = fixture();
        let resolver = resolver(&fx);
        let activity = fx.store.get("Activity", "a1").unwrap();
        let parent = Parent::Connection(vec![activity]);
        let Resolved::Edges(edges) = resolver.resolve("edges", &parent, &no_args(), false).unwrap()
        else {
            panic!("expected edges");
        };
        let edge = Parent::Edge(edges[0]);
        assert_eq!(
            resolver.resolve("node", &edge, &no_args(), false).unwrap(),
            Resolved::Entity(activity)
        );
        assert!(resolver.resolve("cursor", &edge, &no_args(), true).is_err());
    }
}
