//! Configuration system
//!
//! Loads ~/.config/graphcache/config.yaml with support for:
//! - Payload conventions (identifier field, type suffixes, root marker)
//! - Field type map and relation conflict table
//! - Snapshot persistence backend
//! - GraphQL transport settings

mod cache_config;
pub mod validation;

pub use cache_config::{
    CacheConfig, ConflictEntry, NormalizeConfig, PersistenceBackend, PersistenceConfig,
    TransportConfig, TypesConfig,
};
pub use validation::{validate_config, validate_config_result, ValidationError};
