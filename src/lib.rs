//! graphcache - Normalized client-side cache for GraphQL responses
//!
//! Ingests nested, denormalized response payloads, flattens them into a store indexed
//! by type and identifier, and answers later queries straight from that store. A
//! request coordinator in front of the network keeps at most one fetch in flight per
//! (query, variables) signature and shares its outcome with every caller.
//!
//! # Architecture
//!
//! - **store**: Flat entities, relation references and the merge policy
//! - **schema**: Type resolver, relation conflict table, naming conventions
//! - **normalize**: Response tree -> store
//! - **resolve**: Field resolution and connection filtering over the store
//! - **query**: Reference executor over pre-parsed selection trees
//! - **cache**: `NormalizedCache` facade (locking, change events, snapshots)
//! - **persist**: JSON and SQLite snapshot backends
//! - **network**: Transport trait, HTTP transport, request coordinator
//! - **config**: YAML configuration

// Core modules
pub mod config;
pub mod error;
pub mod schema;
pub mod store;

// Engine
pub mod cache;
pub mod normalize;
pub mod query;
pub mod resolve;

// Edges
pub mod logging;
pub mod metrics;
pub mod network;
pub mod persist;

// Re-exports
pub use cache::{CacheEvent, CacheStats, IngestOptions, NormalizedCache};
pub use error::{CacheError, Result};
pub use network::{HttpTransport, RequestCoordinator, RequestStatus, Transport};
pub use query::{QueryResult, Selection};
