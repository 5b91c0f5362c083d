//! Normalized cache facade
//!
//! Owns the store behind a lock together with everything needed to write to it
//! (conventions, type resolver, conflict table) and to announce changes. Writers
//! take the lock for a whole ingest, readers for a whole query.

use crate::config::CacheConfig;
use crate::normalize::{IngestReport, Normalizer};
use crate::persist::{self, SnapshotStore};
use crate::query::{self, QueryResult, Selection};
use crate::resolve::CacheResolver;
use crate::schema::{Conventions, RelationConflicts, TypeMap, TypeResolver};
use crate::store::{Snapshot, Store};
use crate::{CacheError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// Change notification sent to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// At least one entity of this type was inserted or merged
    TypeChanged(String),
    /// The store was emptied
    Cleared,
}

/// Per-write options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Write a snapshot after the ingest when a backend is configured
    pub persist: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self { persist: true }
    }
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entity_count: usize,
    pub type_counts: BTreeMap<String, usize>,
}

/// Normalized client-side cache
pub struct NormalizedCache {
    store: RwLock<Store>,
    conventions: Conventions,
    types: Box<dyn TypeResolver>,
    conflicts: RelationConflicts,
    events: broadcast::Sender<CacheEvent>,
    snapshots: Option<Box<dyn SnapshotStore>>,
}

impl NormalizedCache {
    pub fn new(
        conventions: Conventions,
        types: impl TypeResolver + 'static,
        conflicts: RelationConflicts,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store: RwLock::new(Store::new()),
            conventions,
            types: Box::new(types),
            conflicts,
            events,
            snapshots: None,
        }
    }

    /// Build a cache from configuration, opening the snapshot backend
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let cache = Self::new(
            Conventions::from_config(&config.normalize),
            TypeMap::from_config(&config.types, &config.normalize.connection_suffix),
            RelationConflicts::from_entries(&config.conflicts),
        );
        Ok(match persist::open(&config.persistence)? {
            Some(backend) => cache.with_snapshots(backend),
            None => cache,
        })
    }

    pub fn with_snapshots(mut self, snapshots: Box<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn conventions(&self) -> &Conventions {
        &self.conventions
    }

    /// Normalize a response data payload into the store
    pub fn ingest(&self, data: &Value) -> Result<IngestReport> {
        self.ingest_with(data, IngestOptions::default())
    }

    pub fn ingest_with(&self, data: &Value, options: IngestOptions) -> Result<IngestReport> {
        let (report, snapshot) = {
            let mut store = self.write_store()?;
            let report = Normalizer::new(
                &mut store,
                &self.conventions,
                self.types.as_ref(),
                &self.conflicts,
            )
            .ingest(data)?;
            crate::metrics::set_stored_entities(store.len());

            let snapshot = match self.snapshots {
                Some(_) if options.persist => Some(store.snapshot()),
                _ => None,
            };
            (report, snapshot)
        };

        tracing::info!(
            inserted = report.inserted,
            merged = report.merged,
            unchanged = report.unchanged,
            "Ingested response"
        );

        if let (Some(snapshot), Some(backend)) = (snapshot, &self.snapshots) {
            // the in-memory store stays authoritative when a snapshot write fails
            if let Err(e) = backend.save(&snapshot) {
                tracing::warn!(backend = %backend.describe(), error = %e, "Snapshot write failed");
            }
        }

        for type_name in &report.changed_types {
            // no subscribers is not an error
            let _ = self.events.send(CacheEvent::TypeChanged(type_name.clone()));
        }

        Ok(report)
    }

    /// Answer a selection set from the store alone
    pub fn read(&self, selections: &[Selection]) -> Result<Value> {
        self.read_with_variables(selections, &Map::new())
    }

    pub fn read_with_variables(
        &self,
        selections: &[Selection],
        variables: &Map<String, Value>,
    ) -> Result<Value> {
        let store = self.read_store()?;
        let resolver = CacheResolver::new(
            &store,
            &self.conventions,
            self.types.as_ref(),
            &self.conflicts,
        );
        query::execute_with_variables(&resolver, selections, variables)
    }

    /// Like [`read`](Self::read), with failures folded into the result
    pub fn load_query(&self, selections: &[Selection]) -> QueryResult {
        let result = self.read(selections);
        if let Err(ref e) = result {
            tracing::debug!(error = %e, "Cache read failed");
        }
        QueryResult::from(result)
    }

    /// Drop every entity and root alias, and the persisted snapshot
    pub fn clear(&self) -> Result<()> {
        self.write_store()?.clear();
        crate::metrics::set_stored_entities(0);

        if let Some(ref backend) = self.snapshots {
            backend.clear()?;
        }

        tracing::info!("Cleared cache");
        let _ = self.events.send(CacheEvent::Cleared);
        Ok(())
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let store = self.read_store()?;
        Ok(CacheStats {
            entity_count: store.len(),
            type_counts: store.type_counts(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.read_store()?.snapshot())
    }

    /// Replace the store with the persisted snapshot
    ///
    /// Returns `false` when no backend is configured or nothing was persisted yet.
    pub fn restore(&self) -> Result<bool> {
        let Some(ref backend) = self.snapshots else {
            return Ok(false);
        };
        let Some(snapshot) = backend.load()? else {
            return Ok(false);
        };

        let entities = snapshot.entity_count();
        let mut store = self.write_store()?;
        *store = Store::from_snapshot(snapshot);
        crate::metrics::set_stored_entities(entities);

        tracing::info!(backend = %backend.describe(), entities, "Restored cache from snapshot");
        Ok(true)
    }

    fn read_store(&self) -> Result<RwLockReadGuard<'_, Store>> {
        self.store
            .read()
            .map_err(|_| CacheError::Storage("cache store lock poisoned".to_string()))
    }

    fn write_store(&self) -> Result<RwLockWriteGuard<'_, Store>> {
        self.store
            .write()
            .map_err(|_| CacheError::Storage("cache store lock poisoned".to_string()))
    }
}
