//! Snapshot persistence
//!
//! After an ingest the whole store can be written out as a snapshot and read back
//! on startup. Two backends: a single JSON file holding the nested mapping, and a
//! SQLite database with one row per entity.

mod json;
mod sqlite;

pub use json::JsonSnapshot;
pub use sqlite::{SnapshotStats, SqliteSnapshot};

use crate::config::{PersistenceBackend, PersistenceConfig};
use crate::store::Snapshot;
use crate::Result;

/// Storage backend for store snapshots
pub trait SnapshotStore: Send + Sync {
    /// Replace the persisted snapshot
    fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Last persisted snapshot, `None` when nothing was saved yet
    fn load(&self) -> Result<Option<Snapshot>>;

    fn clear(&self) -> Result<()>;

    /// Human-readable location, for logs
    fn describe(&self) -> String;
}

/// Open the backend selected by configuration
pub fn open(config: &PersistenceConfig) -> Result<Option<Box<dyn SnapshotStore>>> {
    let path = config.resolved_path();
    let backend: Box<dyn SnapshotStore> = match config.backend {
        PersistenceBackend::None => return Ok(None),
        PersistenceBackend::Json => Box::new(JsonSnapshot::new(path)),
        PersistenceBackend::Sqlite => Box::new(SqliteSnapshot::open(path)?),
    };
    tracing::debug!(backend = %backend.describe(), "Opened snapshot backend");
    Ok(Some(backend))
}
