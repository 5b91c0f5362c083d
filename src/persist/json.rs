//! JSON file snapshots

use super::SnapshotStore;
use crate::store::Snapshot;
use crate::Result;
use std::path::{Path, PathBuf};

/// Snapshot written as one JSON document
pub struct JsonSnapshot {
    path: PathBuf,
}

impl JsonSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonSnapshot {
    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(snapshot)?;
        std::fs::write(&self.path, content)?;

        tracing::info!(
            path = %self.path.display(),
            entities = snapshot.entity_count(),
            "Wrote JSON snapshot"
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        tracing::debug!(
            path = %self.path.display(),
            entities = snapshot.entity_count(),
            "Loaded JSON snapshot"
        );
        Ok(Some(snapshot))
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}
