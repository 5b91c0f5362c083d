//! SQLite snapshot backend

use super::SnapshotStore;
use crate::store::{Entity, RelationRef, Snapshot};
use crate::{CacheError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// One row per entity, plus root aliases and a last-update stamp
pub struct SqliteSnapshot {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteSnapshot {
    /// Open or create a snapshot database
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Opening snapshot database");

        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let snapshot = Self {
            conn: Mutex::new(conn),
            path,
        };
        snapshot.init_schema()?;
        Ok(snapshot)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entities (
                type_name TEXT NOT NULL,
                id TEXT NOT NULL,
                record TEXT NOT NULL,
                cached_at INTEGER NOT NULL,
                PRIMARY KEY (type_name, id)
            );

            CREATE TABLE IF NOT EXISTS roots (
                alias TEXT PRIMARY KEY,
                relation TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(type_name);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Storage("snapshot connection lock poisoned".to_string()))
    }

    fn last_update(conn: &Connection) -> Result<Option<i64>> {
        Ok(conn
            .query_row(
                "SELECT updated_at FROM cache_metadata WHERE key = 'last_update'",
                [],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Row counts and snapshot age
    pub fn stats(&self) -> Result<SnapshotStats> {
        let conn = self.conn()?;
        let entity_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
        let type_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT type_name) FROM entities",
            [],
            |row| row.get(0),
        )?;
        let last_update = Self::last_update(&conn)?;
        let age = last_update.map(|updated| {
            let now = chrono::Utc::now().timestamp_millis();
            Duration::from_millis(now.saturating_sub(updated).max(0) as u64)
        });

        Ok(SnapshotStats {
            entity_count: entity_count as usize,
            type_count: type_count as usize,
            last_update,
            age,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for SqliteSnapshot {
    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute("DELETE FROM entities", [])?;
        tx.execute("DELETE FROM roots", [])?;

        for (type_name, bucket) in &snapshot.types {
            for (id, entity) in bucket {
                tx.execute(
                    "INSERT INTO entities (type_name, id, record, cached_at) VALUES (?, ?, ?, ?)",
                    params![type_name, id, serde_json::to_string(entity)?, now],
                )?;
            }
        }

        for (alias, relation) in &snapshot.roots {
            tx.execute(
                "INSERT INTO roots (alias, relation) VALUES (?, ?)",
                params![alias, serde_json::to_string(relation)?],
            )?;
        }

        tx.execute(
            "INSERT OR REPLACE INTO cache_metadata (key, value, updated_at) VALUES (?, ?, ?)",
            params!["last_update", now.to_string(), now],
        )?;

        tx.commit()?;

        tracing::info!(entities = snapshot.entity_count(), "Wrote SQLite snapshot");
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>> {
        let conn = self.conn()?;
        if Self::last_update(&conn)?.is_none() {
            return Ok(None);
        }

        let mut snapshot = Snapshot::default();

        let mut stmt = conn.prepare("SELECT type_name, id, record FROM entities")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (type_name, id, record) = row?;
            let entity: Entity = serde_json::from_str(&record)?;
            snapshot.types.entry(type_name).or_default().insert(id, entity);
        }

        let mut stmt = conn.prepare("SELECT alias, relation FROM roots")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (alias, relation) = row?;
            let relation: RelationRef = serde_json::from_str(&relation)?;
            snapshot.roots.insert(alias, relation);
        }

        tracing::debug!(entities = snapshot.entity_count(), "Loaded SQLite snapshot");
        Ok(Some(snapshot))
    }

    fn clear(&self) -> Result<()> {
        tracing::info!("Clearing snapshot database");

        let conn = self.conn()?;
        conn.execute("DELETE FROM entities", [])?;
        conn.execute("DELETE FROM roots", [])?;
        conn.execute("DELETE FROM cache_metadata", [])?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

/// Snapshot database statistics
#[derive(Debug)]
pub struct SnapshotStats {
    pub entity_count: usize,
    pub type_count: usize,
    pub last_update: Option<i64>,
    pub age: Option<Duration>,
}
