//! graphcache configuration file handling
//!
//! Loads and manages the ~/.config/graphcache/config.yaml file.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Reserved keys and type-name conventions of the response payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Identifier field shared by every entity type
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Type discriminator field
    #[serde(default = "default_typename_field")]
    pub typename_field: String,

    /// Suffix of transparent mutation payload types
    #[serde(default = "default_payload_suffix")]
    pub payload_suffix: String,

    /// Type name of the query root (matched case-insensitively)
    #[serde(default = "default_root_marker")]
    pub root_marker: String,

    /// Suffix of paginated connection types
    #[serde(default = "default_connection_suffix")]
    pub connection_suffix: String,
}

fn default_id_field() -> String {
    "nodeId".to_string()
}

fn default_typename_field() -> String {
    "__typename".to_string()
}

fn default_payload_suffix() -> String {
    "Payload".to_string()
}

fn default_root_marker() -> String {
    "Query".to_string()
}

fn default_connection_suffix() -> String {
    "Connection".to_string()
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            id_field: default_id_field(),
            typename_field: default_typename_field(),
            payload_suffix: default_payload_suffix(),
            root_marker: default_root_marker(),
            connection_suffix: default_connection_suffix(),
        }
    }
}

/// Schema type names known to the cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypesConfig {
    /// Field name -> declared result type name
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Connection type name -> element type name, when the naming convention
    /// does not apply
    #[serde(default)]
    pub elements: BTreeMap<String, String>,
}

/// One direction of an ambiguous relation pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictEntry {
    /// Relation field as it appears in responses
    pub field: String,

    /// Relation name the target type uses for the inverse direction
    pub partner: String,
}

impl ConflictEntry {
    pub fn new(field: impl Into<String>, partner: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            partner: partner.into(),
        }
    }
}

/// Snapshot backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    /// Keep the store in memory only
    #[default]
    None,
    /// Nested JSON mapping written to a single file
    Json,
    /// SQLite database
    Sqlite,
}

/// Snapshot persistence settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Backend used after every ingest
    #[serde(default)]
    pub backend: PersistenceBackend,

    /// Snapshot location
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::None,
            path: None,
        }
    }
}

impl PersistenceConfig {
    /// Snapshot path, falling back to ~/.config/graphcache/cache.{json,db}
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(ref path) = self.path {
            return path.clone();
        }
        let mut path = config_dir();
        match self.backend {
            PersistenceBackend::Sqlite => path.push("cache.db"),
            _ => path.push("cache.json"),
        }
        path
    }
}

/// GraphQL endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// GraphQL endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer token, or `$VAR` to read it from the environment
    #[serde(default)]
    pub token: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://localhost:5000/graphql".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl TransportConfig {
    /// Request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Token with `$VAR` references expanded
    pub fn resolved_token(&self) -> Option<String> {
        let token = self.token.as_ref()?;
        match token.strip_prefix('$') {
            Some(var) => std::env::var(var).ok(),
            None => Some(token.clone()),
        }
    }
}

/// graphcache configuration
///
/// Represents the complete ~/.config/graphcache/config.yaml file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Payload conventions
    #[serde(default)]
    pub normalize: NormalizeConfig,

    /// Field and connection type names
    #[serde(default)]
    pub types: TypesConfig,

    /// Ambiguous relation names
    #[serde(default)]
    pub conflicts: Vec<ConflictEntry>,

    /// Snapshot persistence
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Network transport
    #[serde(default)]
    pub transport: TransportConfig,
}

fn config_dir() -> PathBuf {
    // Always use ~/.config for consistency across platforms (macOS, Linux)
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("graphcache");
    path
}

impl CacheConfig {
    /// Create a configuration with every default
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a conflicting relation in both directions
    pub fn add_conflict_pair(&mut self, field: &str, partner: &str) {
        self.conflicts.push(ConflictEntry::new(field, partner));
        self.conflicts.push(ConflictEntry::new(partner, field));
    }

    /// Declare the result type of a field
    pub fn add_field_type(&mut self, field: impl Into<String>, type_name: impl Into<String>) {
        self.types.fields.insert(field.into(), type_name.into());
    }

    /// Load configuration from the default path (~/.config/graphcache/config.yaml)
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        Self::load(&path)
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::CacheError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading graphcache configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            fields = config.types.fields.len(),
            conflicts = config.conflicts.len(),
            backend = ?config.persistence.backend,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving graphcache configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/graphcache/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = config_dir();
        path.push("config.yaml");
        path
    }
}
