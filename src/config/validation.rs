//! Configuration validation
//!
//! Validates graphcache configuration for correctness:
//! - Payload conventions are non-empty
//! - Conflict entries are well formed and unique
//! - Persistence and transport settings are usable

use super::cache_config::{CacheConfig, PersistenceBackend};
use crate::CacheError;
use std::collections::HashSet;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub section: Option<String>,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            section: None,
            field: field.into(),
            message: message.into(),
        }
    }

    fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref section) = self.section {
            write!(f, "[{}] {}: {}", section, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a graphcache configuration
pub fn validate_config(config: &CacheConfig) -> ValidationResult {
    let mut errors = Vec::new();

    let normalize = &config.normalize;
    for (field, value) in [
        ("id_field", &normalize.id_field),
        ("typename_field", &normalize.typename_field),
        ("payload_suffix", &normalize.payload_suffix),
        ("root_marker", &normalize.root_marker),
        ("connection_suffix", &normalize.connection_suffix),
    ] {
        if value.trim().is_empty() {
            errors.push(ValidationError::new(field, "Must not be empty").with_section("normalize"));
        }
    }

    if normalize.id_field == normalize.typename_field {
        errors.push(
            ValidationError::new("id_field", "Identifier and typename fields must differ")
                .with_section("normalize"),
        );
    }

    let mut seen = HashSet::new();
    for entry in &config.conflicts {
        if entry.field.is_empty() || entry.partner.is_empty() {
            errors.push(
                ValidationError::new("conflicts", "Field and partner cannot be empty")
                    .with_section("conflicts"),
            );
        }
        if entry.field == entry.partner {
            errors.push(
                ValidationError::new(
                    "conflicts",
                    format!("Relation '{}' cannot be its own partner", entry.field),
                )
                .with_section("conflicts"),
            );
        }
        if !seen.insert(&entry.field) {
            errors.push(
                ValidationError::new(
                    "conflicts",
                    format!("Duplicate conflict entry for '{}'", entry.field),
                )
                .with_section("conflicts"),
            );
        }
    }

    if config.persistence.backend != PersistenceBackend::None {
        if let Some(ref path) = config.persistence.path {
            if path.as_os_str().is_empty() {
                errors.push(
                    ValidationError::new("path", "Snapshot path cannot be empty")
                        .with_section("persistence"),
                );
            }
        }
    }

    let transport = &config.transport;
    if !transport.endpoint.starts_with("http://") && !transport.endpoint.starts_with("https://")
    {
        errors.push(
            ValidationError::new(
                "endpoint",
                format!("Invalid GraphQL endpoint: {}", transport.endpoint),
            )
            .with_section("transport"),
        );
    }

    if transport.timeout_secs == 0 {
        errors.push(
            ValidationError::new("timeout_secs", "Timeout must be greater than 0")
                .with_section("transport"),
        );
    }

    if let Some(ref token) = transport.token {
        if let Some(var) = token.strip_prefix('$') {
            if std::env::var(var).is_err() {
                tracing::warn!(
                    env_var = %var,
                    "Environment variable not set (this may be intentional if set at runtime)"
                );
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate and convert the error list into a single `CacheError`
pub fn validate_config_result(config: &CacheConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let message = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        CacheError::Config(message)
    })
}
