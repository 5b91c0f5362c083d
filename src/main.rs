//! graphcache - Normalized GraphQL response cache
//!
//! Main entry point for the graphcache CLI.

use anyhow::Context;
use clap::{Parser, Subcommand};
use graphcache::config::{validate_config, CacheConfig, PersistenceBackend};
use graphcache::query::parse_selections;
use graphcache::{
    CacheError, HttpTransport, IngestOptions, NormalizedCache, RequestCoordinator, Selection,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

/// graphcache - Normalized cache for GraphQL responses
#[derive(Parser, Debug)]
#[command(name = "graphcache")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/graphcache/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Normalize a GraphQL response (JSON file) into the cache
    Ingest {
        /// Response file: `{"data": {...}}` or the bare data object
        file: PathBuf,

        /// Do not write a snapshot afterwards
        #[arg(long)]
        no_persist: bool,
    },

    /// Answer a selection set from the cache
    Query {
        /// Selection set as JSON, inline or a file path
        selection: String,

        /// Variables bound into `"$name"` arguments (JSON object)
        #[arg(long)]
        variables: Option<String>,
    },

    /// Fetch a query through the configured endpoint and cache the result
    Fetch {
        /// File holding the GraphQL query text
        query: PathBuf,

        /// Selection set used to read the result back (JSON, inline or a file path)
        #[arg(short, long)]
        selection: String,

        /// Query variables (JSON object)
        #[arg(long)]
        variables: Option<String>,
    },

    /// Show cache statistics
    Stats,

    /// Remove every cached entity and the persisted snapshot
    Clear,

    /// List stored types with entity counts
    Types,

    /// Print Prometheus metrics for this run
    Metrics,
}

fn main() {
    // Initialize logging
    if let Err(e) = graphcache::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> graphcache::Result<()> {
    if let Commands::Init { force } = cli.command {
        return handle_init_command(cli.config.as_deref(), force);
    }

    let config = load_config(cli.config.as_deref())?;
    if let Err(problems) = validate_config(&config) {
        for problem in problems {
            tracing::warn!(%problem, "Configuration problem");
        }
    }

    let cache = NormalizedCache::from_config(&config)?;
    if cache.restore()? {
        tracing::debug!("Restored cache from snapshot");
    }

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),

        Commands::Ingest { file, no_persist } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read response file {}", file.display()))?;
            let response: Value = serde_json::from_str(&content)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;
            let data = match response.get("data") {
                Some(data) if data.is_object() => data.clone(),
                _ => response,
            };

            let report = cache.ingest_with(
                &data,
                IngestOptions {
                    persist: !no_persist,
                },
            )?;
            println!(
                "Ingested {}: {} inserted, {} merged, {} unchanged",
                file.display(),
                report.inserted,
                report.merged,
                report.unchanged
            );
            if !report.changed_types.is_empty() {
                let types: Vec<_> = report.changed_types.iter().map(String::as_str).collect();
                println!("Changed types: {}", types.join(", "));
            }
        }

        Commands::Query {
            selection,
            variables,
        } => {
            let selections = read_selections(&selection)?;
            let variables = parse_variables(variables.as_deref())?;
            let variables = variables.as_object().cloned().unwrap_or_default();
            let data = cache.read_with_variables(&selections, &variables)?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }

        Commands::Fetch {
            query,
            selection,
            variables,
        } => {
            let query_text = std::fs::read_to_string(&query)
                .with_context(|| format!("Failed to read query file {}", query.display()))?;
            let selections = read_selections(&selection)?;
            let variables = parse_variables(variables.as_deref())?;

            let transport = HttpTransport::from_config(&config.transport)?;
            tracing::info!(endpoint = transport.endpoint(), "Fetching");
            let coordinator = RequestCoordinator::new(Arc::new(cache), Arc::new(transport));

            let rt = tokio::runtime::Runtime::new()?;
            let data = rt.block_on(coordinator.execute(
                &query_text,
                variables,
                selections,
                IngestOptions::default(),
            ))?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }

        Commands::Stats => {
            let stats = cache.stats()?;
            println!("Entities: {}", stats.entity_count);
            println!("Types:    {}", stats.type_counts.len());
            println!(
                "Snapshot: {}",
                match config.persistence.backend {
                    PersistenceBackend::None => "disabled".to_string(),
                    _ => config.persistence.resolved_path().display().to_string(),
                }
            );
        }

        Commands::Clear => {
            cache.clear()?;
            println!("Cache cleared");
        }

        Commands::Types => {
            let stats = cache.stats()?;
            if stats.type_counts.is_empty() {
                println!("No cached types");
            }
            for (type_name, count) in &stats.type_counts {
                println!("{:<32} {}", type_name, count);
            }
        }

        Commands::Metrics => {
            print!("{}", graphcache::metrics::encode_metrics()?);
        }
    }

    Ok(())
}

/// Load the configuration; without a config file the CLI keeps a JSON snapshot at the
/// default location so successive commands share one cache
fn load_config(path: Option<&Path>) -> graphcache::Result<CacheConfig> {
    if let Some(path) = path {
        return CacheConfig::load(path);
    }
    match CacheConfig::load_default() {
        Ok(config) => Ok(config),
        Err(CacheError::Config(msg)) if msg.contains("Config file not found") => {
            tracing::debug!("No configuration file, using defaults");
            let mut config = CacheConfig::default();
            config.persistence.backend = PersistenceBackend::Json;
            Ok(config)
        }
        Err(e) => Err(e),
    }
}

fn handle_init_command(path: Option<&Path>, force: bool) -> graphcache::Result<()> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(CacheConfig::default_path);

    if path.exists() && !force {
        return Err(CacheError::Config(format!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        )));
    }

    let mut config = CacheConfig::default();
    config.persistence.backend = PersistenceBackend::Json;
    config.save(&path)?;

    println!("Created configuration: {}", path.display());
    Ok(())
}

/// Selections given inline or as a path to a JSON file
fn read_selections(arg: &str) -> graphcache::Result<Vec<Selection>> {
    let path = Path::new(arg);
    if path.is_file() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read selection file {}", path.display()))?;
        parse_selections(&content)
    } else {
        parse_selections(arg)
    }
}

fn parse_variables(arg: Option<&str>) -> graphcache::Result<Value> {
    match arg {
        Some(json) => {
            let value: Value =
                serde_json::from_str(json).context("Failed to parse --variables")?;
            if !value.is_object() {
                return Err(anyhow::anyhow!("--variables must be a JSON object").into());
            }
            Ok(value)
        }
        None => Ok(Value::Object(Default::default())),
    }
}
