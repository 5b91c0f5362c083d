//! Logging setup
//!
//! Structured events go to stderr. `GRAPHCACHE_LOG` takes precedence over `RUST_LOG`
//! so the cache can be turned up without flooding output from the host application.
//!
//! Useful directives:
//! - `info` - ingest, clear and snapshot events
//! - `graphcache=debug` - every upsert and request transition
//! - `graphcache::normalize=trace` - shape classification per object

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crate-specific filter variable
pub const LOG_ENV: &str = "GRAPHCACHE_LOG";

const DEFAULT_DIRECTIVES: &str = "warn";

/// Filter from explicit directives, falling back to `warn` when absent or unparsable
pub fn build_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the global subscriber
///
/// # Errors
/// Returns `CacheError::Config` if a subscriber is already installed
pub fn init() -> crate::Result<()> {
    let directives = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var(EnvFilter::DEFAULT_ENV))
        .ok();

    tracing_subscriber::registry()
        .with(build_filter(directives.as_deref()))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .pretty(),
        )
        .try_init()
        .map_err(|e| crate::CacheError::Config(format!("Failed to initialize tracing: {}", e)))
}

/// Initialize logging for tests (no-op if already initialized)
pub fn init_test() {
    let _ = init();
}
