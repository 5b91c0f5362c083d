//! Prometheus metrics for the cache
//!
//! Counters for entity writes, resolver hits and misses, and network activity of the
//! request coordinator.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_int_counter, CounterVec, Encoder, Gauge,
    IntCounter, TextEncoder,
};

lazy_static! {
    /// Counter: entity upserts by outcome (inserted, merged, unchanged)
    pub static ref ENTITY_WRITES: CounterVec = register_counter_vec!(
        "graphcache_entity_writes_total",
        "Entity upserts by outcome",
        &["outcome"]
    )
    .expect("Failed to create entity_writes metric");

    /// Counter: resolver lookups (hit/miss)
    pub static ref CACHE_OPERATIONS: CounterVec = register_counter_vec!(
        "graphcache_cache_operations_total",
        "Resolver lookups by result",
        &["operation"]
    )
    .expect("Failed to create cache_operations metric");

    /// Counter: network fetches by outcome (success, failure)
    pub static ref NETWORK_FETCHES: CounterVec = register_counter_vec!(
        "graphcache_network_fetches_total",
        "Network fetches issued by the request coordinator",
        &["outcome"]
    )
    .expect("Failed to create network_fetches metric");

    /// Counter: callers served by an already in-flight request
    pub static ref COALESCED_REQUESTS: IntCounter = register_int_counter!(
        "graphcache_coalesced_requests_total",
        "Requests joined to an in-flight fetch"
    )
    .expect("Failed to create coalesced_requests metric");

    /// Gauge: entities currently stored
    pub static ref STORED_ENTITIES: Gauge = register_gauge!(
        "graphcache_stored_entities",
        "Number of entities in the normalized store"
    )
    .expect("Failed to create stored_entities metric");
}

/// Record an upsert outcome
pub fn record_entity_write(outcome: &str) {
    ENTITY_WRITES.with_label_values(&[outcome]).inc();
}

/// Record cache hit
pub fn record_cache_hit() {
    CACHE_OPERATIONS.with_label_values(&["hit"]).inc();
}

/// Record cache miss
pub fn record_cache_miss() {
    CACHE_OPERATIONS.with_label_values(&["miss"]).inc();
}

/// Record a finished network fetch
pub fn record_fetch(outcome: &str) {
    NETWORK_FETCHES.with_label_values(&[outcome]).inc();
}

/// Record a caller joining an in-flight fetch
pub fn record_coalesced() {
    COALESCED_REQUESTS.inc();
}

/// Set the stored entity count
pub fn set_stored_entities(count: usize) {
    STORED_ENTITIES.set(count as f64);
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> crate::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| crate::CacheError::Storage(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| crate::CacheError::Storage(format!("Metrics are not UTF-8: {}", e)))
}
