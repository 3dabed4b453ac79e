//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gemcache_requests_total` (counter): requests by outcome
//! - `gemcache_cache_lookups_total` (counter): lookups by result (hit, miss)
//! - `gemcache_cache_write_errors_total` (counter): failed cache writes
//! - `gemcache_upstream_errors_total` (counter): failed or interrupted fetches
//! - `gemcache_upstream_fetch_seconds` (histogram): time to upstream header
//! - `gemcache_active_connections` (gauge): current connection count

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(outcome: &'static str) {
    metrics::counter!("gemcache_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_cache_lookup(result: &'static str) {
    metrics::counter!("gemcache_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_write_error() {
    metrics::counter!("gemcache_cache_write_errors_total").increment(1);
}

pub fn record_upstream_error() {
    metrics::counter!("gemcache_upstream_errors_total").increment(1);
}

pub fn record_fetch_duration(started: Instant) {
    metrics::histogram!("gemcache_upstream_fetch_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_active_connections(active: u64) {
    metrics::gauge!("gemcache_active_connections").set(active as f64);
}
