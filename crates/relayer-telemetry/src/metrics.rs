//! Prometheus metrics for the relayer sync engines.
//!
//! All metrics follow the naming convention: `relayer_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Sync cycles by engine and outcome (`ok` / `error`)
    pub static ref SYNC_CYCLES: CounterVec = CounterVec::new(
        Opts::new("relayer_sync_cycles_total", "Total sync cycles run"),
        &["engine", "outcome"]
    ).expect("metric creation failed");

    /// Headers or light blocks accepted by a contract, by engine
    pub static ref HEADERS_SUBMITTED: CounterVec = CounterVec::new(
        Opts::new("relayer_headers_submitted_total", "Headers submitted to contracts"),
        &["engine"]
    ).expect("metric creation failed");

    /// Read-only query retries
    pub static ref QUERY_RETRIES: IntCounter = IntCounter::new(
        "relayer_query_retries_total",
        "Total read-only query retries"
    ).expect("metric creation failed");

    /// Sync cycle duration
    pub static ref CYCLE_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "relayer_sync_cycle_duration_seconds",
            "Time spent in one sync cycle"
        ).buckets(exponential_buckets(0.01, 2.0, 14).expect("valid buckets")),
        &["engine"]
    ).expect("metric creation failed");
}

/// Handle for the registered metrics
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(SYNC_CYCLES.clone()),
        Box::new(HEADERS_SUBMITTED.clone()),
        Box::new(QUERY_RETRIES.clone()),
        Box::new(CYCLE_DURATION.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Record the outcome of one sync cycle.
pub fn record_cycle(engine: &str, ok: bool, seconds: f64) {
    let outcome = if ok { "ok" } else { "error" };
    SYNC_CYCLES.with_label_values(&[engine, outcome]).inc();
    CYCLE_DURATION.with_label_values(&[engine]).observe(seconds);
}

/// Record headers accepted by a contract.
pub fn record_headers_submitted(engine: &str, count: usize) {
    HEADERS_SUBMITTED
        .with_label_values(&[engine])
        .inc_by(count as f64);
}

/// Record one query retry.
pub fn record_query_retry() {
    QUERY_RETRIES.inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // May fail if already registered, which is fine
        let _ = register_metrics();
    }

    #[test]
    fn test_record_cycle() {
        record_cycle("test-engine", true, 0.5);
        record_cycle("test-engine", false, 0.1);
        assert!(SYNC_CYCLES.with_label_values(&["test-engine", "ok"]).get() >= 1.0);
        assert!(SYNC_CYCLES.with_label_values(&["test-engine", "error"]).get() >= 1.0);
    }

    #[test]
    fn test_record_headers_submitted() {
        record_headers_submitted("counting", 3);
        assert!(HEADERS_SUBMITTED.with_label_values(&["counting"]).get() >= 3.0);
    }

    #[test]
    fn test_encode_contains_registered_metric() {
        let _ = register_metrics();
        record_query_retry();
        let text = encode_metrics().unwrap();
        assert!(text.contains("relayer_query_retries_total"));
    }
}
