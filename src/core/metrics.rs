// src/core/metrics.rs

//! Defines and registers Prometheus metrics for heartbeat monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    /// The number of sessions currently in the selector's active dispatch set.
    pub static ref ACTIVE_SESSIONS: Gauge =
        register_gauge!("hbwarden_active_sessions", "Number of heartbeat sessions actively probing.").unwrap();

    /// Completed probes, labeled by outcome (pong, timeout, failed).
    pub static ref PROBES_TOTAL: CounterVec =
        register_counter_vec!("hbwarden_probes_total", "Total number of heartbeat probes, labeled by outcome.", &["outcome"]).unwrap();
    /// Replies slower than the slowlog threshold.
    pub static ref SLOW_REPLIES_TOTAL: Counter =
        register_counter!("hbwarden_slow_replies_total", "Total number of heartbeat replies slower than the slowlog threshold.").unwrap();
    /// Opinions submitted to the decision pipeline, labeled by kind.
    pub static ref OPINIONS_TOTAL: CounterVec =
        register_counter_vec!("hbwarden_opinions_total", "Total number of opinions submitted, labeled by kind.", &["kind"]).unwrap();

    /// Round-trip latency of successful probes.
    pub static ref PROBE_LATENCY_SECONDS: Histogram =
        register_histogram!("hbwarden_probe_latency_seconds", "Heartbeat ping/pong latency in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# failed to encode metrics: {e}\n"))
}
