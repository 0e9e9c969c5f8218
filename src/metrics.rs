//! Metrics collection for batch dispatch
//!
//! Provides Prometheus-compatible metrics for monitoring dispatched batches,
//! per-call outcomes and permit usage.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// Counter for dispatched batches
    static ref BATCHES: IntCounter = register_int_counter!(
        "rowgen_batches_total",
        "Total number of dispatched batches"
    ).unwrap();

    /// Counter for calls by outcome
    static ref CALLS: IntCounterVec = register_int_counter_vec!(
        "rowgen_calls_total",
        "Total number of calls by outcome",
        &["outcome"]
    ).unwrap();

    /// Histogram for batch duration
    static ref BATCH_DURATION: Histogram = register_histogram!(
        "rowgen_batch_duration_seconds",
        "Batch dispatch duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    /// Gauge for permits currently held
    static ref PERMITS_IN_USE: IntGauge = register_int_gauge!(
        "rowgen_permits_in_use",
        "Number of downstream call permits currently held"
    ).unwrap();

    /// Counter for rejected envelopes
    static ref ENVELOPE_ERRORS: IntCounter = register_int_counter!(
        "rowgen_envelope_errors_total",
        "Total number of requests rejected because the envelope could not be decoded"
    ).unwrap();
}

/// Record a finished batch
pub fn record_batch(duration_secs: f64) {
    BATCHES.inc();
    BATCH_DURATION.observe(duration_secs);
}

/// Record the outcome of one call
pub fn record_call(outcome: &str) {
    CALLS.with_label_values(&[outcome]).inc();
}

/// Record a rejected envelope
pub fn record_envelope_error() {
    ENVELOPE_ERRORS.inc();
}

pub(crate) fn permit_acquired() {
    PERMITS_IN_USE.inc();
}

pub(crate) fn permit_released() {
    PERMITS_IN_USE.dec();
}

/// Render the default registry in the Prometheus text format
pub fn export_metrics() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let mut text = Vec::new();
    TextEncoder::new()
        .encode(&prometheus::gather(), &mut text)
        .map_err(|e| format!("Failed to encode metrics: {e}"))?;

    Ok(String::from_utf8(text).map_err(|e| format!("Metrics output is not UTF-8: {e}"))?)
}
