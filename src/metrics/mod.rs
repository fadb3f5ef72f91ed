//! Metrics module
//!
//! Prometheus counters for upload attempts, settlements and transferred
//! bytes, registered in the default registry.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, register_int_gauge, Counter,
    CounterVec, Encoder, HistogramVec, IntGauge, TextEncoder,
};

use crate::job::UploadStatus;

lazy_static! {
    pub static ref UPLOAD_ATTEMPTS_TOTAL: CounterVec = register_counter_vec!(
        "uploads_attempts_total",
        "Upload attempts started",
        &["trigger"]  // "submit" or "retry"
    ).unwrap();

    pub static ref UPLOADS_SETTLED_TOTAL: CounterVec = register_counter_vec!(
        "uploads_settled_total",
        "Upload attempts finished, by final status or superseded",
        &["status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "upload_bytes_total",
        "Total bytes of successfully uploaded payloads"
    ).unwrap();

    pub static ref COMPRESSION_SAVED_BYTES: Counter = register_counter!(
        "compression_saved_bytes_total",
        "Bytes removed by the compression step"
    ).unwrap();

    pub static ref ATTEMPT_DURATION: HistogramVec = register_histogram_vec!(
        "upload_attempt_duration_seconds",
        "Upload attempt duration in seconds, compression included",
        &["status"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    pub static ref UPLOADS_IN_FLIGHT: IntGauge = register_int_gauge!(
        "uploads_in_flight",
        "Upload attempts currently running"
    ).unwrap();
}

/// Record the start of an attempt
pub fn record_attempt_started(trigger: &str) {
    UPLOAD_ATTEMPTS_TOTAL.with_label_values(&[trigger]).inc();
    UPLOADS_IN_FLIGHT.inc();
}

/// Settlement label for attempts whose outcome was discarded because a retry
/// replaced them
pub const SUPERSEDED: &str = "superseded";

/// Record an attempt whose outcome settled its job
pub fn record_attempt_settled(status: UploadStatus, duration_secs: f64) {
    record_finished(status.as_str(), duration_secs);
}

/// Record an attempt that finished after being superseded by a retry
pub fn record_attempt_superseded(duration_secs: f64) {
    record_finished(SUPERSEDED, duration_secs);
}

fn record_finished(label: &str, duration_secs: f64) {
    UPLOADS_IN_FLIGHT.dec();
    UPLOADS_SETTLED_TOTAL.with_label_values(&[label]).inc();
    ATTEMPT_DURATION
        .with_label_values(&[label])
        .observe(duration_secs);
}

/// Record a successful upload's payload size
pub fn record_uploaded_bytes(bytes: u64) {
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record bytes saved by compression
pub fn record_compression(original: u64, compressed: u64) {
    COMPRESSION_SAVED_BYTES.inc_by(original.saturating_sub(compressed) as f64);
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
