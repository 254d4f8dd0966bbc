//! Observability (C15, SPEC_FULL §2 [ADD]).
//!
//! Thin wrappers over the `metrics` crate facade, named after what the
//! orchestrator actually instruments. Grounded on the teacher's
//! `performance`/`route_quality::metrics` convention of naming each
//! counter/gauge/histogram once here rather than inlining string
//! literals at every call site.

use crate::models::Mode;

pub fn record_window_sealed(mode: Mode) {
    metrics::counter!("detector_windows_sealed_total", "mode" => mode.as_str()).increment(1);
}

pub fn record_detection_emitted(mode: Mode) {
    metrics::counter!("detector_detections_emitted_total", "mode" => mode.as_str()).increment(1);
}

pub fn record_observation_dropped_filter() {
    metrics::counter!("detector_observations_filtered_total").increment(1);
}

pub fn record_queue_drop(queue: &'static str, count: u64) {
    metrics::counter!("detector_queue_drops_total", "queue" => queue).increment(count);
}

pub fn record_scoring_latency_ms(latency_ms: f64) {
    metrics::histogram!("detector_scoring_latency_ms").record(latency_ms);
}

pub fn record_submodel_unavailable(submodel: &'static str) {
    metrics::counter!("detector_submodel_unavailable_total", "submodel" => submodel).increment(1);
}

pub fn record_detection_conflict() {
    metrics::counter!("detector_detection_write_conflicts_total").increment(1);
}

/// Installs the Prometheus recorder/exporter on an ephemeral port the
/// teacher's `performance` module also wires up ahead of `main()`'s
/// axum server start. Fire-and-forget: a failure here degrades
/// observability, never the detector itself.
pub fn install_recorder(bind_addr: std::net::SocketAddr) {
    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(bind_addr)
        .install()
    {
        tracing::warn!(error = %e, "failed to install prometheus metrics exporter");
    }
}
