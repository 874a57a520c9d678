//! Prometheus metrics for the event processor

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};

// ── Processing metrics ───────────────────────────────────────────────────────

/// Events evaluated, labelled by `path` ("async" or "sync").
pub static EVENTS_PROCESSED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lookout_events_processed_total",
        "Events evaluated against the compiled filter",
        &["path"]
    )
    .unwrap()
});

pub static EVENTS_MATCHED: Lazy<Counter> = Lazy::new(|| {
    register_counter!("lookout_events_matched_total", "Events that matched the filter").unwrap()
});

pub static EVENTS_FILTERED: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "lookout_events_filtered_total",
        "Events discarded by the filter"
    )
    .unwrap()
});

// ── Evaluation failures ──────────────────────────────────────────────────────

pub static DECODE_FAILURES: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "lookout_decode_failures_total",
        "Event payloads that failed to decode (treated as no match)"
    )
    .unwrap()
});

pub static FILTER_PANICS: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "lookout_filter_panics_total",
        "Filter evaluations that panicked (treated as no match)"
    )
    .unwrap()
});

pub static EVAL_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "lookout_filter_eval_duration_seconds",
        "Time spent decoding and evaluating one event",
        vec![0.000_001, 0.000_005, 0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.01]
    )
    .unwrap()
});

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_are_exported() {
        EVENTS_MATCHED.inc();
        EVENTS_PROCESSED.with_label_values(&["sync"]).inc();
        let text = encode_metrics();
        assert!(text.contains("lookout_events_matched_total"));
        assert!(text.contains("path=\"sync\""));
    }
}
