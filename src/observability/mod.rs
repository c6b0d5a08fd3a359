//! Metrics hook shared by every component.
//!
//! Components never talk to a metrics backend directly. They report through
//! [`MetricsHook`], which defaults to [`NoOpMetricsHook`].

pub mod names;
mod store;

use std::sync::Arc;
use std::time::Instant;

pub use store::{MetricKind, MetricSummary, SqliteMetricsStore};

/// Label pairs attached to a metric event.
pub type Labels<'a> = &'a [(&'a str, &'a str)];

/// Sink for latency, counter and gauge events.
pub trait MetricsHook: Send + Sync {
    fn record_latency(&self, name: &str, value_ms: f64, labels: Labels<'_>);

    fn increment(&self, name: &str, value: u64, labels: Labels<'_>);

    fn record_gauge(&self, name: &str, value: f64, labels: Labels<'_>);
}

pub type SharedMetricsHook = Arc<dyn MetricsHook>;

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetricsHook;

impl MetricsHook for NoOpMetricsHook {
    fn record_latency(&self, _name: &str, _value_ms: f64, _labels: Labels<'_>) {}

    fn increment(&self, _name: &str, _value: u64, _labels: Labels<'_>) {}

    fn record_gauge(&self, _name: &str, _value: f64, _labels: Labels<'_>) {}
}

/// Emits every event as a `tracing` debug record under the `llmkit::metrics` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsHook;

impl MetricsHook for TracingMetricsHook {
    fn record_latency(&self, name: &str, value_ms: f64, labels: Labels<'_>) {
        tracing::debug!(
            target: "llmkit::metrics",
            metric = name,
            value_ms,
            labels = %format_labels(labels),
            "latency"
        );
    }

    fn increment(&self, name: &str, value: u64, labels: Labels<'_>) {
        tracing::debug!(
            target: "llmkit::metrics",
            metric = name,
            value,
            labels = %format_labels(labels),
            "counter"
        );
    }

    fn record_gauge(&self, name: &str, value: f64, labels: Labels<'_>) {
        tracing::debug!(
            target: "llmkit::metrics",
            metric = name,
            value,
            labels = %format_labels(labels),
            "gauge"
        );
    }
}

pub fn noop_hook() -> SharedMetricsHook {
    Arc::new(NoOpMetricsHook)
}

fn format_labels(labels: Labels<'_>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Milliseconds elapsed since `start`, as reported to [`MetricsHook::record_latency`].
pub fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_labels() {
        assert_eq!(format_labels(&[]), "");
        assert_eq!(
            format_labels(&[("backend", "openai"), ("operation", "query")]),
            "backend=openai,operation=query"
        );
    }

    #[test]
    fn test_noop_hook_accepts_events() {
        let hook = noop_hook();
        hook.record_latency(names::CHUNKING_DURATION, 1.5, &[]);
        hook.increment(names::CHUNKING_CHUNKS_CREATED, 3, &[]);
        hook.record_gauge(names::EMBEDDINGS_BATCH_SIZE, 8.0, &[("backend", "local")]);
    }
}
