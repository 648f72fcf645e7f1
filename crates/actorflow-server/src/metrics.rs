//! Prometheus metrics for the event loop.
//!
//! All counters live in one process-wide registry; [`Metrics::render`]
//! produces the text exposition format served by the metrics endpoint.

use std::sync::OnceLock;

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Event loop counters.
pub struct Metrics {
    registry: Registry,
    /// Connections accepted and turned into sessions.
    pub sessions_accepted: IntCounter,
    /// Sessions currently open.
    pub sessions_active: IntGauge,
    /// Connections dropped because `max_sessions` was reached.
    pub sessions_rejected: IntCounter,
    /// Sessions closed by the idle sweep.
    pub idle_timeouts: IntCounter,
    /// Complete lines pushed into pipelines.
    pub lines_received: IntCounter,
    /// Replies queued on sessions.
    pub replies_queued: IntCounter,
    /// Failed `accept` calls.
    pub accept_errors: IntCounter,
}

impl Metrics {
    /// Returns the process-wide metrics, creating them on first use.
    pub fn global() -> &'static Metrics {
        METRICS.get_or_init(Metrics::new)
    }

    fn new() -> Self {
        let registry = Registry::new_custom(Some("actorflow".to_string()), None)
            .expect("static registry prefix is valid");

        let counter = |name: &str, help: &str| {
            let metric = IntCounter::new(name, help).expect("static metric definition is valid");
            registry
                .register(Box::new(metric.clone()))
                .expect("metric names are unique");
            metric
        };

        let sessions_accepted = counter("sessions_accepted_total", "Connections accepted");
        let sessions_rejected = counter(
            "sessions_rejected_total",
            "Connections dropped at the session limit",
        );
        let idle_timeouts = counter("idle_timeouts_total", "Sessions closed for inactivity");
        let lines_received = counter("lines_received_total", "Lines pushed into pipelines");
        let replies_queued = counter("replies_queued_total", "Replies queued on sessions");
        let accept_errors = counter("accept_errors_total", "Failed accept calls");

        let sessions_active = IntGauge::new("sessions_active", "Sessions currently open")
            .expect("static metric definition is valid");
        registry
            .register(Box::new(sessions_active.clone()))
            .expect("metric names are unique");

        Self {
            registry,
            sessions_accepted,
            sessions_active,
            sessions_rejected,
            idle_timeouts,
            lines_received,
            replies_queued,
            accept_errors,
        }
    }

    /// Renders every metric in the Prometheus text format.
    pub fn render(&self) -> String {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(error) = TextEncoder::new().encode(&families, &mut buffer) {
            tracing::warn!(%error, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
