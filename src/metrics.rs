// Prometheus metrics definitions for the bot.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Reachability of each CRCON server as seen by the last health probe.
    pub static ref SERVER_UP: IntGaugeVec = IntGaugeVec::new(
        Opts::new("crcon_bot_server_up", "Whether the last health probe reached the server"),
        &["server"],
    )
    .unwrap();

    /// Players online per server, as of the last successful probe.
    pub static ref SERVER_PLAYERS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("crcon_bot_server_players", "Players online at the last health probe"),
        &["server"],
    )
    .unwrap();

    /// Per-index API calls currently in flight across all batch commands.
    pub static ref BATCH_IN_FLIGHT: IntGauge =
        IntGauge::new("crcon_bot_batch_in_flight", "Batch API calls currently in flight").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Chat commands handled, by command name and outcome code.
    pub static ref COMMANDS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("crcon_bot_commands_total", "Chat commands handled"),
        &["command", "outcome"],
    )
    .unwrap();

    /// CRCON requests, by endpoint and status ("ok", HTTP code, or "unreachable").
    pub static ref CRCON_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("crcon_bot_crcon_requests_total", "Requests sent to CRCON"),
        &["endpoint", "status"],
    )
    .unwrap();

    /// Permission changes, by operation and tier.
    pub static ref PERMISSION_CHANGES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("crcon_bot_permission_changes_total", "Persisted permission changes"),
        &["operation", "tier"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// CRCON request duration in seconds, by endpoint.
    pub static ref CRCON_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "crcon_bot_crcon_request_duration_seconds",
            "CRCON request duration in seconds",
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["endpoint"],
    )
    .unwrap();
}

static REGISTER: Once = Once::new();

/// Register all metrics with the custom registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(SERVER_UP.clone()),
            Box::new(SERVER_PLAYERS.clone()),
            Box::new(BATCH_IN_FLIGHT.clone()),
            Box::new(COMMANDS_TOTAL.clone()),
            Box::new(CRCON_REQUESTS_TOTAL.clone()),
            Box::new(PERMISSION_CHANGES_TOTAL.clone()),
            Box::new(CRCON_REQUEST_DURATION_SECONDS.clone()),
        ];

        for c in collectors {
            if let Err(e) = REGISTRY.register(c) {
                tracing::error!("failed to register metric: {e}");
            }
        }
    });
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_twice_does_not_panic() {
        register_metrics();
        register_metrics();
    }

    #[test]
    fn test_gather_contains_recorded_series() {
        register_metrics();
        COMMANDS_TOTAL.with_label_values(&["帮助", "ok"]).inc();
        SERVER_UP.with_label_values(&["1"]).set(1);
        CRCON_REQUEST_DURATION_SECONDS
            .with_label_values(&["get_players"])
            .observe(0.05);

        let output = gather_metrics();
        assert!(output.contains("crcon_bot_commands_total"));
        assert!(output.contains("crcon_bot_server_up"));
        assert!(output.contains("crcon_bot_crcon_request_duration_seconds"));
    }

    #[test]
    fn test_gauge_updates() {
        BATCH_IN_FLIGHT.inc();
        BATCH_IN_FLIGHT.dec();
        SERVER_PLAYERS.with_label_values(&["2"]).set(64);
        assert_eq!(SERVER_PLAYERS.with_label_values(&["2"]).get(), 64);
    }
}
