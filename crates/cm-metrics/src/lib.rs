use std::env;
use std::sync::OnceLock;

use metrics::{Unit, describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn resolve_port(raw: Option<String>, default_port: u16) -> u16 {
    raw.and_then(|value| value.trim().parse::<u16>().ok())
        .unwrap_or(default_port)
}

/// Start a Prometheus exporter on `0.0.0.0:<port>`.
///
/// The port comes from `port_env`, else `default_port`. Repeated calls return
/// the handle of the first successful install.
pub fn init_metrics(port_env: &str, default_port: u16) -> Option<&'static PrometheusHandle> {
    if let Some(existing) = PROMETHEUS_HANDLE.get() {
        return Some(existing);
    }

    let port = resolve_port(env::var(port_env).ok(), default_port);

    match PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install_recorder()
    {
        Ok(handle) => {
            let _ = PROMETHEUS_HANDLE.set(handle);
            describe_engine_metrics();
            info!(metrics_port = port, "started prometheus exporter");
            PROMETHEUS_HANDLE.get()
        }
        Err(err) => {
            warn!(error = %err, metrics_port = port, "failed to start prometheus exporter");
            PROMETHEUS_HANDLE.get()
        }
    }
}

/// Registers help text for the series the recommendation engine emits.
pub fn describe_engine_metrics() {
    describe_counter!(
        "cm_candidates_scored_total",
        "Candidates that received a compatibility score"
    );
    describe_counter!(
        "cm_candidate_failures_total",
        "Candidates dropped because their score could not be fetched"
    );
    describe_counter!(
        "cm_superseded_runs_total",
        "Runs discarded because a newer run for the same scope started"
    );
    describe_histogram!(
        "cm_http_request_duration_seconds",
        Unit::Seconds,
        "Latency of recommendation API handlers"
    );
}
