use std::time::Instant;

pub mod candidates;
pub mod compatibility;
pub mod health;
pub mod pagination;
pub mod recommendations;
pub mod saved_searches;
pub mod search;

pub(crate) fn record_latency(handler: &'static str, started: Instant) {
    metrics::histogram!("cm_http_request_duration_seconds", "handler" => handler)
        .record(started.elapsed().as_secs_f64());
}
