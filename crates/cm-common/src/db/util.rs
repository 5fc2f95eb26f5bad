use std::{future::Future, sync::OnceLock, time::Instant};

use tokio_postgres::error::SqlState;
use tracing::warn;

fn slow_query_threshold_ms() -> Option<u64> {
    static CACHE: OnceLock<Option<u64>> = OnceLock::new();

    *CACHE.get_or_init(|| {
        std::env::var("CM_DB_LOG_MIN_DURATION_MS")
            .ok()
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(|v| v.max(0) as u64)
            .filter(|v| *v > 0)
    })
}

fn maybe_log_slow_query(label: &str, started_at: Instant) {
    if let Some(threshold_ms) = slow_query_threshold_ms() {
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        if elapsed_ms >= threshold_ms {
            warn!(query = label, elapsed_ms, "slow_query_detected");
        }
    }
}

/// Awaits a query future and logs it when it runs past
/// `CM_DB_LOG_MIN_DURATION_MS`.
pub async fn timed<F, T>(label: &str, query: F) -> T
where
    F: Future<Output = T>,
{
    let started = Instant::now();
    let result = query.await;
    maybe_log_slow_query(label, started);
    result
}

/// `'not-a-uuid'::uuid` fails with `22P02`; callers treat that as "no row".
pub fn is_invalid_id(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::INVALID_TEXT_REPRESENTATION)
}

/// Connection-level failures that may clear up on their own.
pub fn is_connection_error(err: &tokio_postgres::Error) -> bool {
    err.is_closed()
        || err.code().is_some_and(|code| {
            code.code().starts_with("08")
                || *code == SqlState::ADMIN_SHUTDOWN
                || *code == SqlState::CANNOT_CONNECT_NOW
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timed_passes_the_result_through() {
        let value = timed("noop", async { 41 + 1 }).await;
        assert_eq!(value, 42);
    }
}
