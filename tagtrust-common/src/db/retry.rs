//! Database retry logic
//!
//! Exponential backoff for transient SQLite lock contention. The whole unit
//! of work is re-run, so callers pass a closure that opens, fills and commits
//! its own transaction.

use std::time::{Duration, Instant};

use crate::{Error, Result};

/// First backoff sleep
pub const INITIAL_BACKOFF_MS: u64 = 10;

/// Cap on any single backoff sleep
pub const MAX_BACKOFF_MS: u64 = 1000;

/// Retry an operation while it fails on lock contention, until `max_wait_ms`
/// elapses.
///
/// - Success: returned immediately.
/// - Lock contention within budget: WARN, sleep (10ms doubling, capped at 1s), retry.
/// - Lock contention past budget: ERROR, `Error::Transient`.
/// - Any other error: returned immediately, no retry.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_lock_contention() {
                    return Err(err);
                }

                let elapsed = start_time.elapsed();
                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        max_wait_ms,
                        "Database operation failed: max retry time exceeded"
                    );
                    return Err(Error::Transient(format!(
                        "{} still locked after {} attempts ({} ms)",
                        operation_name,
                        attempt,
                        elapsed.as_millis()
                    )));
                }

                let sleep_ms = backoff_ms
                    .min(MAX_BACKOFF_MS)
                    .min(max_duration.saturating_sub(elapsed).as_millis() as u64)
                    .max(1);

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    backoff_ms = sleep_ms,
                    "Database locked, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
    }
}
