//! Database retry logic
//!
//! Storage failures caused by SQLite lock contention are retried once after a
//! short backoff. Everything else, and a second transient failure, is
//! returned to the caller.

use std::time::Duration;
use gigflow_common::Result;

/// Default pause before the single retry
pub const DEFAULT_BACKOFF_MS: u64 = 50;

/// Run `operation`, retrying once if the first failure is transient
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g. "materialize enquiry")
/// * `backoff_ms` - Pause before the retry
/// * `operation` - Async closure performing the database work; it must be
///   safe to run twice (each attempt opens its own transaction)
pub async fn retry_once_on_transient<F, Fut, T>(
    operation_name: &str,
    backoff_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    match operation().await {
        Ok(result) => Ok(result),
        Err(err) if err.is_transient() => {
            tracing::warn!(
                operation = operation_name,
                backoff_ms,
                error = %err,
                "Transient database error, retrying once after backoff"
            );
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;

            operation().await.map_err(|retry_err| {
                tracing::error!(
                    operation = operation_name,
                    error = %retry_err,
                    "Database operation failed after retry"
                );
                retry_err
            })
        }
        Err(err) => Err(err),
    }
}
