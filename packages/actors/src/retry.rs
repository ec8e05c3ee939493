//! Bounded retry for job store writes.

use std::future::Future;

use db::DbError;
use queue_core::{JobId, RetryPolicy};

/// Run `write` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up.
pub(crate) async fn write_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    job_id: JobId,
    operation: &'static str,
    mut write: F,
) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt = 1;
    loop {
        match write().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    %job_id,
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Store write failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
