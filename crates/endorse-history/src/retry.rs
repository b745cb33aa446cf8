//! Retry with exponential back-off and jitter for repository calls.
//!
//! Reads are retried on any transient storage failure (pool exhaustion,
//! connection I/O). Saves are retried only when the statement never left the
//! pool: after a dropped connection the write may have committed, and a
//! repeat would then be rejected as a stale version. Version conflicts,
//! constraint violations and malformed rows are returned immediately.

use std::future::Future;
use std::time::Duration;

use endorse_core::AppConfig;
use endorse_db::DbError;

const MAX_DELAY_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 100,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_retries: config.storage_max_retries,
            backoff_base_ms: config.storage_retry_backoff_ms,
        }
    }

    /// Never retry. Useful in tests that count storage calls.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_base_ms: 0,
        }
    }
}

/// Runs a read with up to `policy.max_retries` additional attempts on
/// transient errors.
pub(crate) async fn retry_transient<T, F, Fut>(
    policy: RetryPolicy,
    operation_name: &'static str,
    operation: F,
) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    retry_when(policy, operation_name, DbError::is_transient, operation).await
}

/// Runs a write, retrying only failures where the statement was never sent.
pub(crate) async fn retry_unsent<T, F, Fut>(
    policy: RetryPolicy,
    operation_name: &'static str,
    operation: F,
) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    retry_when(policy, operation_name, DbError::is_unsent, operation).await
}

/// The delay before attempt `n + 1` is `backoff_base_ms × 2ⁿ⁻¹ ± 25 %`,
/// capped at five seconds.
async fn retry_when<T, F, Fut>(
    policy: RetryPolicy,
    operation_name: &'static str,
    should_retry: fn(&DbError) -> bool,
    mut operation: F,
) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !should_retry(&err) || attempt >= policy.max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = policy
                    .backoff_base_ms
                    .saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms,
                    error = %err,
                    "transient storage error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
