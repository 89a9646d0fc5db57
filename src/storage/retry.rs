//! 操作重试模块
//!
//! 固定次数、固定间隔的重试执行器，按错误类别分类。

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::errors::{LinkcutError, Result};

/// 重试策略
///
/// `max_attempts` counts the first attempt; `delay` is applied unchanged
/// between attempts.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Duration::from_millis(delay_ms),
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(cfg: RetryConfig) -> Self {
        Self::new(cfg.max_attempts, cfg.delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

/// 重试执行器
///
/// Re-runs `operation` while the error classifies as retryable
/// (`LinkcutError::is_retryable`), up to `policy.max_attempts` attempts with
/// a fixed delay in between. The final failure propagates the original
/// error; each failed attempt is logged.
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        "operation '{}' succeeded on attempt {}",
                        operation_name, attempt
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                warn!(
                    "operation '{}' failed (attempt {}/{}): {}, retrying in {} ms",
                    operation_name,
                    attempt,
                    policy.max_attempts,
                    e,
                    policy.delay.as_millis()
                );
                attempt += 1;
                sleep(policy.delay).await;
            }
            Err(e) => {
                if !e.is_retryable() {
                    debug!(
                        "operation '{}' failed with non-retryable error: {}",
                        operation_name, e
                    );
                } else {
                    warn!(
                        "operation '{}' failed (attempt {}/{}): no more retries",
                        operation_name, attempt, policy.max_attempts
                    );
                }
                return Err(e);
            }
        }
    }
}

/// 针对特定错误谓词的重试执行器
///
/// Same shape as [`with_retry`] but with a caller-supplied predicate.
/// The creation pipeline uses it to retry only integrity violations that
/// are not URL conflicts.
pub async fn with_retry_if<T, F, Fut, P>(
    operation_name: &str,
    policy: RetryPolicy,
    retry_if: P,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&LinkcutError) -> bool,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if retry_if(&e) && attempt < policy.max_attempts => {
                warn!(
                    "operation '{}' failed (attempt {}/{}): {}, retrying in {} ms",
                    operation_name,
                    attempt,
                    policy.max_attempts,
                    e,
                    policy.delay.as_millis()
                );
                attempt += 1;
                sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_success_passes_through() {
        let policy = RetryPolicy::new(3, 1);
        let result = with_retry("ok", policy, || async { Ok::<_, LinkcutError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let policy = RetryPolicy::new(3, 1);
        let attempts = AtomicU32::new(0);
        let result = with_retry("flaky", policy, || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(LinkcutError::transient_backend("connection reset"))
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let policy = RetryPolicy::new(5, 1);
        let attempts = AtomicU32::new(0);
        let result: Result<()> = with_retry("invalid", policy, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(LinkcutError::invalid_url("bad scheme"))
        })
        .await;
        assert!(matches!(result, Err(LinkcutError::InvalidUrl(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_budget_propagates_original() {
        let policy = RetryPolicy::new(2, 1);
        let attempts = AtomicU32::new(0);
        let result: Result<()> = with_retry("down", policy, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(LinkcutError::transient_backend("still down"))
        })
        .await;
        match result {
            Err(LinkcutError::TransientBackend(msg)) => assert_eq!(msg, "still down"),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_if_predicate() {
        let policy = RetryPolicy::new(3, 1);
        let attempts = AtomicU32::new(0);
        let result: Result<()> = with_retry_if(
            "integrity",
            policy,
            |e| matches!(e, LinkcutError::Integrity(_)),
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(LinkcutError::integrity("duplicate key"))
            },
        )
        .await;
        assert!(matches!(result, Err(LinkcutError::Integrity(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
