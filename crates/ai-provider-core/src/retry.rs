use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::errors::CoreError;

/// Backoff schedule knobs (spec §4.D). `generate` calls use
/// `max_attempts = 3`; every other manager operation runs with
/// `max_attempts = 1` (no retry).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait *before* making `attempt` (1-indexed). Attempt 1 never
    /// waits. `min(base * 2^(k-1), max_delay) + jitter` where `k = attempt - 1`
    /// and jitter is uniform on `[0, delay/4)`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let k = attempt - 1;
        let exp = k.saturating_sub(1).min(32);
        let scaled = self.base.saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX));
        let delay = scaled.min(self.max_delay);
        let jitter_bound = delay / 4;
        let jitter = if jitter_bound.is_zero() {
            Duration::ZERO
        } else {
            let millis = rand::rng().random_range(0..jitter_bound.as_millis().max(1) as u64);
            Duration::from_millis(millis)
        };
        delay + jitter
    }
}

/// Per-call scratch state threaded through one `generate` invocation
/// (spec §3 "RetryContext"). Never outlives the call.
#[derive(Debug, Default)]
pub struct RetryContext {
    pub attempt: u32,
    pub last_failure_at: Option<Instant>,
    pub last_error: Option<CoreError>,
}

/// Runs `op` under the retry policy, honoring cancellation during the
/// inter-attempt sleep (spec §4.D, §5 "cancellation must abort the wait
/// immediately"). `op` receives the 1-indexed attempt number.
pub async fn run_with_retry<F, Fut, T>(
    ctx: &CancellationToken,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, CoreError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut retry_ctx = RetryContext::default();

    for attempt in 1..=policy.max_attempts {
        retry_ctx.attempt = attempt;

        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            tokio::select! {
                _ = ctx.cancelled() => return Err(CoreError::canceled()),
                _ = tokio::time::sleep(delay) => {}
            }
        } else if ctx.is_cancelled() {
            return Err(CoreError::canceled());
        }

        let result = tokio::select! {
            _ = ctx.cancelled() => Err(CoreError::canceled()),
            result = op(attempt) => result,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.kind == crate::errors::ProviderErrorKind::Canceled => {
                return Err(err);
            }
            Err(err) => {
                let retryable = err.kind.is_retryable();
                retry_ctx.last_failure_at = Some(Instant::now());
                retry_ctx.last_error = Some(err.clone());
                if !retryable || attempt == policy.max_attempts {
                    return Err(CoreError::new(
                        err.kind,
                        format!("all retries failed: {}", err.message),
                    ));
                }
            }
        }
    }

    // Unreachable: max_attempts >= 1 guarantees a return above.
    Err(retry_ctx
        .last_error
        .unwrap_or_else(|| CoreError::internal("retry loop exited without a result")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn zero_wait_precedes_first_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::ZERO);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        let d2 = policy.delay_before(2);
        let d3 = policy.delay_before(3);
        assert!(d2 >= Duration::from_secs(1) && d2 < Duration::from_secs(2));
        assert!(d3 >= Duration::from_secs(2) && d3 < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_retryable_errors_up_to_ceiling() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let ctx = CancellationToken::new();
        let policy = RetryPolicy::default();

        let result: Result<(), CoreError> = run_with_retry(&ctx, &policy, move |_attempt| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::transport("boom"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let ctx = CancellationToken::new();
        let policy = RetryPolicy::default();

        let result: Result<(), CoreError> = run_with_retry(&ctx, &policy, move |_attempt| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::client_error("nope"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_retryable_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let ctx = CancellationToken::new();
        let policy = RetryPolicy::default();

        let result = run_with_retry(&ctx, &policy, move |_attempt| {
            let calls = calls_clone.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(CoreError::rate_limit("slow down"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancellation_aborts_wait_immediately() {
        let ctx = CancellationToken::new();
        let policy = RetryPolicy::default();
        let ctx_clone = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            ctx_clone.cancel();
        });

        let result: Result<(), CoreError> = run_with_retry(&ctx, &policy, |_attempt| async {
            Err(CoreError::transport("boom"))
        })
        .await;

        assert_eq!(result.unwrap_err().kind, ProviderErrorKind::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_operation_aborts_the_in_flight_attempt() {
        let ctx = CancellationToken::new();
        let policy = RetryPolicy::default();
        let ctx_clone = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            ctx_clone.cancel();
        });

        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let result: Result<(), CoreError> = run_with_retry(&ctx, &policy, move |_attempt| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        })
        .await;

        assert_eq!(result.unwrap_err().kind, ProviderErrorKind::Canceled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
