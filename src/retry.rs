//! Retry executor with exponential backoff and jitter.
//!
//! Wraps fallible async operations and re-invokes them with exponentially
//! growing, jittered delays. Two named profiles cover the engine's external
//! call classes: model completions (longer cool-off, provider-side
//! throttling) and third-party lookup APIs (fail fast, often spuriously).
//!
//! Errors that classify as non-retryable are propagated immediately without
//! consuming attempts.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::time::sleep;

use crate::config::RetryProfilesConfig;

/// Classification consulted before scheduling a retry.
pub trait ErrorClass {
    /// Whether another attempt could plausibly succeed.
    fn retryable(&self) -> bool;
}

/// Bounds for one class of retried operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; the operation runs at most
    /// `max_retries + 1` times.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Profile for LLM completion calls.
    pub fn model_call(config: &RetryProfilesConfig) -> Self {
        Self {
            max_retries: config.model_max_retries,
            base_delay: Duration::from_millis(config.model_base_delay_ms),
            max_delay: Duration::from_millis(config.model_max_delay_ms),
        }
    }

    /// Profile for third-party lookup/search API calls.
    pub fn external_api(config: &RetryProfilesConfig) -> Self {
        Self {
            max_retries: config.api_max_retries,
            base_delay: Duration::from_millis(config.api_base_delay_ms),
            max_delay: Duration::from_millis(config.api_max_delay_ms),
        }
    }
}

/// Terminal outcome of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    #[error("retries exhausted after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: E },
    /// A non-retryable error was propagated without further attempts.
    #[error(transparent)]
    Aborted(E),
}

impl<E> RetryError<E> {
    /// The underlying error, whichever way the retry loop ended.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { source, .. } => source,
            RetryError::Aborted(source) => source,
        }
    }
}

/// Run `operation` under `policy`, retrying retryable failures.
///
/// `on_retry` fires before each backoff sleep with the failed error, the
/// 1-indexed attempt number, and the delay about to be applied.
pub async fn execute<T, E, F, Fut, H>(
    mut operation: F,
    policy: &RetryPolicy,
    mut on_retry: H,
) -> Result<T, RetryError<E>>
where
    E: ErrorClass,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    H: FnMut(&E, u32, Duration),
{
    for attempt in 0..=policy.max_retries {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.retryable() {
                    return Err(RetryError::Aborted(err));
                }

                if attempt == policy.max_retries {
                    return Err(RetryError::Exhausted {
                        attempts: policy.max_retries + 1,
                        source: err,
                    });
                }

                let delay = sample_backoff_delay(attempt, policy);
                on_retry(&err, attempt + 1, delay);
                sleep(delay).await;
            }
        }
    }

    unreachable!("retry loop always returns")
}

fn sample_backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let mut rng = rand::thread_rng();
    backoff_delay(attempt, policy, &mut rng)
}

/// `min(max_delay, 2^attempt * base + jitter)` with jitter uniform in
/// `[-0.25, +0.25]` of the exponential term. Attempt is 0-indexed.
fn backoff_delay<R: Rng + ?Sized>(attempt: u32, policy: &RetryPolicy, rng: &mut R) -> Duration {
    let exponential = policy.base_delay.as_millis() as f64 * 2_f64.powi(attempt as i32);
    let jitter = rng.gen_range(-0.25..=0.25) * exponential;
    let capped = (exponential + jitter)
        .max(0.0)
        .min(policy.max_delay.as_millis() as f64);
    Duration::from_millis(capped.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Error)]
    enum TestError {
        #[error("transient")]
        Transient,
        #[error("fatal")]
        Fatal,
    }

    impl ErrorClass for TestError {
        fn retryable(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn always_failing_operation_runs_exactly_max_retries_plus_one_times() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = execute(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Transient) }
            },
            &fast_policy(3),
            |_, _, _| {},
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(
            result,
            Err(RetryError::Exhausted { attempts: 4, .. })
        ));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = execute(
            || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(TestError::Transient)
                    } else {
                        Ok(42)
                    }
                }
            },
            &fast_policy(2),
            |_, _, _| {},
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_aborts_without_retry() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = execute(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Fatal) }
            },
            &fast_policy(3),
            |_, _, _| {},
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryError::Aborted(TestError::Fatal))));
    }

    #[tokio::test]
    async fn on_retry_reports_one_indexed_attempts() {
        let mut reported = Vec::new();

        let _: Result<(), _> = execute(
            || async { Err(TestError::Transient) },
            &fast_policy(2),
            |_, attempt, _| reported.push(attempt),
        )
        .await;

        assert_eq!(reported, vec![1, 2]);
    }

    #[test]
    fn backoff_grows_exponentially_and_respects_cap() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(8_000),
        };
        let mut rng = StdRng::seed_from_u64(7);

        for attempt in 0..10 {
            let exponential = 1_000.0 * 2_f64.powi(attempt as i32);
            let delay = backoff_delay(attempt, &policy, &mut rng).as_millis() as f64;
            assert!(delay <= 8_000.0, "attempt {}: {} exceeds cap", attempt, delay);
            assert!(
                delay >= (exponential * 0.75).min(8_000.0) - 1.0,
                "attempt {}: {} below jitter band",
                attempt,
                delay
            );
        }
    }

    #[test]
    fn profiles_reflect_configured_call_classes() {
        let config = RetryProfilesConfig::default();

        let model = RetryPolicy::model_call(&config);
        assert_eq!(model.max_retries, 3);
        assert_eq!(model.base_delay, Duration::from_millis(2_000));
        assert_eq!(model.max_delay, Duration::from_millis(60_000));

        let api = RetryPolicy::external_api(&config);
        assert_eq!(api.max_retries, 2);
        assert_eq!(api.base_delay, Duration::from_millis(1_500));
        assert_eq!(api.max_delay, Duration::from_millis(30_000));
    }
}
