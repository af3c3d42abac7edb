//! Retry for read-only evaluations.
//!
//! Only evaluations go through [`retry_evaluate`]; a submit is never re-run
//! because the ledger has no idempotency key for it. An evaluation is
//! re-run while it fails with a transient [`ErrorKind`] (timeouts and
//! connectivity failures) and the policy still has retries left. Every
//! other kind is returned as is.
//!
//! Delays come from [`Backoff`]: the nominal delay starts at
//! `initial_backoff`, doubles per retry and is capped at `max_backoff`. The
//! actual sleep is drawn from the upper half of the nominal delay, so it
//! never exceeds the cap.
//!
//! [`ErrorKind`]: crate::ErrorKind

use std::{future::Future, time::Duration};

use fail::fail_point;
use rand::Rng;

use crate::{config::RetryConfig, error::LedgerError, metrics::GatewayMetrics};

/// Delays between evaluate attempts, one per permitted retry.
#[derive(Debug)]
struct Backoff {
    nominal: Duration,
    cap: Duration,
    remaining: u32,
}

impl Backoff {
    fn new(config: &RetryConfig) -> Self {
        Self { nominal: config.initial_backoff, cap: config.max_backoff, remaining: config.max_retries }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        self.remaining = self.remaining.checked_sub(1)?;
        let nominal = self.nominal.min(self.cap);
        self.nominal = self.nominal.saturating_mul(2);

        let half = nominal / 2;
        let spread = u64::try_from((nominal - half).as_micros()).unwrap_or(u64::MAX);
        Some(half + Duration::from_micros(rand::rng().random_range(0..=spread)))
    }
}

/// Runs `evaluate`, re-running it after transient failures.
///
/// Returns the first success, the first non-transient error, or the error
/// of the last attempt once the policy's retries are spent.
#[tracing::instrument(name = "retry_evaluate", skip_all, fields(max_retries = config.max_retries))]
pub(crate) async fn retry_evaluate<F, Fut, T>(
    config: &RetryConfig,
    metrics: &GatewayMetrics,
    mut evaluate: F,
) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut delays = Backoff::new(config);
    let mut attempt = 1u32;
    loop {
        let err = match evaluate().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "evaluate succeeded on retry");
                }
                return Ok(value);
            },
            Err(err) => err,
        };

        if !err.kind().is_transient() {
            return Err(err);
        }
        let Some(delay) = delays.next() else {
            if attempt > 1 {
                tracing::debug!(attempts = attempt, kind = %err.kind(), "evaluate retries exhausted");
            }
            return Err(err);
        };

        metrics.record_retry();
        tracing::debug!(
            attempt,
            kind = %err.kind(),
            error = %err,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "transient evaluate failure",
        );
        fail_point!("retry-before-sleep");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::ErrorKind;

    fn policy(max_retries: u32, initial_ms: u64, max_ms: u64) -> RetryConfig {
        RetryConfig::builder()
            .max_retries(max_retries)
            .initial_backoff(Duration::from_millis(initial_ms))
            .max_backoff(Duration::from_millis(max_ms))
            .build()
            .unwrap()
    }

    #[test]
    fn backoff_yields_one_delay_per_retry() {
        assert_eq!(Backoff::new(&policy(3, 10, 100)).count(), 3);
        assert_eq!(Backoff::new(&RetryConfig::default()).count(), 0);
    }

    #[test]
    fn backoff_doubles_within_upper_half() {
        let delays: Vec<_> = Backoff::new(&policy(3, 100, 10_000)).collect();
        for (delay, nominal) in delays.iter().zip([100, 200, 400]) {
            assert!(*delay >= Duration::from_millis(nominal / 2), "{delay:?}");
            assert!(*delay <= Duration::from_millis(nominal), "{delay:?}");
        }
    }

    #[test]
    fn backoff_never_exceeds_cap() {
        assert!(Backoff::new(&policy(20, 1_000, 2_000)).all(|d| d <= Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn default_policy_runs_once() {
        let metrics = GatewayMetrics::new();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_evaluate(&RetryConfig::default(), &metrics, || {
            calls.fetch_add(1, Ordering::Relaxed);
            async { Err(LedgerError::new(ErrorKind::Timeout, "slow")) }
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Timeout);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.snapshot().retry_count, 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let metrics = GatewayMetrics::new();
        let calls = AtomicU32::new(0);
        let result = retry_evaluate(&policy(3, 1, 5), &metrics, || {
            let n = calls.fetch_add(1, Ordering::Relaxed);
            async move {
                if n < 2 { Err(LedgerError::new(ErrorKind::ConnectivityLost, "reset")) } else { Ok(n) }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(metrics.snapshot().retry_count, 2);
    }

    #[tokio::test]
    async fn business_outcomes_are_not_retried() {
        let metrics = GatewayMetrics::new();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_evaluate(&policy(3, 1, 5), &metrics, || {
            calls.fetch_add(1, Ordering::Relaxed);
            async { Err(LedgerError::new(ErrorKind::EndorsementFailed, "denied")) }
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::EndorsementFailed);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_error() {
        let metrics = GatewayMetrics::new();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_evaluate(&policy(2, 1, 5), &metrics, || {
            let n = calls.fetch_add(1, Ordering::Relaxed);
            async move { Err(LedgerError::new(ErrorKind::Timeout, format!("attempt {n}"))) }
        })
        .await;

        assert_eq!(result.unwrap_err().message(), "attempt 2");
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.snapshot().retry_count, 2);
    }
}
