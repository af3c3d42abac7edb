//! Gateway metrics.
//!
//! Lock-free counters for session lifecycle, invocations and classified
//! failures. All atomics use `Ordering::Relaxed`: each counter is
//! independent and monotonically increasing, and a [`MetricsSnapshot`] is
//! not a point-in-time view across counters.
//!
//! ```
//! use claimledger_gateway::{ErrorKind, GatewayMetrics};
//!
//! let metrics = GatewayMetrics::new();
//! metrics.record_evaluate(std::time::Duration::from_micros(250));
//! metrics.record_failure(ErrorKind::Timeout);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.evaluate_count, 1);
//! assert_eq!(snapshot.failures(ErrorKind::Timeout), 1);
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::error::ErrorKind;

const KIND_COUNT: usize = ErrorKind::ALL.len();

/// Point-in-time copy of the gateway counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Sessions successfully established.
    pub sessions_established: u64,
    /// Sessions removed from the cache after a connectivity failure or channel change.
    pub sessions_evicted: u64,
    /// `acquire` calls served from the session cache.
    pub cache_hits: u64,
    /// `acquire` calls that had to establish (or wait for) a session.
    pub cache_misses: u64,
    /// Completed submits.
    pub submit_count: u64,
    /// Completed evaluates.
    pub evaluate_count: u64,
    /// Cumulative submit latency in microseconds.
    pub submit_latency_us: u64,
    /// Cumulative evaluate latency in microseconds.
    pub evaluate_latency_us: u64,
    /// Evaluate retries performed.
    pub retry_count: u64,
    /// Evaluate responses that could not be decoded as JSON.
    pub decode_warnings: u64,
    failures: [u64; KIND_COUNT],
}

impl MetricsSnapshot {
    /// Failures recorded for `kind`.
    #[must_use]
    pub fn failures(&self, kind: ErrorKind) -> u64 {
        self.failures[kind.index()]
    }

    /// Failures across all kinds.
    #[must_use]
    pub fn total_failures(&self) -> u64 {
        self.failures.iter().sum()
    }

    /// Fraction of `acquire` calls served from cache.
    #[must_use]
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 { 0.0 } else { self.cache_hits as f64 / total as f64 }
    }

    /// Average evaluate latency in microseconds.
    #[must_use]
    pub fn avg_evaluate_latency_us(&self) -> f64 {
        if self.evaluate_count == 0 {
            0.0
        } else {
            self.evaluate_latency_us as f64 / self.evaluate_count as f64
        }
    }

    /// Average submit latency in microseconds.
    #[must_use]
    pub fn avg_submit_latency_us(&self) -> f64 {
        if self.submit_count == 0 { 0.0 } else { self.submit_latency_us as f64 / self.submit_count as f64 }
    }
}

/// Shared, cheaply cloneable gateway counters.
#[derive(Clone, Default)]
pub struct GatewayMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    sessions_established: AtomicU64,
    sessions_evicted: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    submit_count: AtomicU64,
    evaluate_count: AtomicU64,
    submit_latency_us: AtomicU64,
    evaluate_latency_us: AtomicU64,
    retry_count: AtomicU64,
    decode_warnings: AtomicU64,
    failures: [AtomicU64; KIND_COUNT],
}

impl std::fmt::Debug for GatewayMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("GatewayMetrics").field(&self.snapshot()).finish()
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

impl GatewayMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly established session.
    pub fn record_session_established(&self) {
        self.inner.sessions_established.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a session removed from the cache.
    pub fn record_session_evicted(&self) {
        self.inner.sessions_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an `acquire` served from cache.
    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an `acquire` that missed the cache.
    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a completed submit.
    pub fn record_submit(&self, duration: Duration) {
        self.inner.submit_count.fetch_add(1, Ordering::Relaxed);
        self.inner.submit_latency_us.fetch_add(micros(duration), Ordering::Relaxed);
    }

    /// Records a completed evaluate.
    pub fn record_evaluate(&self, duration: Duration) {
        self.inner.evaluate_count.fetch_add(1, Ordering::Relaxed);
        self.inner.evaluate_latency_us.fetch_add(micros(duration), Ordering::Relaxed);
    }

    /// Records an evaluate retry.
    pub fn record_retry(&self) {
        self.inner.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an undecodable evaluate response.
    pub fn record_decode_warning(&self) {
        self.inner.decode_warnings.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a classified failure.
    pub fn record_failure(&self, kind: ErrorKind) {
        self.inner.failures[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        MetricsSnapshot {
            sessions_established: inner.sessions_established.load(Ordering::Relaxed),
            sessions_evicted: inner.sessions_evicted.load(Ordering::Relaxed),
            cache_hits: inner.cache_hits.load(Ordering::Relaxed),
            cache_misses: inner.cache_misses.load(Ordering::Relaxed),
            submit_count: inner.submit_count.load(Ordering::Relaxed),
            evaluate_count: inner.evaluate_count.load(Ordering::Relaxed),
            submit_latency_us: inner.submit_latency_us.load(Ordering::Relaxed),
            evaluate_latency_us: inner.evaluate_latency_us.load(Ordering::Relaxed),
            retry_count: inner.retry_count.load(Ordering::Relaxed),
            decode_warnings: inner.decode_warnings.load(Ordering::Relaxed),
            failures: std::array::from_fn(|i| inner.failures[i].load(Ordering::Relaxed)),
        }
    }

    /// Logs the current counters at INFO level.
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            sessions_established = snapshot.sessions_established,
            sessions_evicted = snapshot.sessions_evicted,
            cache_hit_rate = snapshot.cache_hit_rate(),
            submit_count = snapshot.submit_count,
            evaluate_count = snapshot.evaluate_count,
            avg_submit_latency_us = snapshot.avg_submit_latency_us(),
            avg_evaluate_latency_us = snapshot.avg_evaluate_latency_us(),
            retry_count = snapshot.retry_count,
            total_failures = snapshot.total_failures(),
            "Gateway metrics snapshot"
        );
    }
}
