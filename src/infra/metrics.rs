//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention. All
//! counter updates are lock-free; reporting is the only operation that
//! needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally - these are
//! statistical counters only. Admission decisions are resolved by the
//! store's CAS, never by these counters.

use crate::domain::checkin::CheckInOutcome;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector for validation traffic
pub struct Metrics {
    /// Total validations ever processed (monotonic)
    validations_total: AtomicU64,
    /// Validations since last report (reset on report)
    validations_since_report: AtomicU64,
    /// Per-outcome totals (monotonic)
    success_total: AtomicU64,
    already_used_total: AtomicU64,
    invalid_total: AtomicU64,
    cancelled_total: AtomicU64,
    /// Infrastructure faults surfaced as outcome Error (monotonic)
    store_errors_total: AtomicU64,
    /// Sum of validation latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max validation latency (reset on report)
    latency_max_us: AtomicU64,
    /// Validation latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            validations_total: AtomicU64::new(0),
            validations_since_report: AtomicU64::new(0),
            success_total: AtomicU64::new(0),
            already_used_total: AtomicU64::new(0),
            invalid_total: AtomicU64::new(0),
            cancelled_total: AtomicU64::new(0),
            store_errors_total: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    /// Record one validation attempt with its outcome and latency (lock-free)
    #[inline]
    pub fn record_validation(&self, outcome: CheckInOutcome, latency_us: u64) {
        self.validations_total.fetch_add(1, Ordering::Relaxed);
        self.validations_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let counter = match outcome {
            CheckInOutcome::Success => &self.success_total,
            CheckInOutcome::AlreadyUsed => &self.already_used_total,
            CheckInOutcome::Invalid => &self.invalid_total,
            CheckInOutcome::Cancelled => &self.cancelled_total,
            CheckInOutcome::Error => &self.store_errors_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    /// Get total validations processed
    #[inline]
    pub fn validations_total(&self) -> u64 {
        self.validations_total.load(Ordering::Relaxed)
    }

    /// Get total successful admissions
    #[inline]
    pub fn success_total(&self) -> u64 {
        self.success_total.load(Ordering::Relaxed)
    }

    /// Get total infrastructure faults
    #[inline]
    pub fn store_errors_total(&self) -> u64 {
        self.store_errors_total.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        let validations_count = self.validations_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        // Monotonic counters (don't reset)
        let validations_total = self.validations_total.load(Ordering::Relaxed);
        let success_total = self.success_total.load(Ordering::Relaxed);
        let already_used_total = self.already_used_total.load(Ordering::Relaxed);
        let invalid_total = self.invalid_total.load(Ordering::Relaxed);
        let cancelled_total = self.cancelled_total.load(Ordering::Relaxed);
        let store_errors_total = self.store_errors_total.load(Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let validations_per_sec = if elapsed.as_secs_f64() > 0.0 {
            validations_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let avg_latency =
            if validations_count > 0 { latency_sum / validations_count } else { 0 };

        MetricsSummary {
            validations_total,
            validations_per_sec,
            success_total,
            already_used_total,
            invalid_total,
            cancelled_total,
            store_errors_total,
            avg_latency_us: avg_latency,
            max_latency_us: max_latency,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            lat_buckets,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub validations_total: u64,
    pub validations_per_sec: f64,
    pub success_total: u64,
    pub already_used_total: u64,
    pub invalid_total: u64,
    pub cancelled_total: u64,
    pub store_errors_total: u64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    /// Validation latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            validations_total = %self.validations_total,
            validations_per_sec = format!("{:.1}", self.validations_per_sec),
            success = %self.success_total,
            already_used = %self.already_used_total,
            invalid = %self.invalid_total,
            cancelled = %self.cancelled_total,
            store_errors = %self.store_errors_total,
            avg_latency_us = %self.avg_latency_us,
            p50_us = %self.lat_p50_us,
            p95_us = %self.lat_p95_us,
            p99_us = %self.lat_p99_us,
            "metrics"
        );
    }
}
