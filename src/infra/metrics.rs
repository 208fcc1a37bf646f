//! Lock-free metrics collection and periodic reporting
//!
//! Counters are plain atomics updated from the scheduler and the alert tasks.
//! Reporting swaps the per-period values to zero; totals are monotonic.
//!
//! NOTE: All atomics use Relaxed ordering. These are statistical counters only,
//! never use them for coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Sweep duration bucket boundaries (milliseconds)
/// Buckets: ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, ≤10000, ≤30000, ≤60000, ≤120000, >120000
pub const SWEEP_BUCKET_BOUNDS: [u64; 10] =
    [100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000, 60_000, 120_000];
pub const NUM_BUCKETS: usize = 11;

#[inline]
fn bucket_index(duration_ms: u64) -> usize {
    SWEEP_BUCKET_BOUNDS.partition_point(|&bound| bound < duration_ms)
}

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

/// Upper bound of the bucket holding the given percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;
    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return SWEEP_BUCKET_BOUNDS.get(i).copied().unwrap_or(SWEEP_BUCKET_BOUNDS[9] * 2);
        }
    }
    SWEEP_BUCKET_BOUNDS[9] * 2
}

/// Which sweep a duration belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    Main,
    Priority,
}

impl SweepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SweepKind::Main => "main",
            SweepKind::Priority => "priority",
        }
    }
}

/// Lock-free metrics collector
pub struct Metrics {
    main_sweeps_total: AtomicU64,
    priority_sweeps_total: AtomicU64,
    /// Sweeps since last report (reset on report)
    sweeps_since_report: AtomicU64,
    /// Sweep duration histogram (reset on report)
    sweep_buckets: [AtomicU64; NUM_BUCKETS],
    sweep_duration_sum_ms: AtomicU64,
    sweep_duration_max_ms: AtomicU64,
    /// Cumulative sweep duration histogram for the Prometheus endpoint
    sweep_buckets_total: [AtomicU64; NUM_BUCKETS],
    sweep_duration_sum_ms_total: AtomicU64,
    fetch_success_total: AtomicU64,
    fetch_failed_total: AtomicU64,
    fetch_retries_total: AtomicU64,
    rate_limited_total: AtomicU64,
    budget_suspensions_total: AtomicU64,
    transitions_total: AtomicU64,
    recoveries_total: AtomicU64,
    alerts_sent_total: AtomicU64,
    alerts_skipped_total: AtomicU64,
    alerts_failed_total: AtomicU64,
    persistence_errors_total: AtomicU64,
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            main_sweeps_total: AtomicU64::new(0),
            priority_sweeps_total: AtomicU64::new(0),
            sweeps_since_report: AtomicU64::new(0),
            sweep_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            sweep_duration_sum_ms: AtomicU64::new(0),
            sweep_duration_max_ms: AtomicU64::new(0),
            sweep_buckets_total: std::array::from_fn(|_| AtomicU64::new(0)),
            sweep_duration_sum_ms_total: AtomicU64::new(0),
            fetch_success_total: AtomicU64::new(0),
            fetch_failed_total: AtomicU64::new(0),
            fetch_retries_total: AtomicU64::new(0),
            rate_limited_total: AtomicU64::new(0),
            budget_suspensions_total: AtomicU64::new(0),
            transitions_total: AtomicU64::new(0),
            recoveries_total: AtomicU64::new(0),
            alerts_sent_total: AtomicU64::new(0),
            alerts_skipped_total: AtomicU64::new(0),
            alerts_failed_total: AtomicU64::new(0),
            persistence_errors_total: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a completed sweep and its wall-clock duration
    pub fn record_sweep(&self, kind: SweepKind, duration_ms: u64) {
        match kind {
            SweepKind::Main => self.main_sweeps_total.fetch_add(1, Ordering::Relaxed),
            SweepKind::Priority => self.priority_sweeps_total.fetch_add(1, Ordering::Relaxed),
        };
        self.sweeps_since_report.fetch_add(1, Ordering::Relaxed);

        let bucket = bucket_index(duration_ms);
        self.sweep_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.sweep_buckets_total[bucket].fetch_add(1, Ordering::Relaxed);
        self.sweep_duration_sum_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.sweep_duration_sum_ms_total.fetch_add(duration_ms, Ordering::Relaxed);
        update_atomic_max(&self.sweep_duration_max_ms, duration_ms);
    }

    #[inline]
    pub fn record_fetch_success(&self) {
        self.fetch_success_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fetch_failed(&self) {
        self.fetch_failed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fetch_retry(&self) {
        self.fetch_retries_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_budget_suspension(&self) {
        self.budget_suspensions_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_transition(&self) {
        self.transitions_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_recovery(&self) {
        self.recoveries_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alert_sent(&self) {
        self.alerts_sent_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alert_skipped(&self) {
        self.alerts_skipped_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alert_failed(&self) {
        self.alerts_failed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_persistence_error(&self) {
        self.persistence_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Monotonic counters for the Prometheus endpoint
    pub fn totals(&self) -> MetricsTotals {
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
        let mut sweep_buckets = [0u64; NUM_BUCKETS];
        for (i, bucket) in self.sweep_buckets_total.iter().enumerate() {
            sweep_buckets[i] = load(bucket);
        }

        MetricsTotals {
            main_sweeps: load(&self.main_sweeps_total),
            priority_sweeps: load(&self.priority_sweeps_total),
            sweep_buckets,
            sweep_duration_sum_ms: load(&self.sweep_duration_sum_ms_total),
            fetch_success: load(&self.fetch_success_total),
            fetch_failed: load(&self.fetch_failed_total),
            fetch_retries: load(&self.fetch_retries_total),
            rate_limited: load(&self.rate_limited_total),
            budget_suspensions: load(&self.budget_suspensions_total),
            transitions: load(&self.transitions_total),
            recoveries: load(&self.recoveries_total),
            alerts_sent: load(&self.alerts_sent_total),
            alerts_skipped: load(&self.alerts_skipped_total),
            alerts_failed: load(&self.alerts_failed_total),
            persistence_errors: load(&self.persistence_errors_total),
        }
    }

    /// Snapshot and reset the periodic counters
    pub fn report(&self, zones_total: usize, zones_offline: usize) -> MetricsSummary {
        let now = Instant::now();
        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *last = now;
            elapsed
        };

        let sweeps = self.sweeps_since_report.swap(0, Ordering::Relaxed);
        let sum_ms = self.sweep_duration_sum_ms.swap(0, Ordering::Relaxed);
        let max_ms = self.sweep_duration_max_ms.swap(0, Ordering::Relaxed);
        let mut buckets = [0u64; NUM_BUCKETS];
        for (i, bucket) in self.sweep_buckets.iter().enumerate() {
            buckets[i] = bucket.swap(0, Ordering::Relaxed);
        }

        let totals = self.totals();
        MetricsSummary {
            period_secs: elapsed_secs,
            sweeps,
            avg_sweep_ms: if sweeps > 0 { sum_ms / sweeps } else { 0 },
            max_sweep_ms: max_ms,
            sweep_p95_ms: percentile_from_buckets(&buckets, 0.95),
            zones_total,
            zones_offline,
            totals,
        }
    }
}

/// Monotonic counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsTotals {
    pub main_sweeps: u64,
    pub priority_sweeps: u64,
    /// Per-bucket (non-cumulative) sweep counts, bounds in `SWEEP_BUCKET_BOUNDS`
    pub sweep_buckets: [u64; NUM_BUCKETS],
    pub sweep_duration_sum_ms: u64,
    pub fetch_success: u64,
    pub fetch_failed: u64,
    pub fetch_retries: u64,
    pub rate_limited: u64,
    pub budget_suspensions: u64,
    pub transitions: u64,
    pub recoveries: u64,
    pub alerts_sent: u64,
    pub alerts_skipped: u64,
    pub alerts_failed: u64,
    pub persistence_errors: u64,
}

/// One reporting period
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub period_secs: f64,
    pub sweeps: u64,
    pub avg_sweep_ms: u64,
    pub max_sweep_ms: u64,
    pub sweep_p95_ms: u64,
    pub zones_total: usize,
    pub zones_offline: usize,
    pub totals: MetricsTotals,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            period_secs = format!("{:.0}", self.period_secs),
            sweeps = %self.sweeps,
            avg_sweep_ms = %self.avg_sweep_ms,
            max_sweep_ms = %self.max_sweep_ms,
            p95_sweep_ms = %self.sweep_p95_ms,
            zones = %self.zones_total,
            offline = %self.zones_offline,
            fetch_ok = %self.totals.fetch_success,
            fetch_failed = %self.totals.fetch_failed,
            rate_limited = %self.totals.rate_limited,
            transitions = %self.totals.transitions,
            alerts_sent = %self.totals.alerts_sent,
            "metrics"
        );
    }
}
