//! Lock-free counters and periodic summary logging
//!
//! Uses atomics on the hot path so recording never contends with the
//! tracker lock. `report()` swaps the per-interval counters to take a
//! snapshot.
//!
//! NOTE: All atomics use Relaxed ordering. These are statistical counters
//! only; do NOT use them for coordination or logic decisions.

use crate::domain::types::EventKind;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
pub const METRICS_NUM_BUCKETS: usize = 11;

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
fn swap_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Sensor reports processed (monotonic)
    reports_total: AtomicU64,
    /// Reads run through the tracking pipeline (monotonic)
    reads_total: AtomicU64,
    /// Reads since last report (reset on report)
    reads_since_report: AtomicU64,
    /// Reads dropped by a sensor's minimum RSSI filter (monotonic)
    reads_filtered: AtomicU64,
    /// Per-report processing latency (reset on report)
    latency_sum_us: AtomicU64,
    latency_max_us: AtomicU64,
    latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    /// Emitted events by kind (monotonic)
    arrivals_total: AtomicU64,
    moves_total: AtomicU64,
    departures_total: AtomicU64,
    returns_total: AtomicU64,
    /// Tags evicted by the age-out sweep (monotonic)
    aged_out_total: AtomicU64,
    /// Exiting tags finalized into departures (monotonic)
    exit_departures_total: AtomicU64,
    /// Inbound messages dropped because the tracker channel was full (monotonic)
    ingress_dropped: AtomicU64,
    /// Egress messages dropped because the publisher channel was full (monotonic)
    egress_dropped: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            reports_total: AtomicU64::new(0),
            reads_total: AtomicU64::new(0),
            reads_since_report: AtomicU64::new(0),
            reads_filtered: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            arrivals_total: AtomicU64::new(0),
            moves_total: AtomicU64::new(0),
            departures_total: AtomicU64::new(0),
            returns_total: AtomicU64::new(0),
            aged_out_total: AtomicU64::new(0),
            exit_departures_total: AtomicU64::new(0),
            ingress_dropped: AtomicU64::new(0),
            egress_dropped: AtomicU64::new(0),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    /// Record a processed sensor report with its read count and latency
    #[inline]
    pub fn record_report(&self, reads: u64, latency_us: u64) {
        self.reports_total.fetch_add(1, Ordering::Relaxed);
        self.reads_total.fetch_add(reads, Ordering::Relaxed);
        self.reads_since_report.fetch_add(reads, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_read_filtered(&self) {
        self.reads_filtered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event(&self, kind: EventKind) {
        let counter = match kind {
            EventKind::Arrival => &self.arrivals_total,
            EventKind::Moved => &self.moves_total,
            EventKind::Departed => &self.departures_total,
            EventKind::Returned => &self.returns_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_aged_out(&self, count: u64) {
        self.aged_out_total.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_exit_departures(&self, count: u64) {
        self.exit_departures_total.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ingress_dropped(&self) {
        self.ingress_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_egress_dropped(&self) {
        self.egress_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reads_total(&self) -> u64 {
        self.reads_total.load(Ordering::Relaxed)
    }

    pub fn reads_filtered(&self) -> u64 {
        self.reads_filtered.load(Ordering::Relaxed)
    }

    pub fn events_total(&self, kind: EventKind) -> u64 {
        match kind {
            EventKind::Arrival => self.arrivals_total.load(Ordering::Relaxed),
            EventKind::Moved => self.moves_total.load(Ordering::Relaxed),
            EventKind::Departed => self.departures_total.load(Ordering::Relaxed),
            EventKind::Returned => self.returns_total.load(Ordering::Relaxed),
        }
    }

    pub fn egress_dropped(&self) -> u64 {
        self.egress_dropped.load(Ordering::Relaxed)
    }

    /// Take a snapshot, resetting the per-interval counters
    pub fn report(&self, tracked_tags: usize, exiting_tags: usize) -> MetricsSummary {
        let now = Instant::now();
        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *last = now;
            elapsed
        };

        let reads = self.reads_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);
        let reports: u64 = lat_buckets.iter().sum();

        MetricsSummary {
            reports_total: self.reports_total.load(Ordering::Relaxed),
            reads_total: self.reads_total.load(Ordering::Relaxed),
            reads_per_sec: if elapsed_secs > 0.0 { reads as f64 / elapsed_secs } else { 0.0 },
            reads_filtered: self.reads_filtered.load(Ordering::Relaxed),
            avg_report_latency_us: if reports > 0 { latency_sum / reports } else { 0 },
            max_report_latency_us: latency_max,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            arrivals_total: self.arrivals_total.load(Ordering::Relaxed),
            moves_total: self.moves_total.load(Ordering::Relaxed),
            departures_total: self.departures_total.load(Ordering::Relaxed),
            returns_total: self.returns_total.load(Ordering::Relaxed),
            aged_out_total: self.aged_out_total.load(Ordering::Relaxed),
            exit_departures_total: self.exit_departures_total.load(Ordering::Relaxed),
            ingress_dropped: self.ingress_dropped.load(Ordering::Relaxed),
            egress_dropped: self.egress_dropped.load(Ordering::Relaxed),
            tracked_tags,
            exiting_tags,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub reports_total: u64,
    pub reads_total: u64,
    pub reads_per_sec: f64,
    pub reads_filtered: u64,
    pub avg_report_latency_us: u64,
    pub max_report_latency_us: u64,
    pub lat_p50_us: u64,
    pub lat_p99_us: u64,
    pub arrivals_total: u64,
    pub moves_total: u64,
    pub departures_total: u64,
    pub returns_total: u64,
    pub aged_out_total: u64,
    pub exit_departures_total: u64,
    pub ingress_dropped: u64,
    pub egress_dropped: u64,
    pub tracked_tags: usize,
    pub exiting_tags: usize,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            reports_total = %self.reports_total,
            reads_total = %self.reads_total,
            reads_per_sec = %format!("{:.1}", self.reads_per_sec),
            reads_filtered = %self.reads_filtered,
            avg_latency_us = %self.avg_report_latency_us,
            max_latency_us = %self.max_report_latency_us,
            lat_p50_us = %self.lat_p50_us,
            lat_p99_us = %self.lat_p99_us,
            arrivals = %self.arrivals_total,
            moves = %self.moves_total,
            departures = %self.departures_total,
            returns = %self.returns_total,
            aged_out = %self.aged_out_total,
            exit_departures = %self.exit_departures_total,
            ingress_dropped = %self.ingress_dropped,
            egress_dropped = %self.egress_dropped,
            tracked_tags = %self.tracked_tags,
            exiting_tags = %self.exiting_tags,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(50), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(60_000), 10);
    }

    #[test]
    fn test_report_resets_interval_counters() {
        let metrics = Metrics::new();
        metrics.record_report(5, 150);
        metrics.record_report(3, 90);

        let summary = metrics.report(7, 1);
        assert_eq!(summary.reports_total, 2);
        assert_eq!(summary.reads_total, 8);
        assert_eq!(summary.max_report_latency_us, 150);
        assert_eq!(summary.avg_report_latency_us, 120);
        assert_eq!(summary.tracked_tags, 7);

        let summary = metrics.report(7, 1);
        assert_eq!(summary.reads_total, 8);
        assert_eq!(summary.max_report_latency_us, 0);
        assert_eq!(summary.avg_report_latency_us, 0);
    }

    #[test]
    fn test_event_counters() {
        let metrics = Metrics::new();
        metrics.record_event(EventKind::Arrival);
        metrics.record_event(EventKind::Arrival);
        metrics.record_event(EventKind::Departed);

        assert_eq!(metrics.events_total(EventKind::Arrival), 2);
        assert_eq!(metrics.events_total(EventKind::Departed), 1);
        assert_eq!(metrics.events_total(EventKind::Moved), 0);
    }

    #[test]
    fn test_percentile_from_buckets() {
        let mut buckets = [0u64; METRICS_NUM_BUCKETS];
        buckets[0] = 90;
        buckets[5] = 10;
        assert_eq!(percentile_from_buckets(&buckets, 0.5), 100);
        assert_eq!(percentile_from_buckets(&buckets, 0.99), 3200);
        assert_eq!(percentile_from_buckets(&[0; METRICS_NUM_BUCKETS], 0.5), 0);
    }
}
