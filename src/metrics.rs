//! Counters and timing for migration runs.

use std::sync::atomic::{AtomicU64, Ordering};

use std::time::Instant;

/// Per-run record counters.
#[derive(Debug, Default)]
pub struct MigrationMetrics {
    /// Documents read from the source
    pub records_scanned: AtomicU64,
    /// Rows inserted
    pub records_inserted: AtomicU64,
    /// Rows skipped because the key already existed
    pub records_skipped: AtomicU64,
    /// Records whose insert failed
    pub records_failed: AtomicU64,
}

impl MigrationMetrics {
    /// Create new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the size of the source scan.
    pub fn record_scanned(&self, count: u64) {
        self.records_scanned.fetch_add(count, Ordering::Relaxed);
    }

    /// Record an inserted row.
    pub fn record_inserted(&self) {
        self.records_inserted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a row skipped on key conflict.
    pub fn record_skipped(&self) {
        self.records_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed insert.
    pub fn record_failed(&self) {
        self.records_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records handled so far, whatever the outcome.
    pub fn processed(&self) -> u64 {
        self.records_inserted.load(Ordering::Relaxed)
            + self.records_skipped.load(Ordering::Relaxed)
            + self.records_failed.load(Ordering::Relaxed)
    }

    /// Get snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_scanned: self.records_scanned.load(Ordering::Relaxed),
            records_inserted: self.records_inserted.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        self.records_scanned.store(0, Ordering::Relaxed);
        self.records_inserted.store(0, Ordering::Relaxed);
        self.records_skipped.store(0, Ordering::Relaxed);
        self.records_failed.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents read from the source
    pub records_scanned: u64,
    /// Rows inserted
    pub records_inserted: u64,
    /// Rows skipped because the key already existed
    pub records_skipped: u64,
    /// Records whose insert failed
    pub records_failed: u64,
}

impl MetricsSnapshot {
    /// Calculate records per second over `duration_ms`.
    pub fn records_per_second(&self, duration_ms: u64) -> f64 {
        if duration_ms == 0 {
            0.0
        } else {
            (self.records_scanned as f64 * 1000.0) / duration_ms as f64
        }
    }
}

/// Timer for measuring operation duration.
pub struct Timer {
    start: Instant,
    label: String,
}

impl Timer {
    /// Start a new timer.
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
        }
    }

    /// Get elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Stop timer and log duration.
    pub fn stop(self) -> u64 {
        let elapsed = self.elapsed_ms();
        tracing::debug!("{} completed in {}ms", self.label, elapsed);
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = MigrationMetrics::new();

        metrics.record_scanned(4);
        metrics.record_inserted();
        metrics.record_inserted();
        metrics.record_skipped();
        metrics.record_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.records_scanned, 4);
        assert_eq!(snapshot.records_inserted, 2);
        assert_eq!(snapshot.records_skipped, 1);
        assert_eq!(snapshot.records_failed, 1);
        assert_eq!(metrics.processed(), 4);

        metrics.reset();
        assert_eq!(metrics.processed(), 0);
    }

    #[test]
    fn test_records_per_second() {
        let snapshot = MetricsSnapshot {
            records_scanned: 1000,
            records_inserted: 990,
            records_skipped: 5,
            records_failed: 5,
        };

        assert!((snapshot.records_per_second(5000) - 200.0).abs() < 0.001);
        assert_eq!(snapshot.records_per_second(0), 0.0);
    }
}
