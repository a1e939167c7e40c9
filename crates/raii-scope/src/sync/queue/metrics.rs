use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Queue metrics for monitoring
#[derive(Debug, Default)]
pub struct QueueMetrics {
    pub total_enqueued: AtomicU64,
    pub total_completed: AtomicU64,
    pub total_failed: AtomicU64,
    pub total_panicked: AtomicU64,
    pub total_unobserved: AtomicU64,
    pub processing_time_total_ms: AtomicU64,
}

impl QueueMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record enqueue operation
    pub fn record_enqueue(&self) {
        self.total_enqueued.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Record a unit that finished successfully
    pub fn record_completion(&self, duration_ms: u64) {
        self.total_completed.fetch_add(1, AtomicOrdering::Relaxed);
        self.processing_time_total_ms.fetch_add(duration_ms, AtomicOrdering::Relaxed);
    }

    /// Record a unit that returned an error
    pub fn record_failure(&self, duration_ms: u64) {
        self.total_failed.fetch_add(1, AtomicOrdering::Relaxed);
        self.processing_time_total_ms.fetch_add(duration_ms, AtomicOrdering::Relaxed);
    }

    /// Record a unit that panicked
    ///
    /// Panics also count as failures.
    pub fn record_panic(&self, duration_ms: u64) {
        self.total_panicked.fetch_add(1, AtomicOrdering::Relaxed);
        self.record_failure(duration_ms);
    }

    /// Record a failure nobody awaited
    pub fn record_unobserved(&self) {
        self.total_unobserved.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Take a point-in-time copy of every counter
    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            total_enqueued: self.total_enqueued.load(AtomicOrdering::Acquire),
            total_completed: self.total_completed.load(AtomicOrdering::Acquire),
            total_failed: self.total_failed.load(AtomicOrdering::Acquire),
            total_panicked: self.total_panicked.load(AtomicOrdering::Acquire),
            total_unobserved: self.total_unobserved.load(AtomicOrdering::Acquire),
            processing_time_total_ms: self.processing_time_total_ms.load(AtomicOrdering::Acquire),
        }
    }
}

/// Snapshot of queue metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueMetricsSnapshot {
    pub total_enqueued: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_panicked: u64,
    pub total_unobserved: u64,
    pub processing_time_total_ms: u64,
}

impl QueueMetricsSnapshot {
    /// Units enqueued but not yet finished (including the one running)
    pub fn depth(&self) -> u64 {
        self.total_enqueued.saturating_sub(self.total_completed + self.total_failed)
    }

    /// Fraction of finished units that failed (0.0 to 1.0)
    pub fn failure_rate(&self) -> f64 {
        let finished = self.total_completed + self.total_failed;
        if finished == 0 {
            return 0.0;
        }
        self.total_failed as f64 / finished as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_depth_and_failure_rate() {
        let metrics = QueueMetrics::new();
        for _ in 0..4 {
            metrics.record_enqueue();
        }
        metrics.record_completion(3);
        metrics.record_failure(1);
        metrics.record_panic(0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.depth(), 1);
        assert_eq!(snapshot.total_failed, 2);
        assert_eq!(snapshot.total_panicked, 1);
        assert_eq!(snapshot.processing_time_total_ms, 4);
        assert!((snapshot.failure_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = QueueMetrics::new().snapshot();
        assert_eq!(snapshot, QueueMetricsSnapshot::default());
        assert_eq!(snapshot.failure_rate(), 0.0);
    }
}
