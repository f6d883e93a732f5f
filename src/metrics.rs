//! Batch counters and timing

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use serde::{Deserialize, Serialize};

/// Counters shared by the batch workers
pub struct BatchMetrics {
    pub files_seen: AtomicU64,
    pub files_failed: AtomicU64,
    pub files_skipped: AtomicU64,
    pub outputs_written: AtomicU64,
    pub outputs_failed: AtomicU64,
    pub total_latency_ms: AtomicU64,
}

impl BatchMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A file was decoded (or failed to decode)
    pub fn record_file(&self, decoded: bool) {
        self.files_seen.fetch_add(1, Ordering::Relaxed);
        if !decoded {
            self.files_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A file was never started because the batch was cancelled
    pub fn record_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// One (file, preset) output finished
    pub fn record_output(&self, success: bool, latency_ms: u64) {
        if success {
            self.outputs_written.fetch_add(1, Ordering::Relaxed);
        } else {
            self.outputs_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let written = self.outputs_written.load(Ordering::Relaxed);
        let failed = self.outputs_failed.load(Ordering::Relaxed);
        let attempted = written + failed;
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        MetricsSnapshot {
            files_seen: self.files_seen.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            outputs_written: written,
            outputs_failed: failed,
            error_rate: if attempted > 0 { failed as f64 / attempted as f64 } else { 0.0 },
            avg_latency_ms: if attempted > 0 { total_latency / attempted } else { 0 },
        }
    }
}

impl Default for BatchMetrics {
    fn default() -> Self {
        Self {
            files_seen: AtomicU64::new(0),
            files_failed: AtomicU64::new(0),
            files_skipped: AtomicU64::new(0),
            outputs_written: AtomicU64::new(0),
            outputs_failed: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub files_seen: u64,
    pub files_failed: u64,
    pub files_skipped: u64,
    pub outputs_written: u64,
    pub outputs_failed: u64,
    pub error_rate: f64,
    pub avg_latency_ms: u64,
}

/// Timer for tracking stage latency
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
