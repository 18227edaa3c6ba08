// Backup metrics module
//
// Lightweight counters for passes and copies, logged after each pass and at shutdown

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Process-wide backup metrics
///
/// Uses atomic operations so copy tasks running in parallel can record
/// without locks. Counters only ever grow for the lifetime of the process.
#[derive(Debug)]
pub struct Metrics {
    /// Passes started by the scheduler
    pub passes_run: AtomicUsize,

    /// Passes aborted by a pass-level error
    pub passes_failed: AtomicUsize,

    /// Candidates found by the scanner, summed over passes
    pub files_discovered: AtomicUsize,

    pub files_copied: AtomicUsize,

    pub files_failed: AtomicUsize,

    pub batches_run: AtomicUsize,

    /// Total time spent in successful copies, in milliseconds
    pub total_copy_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            passes_run: AtomicUsize::new(0),
            passes_failed: AtomicUsize::new(0),
            files_discovered: AtomicUsize::new(0),
            files_copied: AtomicUsize::new(0),
            files_failed: AtomicUsize::new(0),
            batches_run: AtomicUsize::new(0),
            total_copy_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_pass_started(&self) {
        self.passes_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pass_failed(&self) {
        self.passes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_files_discovered(&self, count: usize) {
        self.files_discovered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_file_copied(&self) {
        self.files_copied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self) {
        self.batches_run.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the duration of one successful copy
    pub fn record_copy_time(&self, duration: Duration) {
        self.total_copy_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average time per successful copy in milliseconds
    pub fn avg_copy_time_ms(&self) -> f64 {
        let total = self.total_copy_time_ms.load(Ordering::Relaxed);
        let count = self.files_copied.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Backup Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Passes: {} run, {} failed",
            self.passes_run.load(Ordering::Relaxed),
            self.passes_failed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Images: {} discovered, {} copied, {} failed in {} batches",
            self.files_discovered.load(Ordering::Relaxed),
            self.files_copied.load(Ordering::Relaxed),
            self.files_failed.load(Ordering::Relaxed),
            self.batches_run.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total copy time: {:.2}s (avg: {:.2}ms per image)",
            self.total_copy_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_copy_time_ms()
        );
    }

    /// Log a one-line snapshot, called after every pass
    pub fn log_periodic(&self) {
        tracing::info!(
            "Metrics: {} passes, {} images copied, {} failed, uptime {:.0}s",
            self.passes_run.load(Ordering::Relaxed),
            self.files_copied.load(Ordering::Relaxed),
            self.files_failed.load(Ordering::Relaxed),
            self.uptime().as_secs_f64()
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
