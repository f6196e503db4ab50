//! Export Metrics
//!
//! Thread-safe counters for monitoring partition exports.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Thread-safe metrics for tracking partition exports
#[derive(Debug, Clone)]
pub struct ExportMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    runs_started: AtomicUsize,
    runs_succeeded: AtomicUsize,
    runs_failed: AtomicUsize,
    /// Files found under detached partition directories
    files_discovered: AtomicUsize,
    files_uploaded: AtomicUsize,
    files_failed: AtomicUsize,
    bytes_uploaded: AtomicU64,
    directories_cleaned: AtomicUsize,
}

impl Default for ExportMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                runs_started: AtomicUsize::new(0),
                runs_succeeded: AtomicUsize::new(0),
                runs_failed: AtomicUsize::new(0),
                files_discovered: AtomicUsize::new(0),
                files_uploaded: AtomicUsize::new(0),
                files_failed: AtomicUsize::new(0),
                bytes_uploaded: AtomicU64::new(0),
                directories_cleaned: AtomicUsize::new(0),
            }),
        }
    }

    pub fn record_run_started(&self) {
        self.inner.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_succeeded(&self) {
        self.inner.runs_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_failed(&self) {
        self.inner.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_files_discovered(&self, count: usize) {
        self.inner
            .files_discovered
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Record a successful upload of `bytes`
    pub fn record_file_uploaded(&self, bytes: u64) {
        self.inner.files_uploaded.fetch_add(1, Ordering::Relaxed);
        self.inner
            .bytes_uploaded
            .fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_file_failed(&self) {
        self.inner.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_directory_cleaned(&self) {
        self.inner
            .directories_cleaned
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn runs_started(&self) -> usize {
        self.inner.runs_started.load(Ordering::Relaxed)
    }

    pub fn runs_succeeded(&self) -> usize {
        self.inner.runs_succeeded.load(Ordering::Relaxed)
    }

    pub fn runs_failed(&self) -> usize {
        self.inner.runs_failed.load(Ordering::Relaxed)
    }

    pub fn files_discovered(&self) -> usize {
        self.inner.files_discovered.load(Ordering::Relaxed)
    }

    pub fn files_uploaded(&self) -> usize {
        self.inner.files_uploaded.load(Ordering::Relaxed)
    }

    pub fn files_failed(&self) -> usize {
        self.inner.files_failed.load(Ordering::Relaxed)
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.inner.bytes_uploaded.load(Ordering::Relaxed)
    }

    pub fn directories_cleaned(&self) -> usize {
        self.inner.directories_cleaned.load(Ordering::Relaxed)
    }

    /// Snapshot of all counters
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            runs_started: self.runs_started(),
            runs_succeeded: self.runs_succeeded(),
            runs_failed: self.runs_failed(),
            files_discovered: self.files_discovered(),
            files_uploaded: self.files_uploaded(),
            files_failed: self.files_failed(),
            bytes_uploaded: self.bytes_uploaded(),
            directories_cleaned: self.directories_cleaned(),
        }
    }
}

/// Point-in-time copy of [`ExportMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSummary {
    pub runs_started: usize,
    pub runs_succeeded: usize,
    pub runs_failed: usize,
    pub files_discovered: usize,
    pub files_uploaded: usize,
    pub files_failed: usize,
    pub bytes_uploaded: u64,
    pub directories_cleaned: usize,
}

impl MetricsSummary {
    pub fn log(&self) {
        tracing::info!(
            runs_started = self.runs_started,
            runs_succeeded = self.runs_succeeded,
            runs_failed = self.runs_failed,
            files_discovered = self.files_discovered,
            files_uploaded = self.files_uploaded,
            files_failed = self.files_failed,
            bytes_uploaded = self.bytes_uploaded,
            directories_cleaned = self.directories_cleaned,
            "Export metrics summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = ExportMetrics::new();

        metrics.record_run_started();
        metrics.record_files_discovered(3);
        metrics.record_file_uploaded(100);
        metrics.record_file_uploaded(50);
        metrics.record_file_failed();
        metrics.record_run_failed();

        let summary = metrics.summary();
        assert_eq!(summary.runs_started, 1);
        assert_eq!(summary.runs_failed, 1);
        assert_eq!(summary.runs_succeeded, 0);
        assert_eq!(summary.files_discovered, 3);
        assert_eq!(summary.files_uploaded, 2);
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.bytes_uploaded, 150);
        assert_eq!(summary.directories_cleaned, 0);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = ExportMetrics::new();
        let clone = metrics.clone();

        clone.record_directory_cleaned();
        clone.record_run_succeeded();

        assert_eq!(metrics.directories_cleaned(), 1);
        assert_eq!(metrics.runs_succeeded(), 1);
    }
}
