//! Output metrics for observability
//!
//! Counters for lines and bytes written per severity plus the I/O problems
//! the output writer swallowed instead of handing them to the caller.

use super::severity::Severity;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the output writer
///
/// # Example
///
/// ```
/// use plog::{OutputMetrics, Severity};
///
/// let metrics = OutputMetrics::new();
/// metrics.record_line(Severity::Warning, 42);
/// metrics.record_write_error();
///
/// let stats = metrics.snapshot();
/// assert_eq!(stats.lines[Severity::Warning.index()], 1);
/// assert_eq!(stats.write_errors, 1);
/// ```
#[derive(Debug)]
pub struct OutputMetrics {
    lines: [AtomicU64; 4],
    bytes: [AtomicU64; 4],
    write_errors: AtomicU64,
    flush_errors: AtomicU64,
    rotations: AtomicU64,
    files_created: AtomicU64,
}

/// Point-in-time copy of [`OutputMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Lines accepted per severity, indexed by [`Severity::index`]
    pub lines: [u64; 4],
    pub bytes: [u64; 4],
    pub write_errors: u64,
    pub flush_errors: u64,
    pub rotations: u64,
    pub files_created: u64,
}

impl MetricsSnapshot {
    pub fn total_lines(&self) -> u64 {
        self.lines.iter().sum()
    }
}

impl OutputMetrics {
    /// Create a new metrics instance with all counters at zero
    pub const fn new() -> Self {
        Self {
            lines: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
            bytes: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
            write_errors: AtomicU64::new(0),
            flush_errors: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
            files_created: AtomicU64::new(0),
        }
    }

    /// Record one line of `len` bytes at `severity`
    #[inline]
    pub fn record_line(&self, severity: Severity, len: usize) {
        self.lines[severity.index()].fetch_add(1, Ordering::Relaxed);
        self.bytes[severity.index()].fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Record a failed write; returns the previous count
    #[inline]
    pub fn record_write_error(&self) -> u64 {
        self.write_errors.fetch_add(1, Ordering::Relaxed)
    }

    /// Record a failed flush; returns the previous count
    #[inline]
    pub fn record_flush_error(&self) -> u64 {
        self.flush_errors.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_file_created(&self) {
        self.files_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn write_errors(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn flush_errors(&self) -> u64 {
        self.flush_errors.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counters: &[AtomicU64; 4]| {
            [
                counters[0].load(Ordering::Relaxed),
                counters[1].load(Ordering::Relaxed),
                counters[2].load(Ordering::Relaxed),
                counters[3].load(Ordering::Relaxed),
            ]
        };
        MetricsSnapshot {
            lines: load(&self.lines),
            bytes: load(&self.bytes),
            write_errors: self.write_errors(),
            flush_errors: self.flush_errors(),
            rotations: self.rotations.load(Ordering::Relaxed),
            files_created: self.files_created.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        for counter in self.lines.iter().chain(self.bytes.iter()) {
            counter.store(0, Ordering::Relaxed);
        }
        self.write_errors.store(0, Ordering::Relaxed);
        self.flush_errors.store(0, Ordering::Relaxed);
        self.rotations.store(0, Ordering::Relaxed);
        self.files_created.store(0, Ordering::Relaxed);
    }
}

impl Default for OutputMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the `n`th occurrence (zero based) of a problem should be reported
#[inline]
pub(crate) fn should_report(previous: u64) -> bool {
    previous == 0 || (previous + 1) % 1000 == 0
}
