//! Severity-routed output
//!
//! [`OutputWriter`] owns one stream per severity. A line at severity S goes
//! to the stream of S and of every lower severity, so the INFO file holds
//! everything. Streams open their files lazily on first use and rotate by
//! size. Each stream has its own lock; no code path holds two of them.

use super::redirect::SharedWriter;
use super::rotating_file::{FileNaming, RotatingFile, WriteOutcome};
use crate::core::config::OutputConfig;
use crate::core::error::{LoggerError, Result};
use crate::core::metrics::{should_report, OutputMetrics};
use crate::core::severity::Severity;
use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

enum Slot {
    Empty,
    File(RotatingFile),
    Redirect(SharedWriter),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamWrite {
    Written,
    Opened,
    Failed,
}

/// Saved routing state, see [`OutputWriter::save`]
#[derive(Clone)]
pub(crate) struct WriterState {
    config: Arc<OutputConfig>,
    single: Option<Arc<SharedWriter>>,
    stderr: Option<Arc<SharedWriter>>,
    redirects: [Option<SharedWriter>; 4],
}

pub struct OutputWriter {
    config: ArcSwap<OutputConfig>,
    single: ArcSwapOption<SharedWriter>,
    stderr: ArcSwapOption<SharedWriter>,
    streams: [Mutex<Slot>; 4],
    metrics: Arc<OutputMetrics>,
}

impl OutputWriter {
    pub fn new(config: OutputConfig) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            single: ArcSwapOption::empty(),
            stderr: ArcSwapOption::empty(),
            streams: [
                Mutex::new(Slot::Empty),
                Mutex::new(Slot::Empty),
                Mutex::new(Slot::Empty),
                Mutex::new(Slot::Empty),
            ],
            metrics: Arc::new(OutputMetrics::new()),
        }
    }

    pub fn config(&self) -> Arc<OutputConfig> {
        self.config.load_full()
    }

    pub fn metrics(&self) -> &Arc<OutputMetrics> {
        &self.metrics
    }

    /// Route one rendered line.
    ///
    /// Returns `true` when a new log file was opened for it. Errors are
    /// counted and reported on standard error, never returned.
    pub fn write(&self, severity: Severity, data: &[u8]) -> bool {
        self.metrics.record_line(severity, data.len());

        if let Some(single) = self.single.load_full() {
            if let Err(e) = single.write_all(data) {
                self.report_write_error("custom output", &e);
            }
            return false;
        }

        let config = self.config.load_full();
        if config.to_stderr {
            self.write_stderr(data);
            return false;
        }

        let mut on_stderr = false;
        if config.also_to_stderr || severity >= config.stderr_threshold {
            self.write_stderr(data);
            on_stderr = true;
        }

        let mut opened = false;
        let mut failed = false;
        let mut record = |result: StreamWrite| match result {
            StreamWrite::Written => {}
            StreamWrite::Opened => opened = true,
            StreamWrite::Failed => failed = true,
        };

        if config.log_file.is_some() {
            // All severities share the single file kept in the INFO slot
            record(self.write_stream(Severity::Info, data, &config));
        } else if config.one_output {
            record(self.write_stream(severity, data, &config));
        } else {
            for target in severity.cascade() {
                record(self.write_stream(target, data, &config));
            }
        }

        if failed && !on_stderr {
            self.write_stderr(data);
        }
        opened
    }

    /// Whether a line at `severity` currently reaches standard error
    pub fn reaches_stderr(&self, severity: Severity) -> bool {
        if self.single.load().is_some() {
            return false;
        }
        let config = self.config.load();
        config.to_stderr || config.also_to_stderr || severity >= config.stderr_threshold
    }

    /// Write directly to standard error (or its replacement)
    pub fn write_stderr(&self, data: &[u8]) {
        let result = match self.stderr.load_full() {
            Some(target) => target.write_all(data),
            None => std::io::stderr().lock().write_all(data),
        };
        if let Err(e) = result {
            self.report_write_error("stderr", &e);
        }
    }

    fn write_stream(&self, severity: Severity, data: &[u8], config: &OutputConfig) -> StreamWrite {
        let mut slot = self.streams[severity.index()].lock();
        let mut status = StreamWrite::Written;

        if matches!(*slot, Slot::Empty) {
            match open_stream(severity, config) {
                Ok(file) => {
                    *slot = Slot::File(file);
                    self.metrics.record_file_created();
                    status = StreamWrite::Opened;
                }
                Err(e) => {
                    drop(slot);
                    self.report_write_error(severity.to_str(), &e);
                    return StreamWrite::Failed;
                }
            }
        }

        let result = match &mut *slot {
            Slot::Empty => return StreamWrite::Failed,
            Slot::File(file) => match file.write(data) {
                Ok(WriteOutcome::Appended) => Ok(()),
                Ok(WriteOutcome::Rotated) => {
                    self.metrics.record_rotation();
                    Ok(())
                }
                Ok(WriteOutcome::RotationFailed(e)) => {
                    self.report_write_error(severity.to_str(), &e);
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Slot::Redirect(target) => target.write_all(data).map_err(LoggerError::from),
        };
        drop(slot);

        match result {
            Ok(()) => status,
            Err(e) => {
                self.report_write_error(severity.to_str(), &e);
                StreamWrite::Failed
            }
        }
    }

    /// Flush every stream, one lock at a time.
    ///
    /// # Errors
    ///
    /// The first flush error; the remaining streams are still flushed.
    pub fn flush_all(&self) -> Result<()> {
        let mut first_error = None;
        let mut note = |result: Result<()>, target: &str| {
            if let Err(e) = result {
                let previous = self.metrics.record_flush_error();
                if should_report(previous) {
                    eprintln!(
                        "[plog ERROR] flushing {} failed: {} ({} flush errors so far)",
                        target,
                        e,
                        previous + 1
                    );
                }
                first_error.get_or_insert(e);
            }
        };

        for severity in Severity::ALL.iter().rev() {
            let result = match &mut *self.streams[severity.index()].lock() {
                Slot::Empty => Ok(()),
                Slot::File(file) => file.flush(),
                Slot::Redirect(target) => target.flush().map_err(LoggerError::from),
            };
            note(result, severity.to_str());
        }
        if let Some(single) = self.single.load_full() {
            note(single.flush().map_err(LoggerError::from), "custom output");
        }
        if let Some(target) = self.stderr.load_full() {
            note(target.flush().map_err(LoggerError::from), "stderr");
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Send every line, once, to `writer` instead of the normal routing
    pub fn set_output(&self, writer: SharedWriter) {
        self.single.store(Some(Arc::new(writer)));
    }

    /// Return to severity routing after [`set_output`](Self::set_output)
    pub fn clear_output(&self) {
        self.single.store(None);
    }

    /// Replace the stream of one severity with `writer`. Lines still
    /// cascade into it. Has no visible effect while `to_stderr` is set or a
    /// single output is installed.
    pub fn set_output_by_severity(&self, severity: Severity, writer: SharedWriter) {
        let previous = std::mem::replace(
            &mut *self.streams[severity.index()].lock(),
            Slot::Redirect(writer),
        );
        drop(previous);
    }

    /// Replace standard error as a destination, `None` restores it
    pub fn set_stderr(&self, writer: Option<SharedWriter>) {
        self.stderr.store(writer.map(Arc::new));
    }

    /// Install new routing settings. Open files are flushed and closed so
    /// they reopen under the new settings; redirected streams stay.
    pub fn reconfigure(&self, config: OutputConfig) {
        self.config.store(Arc::new(config));
        self.close_files();
    }

    /// Flush and close every file stream
    pub fn close_files(&self) {
        for stream in &self.streams {
            let mut slot = stream.lock();
            if let Slot::File(file) = &mut *slot {
                if let Err(e) = file.flush() {
                    eprintln!(
                        "[plog ERROR] flushing {} on close failed: {}",
                        file.path().display(),
                        e
                    );
                }
                *slot = Slot::Empty;
            }
        }
    }

    /// Close files and drop every redirect
    pub fn close_all(&self) {
        self.close_files();
        for stream in &self.streams {
            *stream.lock() = Slot::Empty;
        }
        self.single.store(None);
    }

    pub(crate) fn save(&self) -> WriterState {
        let redirect = |severity: Severity| match &*self.streams[severity.index()].lock() {
            Slot::Redirect(target) => Some(target.clone()),
            _ => None,
        };
        WriterState {
            config: self.config.load_full(),
            single: self.single.load_full(),
            stderr: self.stderr.load_full(),
            redirects: Severity::ALL.map(redirect),
        }
    }

    pub(crate) fn restore(&self, state: WriterState) {
        self.close_all();
        self.config.store(state.config);
        self.single.store(state.single);
        self.stderr.store(state.stderr);
        for (severity, target) in Severity::ALL.into_iter().zip(state.redirects) {
            if let Some(target) = target {
                *self.streams[severity.index()].lock() = Slot::Redirect(target);
            }
        }
    }

    fn report_write_error(&self, target: &str, err: &dyn std::fmt::Display) {
        let previous = self.metrics.record_write_error();
        if should_report(previous) {
            eprintln!(
                "[plog ERROR] writing to {} failed: {} ({} write errors so far)",
                target,
                err,
                previous + 1
            );
        }
    }
}

impl Default for OutputWriter {
    fn default() -> Self {
        Self::new(OutputConfig::default())
    }
}

impl Drop for OutputWriter {
    fn drop(&mut self) {
        let _ = self.flush_all();
    }
}

fn open_stream(severity: Severity, config: &OutputConfig) -> Result<RotatingFile> {
    let naming = match &config.log_file {
        Some(path) => FileNaming::Fixed { path: path.clone() },
        None => FileNaming::Timestamped {
            dir: config.log_dir_or_default(),
            program: config.program_name(),
            severity,
        },
    };
    RotatingFile::create(naming, config.rotation_policy(), !config.skip_log_headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::redirect::SharedBuffer;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn files_for(dir: &Path, severity: Severity) -> Vec<std::path::PathBuf> {
        let prefix = format!("test.log.{}.", severity);
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .unwrap()
                    .to_string_lossy()
                    .starts_with(&prefix)
            })
            .collect()
    }

    fn file_config(dir: &Path) -> OutputConfig {
        OutputConfig::default()
            .with_log_dir(dir)
            .with_program("test")
            .with_skip_log_headers(true)
            .with_stderr_threshold(Severity::Fatal)
    }

    #[test]
    fn test_to_stderr_routing() {
        let writer = OutputWriter::default();
        let stderr = SharedBuffer::new();
        writer.set_stderr(Some(stderr.writer()));

        assert!(!writer.write(Severity::Error, b"E line\n"));
        assert_eq!(stderr.text(), "E line\n");
    }

    #[test]
    fn test_single_output_writes_once() {
        let writer = OutputWriter::default();
        let out = SharedBuffer::new();
        writer.set_output(out.writer());

        writer.write(Severity::Error, b"once\n");
        assert_eq!(out.text(), "once\n");
        assert!(!writer.reaches_stderr(Severity::Fatal));

        writer.clear_output();
        assert!(writer.reaches_stderr(Severity::Info));
    }

    #[test]
    fn test_cascade_to_files() {
        let dir = tempdir().unwrap();
        let writer = OutputWriter::new(file_config(dir.path()));

        assert!(writer.write(Severity::Warning, b"warn\n"));
        assert!(!writer.write(Severity::Info, b"info\n"));
        writer.flush_all().unwrap();

        let info = fs::read_to_string(&files_for(dir.path(), Severity::Info)[0]).unwrap();
        let warning = fs::read_to_string(&files_for(dir.path(), Severity::Warning)[0]).unwrap();
        assert_eq!(info, "warn\ninfo\n");
        assert_eq!(warning, "warn\n");
        assert!(files_for(dir.path(), Severity::Error).is_empty());
        assert_eq!(writer.metrics().snapshot().files_created, 2);
    }

    #[test]
    fn test_one_output() {
        let dir = tempdir().unwrap();
        let writer = OutputWriter::new(file_config(dir.path()).with_one_output(true));
        writer.write(Severity::Error, b"err\n");
        writer.flush_all().unwrap();

        assert_eq!(files_for(dir.path(), Severity::Error).len(), 1);
        assert!(files_for(dir.path(), Severity::Info).is_empty());
    }

    #[test]
    fn test_stderr_threshold_copies() {
        let dir = tempdir().unwrap();
        let writer =
            OutputWriter::new(file_config(dir.path()).with_stderr_threshold(Severity::Error));
        let stderr = SharedBuffer::new();
        writer.set_stderr(Some(stderr.writer()));

        writer.write(Severity::Warning, b"w\n");
        writer.write(Severity::Error, b"e\n");
        assert_eq!(stderr.text(), "e\n");
        assert!(writer.reaches_stderr(Severity::Error));
        assert!(!writer.reaches_stderr(Severity::Warning));
    }

    #[test]
    fn test_single_log_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("all.log");
        let writer = OutputWriter::new(
            OutputConfig::default()
                .with_log_file(&path)
                .with_skip_log_headers(true)
                .with_stderr_threshold(Severity::Fatal),
        );
        writer.write(Severity::Error, b"e\n");
        writer.write(Severity::Info, b"i\n");
        writer.flush_all().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "e\ni\n");
    }

    #[test]
    fn test_output_by_severity_receives_cascade() {
        let dir = tempdir().unwrap();
        let writer = OutputWriter::new(file_config(dir.path()));
        let warnings = SharedBuffer::new();
        writer.set_output_by_severity(Severity::Warning, warnings.writer());

        writer.write(Severity::Error, b"e\n");
        writer.write(Severity::Warning, b"w\n");
        writer.write(Severity::Info, b"i\n");
        assert_eq!(warnings.text(), "e\nw\n");
    }

    #[test]
    fn test_cascade_rotates_each_stream() {
        let dir = tempdir().unwrap();
        let writer = OutputWriter::new(file_config(dir.path()).with_max_size(12));

        // 7 bytes per line: every line after the first starts a new file
        for i in 0..4 {
            writer.write(Severity::Warning, format!("warn {}\n", i).as_bytes());
        }
        writer.flush_all().unwrap();

        let stats = writer.metrics().snapshot();
        assert_eq!(stats.rotations, 6);
        assert_eq!(stats.files_created, 2);
        assert_eq!(stats.write_errors, 0);

        for severity in [Severity::Info, Severity::Warning] {
            let files = files_for(dir.path(), severity);
            assert_eq!(files.len(), 4);
            let total: String = files
                .iter()
                .map(|p| fs::read_to_string(p).unwrap())
                .collect::<Vec<_>>()
                .concat();
            assert_eq!(total.lines().count(), 4);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_rotation_is_counted() {
        let writer = OutputWriter::new(
            OutputConfig::default()
                .with_log_file("/dev/full")
                .with_skip_log_headers(true)
                .with_max_size(4)
                .with_max_backups(0)
                .with_stderr_threshold(Severity::Fatal),
        );
        let stderr = SharedBuffer::new();
        writer.set_stderr(Some(stderr.writer()));

        writer.write(Severity::Info, b"abc\n");
        writer.write(Severity::Info, b"def\n");

        let stats = writer.metrics().snapshot();
        assert_eq!(stats.rotations, 0);
        assert_eq!(stats.write_errors, 1);
        // The line itself was accepted by the current file
        assert_eq!(stderr.text(), "");
    }

    #[test]
    fn test_flush_is_idempotent() {
        let dir = tempdir().unwrap();
        let writer = OutputWriter::new(file_config(dir.path()));
        writer.write(Severity::Info, b"x\n");
        writer.flush_all().unwrap();

        let path = &files_for(dir.path(), Severity::Info)[0];
        let first = fs::metadata(path).unwrap().len();
        writer.flush_all().unwrap();
        assert_eq!(fs::metadata(path).unwrap().len(), first);
    }

    #[test]
    fn test_unwritable_dir_falls_back_to_stderr() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"").unwrap();

        let writer = OutputWriter::new(file_config(&blocker.join("sub")));
        let stderr = SharedBuffer::new();
        writer.set_stderr(Some(stderr.writer()));

        writer.write(Severity::Warning, b"kept\n");
        assert_eq!(stderr.text(), "kept\n");
        assert_eq!(writer.metrics().write_errors(), 2);
    }

    #[test]
    fn test_save_restore() {
        let writer = OutputWriter::default();
        let state = writer.save();

        let out = SharedBuffer::new();
        writer.set_output(out.writer());
        writer.reconfigure(OutputConfig::default().with_to_stderr(false));
        writer.restore(state);

        assert!(writer.config().to_stderr);
        assert!(writer.reaches_stderr(Severity::Info));
    }
}
