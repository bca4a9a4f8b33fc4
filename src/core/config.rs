//! Engine configuration
//!
//! [`Config`] is plain data with serde support so it can be loaded from a
//! JSON document. Every field has a default; a missing field keeps it.
//! Durations are written in milliseconds (`flush_interval_ms`,
//! `fatal_flush_timeout_ms`).

use super::error::{LoggerError, Result};
use super::formatter::FormatOptions;
use super::severity::Severity;
use super::verbosity::{Level, VModule};
use crate::output::rotating_file::{RotationPolicy, DEFAULT_MAX_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default period of the background flush
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on the flush that precedes a fatal exit
pub const EXIT_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Where rendered lines go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Write everything to standard error and nothing to files
    pub to_stderr: bool,
    /// Copy every line to standard error in addition to files
    pub also_to_stderr: bool,
    /// Lines at or above this severity are copied to standard error
    pub stderr_threshold: Severity,
    /// Directory for per-severity files; the system temp dir when unset
    pub log_dir: Option<PathBuf>,
    /// Single file for all severities; takes precedence over `log_dir`
    pub log_file: Option<PathBuf>,
    /// Rotation threshold in bytes
    pub max_size: u64,
    /// Numbered backups kept when `log_file` rotates
    pub max_backups: usize,
    /// Gzip rotated `log_file` backups
    pub compress_backups: bool,
    /// Write each line only to the file of its own severity
    pub one_output: bool,
    /// Do not start new files with header lines
    pub skip_log_headers: bool,
    /// Program name used in file names; the executable name when unset
    pub program: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            to_stderr: true,
            also_to_stderr: false,
            stderr_threshold: Severity::Error,
            log_dir: None,
            log_file: None,
            max_size: DEFAULT_MAX_SIZE,
            max_backups: 3,
            compress_backups: false,
            one_output: false,
            skip_log_headers: false,
            program: None,
        }
    }
}

impl OutputConfig {
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_to_stderr(mut self, enabled: bool) -> Self {
        self.to_stderr = enabled;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_also_to_stderr(mut self, enabled: bool) -> Self {
        self.also_to_stderr = enabled;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_stderr_threshold(mut self, severity: Severity) -> Self {
        self.stderr_threshold = severity;
        self
    }

    /// Log to per-severity files in `dir` (implies `to_stderr = false`)
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self.to_stderr = false;
        self
    }

    /// Log to a single file (implies `to_stderr = false`)
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self.to_stderr = false;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress_backups = enabled;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_one_output(mut self, enabled: bool) -> Self {
        self.one_output = enabled;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_skip_log_headers(mut self, enabled: bool) -> Self {
        self.skip_log_headers = enabled;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidSetting`] for a zero size limit,
    /// a log file that is a directory, a log dir that is a file, or
    /// compression without the `compression` feature.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(LoggerError::config("output", "max_size must be greater than zero"));
        }
        if let Some(path) = &self.log_file {
            if path.as_os_str().is_empty() {
                return Err(LoggerError::config("output", "log_file must not be empty"));
            }
            if path.is_dir() {
                return Err(LoggerError::config(
                    "output",
                    format!("log_file '{}' is a directory", path.display()),
                ));
            }
        }
        if let Some(dir) = &self.log_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(LoggerError::config(
                    "output",
                    format!("log_dir '{}' is not a directory", dir.display()),
                ));
            }
        }
        if let Some(program) = &self.program {
            if program.is_empty() || program.contains(&['/', '\\'][..]) {
                return Err(LoggerError::config(
                    "output",
                    format!("invalid program name '{}'", program),
                ));
            }
        }
        if self.compress_backups && !cfg!(feature = "compression") {
            return Err(LoggerError::config(
                "output",
                "compress_backups requires the `compression` feature",
            ));
        }
        Ok(())
    }

    /// Program name for file names
    pub fn program_name(&self) -> String {
        if let Some(program) = &self.program {
            return program.clone();
        }
        std::env::current_exe()
            .ok()
            .as_deref()
            .and_then(Path::file_stem)
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "plog".to_string())
    }

    /// Directory for per-severity files
    pub fn log_dir_or_default(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn rotation_policy(&self) -> RotationPolicy {
        RotationPolicy::new()
            .with_max_size(self.max_size)
            .with_max_backups(self.max_backups)
            .with_compression(self.compress_backups)
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Global verbosity level
    pub verbosity: Level,
    /// Per-file rules, `pattern=N,pattern=N`
    pub vmodule: String,
    pub output: OutputConfig,
    pub format: FormatOptions,
    #[serde(rename = "flush_interval_ms", with = "millis")]
    pub flush_interval: Duration,
    #[serde(rename = "fatal_flush_timeout_ms", with = "millis")]
    pub fatal_flush_timeout: Duration,
    /// When false, `from_context` always yields the process default logger
    pub contextual_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbosity: Level(0),
            vmodule: String::new(),
            output: OutputConfig::default(),
            format: FormatOptions::default(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            fatal_flush_timeout: EXIT_FLUSH_TIMEOUT,
            contextual_logging: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON document from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            LoggerError::io_operation("reading configuration", path.display().to_string(), e)
        })?;
        Self::from_json(&text)
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_verbosity(mut self, level: impl Into<Level>) -> Self {
        self.verbosity = level.into();
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_vmodule(mut self, vmodule: impl Into<String>) -> Self {
        self.vmodule = vmodule.into();
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_output(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_format(mut self, format: FormatOptions) -> Self {
        self.format = format;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_fatal_flush_timeout(mut self, timeout: Duration) -> Self {
        self.fatal_flush_timeout = timeout;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_contextual_logging(mut self, enabled: bool) -> Self {
        self.contextual_logging = enabled;
        self
    }

    /// Check every field and return the parsed rules.
    ///
    /// # Errors
    ///
    /// The first problem found; nothing is applied by this call.
    pub fn validate(&self) -> Result<VModule> {
        if self.verbosity.0 < 0 {
            return Err(LoggerError::config(
                "verbosity",
                format!("level must not be negative, got {}", self.verbosity),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(LoggerError::config("flush_interval", "must be greater than zero"));
        }
        self.output.validate()?;
        VModule::parse(&self.vmodule)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
