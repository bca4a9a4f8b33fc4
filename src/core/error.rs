//! Error types for the logging engine
//!
//! Nothing on the logging path returns these to the caller: write and flush
//! failures are counted and reported on standard error. They surface from
//! configuration calls, file handling and [`flush_with_timeout`](super::flush_with_timeout).

use std::io;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, LoggerError>;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// IO failure while doing `operation` on `target`
    #[error("{operation} '{target}' failed: {source}")]
    Io {
        operation: String,
        target: String,
        #[source]
        source: io::Error,
    },

    /// IO failure of a redirected stream
    #[error("stream error: {0}")]
    Stream(#[from] io::Error),

    /// Configuration text that is not valid JSON for [`Config`](super::Config)
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed `pattern=N` rule
    #[error("invalid vmodule entry '{entry}': {message}")]
    InvalidVModule { entry: String, message: String },

    /// Verbosity level that is not an integer
    #[error("invalid verbosity level '{0}'")]
    InvalidLevel(String),

    /// Setting outside its allowed range
    #[error("invalid {setting} setting: {message}")]
    InvalidSetting { setting: String, message: String },

    /// Log file could not be created or opened
    #[error("cannot open log file '{path}': {reason}")]
    FileOpen { path: String, reason: String },

    /// Size-based rotation did not complete
    #[error("rotating '{path}' failed: {reason}")]
    Rotation { path: String, reason: String },

    /// Write to a log file whose handle was lost in a failed rotation
    #[error("log file '{0}' is closed")]
    Closed(String),

    /// Flush did not finish in time
    #[error("flush took longer than {0:?}")]
    FlushTimeout(Duration),

    #[error("{0}")]
    Other(String),
}

impl LoggerError {
    pub fn io_operation(
        operation: impl Into<String>,
        target: impl Into<String>,
        source: io::Error,
    ) -> Self {
        LoggerError::Io {
            operation: operation.into(),
            target: target.into(),
            source,
        }
    }

    pub fn vmodule(entry: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::InvalidVModule {
            entry: entry.into(),
            message: message.into(),
        }
    }

    pub fn config(setting: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::InvalidSetting {
            setting: setting.into(),
            message: message.into(),
        }
    }

    pub fn file_open(path: impl Into<String>, reason: impl Into<String>) -> Self {
        LoggerError::FileOpen {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn rotation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        LoggerError::Rotation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn other<S: Into<String>>(msg: S) -> Self {
        LoggerError::Other(msg.into())
    }

    /// Whether the error came from the operating system rather than from
    /// bad input
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            LoggerError::Io { .. }
                | LoggerError::Stream(_)
                | LoggerError::FileOpen { .. }
                | LoggerError::Rotation { .. }
                | LoggerError::Closed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = LoggerError::vmodule("gc=x", "level is not an integer");
        assert_eq!(
            err.to_string(),
            "invalid vmodule entry 'gc=x': level is not an integer"
        );

        let err = LoggerError::rotation("/var/log/app.log", "disk full");
        assert_eq!(err.to_string(), "rotating '/var/log/app.log' failed: disk full");

        let err = LoggerError::FlushTimeout(Duration::from_millis(10));
        assert_eq!(err.to_string(), "flush took longer than 10ms");
    }

    #[test]
    fn test_io_operation_keeps_source() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = LoggerError::io_operation("writing log file", "/tmp/x.log", io_err);

        assert_eq!(err.to_string(), "writing log file '/tmp/x.log' failed: access denied");
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.is_io());
    }

    #[test]
    fn test_input_errors_are_not_io() {
        assert!(!LoggerError::config("max_size", "must be positive").is_io());
        assert!(!LoggerError::InvalidLevel("x".into()).is_io());
        assert!(LoggerError::file_open("/nope", "denied").is_io());
    }
}
