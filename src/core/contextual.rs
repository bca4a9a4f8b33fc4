//! Logger handles and request-scoped carriers
//!
//! A [`Logger`] is an immutable handle over a [`LogSink`]. Deriving a handle
//! with [`Logger::with_name`], [`Logger::with_values`] or [`Logger::v`]
//! returns a new value and leaves the original untouched. A [`Context`]
//! carries an optional handle through a call chain.

use super::backend::LogSink;
use super::log_entry::CallSite;
use super::value::Value;
use super::verbosity::Level;
use std::fmt;
use std::sync::Arc;

/// Handle for structured logging
#[derive(Clone)]
pub struct Logger {
    sink: Option<Arc<dyn LogSink>>,
    level: Level,
}

impl Logger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink: Some(sink),
            level: Level(0),
        }
    }

    /// Handle that drops everything
    pub fn discard() -> Self {
        Self {
            sink: None,
            level: Level(0),
        }
    }

    pub fn sink(&self) -> Option<&Arc<dyn LogSink>> {
        self.sink.as_ref()
    }

    /// Verbosity at which this handle's `info` calls are made
    pub fn verbosity(&self) -> Level {
        self.level
    }

    /// Handle whose `info` calls are `level` steps more verbose
    #[must_use]
    pub fn v(&self, level: impl Into<Level>) -> Self {
        Self {
            sink: self.sink.clone(),
            level: Level(self.level.0.saturating_add(level.into().0)),
        }
    }

    #[must_use]
    pub fn with_name(&self, name: &str) -> Self {
        Self {
            sink: self.sink.as_ref().map(|sink| sink.with_name(name)),
            level: self.level,
        }
    }

    #[must_use]
    pub fn with_values(&self, kv: &[Value]) -> Self {
        Self {
            sink: self.sink.as_ref().map(|sink| sink.with_values(kv)),
            level: self.level,
        }
    }

    #[track_caller]
    pub fn enabled(&self) -> bool {
        let site = CallSite::caller();
        self.sink
            .as_ref()
            .is_some_and(|sink| sink.enabled(&site, self.level))
    }

    #[track_caller]
    pub fn info(&self, msg: &str, kv: &[Value]) {
        let site = CallSite::caller();
        if let Some(sink) = &self.sink {
            if sink.enabled(&site, self.level) {
                sink.info(&site, self.level, msg, kv);
            }
        }
    }

    /// Errors are logged regardless of verbosity.
    #[track_caller]
    pub fn error(
        &self,
        err: Option<&(dyn std::error::Error + 'static)>,
        msg: &str,
        kv: &[Value],
    ) {
        let site = CallSite::caller();
        if let Some(sink) = &self.sink {
            sink.error(&site, err, msg, kv);
        }
    }

    /// Whether both handles use the same sink at the same verbosity
    pub fn same_as(&self, other: &Logger) -> bool {
        let same_sink = match (&self.sink, &other.sink) {
            (Some(a), Some(b)) => Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const (),
            (None, None) => true,
            _ => false,
        };
        same_sink && self.level == other.level
    }
}

impl PartialEq for Logger {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("sink", &self.sink.as_ref().map(|s| Arc::as_ptr(s) as *const ()))
            .field("level", &self.level)
            .finish()
    }
}

/// Request-scoped carrier that may hold a [`Logger`]
#[derive(Debug, Clone, Default)]
pub struct Context {
    logger: Option<Logger>,
}

impl Context {
    /// Carrier with nothing attached
    pub fn background() -> Self {
        Self::default()
    }

    pub fn logger(&self) -> Option<&Logger> {
        self.logger.as_ref()
    }

    /// New carrier holding `logger`; `self` is unchanged
    #[must_use]
    pub fn with_logger(&self, logger: Logger) -> Self {
        Self {
            logger: Some(logger),
        }
    }
}
