//! Core engine types

pub mod backend;
pub mod config;
pub mod contextual;
pub mod error;
pub mod flush;
pub mod formatter;
pub mod log_entry;
pub mod logger;
pub mod metrics;
pub mod severity;
pub mod value;
pub mod verbosity;

pub use backend::{BackendBridge, BackendOptions, BackendState, LogSink};
pub use config::{Config, OutputConfig, DEFAULT_FLUSH_INTERVAL, EXIT_FLUSH_TIMEOUT};
pub use contextual::{Context, Logger};
pub use error::{LoggerError, Result};
pub use flush::{flush_with_timeout, FlushDaemon};
pub use formatter::{FormatOptions, RecordFormatter, MISSING};
pub use log_entry::{CallSite, LogRecord, Message};
pub use logger::{State, Verbose, FATAL_EXIT_CODE};
pub use metrics::{MetricsSnapshot, OutputMetrics};
pub use severity::Severity;
pub use value::{format, k_obj, k_objs, k_ref, Formatted, ObjectMeta, ObjectRef, Value};
pub use verbosity::{Level, VModule, VModuleRule, VerbosityController};
