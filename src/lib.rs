//! # plog
//!
//! Process-wide leveled logging in the klog tradition.
//!
//! ## Features
//!
//! - **Severities**: INFO, WARNING, ERROR and FATAL; a line also lands in the
//!   files of every lower severity
//! - **Verbosity**: a global level plus per-file `pattern=N` rules
//! - **Structured calls**: `"msg" key="value"` rendering with stable order
//! - **Backends**: forward rendered lines to another logger, or let it serve
//!   structured calls directly
//! - **Safe exit**: fatal records are flushed within a bounded time before
//!   the process ends
//!
//! ```
//! use plog::{info_s, kv, Context, Level};
//!
//! plog::set_verbosity(Level(1));
//! plog::info!("starting {} workers", 4);
//!
//! let logger = plog::background().with_name("worker").with_values(&kv!["id", 7]);
//! let ctx = plog::new_context(&Context::background(), logger);
//! plog::from_context(&ctx).info("ready", &kv!["queue", "default"]);
//! info_s!("done");
//! plog::flush();
//! ```

pub mod core;
pub mod macros;
pub mod output;

pub mod prelude {
    pub use crate::core::{
        BackendOptions, CallSite, Config, Context, Level, LogSink, Logger, LoggerError,
        OutputConfig, Result, Severity, Value,
    };
    pub use crate::output::{SharedBuffer, SharedWriter};
}

pub use crate::core::logger::{
    add_or_replace_rules, background, backend_state, capture_state, clear_logger, clear_output,
    configure, enable_contextual_logging, error, error_s, fatal, flush, flush_and_exit,
    flush_daemon_running, from_context, info, info_s, new_context, set_exit_hook, set_logger,
    set_logger_with_options, set_output, set_output_by_severity, set_stderr_output, set_verbosity,
    set_vmodule, start_flush_daemon, stats, stop_flush_daemon, v, verbosity, vmodule, warning,
};
pub use crate::core::{
    format, k_obj, k_objs, k_ref, BackendOptions, BackendState, CallSite, Config, Context,
    FormatOptions, Formatted, Level, LogSink, Logger, LoggerError, MetricsSnapshot, ObjectMeta,
    ObjectRef, OutputConfig, OutputMetrics, Result, Severity, State, VModule, Value, Verbose,
    FATAL_EXIT_CODE, MISSING,
};
pub use crate::output::{SharedBuffer, SharedWriter};
