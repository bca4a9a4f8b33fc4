//! Process-wide logging engine
//!
//! One lazily created engine owns the verbosity controller, the output
//! writer, the backend bridge and the flush daemon. The free functions in
//! this module are the public face of it; the crate root re-exports them.
//!
//! Every call runs synchronously in the caller's thread: verbosity check,
//! rendering, handing the line to the backend, buffered write. The only
//! background work is the periodic flush and the bounded flush that precedes
//! a fatal exit.

use super::backend::{BackendBridge, BackendOptions, BackendState, BridgeSnapshot, LogSink};
use super::config::{Config, DEFAULT_FLUSH_INTERVAL, EXIT_FLUSH_TIMEOUT};
use super::contextual::{Context, Logger};
use super::error::Result;
use super::flush::{flush_with_timeout, FlushDaemon};
use super::formatter::{pad_missing, FormatOptions, RecordFormatter};
use super::log_entry::{CallSite, LogRecord, Message};
use super::metrics::MetricsSnapshot;
use super::severity::Severity;
use super::value::Value;
use super::verbosity::{Level, VerbosityController, VerbositySnapshot};
use crate::output::writer::{OutputWriter, WriterState};
use crate::output::SharedWriter;
use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Exit code used after a fatal record
pub const FATAL_EXIT_CODE: i32 = 255;

type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

struct Settings {
    formatter: RecordFormatter,
    flush_interval: Duration,
    fatal_flush_timeout: Duration,
}

impl Settings {
    fn from_config(config: &Config) -> Self {
        Self {
            formatter: RecordFormatter::new(config.format),
            flush_interval: config.flush_interval,
            fatal_flush_timeout: config.fatal_flush_timeout,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            formatter: RecordFormatter::new(FormatOptions::default()),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            fatal_flush_timeout: EXIT_FLUSH_TIMEOUT,
        }
    }
}

pub(crate) struct Engine {
    verbosity: VerbosityController,
    output: OutputWriter,
    backend: BackendBridge,
    daemon: FlushDaemon,
    settings: ArcSwap<Settings>,
    exit_hook: RwLock<ExitHook>,
    default_sink: Arc<dyn LogSink>,
}

static ENGINE: Lazy<Engine> = Lazy::new(Engine::new);

#[inline]
fn engine() -> &'static Engine {
    &ENGINE
}

impl Engine {
    fn new() -> Self {
        let exit: ExitHook = Arc::new(|code: i32| {
            std::process::exit(code);
        });
        Self {
            verbosity: VerbosityController::new(),
            output: OutputWriter::default(),
            backend: BackendBridge::new(),
            daemon: FlushDaemon::new(),
            settings: ArcSwap::from_pointee(Settings::default()),
            exit_hook: RwLock::new(exit),
            default_sink: Arc::new(EngineSink::default()),
        }
    }

    fn log_text(&self, severity: Severity, site: CallSite, args: fmt::Arguments<'_>) {
        let text = match args.as_str() {
            Some(s) => s.to_string(),
            None => args.to_string(),
        };
        self.emit(LogRecord::new(severity, site, Message::Text(text)));
    }

    fn log_structured(
        &self,
        severity: Severity,
        site: CallSite,
        msg: String,
        err: Option<String>,
        kv: Vec<Value>,
    ) {
        self.emit(LogRecord::new(
            severity,
            site,
            Message::Structured { msg, err, kv },
        ));
    }

    fn emit(&self, record: LogRecord) {
        let settings = self.settings.load();
        let line = settings.formatter.render(&record);
        self.backend.forward(record.severity, &line);
        if self.output.write(record.severity, &line) {
            self.ensure_daemon(settings.flush_interval);
        }
        if record.severity == Severity::Fatal {
            self.terminate(&line, settings.fatal_flush_timeout);
        }
    }

    fn terminate(&self, line: &[u8], timeout: Duration) {
        if !self.output.reaches_stderr(Severity::Fatal) {
            self.output.write_stderr(line);
        }
        let current = std::thread::current();
        let trace = format!(
            "\nbacktrace of thread {}:\n{}\n",
            current.name().unwrap_or("<unnamed>"),
            Backtrace::force_capture()
        );
        self.output.write(Severity::Fatal, trace.as_bytes());
        self.flush_and_exit(timeout, FATAL_EXIT_CODE);
    }

    fn flush_all(&self) -> Result<()> {
        let result = self.output.flush_all();
        self.backend.flush();
        result
    }

    fn flush_and_exit(&self, timeout: Duration, code: i32) {
        if let Err(e) = flush_with_timeout(timeout, || engine().flush_all()) {
            eprintln!("[plog ERROR] flush before exit failed: {}", e);
        }
        let hook = Arc::clone(&*self.exit_hook.read());
        hook(code);
    }

    fn ensure_daemon(&self, interval: Duration) {
        if !self.daemon.is_running() {
            self.start_daemon(interval);
        }
    }

    fn start_daemon(&self, interval: Duration) {
        self.daemon.run(interval, || {
            let _ = engine().flush_all();
        });
    }
}

/// Default logger: renders structured calls through the engine
#[derive(Debug, Clone, Default)]
struct EngineSink {
    prefix: String,
    values: Vec<Value>,
}

impl EngineSink {
    fn message(&self, msg: &str) -> String {
        if self.prefix.is_empty() {
            msg.to_string()
        } else {
            format!("{}: {}", self.prefix, msg)
        }
    }

    fn merged(&self, kv: &[Value]) -> Vec<Value> {
        let mut all = Vec::with_capacity(self.values.len() + kv.len());
        all.extend_from_slice(&self.values);
        all.extend_from_slice(kv);
        all
    }
}

impl LogSink for EngineSink {
    fn enabled(&self, site: &CallSite, level: Level) -> bool {
        engine().verbosity.enabled(level, site.file)
    }

    fn info(&self, site: &CallSite, _level: Level, msg: &str, kv: &[Value]) {
        engine().log_structured(
            Severity::Info,
            *site,
            self.message(msg),
            None,
            self.merged(kv),
        );
    }

    fn error(
        &self,
        site: &CallSite,
        err: Option<&(dyn std::error::Error + 'static)>,
        msg: &str,
        kv: &[Value],
    ) {
        engine().log_structured(
            Severity::Error,
            *site,
            self.message(msg),
            err.map(|e| e.to_string()),
            self.merged(kv),
        );
    }

    fn with_values(&self, kv: &[Value]) -> Arc<dyn LogSink> {
        let mut segment = kv.to_vec();
        pad_missing(&mut segment);
        let mut values = self.values.clone();
        values.extend(segment);
        Arc::new(EngineSink {
            prefix: self.prefix.clone(),
            values,
        })
    }

    fn with_name(&self, name: &str) -> Arc<dyn LogSink> {
        let prefix = if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.prefix, name)
        };
        Arc::new(EngineSink {
            prefix,
            values: self.values.clone(),
        })
    }
}

/// Result of [`v`]: logs only when the verbosity check passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verbose {
    enabled: bool,
}

impl Verbose {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[track_caller]
    pub fn info(&self, args: fmt::Arguments<'_>) {
        if self.enabled {
            engine().log_text(Severity::Info, CallSite::caller(), args);
        }
    }

    #[track_caller]
    pub fn info_s(&self, msg: &str, kv: &[Value]) {
        if self.enabled {
            engine().log_structured(
                Severity::Info,
                CallSite::caller(),
                msg.to_string(),
                None,
                kv.to_vec(),
            );
        }
    }

    #[track_caller]
    pub fn error_s(
        &self,
        err: Option<&(dyn std::error::Error + 'static)>,
        msg: &str,
        kv: &[Value],
    ) {
        if self.enabled {
            engine().log_structured(
                Severity::Error,
                CallSite::caller(),
                msg.to_string(),
                err.map(|e| e.to_string()),
                kv.to_vec(),
            );
        }
    }
}

/// Log formatted text at INFO
#[track_caller]
pub fn info(args: fmt::Arguments<'_>) {
    engine().log_text(Severity::Info, CallSite::caller(), args);
}

/// Log formatted text at WARNING
#[track_caller]
pub fn warning(args: fmt::Arguments<'_>) {
    engine().log_text(Severity::Warning, CallSite::caller(), args);
}

/// Log formatted text at ERROR
#[track_caller]
pub fn error(args: fmt::Arguments<'_>) {
    engine().log_text(Severity::Error, CallSite::caller(), args);
}

/// Log formatted text at FATAL, then flush and exit with code 255.
///
/// Returns only if the exit hook returns.
#[track_caller]
pub fn fatal(args: fmt::Arguments<'_>) {
    engine().log_text(Severity::Fatal, CallSite::caller(), args);
}

/// Structured INFO record: `"msg" k1=v1 k2=v2`
#[track_caller]
pub fn info_s(msg: &str, kv: &[Value]) {
    engine().log_structured(
        Severity::Info,
        CallSite::caller(),
        msg.to_string(),
        None,
        kv.to_vec(),
    );
}

/// Structured ERROR record: `"msg" err="..." k1=v1`
#[track_caller]
pub fn error_s(err: Option<&(dyn std::error::Error + 'static)>, msg: &str, kv: &[Value]) {
    engine().log_structured(
        Severity::Error,
        CallSite::caller(),
        msg.to_string(),
        err.map(|e| e.to_string()),
        kv.to_vec(),
    );
}

/// Verbosity gate for the calling source file
#[track_caller]
pub fn v(level: impl Into<Level>) -> Verbose {
    let site = CallSite::caller();
    Verbose {
        enabled: engine().verbosity.enabled(level.into(), site.file),
    }
}

/// Flush all buffered output and run the backend's flush hook
pub fn flush() {
    let _ = engine().flush_all();
}

/// Flush with a time limit, then call the exit hook with `code`
pub fn flush_and_exit(timeout: Duration, code: i32) {
    engine().flush_and_exit(timeout, code);
}

/// (Re)start the periodic flush with the given interval
pub fn start_flush_daemon(interval: Duration) {
    let engine = engine();
    engine.daemon.stop();
    engine.start_daemon(interval);
}

/// Stop the periodic flush; no flush thread remains when this returns
pub fn stop_flush_daemon() {
    engine().daemon.stop();
}

pub fn flush_daemon_running() -> bool {
    engine().daemon.is_running()
}

/// Send every line, once, to `writer`
pub fn set_output(writer: impl Into<SharedWriter>) {
    engine().output.set_output(writer.into());
}

/// Undo [`set_output`]
pub fn clear_output() {
    engine().output.clear_output();
}

/// Replace the stream of one severity. Only effective while `to_stderr`
/// is off and no [`set_output`] target is installed.
pub fn set_output_by_severity(severity: Severity, writer: impl Into<SharedWriter>) {
    engine().output.set_output_by_severity(severity, writer.into());
}

/// Replace standard error as a destination; `None` restores it
pub fn set_stderr_output(writer: Option<SharedWriter>) {
    engine().output.set_stderr(writer);
}

pub fn set_verbosity(level: impl Into<Level>) {
    engine().verbosity.set_global_level(level.into());
}

pub fn verbosity() -> Level {
    engine().verbosity.global_level()
}

/// Replace the per-file rules; on error the old rules stay
pub fn set_vmodule(spec: &str) -> Result<()> {
    engine().verbosity.set_vmodule(spec)
}

pub fn add_or_replace_rules<I, P>(rules: I) -> Result<()>
where
    I: IntoIterator<Item = (P, Level)>,
    P: AsRef<str>,
{
    engine().verbosity.add_or_replace_rules(rules)
}

/// Current per-file rules as `pattern=N,...`
pub fn vmodule() -> String {
    engine().verbosity.vmodule().to_string()
}

/// Forward every rendered line to `sink` as well
pub fn set_logger(sink: Arc<dyn LogSink>) {
    engine().backend.set(sink);
}

pub fn set_logger_with_options(sink: Arc<dyn LogSink>, options: BackendOptions) {
    engine().backend.set_with_options(sink, options);
}

pub fn clear_logger() {
    engine().backend.clear();
}

pub fn backend_state() -> BackendState {
    engine().backend.state()
}

/// The process default logger: the backend when installed contextually,
/// the engine otherwise
pub fn background() -> Logger {
    let engine = engine();
    match engine.backend.contextual_sink() {
        Some(sink) => Logger::new(sink),
        None => Logger::new(Arc::clone(&engine.default_sink)),
    }
}

/// Carrier like `ctx` with `logger` attached
pub fn new_context(ctx: &Context, logger: Logger) -> Context {
    ctx.with_logger(logger)
}

/// Logger attached to `ctx`, or [`background`] when there is none or
/// contextual logging is disabled
pub fn from_context(ctx: &Context) -> Logger {
    if engine().backend.contextual_enabled() {
        if let Some(logger) = ctx.logger() {
            return logger.clone();
        }
    }
    background()
}

pub fn enable_contextual_logging(enabled: bool) {
    engine().backend.set_contextual_enabled(enabled);
}

/// Apply a complete configuration.
///
/// # Errors
///
/// Everything is validated first; on error nothing changes.
pub fn configure(config: &Config) -> Result<()> {
    let vmodule = config.validate()?;
    let engine = engine();

    engine.verbosity.set_global_level(config.verbosity);
    engine.verbosity.replace_rules(vmodule);
    engine.output.reconfigure(config.output.clone());
    engine.backend.set_contextual_enabled(config.contextual_logging);
    engine.settings.store(Arc::new(Settings::from_config(config)));

    if engine.daemon.is_running() {
        engine.daemon.stop();
        engine.start_daemon(config.flush_interval);
    }
    Ok(())
}

pub fn stats() -> MetricsSnapshot {
    engine().output.metrics().snapshot()
}

/// Replace the function called to end the process
pub fn set_exit_hook<F>(hook: F)
where
    F: Fn(i32) + Send + Sync + 'static,
{
    let hook: ExitHook = Arc::new(hook);
    *engine().exit_hook.write() = hook;
}

/// Saved engine state, see [`capture_state`]
pub struct State {
    verbosity: Arc<VerbositySnapshot>,
    output: WriterState,
    backend: Arc<BridgeSnapshot>,
    settings: Arc<Settings>,
    exit_hook: ExitHook,
}

/// Snapshot of the whole engine configuration
pub fn capture_state() -> State {
    let engine = engine();
    State {
        verbosity: engine.verbosity.snapshot(),
        output: engine.output.save(),
        backend: engine.backend.snapshot(),
        settings: engine.settings.load_full(),
        exit_hook: Arc::clone(&*engine.exit_hook.read()),
    }
}

impl State {
    /// Put the engine back into the captured state. Open files are closed
    /// and the flush daemon is stopped; both come back on demand.
    pub fn restore(self) {
        let engine = engine();
        engine.daemon.stop();
        engine.verbosity.restore(self.verbosity);
        engine.output.restore(self.output);
        engine.backend.restore(self.backend);
        engine.settings.store(self.settings);
        *engine.exit_hook.write() = self.exit_hook;
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SharedBuffer;
    use serial_test::serial;

    fn capture() -> (State, SharedBuffer) {
        let state = capture_state();
        let out = SharedBuffer::new();
        configure(&Config::new().with_format(FormatOptions {
            skip_headers: true,
            add_dir_header: false,
        }))
        .unwrap();
        set_output(out.clone());
        (state, out)
    }

    #[test]
    #[serial]
    fn test_engine_sink_prefix_and_values() {
        let (state, out) = capture();

        let logger = background()
            .with_name("a")
            .with_values(&["odd".into()])
            .with_name("b");
        logger.info("msg", &["k".into(), 1.into()]);

        assert_eq!(out.text(), "\"a/b: msg\" odd=\"(MISSING)\" k=1\n");
        state.restore();
    }

    #[test]
    #[serial]
    fn test_verbose_gate() {
        let (state, out) = capture();
        set_verbosity(1);
        v(1).info(format_args!("one"));
        v(2).info(format_args!("two"));
        assert!(!v(2).enabled());
        assert_eq!(out.text(), "one\n");
        state.restore();
    }

    #[test]
    #[serial]
    fn test_restore_resets_everything() {
        let before = vmodule();
        let state = capture_state();
        set_vmodule("x=3").unwrap();
        set_verbosity(7);
        enable_contextual_logging(false);
        state.restore();

        assert_eq!(vmodule(), before);
        assert_eq!(verbosity(), Level(0));
        assert!(engine().backend.contextual_enabled());
    }

    #[test]
    #[serial]
    fn test_configure_is_atomic() {
        let state = capture_state();
        set_verbosity(2);
        let bad = Config::new().with_verbosity(5).with_vmodule("no-level");
        assert!(configure(&bad).is_err());
        assert_eq!(verbosity(), Level(2));
        state.restore();
    }
}
