//! Pluggable logging backends
//!
//! A backend implements [`LogSink`]. Installed with
//! [`set_logger`](crate::set_logger) it receives every line the engine
//! renders; installed with `contextual(true)` it additionally becomes the
//! process default [`Logger`](crate::Logger), so structured calls through
//! that handle reach it without going through the engine's formatter.

use super::log_entry::CallSite;
use super::severity::Severity;
use super::value::Value;
use super::verbosity::Level;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Capability set of a logging backend.
///
/// Implementations must tolerate odd key/value sequences, repeated keys and
/// keys of any type.
pub trait LogSink: Send + Sync {
    /// Whether a call at verbosity `level` from `site` would be logged
    fn enabled(&self, site: &CallSite, level: Level) -> bool;

    fn info(&self, site: &CallSite, level: Level, msg: &str, kv: &[Value]);

    fn error(
        &self,
        site: &CallSite,
        err: Option<&(dyn std::error::Error + 'static)>,
        msg: &str,
        kv: &[Value],
    );

    /// Sink that adds `kv` to every call, after any values added before
    fn with_values(&self, kv: &[Value]) -> Arc<dyn LogSink>;

    /// Sink with `name` appended to its name
    fn with_name(&self, name: &str) -> Arc<dyn LogSink>;

    /// A line rendered by the engine, header and newline included
    fn write_rendered(&self, severity: Severity, line: &[u8]) {
        let _ = (severity, line);
    }
}

pub type FlushHook = Arc<dyn Fn() + Send + Sync>;

/// Options for [`set_logger_with_options`](crate::set_logger_with_options)
#[derive(Clone, Default)]
pub struct BackendOptions {
    contextual: bool,
    flush: Option<FlushHook>,
}

impl BackendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also use the backend as the process default logger
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn contextual(mut self, enabled: bool) -> Self {
        self.contextual = enabled;
        self
    }

    /// Called whenever the engine flushes
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn flush_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.flush = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for BackendOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendOptions")
            .field("contextual", &self.contextual)
            .field("flush", &self.flush.is_some())
            .finish()
    }
}

/// Which backend is installed and how
#[derive(Clone, Default)]
pub enum BackendState {
    #[default]
    Unset,
    /// Receives rendered lines only
    AsWriterOnly(Arc<dyn LogSink>),
    /// Receives rendered lines and serves as the default logger
    AsContextual(Arc<dyn LogSink>),
}

impl BackendState {
    pub fn sink(&self) -> Option<&Arc<dyn LogSink>> {
        match self {
            BackendState::Unset => None,
            BackendState::AsWriterOnly(sink) | BackendState::AsContextual(sink) => Some(sink),
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, BackendState::Unset)
    }
}

impl fmt::Debug for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendState::Unset => f.write_str("Unset"),
            BackendState::AsWriterOnly(_) => f.write_str("AsWriterOnly(..)"),
            BackendState::AsContextual(_) => f.write_str("AsContextual(..)"),
        }
    }
}

#[derive(Clone)]
pub(crate) struct BridgeSnapshot {
    state: BackendState,
    flush: Option<FlushHook>,
    contextual_enabled: bool,
}

/// Process-wide backend selection, read without locking
pub struct BackendBridge {
    current: ArcSwap<BridgeSnapshot>,
    write_lock: Mutex<()>,
}

impl BackendBridge {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(BridgeSnapshot {
                state: BackendState::Unset,
                flush: None,
                contextual_enabled: true,
            }),
            write_lock: Mutex::new(()),
        }
    }

    /// Install `sink` as a receiver of rendered lines
    pub fn set(&self, sink: Arc<dyn LogSink>) {
        self.set_with_options(sink, BackendOptions::default());
    }

    pub fn set_with_options(&self, sink: Arc<dyn LogSink>, options: BackendOptions) {
        let state = if options.contextual {
            BackendState::AsContextual(sink)
        } else {
            BackendState::AsWriterOnly(sink)
        };
        self.update(|snapshot| {
            snapshot.state = state;
            snapshot.flush = options.flush;
        });
    }

    pub fn clear(&self) {
        self.update(|snapshot| {
            snapshot.state = BackendState::Unset;
            snapshot.flush = None;
        });
    }

    pub fn state(&self) -> BackendState {
        self.current.load().state.clone()
    }

    /// The backend, when it serves as the default logger
    pub fn contextual_sink(&self) -> Option<Arc<dyn LogSink>> {
        match &self.current.load().state {
            BackendState::AsContextual(sink) => Some(Arc::clone(sink)),
            _ => None,
        }
    }

    pub fn set_contextual_enabled(&self, enabled: bool) {
        self.update(|snapshot| snapshot.contextual_enabled = enabled);
    }

    pub fn contextual_enabled(&self) -> bool {
        self.current.load().contextual_enabled
    }

    /// Hand a rendered line to the installed backend, if any
    pub fn forward(&self, severity: Severity, line: &[u8]) {
        let snapshot = self.current.load();
        if let Some(sink) = snapshot.state.sink() {
            let result = catch_unwind(AssertUnwindSafe(|| sink.write_rendered(severity, line)));
            if result.is_err() {
                eprintln!("[plog ERROR] backend panicked while receiving a {} line", severity);
            }
        }
    }

    /// Run the backend's flush hook, if any
    pub fn flush(&self) {
        let hook = self.current.load().flush.clone();
        if let Some(hook) = hook {
            if catch_unwind(AssertUnwindSafe(|| hook())).is_err() {
                eprintln!("[plog ERROR] backend flush hook panicked");
            }
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<BridgeSnapshot> {
        self.current.load_full()
    }

    pub(crate) fn restore(&self, snapshot: Arc<BridgeSnapshot>) {
        let _guard = self.write_lock.lock();
        self.current.store(snapshot);
    }

    fn update(&self, change: impl FnOnce(&mut BridgeSnapshot)) {
        let _guard = self.write_lock.lock();
        let mut next = BridgeSnapshot::clone(&self.current.load());
        change(&mut next);
        self.current.store(Arc::new(next));
    }
}

impl Default for BackendBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<(Severity, String)>>,
    }

    impl LogSink for Recorder {
        fn enabled(&self, _site: &CallSite, _level: Level) -> bool {
            true
        }

        fn info(&self, _site: &CallSite, _level: Level, _msg: &str, _kv: &[Value]) {}

        fn error(
            &self,
            _site: &CallSite,
            _err: Option<&(dyn std::error::Error + 'static)>,
            _msg: &str,
            _kv: &[Value],
        ) {
        }

        fn with_values(&self, _kv: &[Value]) -> Arc<dyn LogSink> {
            Arc::new(Recorder::default())
        }

        fn with_name(&self, _name: &str) -> Arc<dyn LogSink> {
            Arc::new(Recorder::default())
        }

        fn write_rendered(&self, severity: Severity, line: &[u8]) {
            self.lines
                .lock()
                .push((severity, String::from_utf8_lossy(line).into_owned()));
        }
    }

    struct Panicky;

    impl LogSink for Panicky {
        fn enabled(&self, _site: &CallSite, _level: Level) -> bool {
            true
        }

        fn info(&self, _site: &CallSite, _level: Level, _msg: &str, _kv: &[Value]) {}

        fn error(
            &self,
            _site: &CallSite,
            _err: Option<&(dyn std::error::Error + 'static)>,
            _msg: &str,
            _kv: &[Value],
        ) {
        }

        fn with_values(&self, _kv: &[Value]) -> Arc<dyn LogSink> {
            Arc::new(Panicky)
        }

        fn with_name(&self, _name: &str) -> Arc<dyn LogSink> {
            Arc::new(Panicky)
        }

        fn write_rendered(&self, _severity: Severity, _line: &[u8]) {
            panic!("backend failure");
        }
    }

    #[test]
    fn test_state_transitions() {
        let bridge = BackendBridge::new();
        assert!(bridge.state().is_unset());

        let sink: Arc<dyn LogSink> = Arc::new(Recorder::default());
        bridge.set(Arc::clone(&sink));
        assert!(matches!(bridge.state(), BackendState::AsWriterOnly(_)));
        assert!(bridge.contextual_sink().is_none());

        bridge.set_with_options(Arc::clone(&sink), BackendOptions::new().contextual(true));
        assert!(matches!(bridge.state(), BackendState::AsContextual(_)));
        assert!(bridge.contextual_sink().is_some());

        bridge.clear();
        assert!(bridge.state().is_unset());
    }

    #[test]
    fn test_forward_reaches_sink() {
        let bridge = BackendBridge::new();
        let recorder = Arc::new(Recorder::default());
        bridge.set(recorder.clone());

        bridge.forward(Severity::Warning, b"W line\n");
        let lines = recorder.lines.lock();
        assert_eq!(lines.as_slice(), &[(Severity::Warning, "W line\n".to_string())]);
    }

    #[test]
    fn test_panicking_backend_is_contained() {
        let bridge = BackendBridge::new();
        bridge.set(Arc::new(Panicky));
        bridge.forward(Severity::Info, b"x\n");
    }

    #[test]
    fn test_flush_hook() {
        let bridge = BackendBridge::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        bridge.set_with_options(
            Arc::new(Recorder::default()),
            BackendOptions::new().flush_hook(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        bridge.flush();
        bridge.flush();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        bridge.clear();
        bridge.flush();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_contextual_flag_survives_backend_changes() {
        let bridge = BackendBridge::new();
        bridge.set_contextual_enabled(false);
        bridge.set(Arc::new(Recorder::default()));
        assert!(!bridge.contextual_enabled());
    }
}
