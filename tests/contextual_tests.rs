//! Backend and contextual logging tests
//!
//! These tests verify:
//! - Writer-only backends receive rendered lines while the engine keeps writing
//! - Contextual backends serve structured calls without the engine formatter
//! - Logger handles travel through a Context
//! - Contextual lookup can be switched off
//! - A stuck flush hook does not hold up exit

use parking_lot::Mutex;
use plog::{
    kv, BackendOptions, BackendState, CallSite, Config, Context, FormatOptions, Level, LogSink,
    Logger, Severity, SharedBuffer, State, Value,
};
use serial_test::serial;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Recorded {
    rendered: Vec<(Severity, String)>,
    calls: Vec<String>,
}

/// Backend that records everything it is handed
#[derive(Clone, Default)]
struct RecordingSink {
    name: String,
    values: Vec<Value>,
    log: Arc<Mutex<Recorded>>,
}

impl RecordingSink {
    fn derive(&self, name: String, values: Vec<Value>) -> Arc<dyn LogSink> {
        Arc::new(RecordingSink {
            name,
            values,
            log: Arc::clone(&self.log),
        })
    }

    fn joined(&self, kv: &[Value]) -> String {
        self.values
            .iter()
            .chain(kv)
            .map(|v| v.key_text().into_owned())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl LogSink for RecordingSink {
    fn enabled(&self, _site: &CallSite, level: Level) -> bool {
        level <= Level(2)
    }

    fn info(&self, site: &CallSite, level: Level, msg: &str, kv: &[Value]) {
        let call = format!(
            "info[{}] {} {}:{} {}",
            level,
            self.name,
            site.base_name(),
            msg,
            self.joined(kv)
        );
        self.log.lock().calls.push(call);
    }

    fn error(
        &self,
        _site: &CallSite,
        err: Option<&(dyn std::error::Error + 'static)>,
        msg: &str,
        kv: &[Value],
    ) {
        let err = err.map(|e| e.to_string()).unwrap_or_default();
        let call = format!("error {} {} [{}] {}", self.name, msg, err, self.joined(kv));
        self.log.lock().calls.push(call);
    }

    fn with_values(&self, kv: &[Value]) -> Arc<dyn LogSink> {
        let mut values = self.values.clone();
        values.extend_from_slice(kv);
        self.derive(self.name.clone(), values)
    }

    fn with_name(&self, name: &str) -> Arc<dyn LogSink> {
        let name = if self.name.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.name, name)
        };
        self.derive(name, self.values.clone())
    }

    fn write_rendered(&self, severity: Severity, line: &[u8]) {
        self.log
            .lock()
            .rendered
            .push((severity, String::from_utf8_lossy(line).into_owned()));
    }
}

fn capture() -> (State, SharedBuffer) {
    let state = plog::capture_state();
    let out = SharedBuffer::new();
    let format = FormatOptions {
        skip_headers: true,
        add_dir_header: false,
    };
    plog::configure(&Config::new().with_format(format)).expect("Failed to configure");
    plog::set_output(out.clone());
    (state, out)
}

#[test]
#[serial]
fn test_writer_only_backend_receives_rendered_text() {
    let (state, out) = capture();
    let sink = RecordingSink::default();
    plog::set_logger(Arc::new(sink.clone()));
    assert!(matches!(plog::backend_state(), BackendState::AsWriterOnly(_)));

    let ctx = Context::background();
    plog::from_context(&ctx).info("hello", &kv!["user", "alice"]);
    plog::warning!("plain {}", 1);

    // Still formatted by the engine
    assert_eq!(out.text(), "\"hello\" user=\"alice\"\nplain 1\n");

    let log = sink.log.lock();
    assert!(log.calls.is_empty());
    assert_eq!(
        log.rendered,
        vec![
            (Severity::Info, "\"hello\" user=\"alice\"\n".to_string()),
            (Severity::Warning, "plain 1\n".to_string()),
        ]
    );
    drop(log);

    state.restore();
}

#[test]
#[serial]
fn test_contextual_backend_bypasses_formatter() {
    let (state, out) = capture();
    let sink = RecordingSink::default();
    plog::set_logger_with_options(Arc::new(sink.clone()), BackendOptions::new().contextual(true));
    assert!(matches!(plog::backend_state(), BackendState::AsContextual(_)));

    let logger = plog::from_context(&Context::background());
    logger.with_name("api").with_values(&kv!["req", 7]).info("served", &kv!["status", 200]);
    logger.v(3).info("too verbose", &[]);
    let err = std::io::Error::new(std::io::ErrorKind::Other, "timeout");
    logger.error(Some(&err), "upstream", &kv!["host"]);

    assert!(out.is_empty());
    let log = sink.log.lock();
    assert!(log.rendered.is_empty());
    assert_eq!(
        log.calls,
        vec![
            "info[0] api contextual_tests.rs:served req,7,status,200".to_string(),
            "error  upstream [timeout] host".to_string(),
        ]
    );
    drop(log);

    // Text calls still go through the engine and reach the backend rendered
    plog::info!("text");
    assert_eq!(out.text(), "text\n");
    assert_eq!(sink.log.lock().rendered.len(), 1);

    state.restore();
}

#[test]
#[serial]
fn test_flush_and_exit_bounded_by_slow_flush_hook() {
    let (state, out) = capture();
    let stuck = Arc::new(AtomicBool::new(true));
    let hook_stuck = Arc::clone(&stuck);
    plog::set_logger_with_options(
        Arc::new(RecordingSink::default()),
        BackendOptions::new().flush_hook(move || {
            let deadline = Instant::now() + Duration::from_secs(5);
            while hook_stuck.load(Ordering::SeqCst) && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
        }),
    );

    let code = Arc::new(AtomicI32::new(0));
    let seen = Arc::clone(&code);
    plog::set_exit_hook(move |c| seen.store(c, Ordering::SeqCst));

    plog::info!("before exit");
    let started = Instant::now();
    plog::flush_and_exit(Duration::from_millis(50), 7);
    let elapsed = started.elapsed();

    assert_eq!(code.load(Ordering::SeqCst), 7);
    assert!(elapsed < Duration::from_secs(2), "exit waited {:?}", elapsed);
    // Buffered output is flushed before the hook is reached
    assert_eq!(out.text(), "before exit\n");

    stuck.store(false, Ordering::SeqCst);
    state.restore();
}

#[test]
#[serial]
fn test_flush_hook_runs_on_flush() {
    let (state, _out) = capture();
    let flushes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&flushes);
    plog::set_logger_with_options(
        Arc::new(RecordingSink::default()),
        BackendOptions::new().flush_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    plog::flush();
    assert_eq!(flushes.load(Ordering::SeqCst), 1);

    plog::clear_logger();
    plog::flush();
    assert_eq!(flushes.load(Ordering::SeqCst), 1);
    assert!(plog::backend_state().is_unset());

    state.restore();
}

#[test]
#[serial]
fn test_context_round_trip() {
    let (state, out) = capture();

    let logger = plog::background().with_name("worker");
    let ctx = plog::new_context(&Context::background(), logger.clone());
    let found = plog::from_context(&ctx);
    assert!(found.same_as(&logger));

    found.info("picked up", &kv!["job", 1]);
    assert_eq!(out.text(), "\"worker: picked up\" job=1\n");

    // A context without a logger falls back to the default
    let empty = Context::background();
    assert!(plog::from_context(&empty).sink().is_some());

    state.restore();
}

#[test]
#[serial]
fn test_disabled_contextual_logging_ignores_carrier() {
    let (state, out) = capture();
    let sink = RecordingSink::default();
    let attached = Logger::new(Arc::new(sink.clone()));
    let ctx = plog::new_context(&Context::background(), attached.clone());

    plog::enable_contextual_logging(false);
    let found = plog::from_context(&ctx);
    assert!(!found.same_as(&attached));
    found.info("engine", &[]);

    plog::enable_contextual_logging(true);
    plog::from_context(&ctx).info("backend", &[]);

    assert_eq!(out.text(), "\"engine\"\n");
    assert_eq!(sink.log.lock().calls.len(), 1);

    state.restore();
}

#[test]
#[serial]
fn test_engine_logger_respects_verbosity() {
    let (state, out) = capture();
    plog::set_verbosity(1);

    let logger = plog::background();
    logger.v(1).info("v1", &[]);
    logger.v(2).info("v2", &[]);
    logger
        .v(5)
        .error(None, "errors ignore verbosity", &kv!["odd"]);

    assert_eq!(
        out.text(),
        "\"v1\"\n\"errors ignore verbosity\" odd=\"(MISSING)\"\n"
    );
    state.restore();
}

#[test]
#[serial]
fn test_discard_logger_in_context() {
    let (state, out) = capture();
    let ctx = plog::new_context(&Context::background(), Logger::discard());

    let logger = plog::from_context(&ctx);
    assert!(!logger.enabled());
    logger.info("dropped", &[]);

    assert!(out.is_empty());
    state.restore();
}
