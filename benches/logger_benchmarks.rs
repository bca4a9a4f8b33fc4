//! Criterion benchmarks for plog

use chrono::Local;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use plog::core::formatter::RecordFormatter;
use plog::core::{LogRecord, Message, VerbosityController};
use plog::prelude::*;
use plog::{kv, FormatOptions};
use std::sync::Arc;

/// Route every line into `io::sink()` so only engine cost is measured
fn discard_output() -> plog::State {
    let state = plog::capture_state();
    plog::set_output(SharedWriter::new(std::io::sink()));
    state
}

// ============================================================================
// Verbosity Check Benchmarks
// ============================================================================

fn bench_verbosity_checks(c: &mut Criterion) {
    let mut group = c.benchmark_group("verbosity_check");
    group.throughput(Throughput::Elements(1));

    let plain = VerbosityController::with_level(Level(2));
    group.bench_function("global_only", |b| {
        b.iter(|| black_box(plain.enabled(black_box(Level(3)), black_box("src/net/conn.rs"))));
    });

    let ruled = VerbosityController::with_level(Level(0));
    ruled
        .set_vmodule("gc=1,recordio=2,net/*=4,*_test=5,conn=3")
        .expect("valid vmodule");
    group.bench_function("with_rules_cached", |b| {
        b.iter(|| black_box(ruled.enabled(black_box(Level(3)), black_box("src/net/conn.rs"))));
    });

    group.bench_function("v_disabled", |b| {
        b.iter(|| black_box(plog::v(black_box(9)).enabled()));
    });

    group.finish();
}

// ============================================================================
// Formatting Benchmarks
// ============================================================================

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    group.throughput(Throughput::Elements(1));

    let formatter = RecordFormatter::new(FormatOptions::default());
    let now = Local::now();

    let text = LogRecord::new(
        Severity::Info,
        CallSite::new("src/server.rs", 120),
        Message::Text("Server listening on port 8080".to_string()),
    )
    .with_timestamp(now);
    group.bench_function("text", |b| {
        b.iter(|| black_box(formatter.render(black_box(&text))));
    });

    let structured = LogRecord::new(
        Severity::Info,
        CallSite::new("src/server.rs", 121),
        Message::structured(
            "Request handled",
            kv!["method", "GET", "path", "/api/v1/pods", "status", 200, "latency_ms", 3.5],
        ),
    )
    .with_timestamp(now);
    group.bench_function("structured", |b| {
        b.iter(|| black_box(formatter.render(black_box(&structured))));
    });

    group.finish();
}

// ============================================================================
// Engine Benchmarks
// ============================================================================

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Elements(1));
    let state = discard_output();

    group.bench_function("info", |b| {
        b.iter(|| plog::info!("Processed {} items", black_box(42)));
    });

    group.bench_function("info_s", |b| {
        b.iter(|| {
            plog::info_s(
                "Processed items",
                &kv!["count", black_box(42), "queue", "default"],
            )
        });
    });

    let logger = plog::background().with_name("worker").with_values(&kv!["id", 7]);
    group.bench_function("logger_with_values", |b| {
        b.iter(|| logger.info("tick", &kv!["seq", black_box(1)]));
    });

    group.bench_function("multi_thread_4", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    std::thread::spawn(move || {
                        for i in 0..100 {
                            plog::info_s("Concurrent message", &kv!["thread", t, "i", i]);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        });
    });

    let backend: Arc<dyn LogSink> = Arc::new(NullSink);
    plog::set_logger(backend);
    group.bench_function("info_with_backend", |b| {
        b.iter(|| plog::info!("Forwarded {}", black_box("line")));
    });

    group.finish();
    state.restore();
}

struct NullSink;

impl LogSink for NullSink {
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
        Arc::new(NullSink)
    }

    fn with_name(&self, _name: &str) -> Arc<dyn LogSink> {
        Arc::new(NullSink)
    }

    fn write_rendered(&self, severity: Severity, line: &[u8]) {
        black_box((severity, line));
    }
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(benches, bench_verbosity_checks, bench_render, bench_engine);

criterion_main!(benches);
