//! Background flushing
//!
//! [`FlushDaemon`] runs a flush function on a dedicated thread at a fixed
//! interval until stopped. [`flush_with_timeout`] is the one-shot variant
//! used before a fatal exit: the flush runs on its own thread and the caller
//! waits at most `timeout` for it.

use super::error::{LoggerError, Result};
use crossbeam_channel::{bounded, select, tick, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct Running {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Periodic flusher on a background thread
#[derive(Default)]
pub struct FlushDaemon {
    running: Mutex<Option<Running>>,
}

impl FlushDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start flushing every `interval`. Does nothing when already running.
    ///
    /// Returns `true` if a new thread was started.
    pub fn run<F>(&self, interval: Duration, flush: F) -> bool
    where
        F: Fn() + Send + 'static,
    {
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let spawned = thread::Builder::new()
            .name("plog-flush".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            if catch_unwind(AssertUnwindSafe(&flush)).is_err() {
                                eprintln!("[plog ERROR] periodic flush panicked");
                            }
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
            });

        match spawned {
            Ok(handle) => {
                *running = Some(Running {
                    stop: stop_tx,
                    handle,
                });
                true
            }
            Err(e) => {
                eprintln!("[plog ERROR] cannot start flush daemon: {}", e);
                false
            }
        }
    }

    /// Stop the thread and wait for it to exit, including a flush that is
    /// in progress. Safe to call repeatedly and from any thread.
    pub fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        drop(running.stop);

        // A flush calling stop() would otherwise wait for itself
        if running.handle.thread().id() == thread::current().id() {
            return;
        }
        if running.handle.join().is_err() {
            eprintln!("[plog ERROR] flush daemon thread panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }
}

impl Drop for FlushDaemon {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run `flush` on a separate thread and wait at most `timeout` for it.
///
/// # Errors
///
/// [`LoggerError::FlushTimeout`] when the flush is still running after
/// `timeout`; the error of `flush` itself otherwise. A flush that times out
/// keeps running detached.
pub fn flush_with_timeout<F>(timeout: Duration, flush: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let (done_tx, done_rx) = bounded(1);
    thread::Builder::new()
        .name("plog-exit-flush".to_string())
        .spawn(move || {
            let _ = done_tx.send(flush());
        })
        .map_err(|e| LoggerError::io_operation("spawning", "plog-exit-flush", e))?;

    match done_rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(LoggerError::FlushTimeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(LoggerError::other("flush thread panicked")),
    }
}
