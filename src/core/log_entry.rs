//! Log record structure

use super::severity::Severity;
use super::value::Value;
use chrono::{DateTime, Local};
use std::cell::RefCell;
use std::panic::Location;

// Thread-local cache for the thread id to avoid repeated allocations
thread_local! {
    static THREAD_ID_CACHE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Get cached thread ID, computing and caching it on first access
fn get_thread_id() -> String {
    THREAD_ID_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .get_or_insert_with(|| format!("{:?}", std::thread::current().id()))
            .clone()
    })
}

/// Source location of a log call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
}

impl CallSite {
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }

    /// Location of the caller of the `#[track_caller]` chain
    #[track_caller]
    pub fn caller() -> Self {
        Location::caller().into()
    }

    /// File name without directories
    pub fn base_name(&self) -> &'static str {
        let file: &'static str = self.file;
        file.rsplit(&['/', '\\'][..]).next().unwrap_or(file)
    }
}

impl From<&'static Location<'static>> for CallSite {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

/// Body of a record
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Already formatted free-form text
    Text(String),
    /// Message plus optional error text and an ordered key/value sequence
    Structured {
        msg: String,
        err: Option<String>,
        kv: Vec<Value>,
    },
}

impl Message {
    pub fn structured(msg: impl Into<String>, kv: Vec<Value>) -> Self {
        Message::Structured {
            msg: msg.into(),
            err: None,
            kv,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub severity: Severity,
    pub timestamp: DateTime<Local>,
    pub site: CallSite,
    pub thread_id: String,
    pub message: Message,
}

impl LogRecord {
    pub fn new(severity: Severity, site: CallSite, message: Message) -> Self {
        Self {
            severity,
            timestamp: Local::now(),
            site,
            thread_id: get_thread_id(),
            message,
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
