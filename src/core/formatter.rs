//! Record rendering
//!
//! Every line has the layout
//!
//! ```text
//! Lmmdd hh:mm:ss.uuuuuu ppppppp file:line] msg...
//! ```
//!
//! where `L` is the severity letter and `ppppppp` the process id,
//! right-aligned in seven columns. Structured messages follow as
//! `"msg" err="text" key="value" key2=42`.

use super::log_entry::{LogRecord, Message};
use super::severity::Severity;
use super::value::Value;
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

/// Value substituted for the last key of an odd key/value sequence
pub const MISSING: &str = "(MISSING)";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatOptions {
    /// Omit the header prefix
    pub skip_headers: bool,
    /// Show the full source path instead of the file name
    pub add_dir_header: bool,
}

/// Turns records into output bytes
#[derive(Debug, Clone)]
pub struct RecordFormatter {
    options: FormatOptions,
    pid: u32,
}

impl RecordFormatter {
    pub fn new(options: FormatOptions) -> Self {
        Self {
            options,
            pid: std::process::id(),
        }
    }

    #[must_use]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn options(&self) -> FormatOptions {
        self.options
    }

    /// Full line for `record`, always ending in exactly one newline
    pub fn render(&self, record: &LogRecord) -> Vec<u8> {
        let mut out = String::with_capacity(128);
        if !self.options.skip_headers {
            let file = if self.options.add_dir_header {
                record.site.file
            } else {
                record.site.base_name()
            };
            write_header(
                &mut out,
                record.severity,
                &record.timestamp,
                self.pid,
                file,
                record.site.line,
            );
        }
        write_message(&mut out, &record.message);
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.into_bytes()
    }
}

impl Default for RecordFormatter {
    fn default() -> Self {
        Self::new(FormatOptions::default())
    }
}

/// Header prefix for one line
pub fn render_header<Tz>(
    severity: Severity,
    time: &DateTime<Tz>,
    pid: u32,
    file: &str,
    line: u32,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let mut out = String::with_capacity(48);
    write_header(&mut out, severity, time, pid, file, line);
    out
}

fn write_header<Tz>(
    out: &mut String,
    severity: Severity,
    time: &DateTime<Tz>,
    pid: u32,
    file: &str,
    line: u32,
) where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let _ = write!(
        out,
        "{}{} {:>7} {}:{}] ",
        severity.letter(),
        time.format("%m%d %H:%M:%S%.6f"),
        pid,
        file,
        line
    );
}

/// Message part of a record, without header or trailing newline handling
pub fn render_message(message: &Message) -> String {
    let mut out = String::new();
    write_message(&mut out, message);
    out
}

fn write_message(out: &mut String, message: &Message) {
    match message {
        Message::Text(text) => out.push_str(text),
        Message::Structured { msg, err, kv } => {
            write_quoted(out, msg);
            if let Some(err) = err {
                out.push_str(" err=");
                write_quoted(out, err);
            }
            write_kv(out, kv);
        }
    }
}

/// ` key=value` pairs, padding an odd sequence with `(MISSING)`
pub fn render_kv(kv: &[Value]) -> String {
    let mut out = String::new();
    write_kv(&mut out, kv);
    out
}

fn write_kv(out: &mut String, kv: &[Value]) {
    for pair in kv.chunks(2) {
        out.push(' ');
        out.push_str(&pair[0].key_text());
        out.push('=');
        match pair.get(1) {
            Some(value) => write_value(out, value),
            None => write_quoted(out, MISSING),
        }
    }
}

/// Pad an odd sequence so that every key has a value
pub fn pad_missing(kv: &mut Vec<Value>) {
    if kv.len() % 2 == 1 {
        kv.push(Value::Str(MISSING.to_string()));
    }
}

pub(crate) fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Str(s) | Value::Display(s) | Value::Error(s) => write_quoted(out, s),
        Value::Int(i) => {
            let _ = write!(out, "{}", i);
        }
        Value::Uint(u) => {
            let _ = write!(out, "{}", u);
        }
        Value::Float(f) => {
            let _ = write!(out, "{}", f);
        }
        Value::Float32(f) => {
            let _ = write!(out, "{}", f);
        }
        Value::Bool(b) => {
            let _ = write!(out, "{}", b);
        }
        Value::Structured(serde_json::Value::String(s)) => write_quoted(out, s),
        Value::Structured(json) => {
            let _ = write!(out, "{}", json);
        }
        Value::Dump(s) => out.push_str(s),
        Value::Bytes(bytes) => write_quoted(out, &String::from_utf8_lossy(bytes)),
        Value::Object(obj) => write_quoted(out, &obj.to_string()),
        Value::Objects(list) => {
            out.push('[');
            for (i, obj) in list.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                let _ = write!(out, "{}", obj);
            }
            out.push(']');
        }
        Value::Null => out.push_str("<nil>"),
    }
}

/// `s` in double quotes with JSON escaping
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    write_quoted(&mut out, s);
    out
}

fn write_quoted(out: &mut String, s: &str) {
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => {
            let _ = write!(out, "{:?}", s);
        }
    }
}
