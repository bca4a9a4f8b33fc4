//! Key/value payload for structured calls
//!
//! Structured calls take an ordered `Vec<Value>` holding alternating keys and
//! values. Keys are usually strings but any value is accepted; the sequence
//! may be odd, in which case the renderer supplies a `(MISSING)` value.

use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

/// One entry of a key/value sequence
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    /// Kept narrow so it prints with single precision
    Float32(f32),
    Bool(bool),
    /// Text of an error value
    Error(String),
    /// Result of a value's string conversion
    Display(String),
    /// Output of a structured-data (marshal) hook
    Structured(serde_json::Value),
    /// Structural dump of a value without either hook, rendered bare
    Dump(String),
    Bytes(Vec<u8>),
    Object(ObjectRef),
    Objects(Vec<ObjectRef>),
    Null,
}

impl Value {
    /// Render an error through its text
    pub fn error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Value::Error(err.to_string())
    }

    /// Render a value through its string conversion
    pub fn display<T: fmt::Display + ?Sized>(value: &T) -> Self {
        Value::Display(value.to_string())
    }

    /// Structural dump of a value's fields
    pub fn debug<T: fmt::Debug + ?Sized>(value: &T) -> Self {
        Value::Dump(format!("{:?}", value))
    }

    /// Render a value through its structured-data hook. Any string
    /// conversion the type has is not consulted.
    pub fn marshal<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => Value::Structured(json),
            Err(e) => Value::Error(format!("<marshal failed: {}>", e)),
        }
    }

    /// Text used when this value appears in key position
    pub fn key_text(&self) -> Cow<'_, str> {
        match self {
            Value::Str(s) | Value::Error(s) | Value::Display(s) | Value::Dump(s) => {
                Cow::Borrowed(s.as_str())
            }
            Value::Object(obj) => Cow::Owned(obj.to_string()),
            other => Cow::Owned(other.to_string()),
        }
    }

    /// Convert to serde_json::Value for sinks that emit JSON
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Str(s) | Value::Error(s) | Value::Display(s) | Value::Dump(s) => {
                Json::String(s.clone())
            }
            Value::Int(i) => Json::Number((*i).into()),
            Value::Uint(u) => Json::Number((*u).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Float32(f) => f
                .to_string()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Bool(b) => Json::Bool(*b),
            Value::Structured(json) => json.clone(),
            Value::Bytes(bytes) => Json::String(String::from_utf8_lossy(bytes).into_owned()),
            Value::Object(obj) => Json::String(obj.to_string()),
            Value::Objects(list) => {
                Json::Array(list.iter().map(|o| Json::String(o.to_string())).collect())
            }
            Value::Null => Json::Null,
        }
    }
}

impl fmt::Display for Value {
    /// Same text as the value part of a rendered `key=value` pair
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        crate::core::formatter::write_value(&mut out, self);
        f.write_str(&out)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Str(s.clone())
    }
}

impl From<Cow<'_, str>> for Value {
    fn from(s: Cow<'_, str>) -> Self {
        Value::Str(s.into_owned())
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Str(c.to_string())
    }
}

macro_rules! impl_from_int {
    ($variant:ident, $target:ty; $($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v as $target)
                }
            }
        )*
    };
}

impl_from_int!(Int, i64; i8, i16, i32, i64, isize);
impl_from_int!(Uint, u64; u8, u16, u32, u64, usize);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Value::Display(format!("{:?}", d))
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::Bytes(bytes.to_vec())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::Structured(json)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

impl From<Vec<ObjectRef>> for Value {
    fn from(list: Vec<ObjectRef>) -> Self {
        Value::Objects(list)
    }
}

impl From<Formatted> for Value {
    fn from(formatted: Formatted) -> Self {
        Value::Structured(formatted.json)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

/// Anything with a name and an optional namespace
pub trait ObjectMeta {
    fn name(&self) -> &str;

    fn namespace(&self) -> &str {
        ""
    }
}

/// Reference to a named object, rendered as `namespace/name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectRef {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Reference to an object implementing [`ObjectMeta`]
pub fn k_obj<T: ObjectMeta + ?Sized>(obj: &T) -> ObjectRef {
    ObjectRef {
        name: obj.name().to_string(),
        namespace: obj.namespace().to_string(),
    }
}

/// Reference built from a namespace and a name
pub fn k_ref(namespace: impl Into<String>, name: impl Into<String>) -> ObjectRef {
    ObjectRef {
        name: name.into(),
        namespace: namespace.into(),
    }
}

/// References to every object of a slice
pub fn k_objs<T: ObjectMeta>(objs: &[T]) -> Vec<ObjectRef> {
    objs.iter().map(|o| k_obj(o)).collect()
}

/// A value rendered through its structured-data hook.
///
/// Displaying it gives indented JSON followed by a newline; as a key/value
/// argument it carries the JSON itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Formatted {
    json: serde_json::Value,
}

/// Wrap `obj` so that it prints as indented JSON
pub fn format<T: Serialize + ?Sized>(obj: &T) -> Formatted {
    let json = serde_json::to_value(obj)
        .unwrap_or_else(|e| serde_json::Value::String(format!("<marshal failed: {}>", e)));
    Formatted { json }
}

impl Formatted {
    pub fn marshal_log(&self) -> &serde_json::Value {
        &self.json
    }
}

impl fmt::Display for Formatted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pretty = serde_json::to_string_pretty(&self.json).map_err(|_| fmt::Error)?;
        writeln!(f, "{}", pretty)
    }
}
