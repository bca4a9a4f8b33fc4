//! Logging macros for ergonomic log message formatting.
//!
//! The severity macros take `format!`-style arguments; a template that does
//! not match its arguments is a compile error.
//!
//! # Examples
//!
//! ```
//! use plog::{info, info_s, v_info, warning};
//!
//! let port = 8080;
//! info!("Server listening on port {}", port);
//! warning!("{} connections dropped", 3);
//! v_info!(2, "only shown at verbosity 2 and above");
//! info_s!("request done", "path", "/health", "status", 200);
//! ```

/// Build a key/value sequence, converting every element into a `Value`.
///
/// ```
/// use plog::{kv, Value};
///
/// let pairs = kv!["user", "alice", "attempts", 3];
/// assert_eq!(pairs[3], Value::Int(3));
/// ```
#[macro_export]
macro_rules! kv {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($value)),+]
    };
}

/// Log formatted text at INFO.
#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => {
        $crate::info(::std::format_args!($($arg)+))
    };
}

/// Log formatted text at WARNING.
#[macro_export]
macro_rules! warning {
    ($($arg:tt)+) => {
        $crate::warning(::std::format_args!($($arg)+))
    };
}

/// Log formatted text at ERROR.
#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => {
        $crate::error(::std::format_args!($($arg)+))
    };
}

/// Log formatted text at FATAL, then flush and exit.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)+) => {
        $crate::fatal(::std::format_args!($($arg)+))
    };
}

/// Log formatted text at INFO when verbosity `level` is enabled for the
/// calling file. The arguments are not evaluated otherwise.
#[macro_export]
macro_rules! v_info {
    ($level:expr, $($arg:tt)+) => {{
        let verbose = $crate::v($level);
        if verbose.enabled() {
            verbose.info(::std::format_args!($($arg)+));
        }
    }};
}

/// Structured INFO record from a message and alternating keys and values.
#[macro_export]
macro_rules! info_s {
    ($msg:expr $(, $value:expr)* $(,)?) => {
        $crate::info_s($msg, &$crate::kv![$($value),*])
    };
}

/// Structured ERROR record; `$err` is an `Option<&dyn Error>`.
#[macro_export]
macro_rules! error_s {
    ($err:expr, $msg:expr $(, $value:expr)* $(,)?) => {
        $crate::error_s($err, $msg, &$crate::kv![$($value),*])
    };
}
