//! Module-gated logging macros.
//!
//! Every module that logs through these macros declares its own switch:
//! ```rust,ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_info};
//!
//! log_info!("detection run {run_id} started");
//! ```
//! Flipping the constant to `false` silences the module without touching
//! `RUST_LOG`. The macros are exported at the crate root.

/// Logs at `$level` when the calling module has `ENABLE_LOGS = true`.
/// Arguments are not evaluated when the module is silenced.
#[macro_export]
macro_rules! log_gated {
    ($level:ident, $($arg:tt)*) => {
        if ENABLE_LOGS {
            log::log!(log::Level::$level, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::log_gated!(Info, $($arg)*) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::log_gated!(Warn, $($arg)*) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::log_gated!(Error, $($arg)*) };
}

/// Per-tick output goes through this one so it stays out of the default
/// `Info` filter.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::log_gated!(Debug, $($arg)*) };
}

/// Whether per-tick feature values should be logged.
/// Enabled with `PUSHCOUNT_DEBUG=1` (or `true`).
pub fn tick_tracing_enabled() -> bool {
    std::env::var("PUSHCOUNT_DEBUG")
        .map(|value| is_truthy(&value))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
