#![deny(missing_docs)]
//! Shared logging utilities for the vidtap workspace.
//!
//! This crate provides the `tap_*` logging macros used across the codebase,
//! the tab-scoped `tab_*` variants, and a minimal test initializer for the
//! global logger.

#[doc(hidden)]
pub use log;

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! tap_trace {
    ($($arg:tt)*) => {{
        $crate::log::trace!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! tap_debug {
    ($($arg:tt)*) => {{
        $crate::log::debug!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! tap_info {
    ($($arg:tt)*) => {{
        $crate::log::info!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! tap_warn {
    ($($arg:tt)*) => {{
        $crate::log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! tap_error {
    ($($arg:tt)*) => {{
        $crate::log::error!($($arg)*);
    }};
}

/// Logs a debug-level message prefixed with `[tab N]`.
#[macro_export]
macro_rules! tab_debug {
    ($tab:expr, $($arg:tt)*) => {{
        $crate::log::debug!("[tab {}] {}", $tab, format_args!($($arg)*));
    }};
}

/// Logs an info-level message prefixed with `[tab N]`.
#[macro_export]
macro_rules! tab_info {
    ($tab:expr, $($arg:tt)*) => {{
        $crate::log::info!("[tab {}] {}", $tab, format_args!($($arg)*));
    }};
}

/// Logs a warn-level message prefixed with `[tab N]`.
#[macro_export]
macro_rules! tab_warn {
    ($tab:expr, $($arg:tt)*) => {{
        $crate::log::warn!("[tab {}] {}", $tab, format_args!($($arg)*));
    }};
}

/// Logs an error-level message prefixed with `[tab N]`.
#[macro_export]
macro_rules! tab_error {
    ($tab:expr, $($arg:tt)*) => {{
        $crate::log::error!("[tab {}] {}", $tab, format_args!($($arg)*));
    }};
}

/// Initializes a simple terminal logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )]);
}
