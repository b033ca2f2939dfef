//! Logger setup for the vidtap binary.
//!
//! stdout carries the bridge protocol, so terminal output always goes to
//! stderr.

use std::fs::File;

use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

use crate::config::{LogConfig, LogDestination};

/// Installs the global logger described by `config`.
///
/// A log file that cannot be created is reported on stderr and skipped.
pub fn initialize(config: &LogConfig) {
    let level = config.level.filter();
    let simple = build_config();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    if matches!(
        config.destination,
        LogDestination::Stderr | LogDestination::Both
    ) {
        loggers.push(TermLogger::new(
            level,
            simple.clone(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }
    if matches!(
        config.destination,
        LogDestination::File | LogDestination::Both
    ) {
        match File::create(&config.file) {
            Ok(file) => loggers.push(WriteLogger::new(level, simple, file)),
            Err(err) => {
                eprintln!(
                    "Warning: Could not create log file at {:?}: {}",
                    config.file, err
                );
            }
        }
    }
    if loggers.is_empty() {
        return;
    }

    let _ = CombinedLogger::init(loggers);
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(log::LevelFilter::Error)
        .build()
}
