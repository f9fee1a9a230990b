//! Log writer module
//!
//! Routes messages to stdout/stderr and drops anything below the configured level.

use std::sync::OnceLock;

/// Level fixed once at startup
static LOG_LEVEL: OnceLock<LogLevel> = OnceLock::new();

/// Message severity, ordered from most to least verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a level name, falling back to `Info` for unknown values
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }
}

/// Set the global level
///
/// Only the first call has an effect; returns false if the level was already set.
pub fn init(level: LogLevel) -> bool {
    LOG_LEVEL.set(level).is_ok()
}

fn current_level() -> LogLevel {
    LOG_LEVEL.get().copied().unwrap_or(LogLevel::Info)
}

pub fn enabled(level: LogLevel) -> bool {
    level >= current_level()
}

/// Write a message if its level passes the filter
pub fn write(level: LogLevel, message: &str) {
    if !enabled(level) {
        return;
    }
    match level {
        LogLevel::Debug | LogLevel::Info => println!("{message}"),
        LogLevel::Warn | LogLevel::Error => eprintln!("{message}"),
    }
}
