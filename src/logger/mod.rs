//! Logger module
//!
//! Provides logging utilities for the server including:
//! - Server lifecycle logging
//! - Access logging with multiple formats
//! - Error and warning logging

mod format;
pub mod writer;

pub use format::AccessLogEntry;
pub use writer::LogLevel;

use crate::config::Config;
use std::net::SocketAddr;
use std::path::Path;

/// Initialize the logger with configuration
///
/// Should be called once at application startup.
pub fn init(config: &Config) {
    writer::init(LogLevel::parse(&config.logging.level));
}

fn write_debug(message: &str) {
    writer::write(LogLevel::Debug, message);
}

fn write_info(message: &str) {
    writer::write(LogLevel::Info, message);
}

fn write_error(message: &str) {
    writer::write(LogLevel::Error, message);
}

/// URL shown to the user; wildcard hosts are presented as localhost
pub fn display_url(addr: &SocketAddr) -> String {
    if addr.ip().is_unspecified() || addr.ip().is_loopback() {
        format!("http://localhost:{}", addr.port())
    } else {
        format!("http://{addr}")
    }
}

pub fn log_server_start(addr: &SocketAddr, root: &Path, config: &Config) {
    write_info(&format!("Server running at {}", display_url(addr)));
    write_debug(&format!("Bound to: {addr}"));
    write_debug(&format!("Serving directory: {}", root.display()));
    if let Some(workers) = config.server.workers {
        write_debug(&format!("Worker threads: {workers}"));
    }
}

pub fn log_shutdown() {
    write_info("\nShutting down server");
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    write_debug(&format!("[Connection] Accepted from: {peer_addr}"));
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    write_error(&format!("[ERROR] Failed to serve connection: {err:?}"));
}

pub fn log_error(message: &str) {
    write_error(&format!("[ERROR] {message}"));
}

pub fn log_warning(message: &str) {
    writer::write(LogLevel::Warn, &format!("[WARN] {message}"));
}

/// Log formatted access log entry
///
/// Access lines go to stderr like the classic development servers, leaving
/// stdout for the startup banner.
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    if writer::enabled(LogLevel::Info) {
        eprintln!("{}", entry.format(format));
    }
}
