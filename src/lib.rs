//! devserve
//!
//! Static file server for local development. Files are served from a single
//! root directory and every response tells clients not to cache it.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;

pub use config::{AppState, Config};
pub use error::ServerError;
