// Configuration module entry point
// Builds the typed configuration and resolves the served root directory

mod state;
mod types;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::ServerError;

// Re-export public types
pub use state::AppState;
pub use types::{Config, HttpConfig, LoggingConfig, PerformanceConfig, ServerConfig};

/// Fixed development port
pub const DEFAULT_PORT: u16 = 8000;

impl Config {
    /// Load the built-in configuration.
    ///
    /// No file or environment source is consulted; the server always starts on
    /// all interfaces at port 8000, serving the executable's directory.
    pub fn load() -> Result<Self, ServerError> {
        Self::load_with_overrides(Vec::new())
    }

    /// Load the built-in configuration with individual keys replaced,
    /// e.g. `("server.port", 0_i64.into())`.
    pub fn load_with_overrides(
        overrides: Vec<(&str, ::config::Value)>,
    ) -> Result<Self, ServerError> {
        let mut builder = ::config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", i64::from(DEFAULT_PORT))?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "simple")?
            .set_default(
                "http.server_name",
                concat!("devserve/", env!("CARGO_PKG_VERSION")),
            )?
            .set_default("http.index_files", vec!["index.html", "index.htm"])?
            .set_default("performance.keep_alive", true)?
            .set_default("performance.connection_timeout", 60)?;

        for (key, value) in overrides {
            builder = builder.set_override(key, value)?;
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, ServerError> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        addr.parse()
            .map_err(|source| ServerError::InvalidAddress { addr, source })
    }

    /// Resolve the directory to serve, once, at startup.
    ///
    /// Uses `server.root` when set, otherwise the directory that contains the
    /// running executable. The result is canonical so later lookups do not
    /// depend on the process working directory.
    pub fn resolve_root(&self) -> Result<PathBuf, ServerError> {
        let candidate = match self.server.root.as_deref() {
            Some(root) => PathBuf::from(root),
            None => executable_dir()?,
        };

        let root = candidate
            .canonicalize()
            .map_err(|source| ServerError::RootDir {
                path: candidate.clone(),
                source,
            })?;

        if !root.is_dir() {
            return Err(ServerError::RootDir {
                path: root,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }

        Ok(root)
    }
}

fn executable_dir() -> Result<PathBuf, ServerError> {
    let exe = std::env::current_exe()?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| ServerError::RootDir {
            path: exe.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "executable has no parent directory",
            ),
        })
}
