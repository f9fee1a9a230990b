// Application state module
// Holds the read-only values every connection needs

use std::path::{Path, PathBuf};

use super::types::Config;

/// Application state shared by all connections
#[derive(Debug)]
pub struct AppState {
    pub config: Config,
    /// Canonical directory that request paths are resolved against
    pub root: PathBuf,
}

impl AppState {
    pub const fn new(config: Config, root: PathBuf) -> Self {
        Self { config, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_files(&self) -> &[String] {
        &self.config.http.index_files
    }
}
