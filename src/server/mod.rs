// Server module entry point
// Binds the listener and runs the accept loop

pub mod connection;
pub mod listener;
pub mod signal;

// Rust does not allow `loop` as a module name (keyword), so it is exposed as server_loop
#[path = "loop.rs"]
pub mod server_loop;

use std::sync::Arc;

use crate::config::{AppState, Config};
use crate::error::ServerError;
use crate::logger;

// Re-export commonly used items
pub use listener::create_listener;
pub use server_loop::start_server_loop;

/// Resolve the root, bind the listener and build the shared state.
///
/// Binding happens here so a port conflict is reported before anything is served.
pub fn bind(config: Config) -> Result<(tokio::net::TcpListener, Arc<AppState>), ServerError> {
    let root = config.resolve_root()?;
    let addr = config.get_socket_addr()?;
    let listener = create_listener(addr).map_err(|source| ServerError::Bind { addr, source })?;
    Ok((listener, Arc::new(AppState::new(config, root))))
}

/// Run the server until Ctrl+C or SIGTERM.
pub async fn run(config: Config) -> Result<(), ServerError> {
    let (listener, state) = bind(config)?;
    let local_addr = listener.local_addr()?;
    logger::log_server_start(&local_addr, state.root(), &state.config);

    start_server_loop(listener, state, signal::shutdown_signal()).await;
    Ok(())
}
