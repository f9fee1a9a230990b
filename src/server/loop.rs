// Server loop module
// Accepts connections until the shutdown future resolves

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

/// Pause after a failed accept so persistent errors (e.g. EMFILE) do not spin
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Serve connections from `listener` until `shutdown` completes.
///
/// In-flight connections are not drained; they end with the runtime.
pub async fn start_server_loop<S>(listener: TcpListener, state: Arc<AppState>, shutdown: S)
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => accept_connection(stream, peer_addr, &state),
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }

            () = &mut shutdown => {
                logger::log_shutdown();
                return;
            }
        }
    }
}
