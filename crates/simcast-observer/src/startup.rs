//! Observer server startup helper for embedding in the server binary.
//!
//! [`spawn_observer`] binds the listener eagerly, so a port conflict is
//! reported to the caller, then serves the REST API, the `WebSocket`
//! endpoint and the snapshot publisher on background Tokio tasks.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::publisher::spawn_publisher;
use crate::server::{ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the Observer server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Handles to the observer's background tasks.
#[derive(Debug)]
pub struct ObserverHandle {
    /// The address actually bound (differs from the config for port 0).
    pub local_addr: SocketAddr,
    /// The HTTP server task.
    pub server: JoinHandle<()>,
    /// The snapshot publisher task.
    pub publisher: JoinHandle<()>,
}

impl ObserverHandle {
    /// Abort both tasks.
    pub fn abort(&self) {
        self.server.abort();
        self.publisher.abort();
    }
}

/// Spawn the Observer server and snapshot publisher.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the address is invalid or the
/// listener cannot bind.
pub async fn spawn_observer(
    config: &ServerConfig,
    state: Arc<AppState>,
) -> Result<ObserverHandle, StartupError> {
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("no local address for {addr}: {e}")))?;

    let publisher = spawn_publisher(&state.sink, state.broadcast_frequency);

    let server = tokio::spawn(async move {
        if let Err(e) = crate::server::serve(listener, state).await {
            tracing::error!(error = %e, "Observer server exited with error");
        }
    });

    tracing::info!(%local_addr, "Observer server spawned on background task");

    Ok(ObserverHandle {
        local_addr,
        server,
        publisher,
    })
}
