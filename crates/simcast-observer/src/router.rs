//! Axum router construction for the Observer API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin client access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the Observer server.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /ws` -- `WebSocket` stream and command channel
/// - `GET /api/status` -- playback status
/// - `GET /api/snapshot` -- latest snapshot
/// - `POST /api/{play,pause,step,fastforward,reset}` -- playback commands
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        // WebSocket
        .route("/ws", get(ws::ws_handler))
        // Read-only
        .route("/api/status", get(handlers::status))
        .route("/api/snapshot", get(handlers::snapshot))
        // Commands
        .route("/api/play", post(handlers::play))
        .route("/api/pause", post(handlers::pause))
        .route("/api/step", post(handlers::step))
        .route("/api/fastforward", post(handlers::fast_forward))
        .route("/api/reset", post(handlers::reset))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
