//! REST API endpoint handlers for the Observer server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/status` | Playback state and tick budget |
//! | `GET` | `/api/snapshot` | Latest snapshot |
//! | `POST` | `/api/play` | Start real-time playback |
//! | `POST` | `/api/pause` | Pause (409 if not running) |
//! | `POST` | `/api/step` | Single step |
//! | `POST` | `/api/fastforward` | Start fast-forward |
//! | `POST` | `/api/reset` | Reset the experiment |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use simcast_core::experiment::ExperimentStatus;
use simcast_core::snapshot::Snapshot;

use crate::commands::{self, Command, CommandReply};
use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing playback status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.control.status();
    let entity_count = state
        .sink
        .latest_snapshot()
        .map_or(0, |snapshot| snapshot.entities.len());

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Simcast Observer</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; }}
        table {{ border-collapse: collapse; }}
        td {{ padding: 0.25rem 1rem 0.25rem 0; }}
        a {{ color: #58a6ff; }}
        code {{ color: #7ee787; }}
    </style>
</head>
<body>
    <h1>Simcast Observer</h1>
    <table>
        <tr><td>State</td><td>{state_label}</td></tr>
        <tr><td>Fast-forward</td><td>{fast_forward}</td></tr>
        <tr><td>Steps</td><td>{steps}</td></tr>
        <tr><td>Tick budget</td><td>{tick_ms} ms</td></tr>
        <tr><td>Entities</td><td>{entity_count}</td></tr>
    </table>
    <h2>API</h2>
    <ul>
        <li><a href="/api/status">/api/status</a></li>
        <li><a href="/api/snapshot">/api/snapshot</a></li>
        <li><code>POST /api/play | pause | step | fastforward | reset</code></li>
        <li><code>GET /ws</code> (WebSocket)</li>
    </ul>
</body>
</html>"#,
        state_label = status.state,
        fast_forward = status.fast_forward,
        steps = status.steps,
        tick_ms = status.tick_duration_ms,
    ))
}

// ---------------------------------------------------------------------------
// GET /api/status, GET /api/snapshot
// ---------------------------------------------------------------------------

/// Current playback status.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<ExperimentStatus> {
    Json(state.control.status())
}

/// The most recent snapshot.
///
/// Returns 404 until the step loop has produced its first snapshot.
pub async fn snapshot(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let snapshot = state
        .sink
        .latest_snapshot()
        .ok_or_else(|| ObserverError::NotFound(String::from("no snapshot yet")))?;
    Ok(Json(Snapshot::clone(&snapshot)))
}

// ---------------------------------------------------------------------------
// POST /api/<command>
// ---------------------------------------------------------------------------

async fn run(state: &AppState, command: Command) -> Result<Json<CommandReply>, ObserverError> {
    let reply = commands::dispatch(Arc::clone(&state.control), command).await?;
    Ok(Json(reply))
}

/// `POST /api/play`
pub async fn play(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CommandReply>, ObserverError> {
    run(&state, Command::Play).await
}

/// `POST /api/pause`
pub async fn pause(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CommandReply>, ObserverError> {
    run(&state, Command::Pause).await
}

/// `POST /api/step`
pub async fn step(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CommandReply>, ObserverError> {
    run(&state, Command::Step).await
}

/// `POST /api/fastforward`
pub async fn fast_forward(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CommandReply>, ObserverError> {
    run(&state, Command::FastForward).await
}

/// `POST /api/reset`
pub async fn reset(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CommandReply>, ObserverError> {
    run(&state, Command::Reset).await
}
