//! `WebSocket` handler for live playback.
//!
//! Clients connect to `GET /ws` and receive JSON [`OutboundMessage`]s:
//! throttled snapshots, state-change events and mirrored log lines. The
//! latest snapshot is sent right after the upgrade so a new client does
//! not have to wait for the next push.
//!
//! Clients may send `{"command": "play"}` (or pause, step, fastforward,
//! reset) text frames. A successful command is visible through the event
//! it triggers; a rejected one is answered with an
//! [`OutboundMessage::Error`] to that client only.
//!
//! If a client falls behind, lagged messages are silently skipped and
//! the client resumes from the most recent message.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::commands::{self, CommandRequest};
use crate::error::ObserverError;
use crate::sink::OutboundMessage;
use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` connection.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Serialize and send one message. Returns `false` once the client is gone.
async fn send(socket: &mut WebSocket, message: &OutboundMessage) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize outbound message: {e}");
            return true;
        }
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

/// Run an inbound text frame as a command; the error text if it failed.
async fn handle_command(state: &AppState, text: &str) -> Option<String> {
    let request: CommandRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => return Some(ObserverError::InvalidCommand(e.to_string()).to_string()),
    };
    match commands::dispatch(Arc::clone(&state.control), request.command).await {
        Ok(reply) if reply.applied => None,
        Ok(reply) => Some(reply.message),
        Err(e) => Some(e.to_string()),
    }
}

/// Handle the `WebSocket` lifecycle.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("WebSocket client connected");

    let mut rx = state.subscribe();

    if let Some(snapshot) = state.sink.latest_snapshot() {
        let initial = OutboundMessage::Broadcast(snapshot.as_ref().clone());
        if !send(&mut socket, &initial).await {
            debug!("WebSocket client disconnected before initial snapshot");
            return;
        }
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(message) => {
                        if !send(&mut socket, &message).await {
                            debug!("WebSocket client disconnected (send failed)");
                            return;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "WebSocket client lagged, skipping ahead");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Broadcast channel closed, shutting down WebSocket");
                        return;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Text(text))) => {
                        if let Some(message) = handle_command(&state, text.as_str()).await {
                            debug!(%message, "WebSocket command rejected");
                            if !send(&mut socket, &OutboundMessage::Error { message }).await {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use simcast_core::engine::EngineError;
    use simcast_core::experiment::{
        CommandOutcome, ControlError, ExperimentControl, ExperimentStatus, StepOutcome,
    };
    use simcast_core::state::ExperimentState;

    use super::*;
    use crate::sink::ObserverSink;

    /// Fresh experiment that accepts play and refuses pause.
    struct Fresh;

    impl ExperimentControl for Fresh {
        fn play(&self) -> CommandOutcome {
            CommandOutcome::Applied(ExperimentState::Playing)
        }
        fn pause(&self) -> Result<ExperimentState, ControlError> {
            Err(ControlError::InvalidState {
                command: "pause",
                state: ExperimentState::Initialized,
            })
        }
        fn step(&self) -> Result<StepOutcome, EngineError> {
            Ok(StepOutcome::Stepped)
        }
        fn fast_forward(&self) -> CommandOutcome {
            CommandOutcome::Ignored(ExperimentState::Initialized)
        }
        fn reset(&self) -> Result<(), EngineError> {
            Ok(())
        }
        fn status(&self) -> ExperimentStatus {
            ExperimentStatus {
                state: ExperimentState::Initialized,
                fast_forward: false,
                tick_duration_ms: 100,
                steps: 0,
                frames_per_broadcast: 1,
            }
        }
    }

    fn app_state() -> AppState {
        AppState::new(ObserverSink::new(), Arc::new(Fresh), 10)
    }

    #[tokio::test]
    async fn malformed_frame_is_answered_with_invalid_command() {
        let reply = handle_command(&app_state(), "not json").await.unwrap();
        assert!(reply.starts_with("invalid command"), "{reply}");
    }

    #[tokio::test]
    async fn rejected_pause_is_answered_with_the_conflict() {
        let reply = handle_command(&app_state(), r#"{"command":"pause"}"#)
            .await
            .unwrap();
        assert!(reply.contains("cannot pause the experiment"), "{reply}");
    }

    #[tokio::test]
    async fn applied_play_sends_no_reply() {
        assert!(
            handle_command(&app_state(), r#"{"command":"play"}"#)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn ignored_command_is_answered_with_its_message() {
        let reply = handle_command(&app_state(), r#"{"command":"fastforward"}"#)
            .await
            .unwrap();
        assert!(reply.contains("ignored"), "{reply}");
    }
}
