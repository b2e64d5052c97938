//! End-to-end test of the spawned observer over a real socket.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use simcast_core::engine::EngineError;
use simcast_core::experiment::{
    CommandOutcome, ControlError, ExperimentControl, ExperimentStatus, StepOutcome,
};
use simcast_core::state::ExperimentState;
use simcast_observer::server::ServerConfig;
use simcast_observer::sink::ObserverSink;
use simcast_observer::spawn_observer;
use simcast_observer::state::AppState;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Control surface frozen in one state.
struct Frozen;

impl ExperimentControl for Frozen {
    fn play(&self) -> CommandOutcome {
        CommandOutcome::Ignored(ExperimentState::Paused)
    }
    fn pause(&self) -> Result<ExperimentState, ControlError> {
        Ok(ExperimentState::Paused)
    }
    fn step(&self) -> Result<StepOutcome, EngineError> {
        Ok(StepOutcome::Stepped)
    }
    fn fast_forward(&self) -> CommandOutcome {
        CommandOutcome::Ignored(ExperimentState::Paused)
    }
    fn reset(&self) -> Result<(), EngineError> {
        Ok(())
    }
    fn status(&self) -> ExperimentStatus {
        ExperimentStatus {
            state: ExperimentState::Paused,
            fast_forward: false,
            tick_duration_ms: 50,
            steps: 7,
            frames_per_broadcast: 3,
        }
    }
}

#[tokio::test]
async fn spawned_observer_answers_over_tcp() {
    let state = Arc::new(AppState::new(ObserverSink::new(), Arc::new(Frozen), 10));
    let config = ServerConfig {
        host: String::from("127.0.0.1"),
        port: 0,
    };
    let handle = spawn_observer(&config, state).await.unwrap();

    let mut stream = TcpStream::connect(handle.local_addr).await.unwrap();
    stream
        .write_all(b"GET /api/status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains(r#""state":"EXPERIMENT_PAUSED""#), "{response}");
    assert!(response.contains(r#""steps":7"#), "{response}");

    handle.abort();
}

#[tokio::test]
async fn port_in_use_is_reported_eagerly() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = ServerConfig {
        host: String::from("127.0.0.1"),
        port: taken.local_addr().unwrap().port(),
    };
    let state = Arc::new(AppState::new(ObserverSink::new(), Arc::new(Frozen), 10));

    assert!(spawn_observer(&config, state).await.is_err());
}
