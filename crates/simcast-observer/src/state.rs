//! Shared application state for the Observer API server.
//!
//! [`AppState`] pairs the [`ObserverSink`] the experiment publishes into
//! with the [`ExperimentControl`] handle commands are dispatched to. Both
//! are cheap to share; handlers never touch the engine directly.

use std::sync::Arc;

use simcast_core::experiment::ExperimentControl;
use tokio::sync::broadcast;

use crate::sink::{ObserverSink, OutboundMessage};

/// Shared state accessible by all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Where snapshots, events and log lines arrive.
    pub sink: ObserverSink,
    /// The experiment being observed.
    pub control: Arc<dyn ExperimentControl>,
    /// Snapshot pushes per second.
    pub broadcast_frequency: u32,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        sink: ObserverSink,
        control: Arc<dyn ExperimentControl>,
        broadcast_frequency: u32,
    ) -> Self {
        Self {
            sink,
            control,
            broadcast_frequency,
        }
    }

    /// Subscribe to outbound messages for a `WebSocket` client.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.sink.subscribe()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("sink", &self.sink)
            .field("broadcast_frequency", &self.broadcast_frequency)
            .finish_non_exhaustive()
    }
}
