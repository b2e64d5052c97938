//! The [`BroadcastSink`] implementation backing the observer.
//!
//! Snapshots are parked in a [`watch`] channel (latest wins) for the
//! publisher task to pick up; events and log lines go straight onto the
//! [`broadcast`] channel every `WebSocket` client subscribes to.

use std::sync::Arc;

use serde::Serialize;
use simcast_core::sink::{BroadcastSink, ExperimentEvent, LogRecord};
use simcast_core::snapshot::Snapshot;
use tokio::sync::{broadcast, watch};

/// Capacity of the outbound broadcast channel.
///
/// If a subscriber falls behind by more than this many messages it will
/// receive a [`broadcast::error::RecvError::Lagged`] and skip to the
/// newest message.
const BROADCAST_CAPACITY: usize = 256;

/// A message pushed to `WebSocket` clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// A periodic snapshot.
    Broadcast(Snapshot),
    /// A state-change event.
    Event(ExperimentEvent),
    /// A mirrored log line.
    Log(LogRecord),
    /// A command sent over the socket was rejected.
    Error {
        /// Why the command failed.
        message: String,
    },
}

/// Sink shared by the experiment and the observer server.
#[derive(Debug, Clone)]
pub struct ObserverSink {
    tx: broadcast::Sender<OutboundMessage>,
    latest: Arc<watch::Sender<Option<Arc<Snapshot>>>>,
}

impl ObserverSink {
    /// Create a sink with no subscribers and no snapshot yet.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (latest, _) = watch::channel(None);
        Self {
            tx,
            latest: Arc::new(latest),
        }
    }

    /// Subscribe to outbound messages.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.tx.subscribe()
    }

    /// A sender onto the outbound channel, for the publisher task.
    pub fn sender(&self) -> broadcast::Sender<OutboundMessage> {
        self.tx.clone()
    }

    /// Watch the latest snapshot.
    pub fn watch_snapshots(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.latest.subscribe()
    }

    /// The most recent snapshot, if any cycle has run yet.
    pub fn latest_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.latest.borrow().clone()
    }

    /// Push a message to every connected client.
    ///
    /// Returns the number of receivers; 0 when nobody is connected, which
    /// is not an error.
    pub fn publish(&self, message: OutboundMessage) -> usize {
        self.tx.send(message).unwrap_or(0)
    }
}

impl Default for ObserverSink {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastSink for ObserverSink {
    fn broadcast(&self, snapshot: Snapshot) {
        self.latest.send_replace(Some(Arc::new(snapshot)));
    }

    fn emit_event(&self, event: ExperimentEvent) {
        self.publish(OutboundMessage::Event(event));
    }

    fn emit_log(&self, record: LogRecord) {
        self.publish(OutboundMessage::Log(record));
    }
}
