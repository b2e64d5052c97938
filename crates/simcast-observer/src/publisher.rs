//! Throttled snapshot publisher.
//!
//! The step loop may produce snapshots far faster than clients can render
//! them (fast-forward, tiny tick budgets). The publisher wakes
//! `broadcast_frequency` times per second and forwards the latest snapshot
//! if it changed since the last push; intermediate snapshots are dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use simcast_core::snapshot::Snapshot;

use crate::sink::{ObserverSink, OutboundMessage};

/// Interval between pushes for a frequency in Hz.
///
/// A frequency of 0 is treated as 1 Hz.
pub fn push_interval(broadcast_frequency: u32) -> Duration {
    Duration::from_secs(1)
        .checked_div(broadcast_frequency.max(1))
        .unwrap_or(Duration::from_secs(1))
}

/// Spawn the publisher on the current Tokio runtime.
///
/// The task ends when the sink's snapshot channel is dropped.
pub fn spawn_publisher(sink: &ObserverSink, broadcast_frequency: u32) -> JoinHandle<()> {
    let rx = sink.watch_snapshots();
    let tx = sink.sender();
    let period = push_interval(broadcast_frequency);
    tokio::spawn(run_publisher(rx, tx, period))
}

async fn run_publisher(
    mut rx: watch::Receiver<Option<Arc<Snapshot>>>,
    tx: broadcast::Sender<OutboundMessage>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        match rx.has_changed() {
            Ok(true) => {}
            Ok(false) => continue,
            Err(_) => {
                debug!("Snapshot channel closed, publisher exiting");
                return;
            }
        }

        let latest = rx.borrow_and_update().clone();
        if let Some(snapshot) = latest {
            // No receivers is fine: nobody is watching right now.
            let _ = tx.send(OutboundMessage::Broadcast(Snapshot::clone(&snapshot)));
        }
    }
}
