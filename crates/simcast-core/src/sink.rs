//! Outbound channels from the experiment to its observers.
//!
//! Snapshots, state-change events and operator-visible log lines are
//! three independent streams. The transport decides how (and how often)
//! each reaches clients.

use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;
use crate::state::ExperimentState;

/// A state-change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentEvent {
    /// Human-readable event name (e.g. `"Experiment playing"`).
    pub event: String,
    /// State after the transition.
    pub state: ExperimentState,
}

impl ExperimentEvent {
    /// Build an event.
    pub fn new(event: impl Into<String>, state: ExperimentState) -> Self {
        Self {
            event: event.into(),
            state,
        }
    }
}

/// Severity of a mirrored log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Informational.
    Info,
    /// Recoverable problem.
    Warn,
    /// Failure that dropped data.
    Error,
}

/// A log line mirrored to remote operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Severity.
    pub level: LogLevel,
    /// Rendered message.
    pub message: String,
}

/// Receiver of everything the experiment publishes.
///
/// Called from both the step loop thread and command threads, so
/// implementations must not block.
pub trait BroadcastSink: Send + Sync {
    /// Deliver the snapshot produced this cycle.
    fn broadcast(&self, snapshot: Snapshot);

    /// Deliver a state-change event.
    fn emit_event(&self, event: ExperimentEvent);

    /// Deliver an operator-visible log line.
    fn emit_log(&self, _record: LogRecord) {}
}

/// A sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl BroadcastSink for NullSink {
    fn broadcast(&self, _snapshot: Snapshot) {}

    fn emit_event(&self, _event: ExperimentEvent) {}
}
