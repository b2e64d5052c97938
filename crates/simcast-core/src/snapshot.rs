//! Per-cycle snapshot assembly.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::{Arena, SimulationEngine};
use crate::entity::{ConversionError, ConverterRegistry};
use crate::state::ExperimentState;

/// The world as observers see it after one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unix epoch milliseconds at assembly time.
    pub timestamp: i64,
    /// Playback state at assembly time.
    pub state: ExperimentState,
    /// Engine steps since the last reset.
    pub steps: u64,
    /// Arena geometry.
    pub arena: Arena,
    /// Converted entities; entities that failed conversion are absent.
    pub entities: Vec<Value>,
}

/// Build a snapshot of `engine`.
///
/// Entities whose conversion fails are left out of the snapshot and
/// returned alongside it so the caller can report them.
pub fn assemble<E>(
    engine: &E,
    registry: &ConverterRegistry,
    state: ExperimentState,
) -> (Snapshot, Vec<ConversionError>)
where
    E: SimulationEngine + ?Sized,
{
    let mut entities = Vec::new();
    let mut failures = Vec::new();
    for entity in engine.entities() {
        match registry.convert(entity) {
            Ok(json) => entities.push(json),
            Err(e) => failures.push(e),
        }
    }

    let snapshot = Snapshot {
        timestamp: Utc::now().timestamp_millis(),
        state,
        steps: engine.current_step(),
        arena: engine.arena(),
        entities,
    };
    (snapshot, failures)
}
