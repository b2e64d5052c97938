//! The simulation engine boundary.
//!
//! The physics itself lives outside this crate. The step loop only needs
//! to advance the engine, run its per-step hooks, ask whether the
//! experiment has finished, and read enough world state to assemble a
//! snapshot.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;

/// Errors raised by the engine itself.
///
/// The step loop does not recover from these; they end the loop and are
/// returned to whoever launched it.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Advancing the simulation by one step failed.
    #[error("engine step failed: {message}")]
    Step {
        /// Description of the failure.
        message: String,
    },

    /// A pre-step, post-step or post-experiment hook failed.
    #[error("engine hook '{hook}' failed: {message}")]
    Hook {
        /// Which hook failed.
        hook: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// Resetting the engine failed.
    #[error("engine reset failed: {message}")]
    Reset {
        /// Description of the failure.
        message: String,
    },
}

/// A point or extent in world space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vec3 {
    /// Build a vector from its components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// World geometry reported with every snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    /// Extent of the arena along each axis.
    pub size: Vec3,
    /// Centre of the arena.
    pub center: Vec3,
}

/// A steppable simulation.
///
/// Hooks default to no-ops; engines override the ones they use.
pub trait SimulationEngine: Send {
    /// Whether the experiment has reached its end condition.
    fn is_finished(&self) -> bool;

    /// Advance the world by one physics tick.
    fn step(&mut self) -> Result<(), EngineError>;

    /// Runs once per cycle before any stepping.
    fn pre_step(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Runs once per cycle after the snapshot has been broadcast.
    fn post_step(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Runs once when the experiment finishes, before the reset.
    fn post_experiment(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Return the world to its initial condition.
    fn reset(&mut self) -> Result<(), EngineError>;

    /// Steps taken since the last reset.
    fn current_step(&self) -> u64;

    /// Physics ticks per second.
    fn tick_rate(&self) -> f64;

    /// Current arena geometry.
    fn arena(&self) -> Arena;

    /// Root entities to include in the snapshot.
    fn entities(&self) -> Vec<&dyn Entity>;
}

/// Wall-clock duration of one tick at `rate` ticks per second.
///
/// Returns `None` for zero, negative, or non-finite rates.
pub fn tick_duration_from_rate(rate: f64) -> Option<Duration> {
    if rate.is_finite() && rate > 0.0 {
        Duration::try_from_secs_f64(rate.recip()).ok()
    } else {
        None
    }
}
