//! The step loop.
//!
//! [`Experiment::run`] is meant to run on a dedicated thread for the
//! lifetime of the process. Each call to [`Experiment::run_cycle`] does one
//! of three things depending on the control value:
//!
//! - **Running, not finished**: pre-step hook, one step (or a burst of
//!   steps in fast-forward, re-checking the state between steps so a pause
//!   or reset cuts the burst short), snapshot broadcast, post-step hook,
//!   then sleep off the rest of the tick budget.
//! - **Running, finished**: post-experiment hook, reset, done event.
//! - **Initialized or paused**: heartbeat snapshot, then wait up to the
//!   idle interval for a command.
//!
//! An overrun cycle is logged and the next cycle starts immediately; lost
//! time is never made up with extra steps.

use tracing::{debug, info};

use crate::clock::{PaceOutcome, Pacer};
use crate::engine::{EngineError, SimulationEngine};
use crate::experiment::Experiment;
use crate::sink::LogLevel;

/// Errors that end the step loop.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    /// The engine failed during a cycle.
    #[error("engine error: {source}")]
    Engine {
        /// The underlying engine error.
        #[from]
        source: EngineError,
    },
}

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was stepped; a heartbeat snapshot was sent.
    Idle,
    /// `steps` engine steps ran and one snapshot was sent.
    Stepped {
        /// Engine steps executed this cycle.
        steps: u32,
        /// Pacing decision at the end of the cycle.
        pace: PaceOutcome,
    },
    /// The experiment finished and was reset.
    Completed,
}

/// Why the step loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// An experiment finished and `exit_on_completion` is set.
    Completed,
    /// [`Experiment::request_shutdown`] was called.
    Shutdown,
}

impl<E: SimulationEngine> Experiment<E> {
    /// Run cycles until shutdown, an engine fault, or (when configured)
    /// experiment completion.
    pub fn run(&self) -> Result<LoopExit, LoopError> {
        info!(
            frames_per_broadcast = self.config().frames_per_broadcast_in_fast_forward(),
            idle_interval_ms = u64::try_from(self.config().idle_interval().as_millis())
                .unwrap_or(u64::MAX),
            exit_on_completion = self.config().exit_on_completion(),
            "Step loop starting"
        );

        loop {
            if self.is_shutdown_requested() {
                info!("Step loop shutting down");
                return Ok(LoopExit::Shutdown);
            }

            if self.run_cycle()? == CycleOutcome::Completed && self.config().exit_on_completion()
            {
                info!("Experiment finished, step loop exiting");
                return Ok(LoopExit::Completed);
            }
        }
    }

    /// Execute one cycle of the step loop.
    pub fn run_cycle(&self) -> Result<CycleOutcome, EngineError> {
        if !self.shared_control().load().state.is_running() {
            self.idle_cycle();
            return Ok(CycleOutcome::Idle);
        }

        // The first cycle after play or fast-forward is timed from the
        // command; later cycles from their own start.
        let pacer = self
            .shared_control()
            .update(|c| c.started_at.take())
            .map_or_else(Pacer::start, Pacer::starting_at);
        let mut engine = self.lock_engine();

        // Re-read under the engine lock: a reset may have completed while
        // we were waiting for it. This read also fixes the step budget and
        // tick duration for the whole cycle.
        let control = self.shared_control().load();
        if !control.state.is_running() {
            return Ok(CycleOutcome::Idle);
        }

        if engine.is_finished() {
            self.complete_locked(&mut engine)?;
            return Ok(CycleOutcome::Completed);
        }

        engine.pre_step()?;

        let budget = control.steps_per_cycle(self.config().frames_per_broadcast_in_fast_forward());
        let mut remaining = budget;
        while remaining > 0
            && !engine.is_finished()
            && self.shared_control().load().state.is_running()
        {
            engine.step()?;
            remaining = remaining.saturating_sub(1);
        }
        let steps = budget.saturating_sub(remaining);

        self.broadcast_locked(&engine);
        engine.post_step()?;

        if engine.is_finished() {
            self.complete_locked(&mut engine)?;
            return Ok(CycleOutcome::Completed);
        }
        drop(engine);

        let pace = pacer.pace(control.tick_duration);
        match pace {
            PaceOutcome::Slept(remaining) => {
                debug!(steps, slept_us = remaining.as_micros(), "Cycle complete");
            }
            PaceOutcome::Overrun { elapsed, budget } => {
                self.notice(
                    LogLevel::Warn,
                    format!(
                        "clock tick took {} ms, more than the expected {} ms; recovering in next cycle",
                        elapsed.as_millis(),
                        budget.as_millis()
                    ),
                );
            }
        }

        Ok(CycleOutcome::Stepped { steps, pace })
    }

    fn idle_cycle(&self) {
        {
            let engine = self.lock_engine();
            self.broadcast_locked(&engine);
        }
        self.shared_control().wait_idle(self.config().idle_interval());
    }
}
