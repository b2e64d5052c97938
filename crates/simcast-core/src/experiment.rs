//! The experiment control surface.
//!
//! [`Experiment`] owns the engine, the shared control value and the
//! outbound sink. Operator commands ([`play`](Experiment::play),
//! [`pause`](Experiment::pause), [`step`](Experiment::step),
//! [`fast_forward`](Experiment::fast_forward), [`reset`](Experiment::reset))
//! run on transport threads; the step loop in [`crate::runner`] runs on its
//! own thread against the same value.
//!
//! # Locking
//!
//! Two locks: the engine mutex and the control mutex. Whenever both are
//! held, the engine lock is taken first. Commands that only change the
//! control value never touch the engine lock, so they cannot be delayed by
//! a running cycle.
//!
//! # Transitions
//!
//! | Command | Valid from | Otherwise |
//! |---------|------------|-----------|
//! | play | initialized, paused | warning, ignored |
//! | fast-forward | initialized, paused | warning, applied anyway |
//! | pause | playing, fast-forwarding | [`ControlError::InvalidState`] |
//! | step | initialized, paused | pauses instead of stepping |
//! | reset | any | -- |
//!
//! While a reset is waiting for the engine lock, play and fast-forward are
//! logged and ignored.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::{ConfigError, LoopConfig};
use crate::engine::{EngineError, SimulationEngine, tick_duration_from_rate};
use crate::entity::ConverterRegistry;
use crate::sink::{BroadcastSink, ExperimentEvent, LogLevel, LogRecord};
use crate::snapshot;
use crate::state::{ControlState, ExperimentState, SharedControl};

/// Event emitted when playback starts.
pub const EVENT_PLAYING: &str = "Experiment playing";
/// Event emitted when fast-forward starts.
pub const EVENT_FAST_FORWARDING: &str = "Experiment fast-forwarding";
/// Event emitted when playback is paused.
pub const EVENT_PAUSED: &str = "Experiment paused";
/// Event emitted after a manual single step.
pub const EVENT_STEP_DONE: &str = "Experiment step done";
/// Event emitted after every reset.
pub const EVENT_RESET: &str = "Experiment reset";
/// Event emitted when the experiment finishes.
pub const EVENT_DONE: &str = "Experiment done";

/// A command rejected because of the current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// The command is not valid in the current state.
    #[error("cannot {command} the experiment, current state: {state}")]
    InvalidState {
        /// The rejected command.
        command: &'static str,
        /// The state at the time of the command.
        state: ExperimentState,
    },
}

/// Result of a play or fast-forward command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    /// The transition happened; carries the new state.
    Applied(ExperimentState),
    /// The command was logged and ignored; carries the unchanged state.
    Ignored(ExperimentState),
}

impl CommandOutcome {
    /// State after the command.
    pub const fn state(self) -> ExperimentState {
        match self {
            Self::Applied(s) | Self::Ignored(s) => s,
        }
    }
}

/// Result of a step command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// One engine step ran.
    Stepped,
    /// The experiment was running, so it was paused instead of stepped.
    PausedInstead,
    /// The experiment had already finished; it was completed and reset.
    Completed,
}

/// Point-in-time view of the experiment for status endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentStatus {
    /// Playback state.
    pub state: ExperimentState,
    /// Whether fast-forward is active.
    pub fast_forward: bool,
    /// Tick budget in milliseconds.
    pub tick_duration_ms: u64,
    /// Steps reported by the most recent snapshot.
    pub steps: u64,
    /// Frames collapsed into one broadcast while fast-forwarding.
    pub frames_per_broadcast: u32,
}

/// Object-safe control surface for transports.
pub trait ExperimentControl: Send + Sync {
    /// Start or resume stepping at one step per cycle.
    fn play(&self) -> CommandOutcome;
    /// Pause a running experiment.
    fn pause(&self) -> Result<ExperimentState, ControlError>;
    /// Run exactly one step, or pause a running experiment.
    fn step(&self) -> Result<StepOutcome, EngineError>;
    /// Start stepping several times per broadcast.
    fn fast_forward(&self) -> CommandOutcome;
    /// Return the engine and state machine to their initial condition.
    fn reset(&self) -> Result<(), EngineError>;
    /// Current status without touching the engine.
    fn status(&self) -> ExperimentStatus;
}

/// A controllable, steppable experiment.
pub struct Experiment<E> {
    engine: Mutex<E>,
    control: SharedControl,
    config: LoopConfig,
    registry: ConverterRegistry,
    sink: Arc<dyn BroadcastSink>,
    last_steps: AtomicU64,
    shutdown: AtomicBool,
}

impl<E: SimulationEngine> Experiment<E> {
    /// Wrap `engine` in a new experiment in the `Initialized` state.
    ///
    /// Fails if the engine's tick rate cannot produce a tick duration.
    pub fn new(
        engine: E,
        registry: ConverterRegistry,
        sink: Arc<dyn BroadcastSink>,
        config: LoopConfig,
    ) -> Result<Self, ConfigError> {
        let rate = engine.tick_rate();
        let tick_duration =
            tick_duration_from_rate(rate).ok_or(ConfigError::InvalidTickRate { rate })?;
        let last_steps = AtomicU64::new(engine.current_step());
        info!(
            tick_duration_ms = duration_ms(tick_duration),
            frames_per_broadcast = config.frames_per_broadcast_in_fast_forward(),
            entity_kinds = registry.len(),
            "Experiment initialized"
        );
        Ok(Self {
            engine: Mutex::new(engine),
            control: SharedControl::new(ControlState::new(tick_duration)),
            config,
            registry,
            sink,
            last_steps,
            shutdown: AtomicBool::new(false),
        })
    }

    /// The immutable loop configuration.
    pub const fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Copy of the current control value.
    pub fn control_state(&self) -> ControlState {
        self.control.load()
    }

    /// Current playback state.
    pub fn state(&self) -> ExperimentState {
        self.control.load().state
    }

    /// Run `f` with exclusive access to the engine.
    ///
    /// Blocks while a cycle is stepping.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        f(&mut self.lock_engine())
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Start stepping at one step per cycle.
    ///
    /// Valid from `Initialized` and `Paused`; from any other state the
    /// command is logged and ignored.
    pub fn play(&self) -> CommandOutcome {
        let current = self.control.load();
        if current.reset_pending() {
            self.notice(
                LogLevel::Warn,
                String::from("play called while a reset is in progress"),
            );
            return CommandOutcome::Ignored(current.state);
        }
        if !matches!(
            current.state,
            ExperimentState::Initialized | ExperimentState::Paused
        ) {
            self.notice(
                LogLevel::Warn,
                format!("play called in wrong state: {}", current.state),
            );
            return CommandOutcome::Ignored(current.state);
        }

        let rate = self.engine_tick_rate();
        let outcome = self.control.update(|c| {
            if c.reset_pending()
                || !matches!(
                    c.state,
                    ExperimentState::Initialized | ExperimentState::Paused
                )
            {
                return CommandOutcome::Ignored(c.state);
            }
            c.fast_forward = false;
            c.tick_duration = Self::tick_duration_or_keep(rate, c.tick_duration);
            c.state = ExperimentState::Playing;
            c.started_at = Some(Instant::now());
            CommandOutcome::Applied(c.state)
        });

        match outcome {
            CommandOutcome::Applied(state) => {
                self.emit(EVENT_PLAYING, state);
                self.notice(LogLevel::Info, String::from("Experiment playing"));
            }
            CommandOutcome::Ignored(state) => self.notice(
                LogLevel::Warn,
                format!("play called in wrong state: {state}"),
            ),
        }
        outcome
    }

    /// Start stepping `frames_per_broadcast_in_fast_forward` times per cycle.
    ///
    /// Expected from `Initialized` or `Paused`; from a running state it
    /// logs a warning and switches to fast-forward anyway. Ignored while a
    /// reset is pending.
    pub fn fast_forward(&self) -> CommandOutcome {
        let rate = self.engine_tick_rate();
        let applied = self.control.update(|c| {
            if c.reset_pending() {
                return Err(c.state);
            }
            let previous = c.state;
            c.fast_forward = true;
            c.tick_duration = Self::tick_duration_or_keep(rate, c.tick_duration);
            c.state = ExperimentState::FastForwarding;
            c.started_at = Some(Instant::now());
            Ok((previous, c.state))
        });
        let (previous, state) = match applied {
            Ok(transition) => transition,
            Err(current) => {
                self.notice(
                    LogLevel::Warn,
                    String::from("fast-forward called while a reset is in progress"),
                );
                return CommandOutcome::Ignored(current);
            }
        };

        if previous.is_running() {
            self.notice(
                LogLevel::Warn,
                format!(
                    "fast-forward called in wrong state: {previous}, running the experiment in fast-forward mode"
                ),
            );
        }
        self.emit(EVENT_FAST_FORWARDING, state);
        self.notice(LogLevel::Info, String::from("Experiment fast-forwarding"));
        CommandOutcome::Applied(state)
    }

    /// Pause a running experiment.
    ///
    /// Unlike the other commands, pausing from a non-running state is an
    /// error reported to the caller.
    pub fn pause(&self) -> Result<ExperimentState, ControlError> {
        let result = self.control.update(|c| {
            if c.state.is_running() {
                c.fast_forward = false;
                c.state = ExperimentState::Paused;
                Ok(c.state)
            } else {
                Err(ControlError::InvalidState {
                    command: "pause",
                    state: c.state,
                })
            }
        });

        match &result {
            Ok(state) => {
                self.emit(EVENT_PAUSED, *state);
                self.notice(LogLevel::Info, String::from("Experiment paused"));
            }
            Err(e) => self.notice(LogLevel::Warn, e.to_string()),
        }
        result
    }

    /// Run exactly one engine step synchronously.
    ///
    /// While running, the step loop may be midway through a cycle, so the
    /// experiment is paused instead and no step is taken. A finished
    /// experiment is completed and reset.
    pub fn step(&self) -> Result<StepOutcome, EngineError> {
        if self.pause_if_running() {
            return Ok(StepOutcome::PausedInstead);
        }

        let mut engine = self.lock_engine();

        // A play may have landed between the check above and the engine
        // lock; the loop is now blocked on us, so the redirect still holds.
        if self.pause_if_running() {
            return Ok(StepOutcome::PausedInstead);
        }
        self.control.update(|c| c.fast_forward = false);

        if engine.is_finished() {
            self.complete_locked(&mut engine)?;
            return Ok(StepOutcome::Completed);
        }

        engine.pre_step()?;
        engine.step()?;
        engine.post_step()?;

        let state = self.control.load().state;
        self.emit(EVENT_STEP_DONE, state);
        self.broadcast_locked(&engine);
        Ok(StepOutcome::Stepped)
    }

    /// Reset the engine and return to `Initialized`. Valid from any state.
    ///
    /// The state becomes `Initialized` before the engine lock is taken, so
    /// a running burst stops at its next step. Until the engine has been
    /// reset, play and fast-forward are refused rather than being
    /// overwritten when the reset lands.
    ///
    /// If the engine fails to reset, the error is logged and returned, no
    /// reset event is emitted, and the experiment stays `Initialized` with
    /// the engine in whatever condition the failed reset left it.
    pub fn reset(&self) -> Result<(), EngineError> {
        self.control.update(|c| {
            c.state = ExperimentState::Initialized;
            c.fast_forward = false;
            c.pending_resets = c.pending_resets.saturating_add(1);
        });
        let result = {
            let mut engine = self.lock_engine();
            self.reset_locked(&mut engine)
        };
        self.control
            .update(|c| c.pending_resets = c.pending_resets.saturating_sub(1));
        if let Err(e) = &result {
            self.notice(LogLevel::Error, format!("reset failed: {e}"));
        }
        result
    }

    /// Current status, read without the engine lock.
    pub fn status(&self) -> ExperimentStatus {
        let control = self.control.load();
        ExperimentStatus {
            state: control.state,
            fast_forward: control.fast_forward,
            tick_duration_ms: duration_ms(control.tick_duration),
            steps: self.last_steps.load(Ordering::Acquire),
            frames_per_broadcast: self.config.frames_per_broadcast_in_fast_forward(),
        }
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Ask the step loop to return at its next poll.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.control.notify();
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Shared with the step loop
    // -----------------------------------------------------------------------

    pub(crate) fn lock_engine(&self) -> MutexGuard<'_, E> {
        // A poisoned engine means a step panicked mid-update; the panic has
        // already been reported on the loop thread.
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) const fn shared_control(&self) -> &SharedControl {
        &self.control
    }

    /// Run the completion sequence: post-experiment hook, reset, done event.
    pub(crate) fn complete_locked(&self, engine: &mut E) -> Result<(), EngineError> {
        engine.post_experiment()?;
        self.reset_locked(engine)?;
        let state = self.control.load().state;
        self.emit(EVENT_DONE, state);
        self.notice(LogLevel::Info, String::from("Experiment done"));
        Ok(())
    }

    fn reset_locked(&self, engine: &mut E) -> Result<(), EngineError> {
        engine.reset()?;
        let state = self.control.update(|c| {
            c.fast_forward = false;
            c.state = ExperimentState::Initialized;
            c.started_at = None;
            c.state
        });
        self.emit(EVENT_RESET, state);
        self.broadcast_locked(engine);
        self.notice(LogLevel::Info, String::from("Experiment reset"));
        Ok(())
    }

    /// Assemble a snapshot of `engine` and hand it to the sink.
    pub(crate) fn broadcast_locked(&self, engine: &E) {
        let state = self.control.load().state;
        let (snapshot, failures) = snapshot::assemble(engine, &self.registry, state);
        for failure in failures {
            self.notice(
                LogLevel::Error,
                format!("entity cannot be converted: {failure}"),
            );
        }
        self.last_steps.store(snapshot.steps, Ordering::Release);
        self.sink.broadcast(snapshot);
    }

    /// Log through `tracing` and mirror the line to remote operators.
    pub(crate) fn notice(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Info => info!("{message}"),
            LogLevel::Warn => warn!("{message}"),
            LogLevel::Error => error!("{message}"),
        }
        self.sink.emit_log(LogRecord { level, message });
    }

    fn emit(&self, event: &str, state: ExperimentState) {
        self.sink.emit_event(ExperimentEvent::new(event, state));
    }

    /// Redirect a step issued while running into a pause.
    fn pause_if_running(&self) -> bool {
        let redirected = self.control.update(|c| {
            if c.state.is_running() {
                c.state = ExperimentState::Paused;
                c.fast_forward = false;
                Some(c.state)
            } else {
                None
            }
        });
        let Some(state) = redirected else {
            return false;
        };
        self.notice(
            LogLevel::Warn,
            String::from("step called while running, pausing the experiment to run a step"),
        );
        self.emit(EVENT_PAUSED, state);
        true
    }

    /// The engine's tick rate, or `None` while a cycle holds the engine.
    fn engine_tick_rate(&self) -> Option<f64> {
        match self.engine.try_lock() {
            Ok(engine) => Some(engine.tick_rate()),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner().tick_rate()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn tick_duration_or_keep(rate: Option<f64>, current: Duration) -> Duration {
        let Some(rate) = rate else {
            return current;
        };
        tick_duration_from_rate(rate).unwrap_or_else(|| {
            warn!(rate, "engine tick rate unusable, keeping previous tick duration");
            current
        })
    }
}

impl<E: SimulationEngine> ExperimentControl for Experiment<E> {
    fn play(&self) -> CommandOutcome {
        Self::play(self)
    }

    fn pause(&self) -> Result<ExperimentState, ControlError> {
        Self::pause(self)
    }

    fn step(&self) -> Result<StepOutcome, EngineError> {
        Self::step(self)
    }

    fn fast_forward(&self) -> CommandOutcome {
        Self::fast_forward(self)
    }

    fn reset(&self) -> Result<(), EngineError> {
        Self::reset(self)
    }

    fn status(&self) -> ExperimentStatus {
        Self::status(self)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
