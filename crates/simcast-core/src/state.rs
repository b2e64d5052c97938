//! Experiment state and the shared control value.
//!
//! The step loop polls the control value every cycle and every inner
//! step, while operator commands mutate it from transport threads. All
//! three coupled fields (state, fast-forward flag, tick duration) live in
//! one [`ControlState`] value behind a single mutex so a reader can never
//! observe a new tick duration paired with a stale state.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Playback state of the experiment.
///
/// There is no terminal state: a finished experiment is reset back to
/// [`ExperimentState::Initialized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExperimentState {
    /// Freshly created or reset; nothing is stepping.
    #[serde(rename = "EXPERIMENT_INITIALIZED")]
    Initialized,
    /// Stepping once per cycle.
    #[serde(rename = "EXPERIMENT_PLAYING")]
    Playing,
    /// Stepping several times per cycle, broadcasting once.
    #[serde(rename = "EXPERIMENT_FAST_FORWARDING")]
    FastForwarding,
    /// Halted by the operator; resumable.
    #[serde(rename = "EXPERIMENT_PAUSED")]
    Paused,
}

impl ExperimentState {
    /// Wire label used in snapshots and events.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Initialized => "EXPERIMENT_INITIALIZED",
            Self::Playing => "EXPERIMENT_PLAYING",
            Self::FastForwarding => "EXPERIMENT_FAST_FORWARDING",
            Self::Paused => "EXPERIMENT_PAUSED",
        }
    }

    /// Whether the step loop should be advancing the engine.
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Playing | Self::FastForwarding)
    }
}

impl fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The coupled control fields, swapped as one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    /// Current playback state.
    pub state: ExperimentState,
    /// Set only by fast-forward; cleared by every other command.
    pub fast_forward: bool,
    /// Wall-clock budget for one cycle.
    pub tick_duration: Duration,
    /// When the last play or fast-forward command was accepted. The step
    /// loop takes it to time the first cycle from the command.
    pub started_at: Option<Instant>,
    /// Resets waiting for the engine lock. Play and fast-forward are
    /// refused while this is non-zero.
    pub pending_resets: u32,
}

impl ControlState {
    /// Initial control value: `Initialized`, fast-forward off.
    pub const fn new(tick_duration: Duration) -> Self {
        Self {
            state: ExperimentState::Initialized,
            fast_forward: false,
            tick_duration,
            started_at: None,
            pending_resets: 0,
        }
    }

    /// Whether a reset has claimed the state but not yet reset the engine.
    pub const fn reset_pending(&self) -> bool {
        self.pending_resets > 0
    }

    /// Number of engine steps to run in one cycle before broadcasting.
    pub const fn steps_per_cycle(&self, frames_per_broadcast: u32) -> u32 {
        if self.fast_forward {
            frames_per_broadcast
        } else {
            1
        }
    }
}

/// Mutex-guarded [`ControlState`] with a wake-up signal for the idle loop.
#[derive(Debug)]
pub struct SharedControl {
    inner: Mutex<ControlState>,
    wake: Condvar,
}

impl SharedControl {
    /// Wrap an initial control value.
    pub const fn new(initial: ControlState) -> Self {
        Self {
            inner: Mutex::new(initial),
            wake: Condvar::new(),
        }
    }

    // The guarded value is plain `Copy` data, so a panic while holding the
    // lock cannot leave it half-written.
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy out the current control value.
    pub fn load(&self) -> ControlState {
        *self.lock()
    }

    /// Apply `f` to the control value atomically and wake the idle loop.
    pub fn update<R>(&self, f: impl FnOnce(&mut ControlState) -> R) -> R {
        let result = {
            let mut guard = self.lock();
            f(&mut guard)
        };
        self.wake.notify_all();
        result
    }

    /// Wake anyone blocked in [`wait_idle`](Self::wait_idle).
    pub fn notify(&self) {
        self.wake.notify_all();
    }

    /// Block for at most `timeout`, returning early when a command updates
    /// the control value.
    pub fn wait_idle(&self, timeout: Duration) {
        let guard = self.lock();
        if guard.state.is_running() {
            return;
        }
        let _unused = self
            .wake
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner);
    }
}
