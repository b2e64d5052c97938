//! Playback command dispatch shared by the REST and `WebSocket` surfaces.
//!
//! Play, pause and fast-forward only touch the control state and return
//! immediately. Step and reset need the engine lock, which the step loop
//! may hold for a whole cycle, so they run on the blocking pool.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use simcast_core::experiment::{
    CommandOutcome, EVENT_DONE, EVENT_FAST_FORWARDING, EVENT_PAUSED, EVENT_PLAYING, EVENT_RESET,
    EVENT_STEP_DONE, ExperimentControl, StepOutcome,
};
use simcast_core::state::ExperimentState;
use tracing::debug;

use crate::error::ObserverError;

/// A playback command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Start or resume real-time stepping.
    Play,
    /// Pause a running experiment.
    Pause,
    /// Advance by one step.
    Step,
    /// Step as fast as possible.
    #[serde(alias = "fast_forward")]
    FastForward,
    /// Return to the initial condition.
    Reset,
}

impl Command {
    /// Lowercase wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Step => "step",
            Self::FastForward => "fastforward",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound `{"command": "..."}` payload.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CommandRequest {
    /// The command to run.
    pub command: Command,
}

/// Answer to a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    /// The command that was run.
    pub command: Command,
    /// Whether the command had its nominal effect.
    pub applied: bool,
    /// State after the command.
    pub state: ExperimentState,
    /// Human-readable summary.
    pub message: String,
}

impl CommandReply {
    fn new(command: Command, applied: bool, state: ExperimentState, message: &str) -> Self {
        Self {
            command,
            applied,
            state,
            message: message.to_owned(),
        }
    }

    fn from_outcome(command: Command, outcome: CommandOutcome, applied_message: &str) -> Self {
        match outcome {
            CommandOutcome::Applied(state) => Self::new(command, true, state, applied_message),
            CommandOutcome::Ignored(state) => Self::new(
                command,
                false,
                state,
                &format!("{command} ignored, current state: {state}"),
            ),
        }
    }
}

/// Run `command` against `control`.
pub async fn dispatch(
    control: Arc<dyn ExperimentControl>,
    command: Command,
) -> Result<CommandReply, ObserverError> {
    debug!(%command, "Dispatching playback command");

    match command {
        Command::Play => Ok(CommandReply::from_outcome(
            command,
            control.play(),
            EVENT_PLAYING,
        )),
        Command::FastForward => Ok(CommandReply::from_outcome(
            command,
            control.fast_forward(),
            EVENT_FAST_FORWARDING,
        )),
        Command::Pause => {
            let state = control.pause()?;
            Ok(CommandReply::new(command, true, state, EVENT_PAUSED))
        }
        Command::Step => {
            let handle = Arc::clone(&control);
            let outcome = tokio::task::spawn_blocking(move || handle.step())
                .await
                .map_err(|e| ObserverError::Internal(format!("step task failed: {e}")))??;
            let state = control.status().state;
            Ok(match outcome {
                StepOutcome::Stepped => CommandReply::new(command, true, state, EVENT_STEP_DONE),
                StepOutcome::Completed => CommandReply::new(command, true, state, EVENT_DONE),
                StepOutcome::PausedInstead => {
                    CommandReply::new(command, false, state, "experiment was running, paused instead")
                }
            })
        }
        Command::Reset => {
            let handle = Arc::clone(&control);
            tokio::task::spawn_blocking(move || handle.reset())
                .await
                .map_err(|e| ObserverError::Internal(format!("reset task failed: {e}")))??;
            Ok(CommandReply::new(
                command,
                true,
                control.status().state,
                EVENT_RESET,
            ))
        }
    }
}
