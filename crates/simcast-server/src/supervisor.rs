//! Step loop supervision.
//!
//! The step loop blocks, so it runs on its own OS thread. The supervisor
//! waits for either that thread to return or Ctrl-C; on Ctrl-C it asks
//! the loop to stop and waits for it before returning.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use simcast_core::engine::SimulationEngine;
use simcast_core::experiment::Experiment;
use simcast_core::runner::{LoopError, LoopExit};
use tracing::{error, info};

use crate::error::AppError;

/// Name of the step loop thread.
pub const LOOP_THREAD_NAME: &str = "simcast-step-loop";

/// Spawn `experiment.run()` on a named OS thread.
pub fn spawn_step_loop<E>(
    experiment: Arc<Experiment<E>>,
) -> Result<JoinHandle<Result<LoopExit, LoopError>>, AppError>
where
    E: SimulationEngine + 'static,
{
    let handle = thread::Builder::new()
        .name(String::from(LOOP_THREAD_NAME))
        .spawn(move || {
            let result = experiment.run();
            if let Err(e) = &result {
                error!(error = %e, "Step loop stopped on engine fault");
            }
            result
        })?;
    Ok(handle)
}

/// Join the loop thread without blocking the runtime.
async fn join(handle: JoinHandle<Result<LoopExit, LoopError>>) -> Result<LoopExit, AppError> {
    let joined = tokio::task::spawn_blocking(move || handle.join())
        .await
        .map_err(|e| AppError::Join {
            message: e.to_string(),
        })?;
    let result = joined.map_err(|payload| AppError::Join {
        message: format!(
            "step loop thread panicked: {}",
            payload
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("unknown cause")
        ),
    })?;
    result.map_err(AppError::from)
}

/// Run until the loop returns or Ctrl-C is received.
pub async fn supervise<E>(
    experiment: Arc<Experiment<E>>,
    handle: JoinHandle<Result<LoopExit, LoopError>>,
) -> Result<LoopExit, AppError>
where
    E: SimulationEngine + 'static,
{
    let mut loop_done = tokio::spawn(join(handle));

    let joined = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Ctrl-C received, stopping step loop");
            experiment.request_shutdown();
            (&mut loop_done).await
        }
        joined = &mut loop_done => joined,
    };

    let exit = joined.map_err(|e| AppError::Join {
        message: e.to_string(),
    })??;
    info!(?exit, "Step loop exited");
    Ok(exit)
}
