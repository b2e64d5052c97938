//! Server binary for Simcast.
//!
//! Wires the bundled demo engine into an experiment, runs the step loop
//! on its own thread, and serves the observer API alongside it.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load and validate configuration from `simcast-config.yaml`
//! 3. Build the demo engine and its converter registry
//! 4. Create the experiment, publishing into the observer sink
//! 5. Start the Observer API server and snapshot publisher
//! 6. Spawn the step loop thread
//! 7. Supervise until the loop exits or Ctrl-C

mod demo;
mod error;
mod supervisor;

use std::sync::Arc;

use simcast_core::config::SimcastConfig;
use simcast_core::experiment::{Experiment, ExperimentControl};
use simcast_observer::server::ServerConfig;
use simcast_observer::sink::ObserverSink;
use simcast_observer::state::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::demo::DemoEngine;
use crate::error::AppError;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any initialization step fails or the step loop
/// stops on an engine fault.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_names(true)
        .init();

    info!("simcast-server starting");

    // 2. Load configuration.
    let config = SimcastConfig::load()?;
    let loop_config = config.loop_config()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        broadcast_frequency = config.playback.broadcast_frequency,
        ff_draw_frames_every = config.playback.ff_draw_frames_every,
        "Configuration loaded"
    );

    // 3. Demo engine.
    let engine = DemoEngine::new(&config.demo);
    info!(
        seed = config.demo.seed,
        particles = engine.particles().len(),
        experiment_length = config.demo.experiment_length,
        tick_rate = config.demo.tick_rate,
        "Demo engine created"
    );

    // 4. Experiment.
    let sink = ObserverSink::new();
    let experiment = Arc::new(Experiment::new(
        engine,
        demo::registry(),
        Arc::new(sink.clone()),
        loop_config,
    )?);

    // 5. Observer API server.
    let app_state = observer_state(sink, &experiment, config.playback.broadcast_frequency);
    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    let observer = simcast_observer::spawn_observer(&server_config, app_state).await?;

    // 6. Step loop thread.
    let handle = supervisor::spawn_step_loop(Arc::clone(&experiment))?;

    // 7. Supervise.
    let result = supervisor::supervise(experiment, handle).await;
    observer.abort();
    info!("simcast-server stopped");

    result?;
    Ok(())
}

/// Shared observer state driving `experiment`.
fn observer_state(
    sink: ObserverSink,
    experiment: &Arc<Experiment<DemoEngine>>,
    broadcast_frequency: u32,
) -> Arc<AppState> {
    let control = Arc::clone(experiment) as Arc<dyn ExperimentControl>;
    Arc::new(AppState::new(sink, control, broadcast_frequency))
}
