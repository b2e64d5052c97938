//! Error types for the server binary.
//!
//! [`AppError`] is the top-level error type that wraps all possible
//! failure modes during startup and while supervising the step loop.

use simcast_core::config::ConfigError;
use simcast_core::runner::LoopError;
use simcast_observer::startup::StartupError;

/// Top-level error for the server binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// Observer API server failed to start.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying startup error.
        #[from]
        source: StartupError,
    },

    /// The step loop stopped on an engine fault.
    #[error("step loop error: {source}")]
    Loop {
        /// The underlying loop error.
        #[from]
        source: LoopError,
    },

    /// Spawning the loop thread or installing the signal handler failed.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The step loop thread panicked or could not be joined.
    #[error("step loop thread failed: {message}")]
    Join {
        /// Description of the failure.
        message: String,
    },
}
