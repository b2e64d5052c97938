//! Configuration loading and typed config structures for Simcast.
//!
//! The canonical configuration lives in `simcast-config.yaml` in the
//! working directory. Every field has a default, so a missing file or a
//! partial one is fine; out-of-range tuning values are not, and fail
//! [`SimcastConfig::validate`] before anything starts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

/// Config file name resolved against the working directory when
/// `SIMCAST_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "simcast-config.yaml";

/// Accepted range for `playback.broadcast_frequency` (broadcasts/second).
pub const BROADCAST_FREQUENCY_RANGE: (u32, u32) = (1, 1000);

/// Accepted range for `playback.ff_draw_frames_every`.
pub const FRAMES_PER_BROADCAST_RANGE: (u32, u32) = (1, 1000);

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A tuning value lies outside its accepted range.
    #[error("{field} = {value} is out of range [{min},{max}]")]
    OutOfRange {
        /// Dotted path of the offending field.
        field: &'static str,
        /// The configured value.
        value: u64,
        /// Inclusive lower bound.
        min: u64,
        /// Inclusive upper bound.
        max: u64,
    },

    /// The engine reported a tick rate that cannot produce a tick duration.
    #[error("engine tick rate {rate} is not a positive finite number")]
    InvalidTickRate {
        /// The reported ticks per second.
        rate: f64,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration, mirroring `simcast-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimcastConfig {
    /// Observer server binding.
    #[serde(default)]
    pub server: ServerSection,

    /// Playback tuning for the step loop and the broadcaster.
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Parameters of the bundled demo engine.
    #[serde(default)]
    pub demo: DemoConfig,
}

impl SimcastConfig {
    /// Load the process configuration.
    ///
    /// Reads the file named by `SIMCAST_CONFIG`, or [`DEFAULT_CONFIG_PATH`].
    /// A missing file yields defaults (still subject to `SIMCAST_PORT`).
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os("SIMCAST_CONFIG")
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
        if path.exists() {
            info!(path = %path.display(), "Loading config file");
            Self::from_file(&path)
        } else {
            info!(path = %path.display(), "Config file not found, using defaults");
            let mut config = Self::default();
            config.server.apply_env_overrides();
            Ok(config)
        }
    }

    /// Load configuration from a YAML file at the given path.
    ///
    /// `SIMCAST_PORT` overrides `server.port` when set to a valid port.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.server.apply_env_overrides();
        Ok(config)
    }

    /// Reject tuning values outside their accepted ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "playback.broadcast_frequency",
            self.playback.broadcast_frequency,
            BROADCAST_FREQUENCY_RANGE,
        )?;
        check_range(
            "playback.ff_draw_frames_every",
            self.playback.ff_draw_frames_every,
            FRAMES_PER_BROADCAST_RANGE,
        )?;
        if self.playback.idle_interval_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "playback.idle_interval_ms",
                value: 0,
                min: 1,
                max: u64::MAX,
            });
        }
        Ok(())
    }

    /// Validate and build the immutable step loop configuration.
    pub fn loop_config(&self) -> Result<LoopConfig, ConfigError> {
        self.validate()?;
        LoopConfig::new(
            self.playback.ff_draw_frames_every,
            Duration::from_millis(self.playback.idle_interval_ms),
            self.playback.exit_on_completion,
        )
    }
}

fn check_range(field: &'static str, value: u32, (min, max): (u32, u32)) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value: u64::from(value),
            min: u64::from(min),
            max: u64::from(max),
        })
    }
}

/// Observer server binding.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSection {
    fn apply_env_overrides(&mut self) {
        if let Some(port) = std::env::var("SIMCAST_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.port = port;
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Playback tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlaybackConfig {
    /// Snapshots pushed to clients per second.
    #[serde(default = "default_broadcast_frequency")]
    pub broadcast_frequency: u32,

    /// Engine steps collapsed into one broadcast while fast-forwarding.
    #[serde(default = "default_ff_draw_frames_every")]
    pub ff_draw_frames_every: u32,

    /// Sleep between heartbeat snapshots while initialized or paused.
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,

    /// Stop the step loop thread when an experiment finishes instead of
    /// returning to the initialized state.
    #[serde(default)]
    pub exit_on_completion: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            broadcast_frequency: default_broadcast_frequency(),
            ff_draw_frames_every: default_ff_draw_frames_every(),
            idle_interval_ms: default_idle_interval_ms(),
            exit_on_completion: false,
        }
    }
}

/// Demo engine parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DemoConfig {
    /// Seed for particle placement.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of particles in the arena.
    #[serde(default = "default_particles")]
    pub particles: u32,

    /// Steps until the experiment finishes (0 = never).
    #[serde(default = "default_experiment_length")]
    pub experiment_length: u64,

    /// Physics ticks per second.
    #[serde(default = "default_tick_rate")]
    pub tick_rate: f64,

    /// Arena extent along x, y and z.
    #[serde(default = "default_arena_size")]
    pub arena_size: [f64; 3],
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            particles: default_particles(),
            experiment_length: default_experiment_length(),
            tick_rate: default_tick_rate(),
            arena_size: default_arena_size(),
        }
    }
}

/// Immutable step loop configuration.
///
/// Only constructible through validation, so a running loop never sees
/// out-of-range values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    frames_per_broadcast_in_fast_forward: u32,
    idle_interval: Duration,
    exit_on_completion: bool,
}

impl LoopConfig {
    /// Build a loop configuration, validating the fast-forward frame count.
    pub fn new(
        frames_per_broadcast_in_fast_forward: u32,
        idle_interval: Duration,
        exit_on_completion: bool,
    ) -> Result<Self, ConfigError> {
        check_range(
            "playback.ff_draw_frames_every",
            frames_per_broadcast_in_fast_forward,
            FRAMES_PER_BROADCAST_RANGE,
        )?;
        Ok(Self {
            frames_per_broadcast_in_fast_forward,
            idle_interval,
            exit_on_completion,
        })
    }

    /// Engine steps per broadcast while fast-forwarding.
    pub const fn frames_per_broadcast_in_fast_forward(&self) -> u32 {
        self.frames_per_broadcast_in_fast_forward
    }

    /// Heartbeat interval while idle.
    pub const fn idle_interval(&self) -> Duration {
        self.idle_interval
    }

    /// Whether the loop exits once an experiment finishes.
    pub const fn exit_on_completion(&self) -> bool {
        self.exit_on_completion
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            frames_per_broadcast_in_fast_forward: default_ff_draw_frames_every(),
            idle_interval: Duration::from_millis(default_idle_interval_ms()),
            exit_on_completion: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    3000
}

const fn default_broadcast_frequency() -> u32 {
    10
}

const fn default_ff_draw_frames_every() -> u32 {
    2
}

const fn default_idle_interval_ms() -> u64 {
    250
}

const fn default_seed() -> u64 {
    42
}

const fn default_particles() -> u32 {
    16
}

const fn default_experiment_length() -> u64 {
    3000
}

const fn default_tick_rate() -> f64 {
    10.0
}

const fn default_arena_size() -> [f64; 3] {
    [10.0, 10.0, 1.0]
}
