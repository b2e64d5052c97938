//! Experiment playback core for Simcast.
//!
//! This crate drives a stepped simulation at a wall-clock cadence while
//! operators control playback remotely (play, pause, step, fast-forward,
//! reset) and observers receive a snapshot once per cycle.
//!
//! # Modules
//!
//! - [`clock`] -- Wall-clock pacer that holds each cycle to its tick budget.
//! - [`config`] -- YAML configuration loading and validation.
//! - [`engine`] -- [`SimulationEngine`] trait implemented by the physics side.
//! - [`entity`] -- Entity kinds and the [`ConverterRegistry`] used to render
//!   them into snapshots.
//! - [`experiment`] -- The [`Experiment`] control surface and its shared state.
//! - [`runner`] -- The step loop that advances the engine on its own thread.
//! - [`sink`] -- [`BroadcastSink`] trait receiving snapshots, events and logs.
//! - [`snapshot`] -- Per-cycle [`Snapshot`] assembly.
//! - [`state`] -- [`ExperimentState`] and the atomically swapped control value.
//!
//! [`SimulationEngine`]: engine::SimulationEngine
//! [`ConverterRegistry`]: entity::ConverterRegistry
//! [`Experiment`]: experiment::Experiment
//! [`BroadcastSink`]: sink::BroadcastSink
//! [`Snapshot`]: snapshot::Snapshot
//! [`ExperimentState`]: state::ExperimentState

pub mod clock;
pub mod config;
pub mod engine;
pub mod entity;
pub mod experiment;
pub mod runner;
pub mod sink;
pub mod snapshot;
pub mod state;
