//! Shared fixtures for experiment integration tests: a scripted engine that
//! records every hook call, and a sink that records everything published.

#![allow(dead_code, clippy::unwrap_used)]

use std::any::Any;
use std::cell::RefCell;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use simcast_core::config::LoopConfig;
use simcast_core::engine::{Arena, EngineError, SimulationEngine, Vec3};
use simcast_core::entity::{ConverterRegistry, Entity};
use simcast_core::experiment::Experiment;
use simcast_core::sink::{BroadcastSink, ExperimentEvent, LogLevel, LogRecord};
use simcast_core::snapshot::Snapshot;

/// One engine interaction, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    PreStep,
    Step,
    Snapshot,
    PostStep,
    PostExperiment,
    Reset,
}

#[derive(Debug, Serialize)]
pub struct Beacon {
    pub id: String,
    #[serde(skip)]
    pub kind: &'static str,
}

impl Entity for Beacon {
    fn kind(&self) -> &str {
        self.kind
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Engine whose behaviour is fixed up front.
#[derive(Debug)]
pub struct ScriptedEngine {
    pub steps: u64,
    /// Finish after this many steps.
    pub length: Option<u64>,
    pub tick_rate: f64,
    /// Wall time burned by each step.
    pub step_cost: Duration,
    /// Fail the step that would take the count past this value.
    pub fail_after: Option<u64>,
    /// Make `reset` fail.
    pub reset_fails: bool,
    pub beacons: Vec<Beacon>,
    pub calls: RefCell<Vec<Call>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            steps: 0,
            length: None,
            tick_rate: 1000.0,
            step_cost: Duration::ZERO,
            fail_after: None,
            reset_fails: false,
            beacons: vec![Beacon {
                id: String::from("beacon_0"),
                kind: "beacon",
            }],
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_tick_rate(mut self, rate: f64) -> Self {
        self.tick_rate = rate;
        self
    }

    pub fn with_step_cost(mut self, cost: Duration) -> Self {
        self.step_cost = cost;
        self
    }

    pub fn failing_after(mut self, steps: u64) -> Self {
        self.fail_after = Some(steps);
        self
    }

    pub fn with_failing_reset(mut self) -> Self {
        self.reset_fails = true;
        self
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls.borrow().iter().filter(|c| **c == call).count()
    }

    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl SimulationEngine for ScriptedEngine {
    fn is_finished(&self) -> bool {
        self.length.is_some_and(|l| self.steps >= l)
    }

    fn step(&mut self) -> Result<(), EngineError> {
        if self.fail_after.is_some_and(|f| self.steps >= f) {
            return Err(EngineError::Step {
                message: String::from("scripted failure"),
            });
        }
        if !self.step_cost.is_zero() {
            std::thread::sleep(self.step_cost);
        }
        self.steps += 1;
        self.record(Call::Step);
        Ok(())
    }

    fn pre_step(&mut self) -> Result<(), EngineError> {
        self.record(Call::PreStep);
        Ok(())
    }

    fn post_step(&mut self) -> Result<(), EngineError> {
        self.record(Call::PostStep);
        Ok(())
    }

    fn post_experiment(&mut self) -> Result<(), EngineError> {
        self.record(Call::PostExperiment);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), EngineError> {
        if self.reset_fails {
            return Err(EngineError::Reset {
                message: String::from("scripted reset failure"),
            });
        }
        self.steps = 0;
        self.record(Call::Reset);
        Ok(())
    }

    fn current_step(&self) -> u64 {
        self.steps
    }

    fn tick_rate(&self) -> f64 {
        self.tick_rate
    }

    fn arena(&self) -> Arena {
        Arena {
            size: Vec3::new(2.0, 2.0, 1.0),
            center: Vec3::default(),
        }
    }

    fn entities(&self) -> Vec<&dyn Entity> {
        self.record(Call::Snapshot);
        self.beacons.iter().map(|b| b as &dyn Entity).collect()
    }
}

/// Sink that keeps everything it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub snapshots: Mutex<Vec<Snapshot>>,
    pub events: Mutex<Vec<ExperimentEvent>>,
    pub logs: Mutex<Vec<LogRecord>>,
}

impl RecordingSink {
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event.clone())
            .collect()
    }

    pub fn logs_at(&self, level: LogLevel) -> Vec<String> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.level == level)
            .map(|r| r.message.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.snapshots.lock().unwrap().clear();
        self.events.lock().unwrap().clear();
        self.logs.lock().unwrap().clear();
    }
}

impl BroadcastSink for RecordingSink {
    fn broadcast(&self, snapshot: Snapshot) {
        self.snapshots.lock().unwrap().push(snapshot);
    }

    fn emit_event(&self, event: ExperimentEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn emit_log(&self, record: LogRecord) {
        self.logs.lock().unwrap().push(record);
    }
}

pub fn registry() -> ConverterRegistry {
    let mut registry = ConverterRegistry::new();
    registry.register_serialize::<Beacon>("beacon");
    registry
}

pub fn loop_config(frames: u32) -> LoopConfig {
    LoopConfig::new(frames, Duration::from_millis(5), false).unwrap()
}

pub fn experiment(
    engine: ScriptedEngine,
    frames: u32,
) -> (Arc<Experiment<ScriptedEngine>>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let experiment = Experiment::new(
        engine,
        registry(),
        Arc::clone(&sink) as Arc<dyn BroadcastSink>,
        loop_config(frames),
    )
    .unwrap();
    (Arc::new(experiment), sink)
}
