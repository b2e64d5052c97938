//! Control surface transitions, guards and fast-forward flag handling.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{Call, ScriptedEngine, experiment};
use simcast_core::engine::EngineError;
use simcast_core::experiment::{
    CommandOutcome, ControlError, EVENT_FAST_FORWARDING, EVENT_PAUSED, EVENT_PLAYING, EVENT_RESET,
    EVENT_STEP_DONE, StepOutcome,
};
use simcast_core::sink::LogLevel;
use simcast_core::state::ExperimentState;

#[test]
fn starts_initialized_without_fast_forward() {
    let (exp, _sink) = experiment(ScriptedEngine::new(), 5);
    let control = exp.control_state();
    assert_eq!(control.state, ExperimentState::Initialized);
    assert!(!control.fast_forward);
}

#[test]
fn play_from_initialized_emits_event() {
    let (exp, sink) = experiment(ScriptedEngine::new(), 5);
    assert_eq!(exp.play(), CommandOutcome::Applied(ExperimentState::Playing));
    assert_eq!(exp.state(), ExperimentState::Playing);
    assert_eq!(sink.event_names(), vec![EVENT_PLAYING]);
}

#[test]
fn play_while_playing_is_ignored_with_warning() {
    let (exp, sink) = experiment(ScriptedEngine::new(), 5);
    exp.play();
    sink.clear();

    assert_eq!(exp.play(), CommandOutcome::Ignored(ExperimentState::Playing));
    assert!(sink.event_names().is_empty());
    assert_eq!(sink.logs_at(LogLevel::Warn).len(), 1);
}

#[test]
fn play_from_paused_clears_fast_forward() {
    let (exp, _sink) = experiment(ScriptedEngine::new(), 5);
    exp.fast_forward();
    exp.pause().unwrap();
    exp.play();
    let control = exp.control_state();
    assert_eq!(control.state, ExperimentState::Playing);
    assert!(!control.fast_forward);
}

#[test]
fn play_derives_tick_duration_from_engine_rate() {
    let (exp, _sink) = experiment(ScriptedEngine::new().with_tick_rate(20.0), 5);
    exp.play();
    assert_eq!(exp.status().tick_duration_ms, 50);
}

#[test]
fn fast_forward_then_pause_clears_flag() {
    let (exp, sink) = experiment(ScriptedEngine::new(), 5);
    assert_eq!(
        exp.fast_forward(),
        CommandOutcome::Applied(ExperimentState::FastForwarding)
    );
    assert!(exp.control_state().fast_forward);

    assert_eq!(exp.pause(), Ok(ExperimentState::Paused));
    let control = exp.control_state();
    assert_eq!(control.state, ExperimentState::Paused);
    assert!(!control.fast_forward);
    assert_eq!(sink.event_names(), vec![EVENT_FAST_FORWARDING, EVENT_PAUSED]);
}

#[test]
fn fast_forward_while_playing_warns_but_applies() {
    let (exp, sink) = experiment(ScriptedEngine::new(), 5);
    exp.play();
    sink.clear();

    assert_eq!(
        exp.fast_forward(),
        CommandOutcome::Applied(ExperimentState::FastForwarding)
    );
    assert!(exp.control_state().fast_forward);
    assert_eq!(sink.logs_at(LogLevel::Warn).len(), 1);
    assert_eq!(sink.event_names(), vec![EVENT_FAST_FORWARDING]);
}

#[test]
fn pause_from_initialized_is_an_error_and_changes_nothing() {
    let (exp, sink) = experiment(ScriptedEngine::new(), 5);
    let err = exp.pause().unwrap_err();
    assert_eq!(
        err,
        ControlError::InvalidState {
            command: "pause",
            state: ExperimentState::Initialized
        }
    );
    assert_eq!(exp.state(), ExperimentState::Initialized);
    assert!(sink.event_names().is_empty());
}

#[test]
fn pause_from_paused_is_an_error() {
    let (exp, _sink) = experiment(ScriptedEngine::new(), 5);
    exp.play();
    exp.pause().unwrap();
    assert!(exp.pause().is_err());
    assert_eq!(exp.state(), ExperimentState::Paused);
}

#[test]
fn step_while_playing_pauses_without_stepping() {
    let (exp, sink) = experiment(ScriptedEngine::new(), 5);
    exp.play();
    sink.clear();

    assert_eq!(exp.step().unwrap(), StepOutcome::PausedInstead);
    assert_eq!(exp.state(), ExperimentState::Paused);
    assert_eq!(exp.with_engine(|e| e.steps), 0);
    assert_eq!(sink.event_names(), vec![EVENT_PAUSED]);
}

#[test]
fn step_while_fast_forwarding_pauses_and_clears_flag() {
    let (exp, _sink) = experiment(ScriptedEngine::new(), 5);
    exp.fast_forward();
    assert_eq!(exp.step().unwrap(), StepOutcome::PausedInstead);
    let control = exp.control_state();
    assert_eq!(control.state, ExperimentState::Paused);
    assert!(!control.fast_forward);
}

#[test]
fn step_from_paused_runs_exactly_one_step() {
    let (exp, sink) = experiment(ScriptedEngine::new(), 5);
    exp.play();
    exp.pause().unwrap();
    sink.clear();

    assert_eq!(exp.step().unwrap(), StepOutcome::Stepped);
    assert_eq!(exp.state(), ExperimentState::Paused);
    assert_eq!(
        exp.with_engine(|e| e.take_calls()),
        vec![Call::PreStep, Call::Step, Call::PostStep, Call::Snapshot]
    );
    assert_eq!(sink.event_names(), vec![EVENT_STEP_DONE]);
    let snapshots = sink.snapshots();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].steps, 1);
    assert_eq!(exp.status().steps, 1);
}

#[test]
fn step_from_initialized_stays_initialized() {
    let (exp, _sink) = experiment(ScriptedEngine::new(), 5);
    exp.step().unwrap();
    exp.step().unwrap();
    assert_eq!(exp.state(), ExperimentState::Initialized);
    assert_eq!(exp.with_engine(|e| e.steps), 2);
}

#[test]
fn step_on_finished_experiment_completes_it() {
    let (exp, sink) = experiment(ScriptedEngine::new().with_length(1), 5);
    assert_eq!(exp.step().unwrap(), StepOutcome::Stepped);
    assert_eq!(exp.step().unwrap(), StepOutcome::Completed);
    assert_eq!(exp.with_engine(|e| e.count(Call::PostExperiment)), 1);
    assert_eq!(exp.with_engine(|e| e.steps), 0);
    assert!(sink.event_names().ends_with(&[
        String::from(EVENT_RESET),
        String::from("Experiment done")
    ]));
}

#[test]
fn step_from_paused_leaves_fast_forward_cleared() {
    let (exp, _sink) = experiment(ScriptedEngine::new(), 5);
    exp.fast_forward();
    exp.pause().unwrap();
    exp.step().unwrap();
    assert!(!exp.control_state().fast_forward);
}

#[test]
fn reset_from_every_state_returns_to_initialized_at_step_zero() {
    type Setup = fn(&simcast_core::experiment::Experiment<ScriptedEngine>);
    let setups: [Setup; 4] = [
        |_| {},
        |e| {
            e.play();
        },
        |e| {
            e.fast_forward();
        },
        |e| {
            e.play();
            e.pause().unwrap();
        },
    ];

    for setup in setups {
        let (exp, sink) = experiment(ScriptedEngine::new(), 5);
        exp.step().unwrap();
        setup(&exp);
        sink.clear();

        exp.reset().unwrap();

        let control = exp.control_state();
        assert_eq!(control.state, ExperimentState::Initialized);
        assert!(!control.fast_forward);
        assert_eq!(exp.with_engine(|e| e.steps), 0);
        assert_eq!(sink.event_names(), vec![EVENT_RESET]);
        assert_eq!(sink.snapshots().last().unwrap().steps, 0);
    }
}

#[test]
fn reset_is_idempotent() {
    let (exp, _sink) = experiment(ScriptedEngine::new(), 5);
    exp.reset().unwrap();
    exp.reset().unwrap();
    assert_eq!(exp.state(), ExperimentState::Initialized);
    assert_eq!(exp.with_engine(|e| e.count(Call::Reset)), 2);
}

#[test]
fn play_while_reset_waits_for_the_engine_is_ignored() {
    let (exp, sink) = experiment(ScriptedEngine::new(), 5);
    exp.play();
    sink.clear();

    // Hold the engine so the reset parks after flipping the state.
    let resetter = exp.with_engine(|_| {
        let background = Arc::clone(&exp);
        let handle = thread::spawn(move || background.reset());
        while exp.control_state().pending_resets == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(
            exp.play(),
            CommandOutcome::Ignored(ExperimentState::Initialized)
        );
        assert_eq!(
            exp.fast_forward(),
            CommandOutcome::Ignored(ExperimentState::Initialized)
        );
        handle
    });
    resetter.join().unwrap().unwrap();

    let control = exp.control_state();
    assert_eq!(control.state, ExperimentState::Initialized);
    assert!(!control.fast_forward);
    assert_eq!(control.pending_resets, 0);
    assert_eq!(sink.event_names(), vec![EVENT_RESET]);
    assert_eq!(sink.logs_at(LogLevel::Warn).len(), 2);

    // Once the reset has landed, play sticks.
    assert_eq!(exp.play(), CommandOutcome::Applied(ExperimentState::Playing));
    assert_eq!(exp.state(), ExperimentState::Playing);
    assert_eq!(sink.event_names(), vec![EVENT_RESET, EVENT_PLAYING]);
}

#[test]
fn failed_reset_stays_initialized_without_an_event() {
    let (exp, sink) = experiment(ScriptedEngine::new().with_failing_reset(), 5);
    exp.step().unwrap();
    exp.play();
    sink.clear();

    let err = exp.reset().unwrap_err();
    assert!(matches!(err, EngineError::Reset { .. }));

    let control = exp.control_state();
    assert_eq!(control.state, ExperimentState::Initialized);
    assert!(!control.fast_forward);
    assert_eq!(control.pending_resets, 0);
    assert!(sink.event_names().is_empty());
    let errors = sink.logs_at(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors.iter().all(|m| m.contains("reset failed")));

    // The engine was not rewound, and the experiment can be played again.
    assert_eq!(exp.with_engine(|e| e.steps), 1);
    assert_eq!(exp.play(), CommandOutcome::Applied(ExperimentState::Playing));
}
