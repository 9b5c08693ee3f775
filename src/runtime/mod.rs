// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Engine task.
//!
//! One task owns the [`ChordEngine`] and the MIDI sink. Each pass it
//! ticks the engine, drains every queued input, then sleeps until the
//! earliest deadline the engine reported or until new input arrives. A
//! zero deadline only yields.
//!
//! Everything else talks to the task through an [`EngineHandle`].

use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::config::{ConfigEvent, ConfigWatcher};
use crate::engine::{AutoplaySwitch, ChordEngine, Command, CommandEvent};
use crate::midi::MidiSink;
use crate::state::PerformanceState;
use crate::timing::MicroClock;

/// Input to the engine task
#[derive(Debug, Clone)]
pub enum EngineInput {
    Command(CommandEvent),
    /// Replace the configuration (hot reload)
    Reload(Box<PerformanceState>),
    /// Release everything and stop the task
    Shutdown,
}

/// Sending side of the engine task's queue
#[derive(Debug, Clone)]
pub struct EngineHandle {
    sender: UnboundedSender<EngineInput>,
}

impl EngineHandle {
    pub fn send(&self, input: EngineInput) -> Result<()> {
        self.sender
            .send(input)
            .map_err(|_| anyhow!("Engine task has stopped"))
    }

    pub fn press(&self, command: Command) -> Result<()> {
        self.send(EngineInput::Command(CommandEvent::press(command)))
    }

    pub fn release(&self, command: Command) -> Result<()> {
        self.send(EngineInput::Command(CommandEvent::release(command)))
    }

    pub fn reload(&self, state: PerformanceState) -> Result<()> {
        self.send(EngineInput::Reload(Box::new(state)))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(EngineInput::Shutdown)
    }
}

/// Create the queue feeding [`run_engine`]
pub fn engine_channel() -> (EngineHandle, UnboundedReceiver<EngineInput>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (EngineHandle { sender }, receiver)
}

/// Run the engine until [`EngineInput::Shutdown`] or until every handle
/// is dropped. Everything sounding is released before returning.
pub async fn run_engine<S: MidiSink>(
    mut engine: ChordEngine,
    mut sink: S,
    mut inputs: UnboundedReceiver<EngineInput>,
) -> (ChordEngine, S) {
    let clock = MicroClock::new();
    info!("engine task started");

    'run: loop {
        let mut wake = engine.tick(clock.now_usec(), &mut sink);

        let mut handled = false;
        loop {
            match inputs.try_recv() {
                Ok(input) => {
                    if !apply(&mut engine, input, clock.now_usec(), &mut sink) {
                        break 'run;
                    }
                    handled = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'run,
            }
        }
        if handled {
            // Notes scheduled by the commands press right away
            wake = Some(0);
        }

        match wake {
            Some(0) => tokio::task::yield_now().await,
            Some(usec) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_micros(usec as u64)) => {}
                    input = inputs.recv() => match input {
                        Some(input) => {
                            if !apply(&mut engine, input, clock.now_usec(), &mut sink) {
                                break 'run;
                            }
                        }
                        None => break 'run,
                    },
                }
            }
            None => match inputs.recv().await {
                Some(input) => {
                    if !apply(&mut engine, input, clock.now_usec(), &mut sink) {
                        break 'run;
                    }
                }
                None => break 'run,
            },
        }
    }

    engine.all_notes_off(&mut sink);
    info!("engine task stopped");
    (engine, sink)
}

/// Apply one input; `false` means stop
fn apply(engine: &mut ChordEngine, input: EngineInput, now_usec: u64, sink: &mut dyn MidiSink) -> bool {
    match input {
        EngineInput::Command(event) => engine.dispatch(event, now_usec, sink),
        EngineInput::Reload(state) => engine.reload(*state, sink),
        EngineInput::Shutdown => return false,
    }
    true
}

/// Forward validated reloads from a [`ConfigWatcher`] to the engine.
///
/// Runs on its own thread until the watcher or the engine goes away.
pub fn forward_config_events(watcher: ConfigWatcher, handle: EngineHandle) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while let Some(event) = watcher.recv() {
            match event {
                ConfigEvent::Reloaded(file) => match file.into_state() {
                    Ok(state) => {
                        info!(song = %file.song.name, "performance reloaded");
                        if handle.reload(state).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Rejected performance file: {}", e),
                },
                ConfigEvent::Error(message) => warn!("{}", message),
            }
        }
        debug!("config forwarding stopped");
    })
}

/// One scripted input and the delay before it
#[derive(Debug, Clone)]
pub struct ScriptStep {
    pub delay: Duration,
    pub input: EngineInput,
}

/// Auto-played I-V-vi-IV progression, four beats per chord
pub fn progression_script(tempo: u16, rounds: usize) -> Vec<ScriptStep> {
    let beat = Duration::from_micros(crate::timing::onbeat_cycle_from_tempo(tempo) as u64);
    let bar = beat * 4;
    let step = |delay, command| ScriptStep {
        delay,
        input: EngineInput::Command(CommandEvent::press(command)),
    };

    let mut script = vec![step(
        Duration::ZERO,
        Command::AutoplaySwitch(AutoplaySwitch::Start),
    )];
    let mut delay = Duration::ZERO;
    for _ in 0..rounds {
        for degree in [1u8, 5, 6, 4] {
            script.push(step(delay, Command::ChordDegree(degree)));
            script.push(ScriptStep {
                delay: Duration::from_millis(50),
                input: EngineInput::Command(CommandEvent::release(Command::ChordDegree(degree))),
            });
            delay = bar - Duration::from_millis(50);
        }
    }
    script.push(step(delay, Command::AutoplaySwitch(AutoplaySwitch::Stop)));
    script.push(ScriptStep {
        delay: bar,
        input: EngineInput::Shutdown,
    });
    script
}

/// Feed a script to the engine in real time
pub async fn play_script(handle: EngineHandle, script: Vec<ScriptStep>) -> Result<()> {
    for step in script {
        tokio::time::sleep(step.delay).await;
        debug!(input = ?step.input, "script");
        handle.send(step.input)?;
    }
    Ok(())
}
