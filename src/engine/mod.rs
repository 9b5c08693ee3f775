// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Chord arpeggiation engine.
//!
//! [`ChordEngine`] owns the performance state and every timer that
//! drives it. It is fed two things:
//! - commands, through [`ChordEngine::dispatch`]
//! - the passage of time, through [`ChordEngine::tick`]
//!
//! Both take the current time in microseconds and the MIDI sink to write
//! to, so the engine itself never touches a clock or a port. Handlers may
//! queue follow-up commands (a degree press queues an on-beat); those are
//! drained before `dispatch` returns.
//!
//! The implementation is split by concern:
//! - `beat`: beat detection, step cursor advance, reset policy, timers
//! - `scheduler`: turns a step into timed notes per part and pitch
//! - `ledger`: per-slot note history with press/release countdowns
//! - `voice`: note/drum buttons and pattern preview

pub mod beat;
pub mod command;
pub mod ledger;
pub mod scheduler;
pub mod voice;

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::midi::MidiSink;
use crate::music::ChordTheory;
use crate::state::{AutoPlay, ChordSelection, PerformanceState};
use crate::timing::{elapsed_between, BeatCycle};

pub use beat::{BeatState, ChordOption};
pub use command::{AutoplaySwitch, BeatKind, Command, CommandEvent, CommandKind, SoundEffect};
pub use ledger::{PitchHistorySlot, PitchLedger, MAX_MANAGE_HISTORY};
pub use voice::{MonoVoiceSlot, MonoVoices};

/// The engine task's state
pub struct ChordEngine {
    state: PerformanceState,
    theory: Box<dyn ChordTheory>,
    beat: BeatState,
    /// Option applied at the last on-beat
    current: ChordOption,
    /// Option latched by the last degree press
    next: ChordOption,
    /// Chord selection snapshot taken at the last on-beat
    applied: ChordSelection,
    reset_request: bool,
    ledger: PitchLedger,
    voices: MonoVoices,
    pending: VecDeque<CommandEvent>,
    previous_usec: Option<u64>,
}

impl ChordEngine {
    pub fn new(state: PerformanceState, theory: Box<dyn ChordTheory>) -> Self {
        let cycle = BeatCycle::from_tempo(
            state.song.tempo,
            state.song.step_per_beat,
            state.song.swing,
        );
        Self {
            state,
            theory,
            beat: BeatState::new(cycle),
            current: ChordOption::default(),
            next: ChordOption::default(),
            applied: ChordSelection::default(),
            reset_request: false,
            ledger: PitchLedger::new(),
            voices: MonoVoices::new(),
            pending: VecDeque::new(),
            previous_usec: None,
        }
    }

    pub fn state(&self) -> &PerformanceState {
        &self.state
    }

    /// Mutable access for edits made between ticks (chord modifiers,
    /// bass degree, edit cursor, pattern cells)
    pub fn state_mut(&mut self) -> &mut PerformanceState {
        &mut self.state
    }

    pub fn beat_state(&self) -> &BeatState {
        &self.beat
    }

    pub fn ledger(&self) -> &PitchLedger {
        &self.ledger
    }

    /// Option applied at the last on-beat
    pub fn current_option(&self) -> ChordOption {
        self.current
    }

    /// Follow-up commands not yet processed
    pub fn pending_commands(&self) -> impl Iterator<Item = &CommandEvent> {
        self.pending.iter()
    }

    /// Queue a command behind any pending follow-ups
    pub fn enqueue(&mut self, event: CommandEvent) {
        self.pending.push_back(event);
    }

    /// Handle one command, then every follow-up it queued
    pub fn dispatch(&mut self, event: CommandEvent, now_usec: u64, sink: &mut dyn MidiSink) {
        self.handle_command(event, now_usec, sink);
        self.drain_pending(now_usec, sink);
    }

    /// Handle queued commands until the queue is empty
    pub fn drain_pending(&mut self, now_usec: u64, sink: &mut dyn MidiSink) {
        while let Some(event) = self.pending.pop_front() {
            self.handle_command(event, now_usec, sink);
        }
    }

    /// Handle one command without draining its follow-ups.
    ///
    /// Countdowns are brought up to `now_usec` first, so timers the
    /// command arms start from the command's own time.
    pub fn handle_command(&mut self, event: CommandEvent, now_usec: u64, sink: &mut dyn MidiSink) {
        self.tick(now_usec, sink);
        trace!(?event, "command");
        let CommandEvent { command, pressed } = event;
        match command {
            Command::ChordDegree(degree) => self.on_chord_degree(degree, pressed),
            Command::ChordBeat(kind) if pressed => self.on_chord_beat(kind, now_usec, sink),
            Command::ChordStepResetRequest if pressed => self.chord_step_reset(),
            Command::AutoplaySwitch(switch) if pressed => self.on_autoplay_switch(switch),
            Command::NoteButton(button) => self.note_button(button, pressed, sink),
            Command::DrumButton(button) => self.drum_button(button, pressed, sink),
            Command::SoundEffect(effect) if pressed => self.sound_effect(effect, sink),
            Command::SetVelocity(velocity) if pressed => {
                self.state.press_velocity = velocity.min(127);
            }
            Command::PartSwitch { part, on } if pressed => self.part_switch(part as usize, on, sink),
            _ => {}
        }
    }

    /// Advance every countdown to `now_usec`.
    ///
    /// Returns the microseconds until the engine next needs to run, or
    /// `None` when nothing is pending.
    pub fn tick(&mut self, now_usec: u64, sink: &mut dyn MidiSink) -> Option<u32> {
        let elapsed = match self.previous_usec {
            Some(previous) => elapsed_between(previous, now_usec),
            None => 0,
        };
        self.previous_usec = Some(now_usec);

        let mut next = self.ledger.process(elapsed, sink);
        let (fired, timer_next) = self.run_timers(elapsed, sink);
        if fired {
            // Notes scheduled by timer beats press at offset zero
            next = self.ledger.process(0, sink);
        }
        min_deadline(next, timer_next)
    }

    /// Replace the configuration with a freshly loaded one.
    ///
    /// Everything sounding is released, part enables follow the new
    /// configuration, and the next on-beat starts the patterns over.
    pub fn reload(&mut self, loaded: PerformanceState, sink: &mut dyn MidiSink) {
        self.all_notes_off(sink);

        let idle = self.is_idle();
        let state = &mut self.state;
        state.part_config = loaded.part_config;
        state.song = loaded.song;
        state.buttons = loaded.buttons;
        state.master_key = loaded.master_key;
        state.press_velocity = loaded.press_velocity;
        state.channel_volume = loaded.channel_volume;
        state.offbeat_style = loaded.offbeat_style;
        for (part, new) in state.parts.iter_mut().zip(loaded.parts.iter()) {
            part.next_enabled = new.next_enabled;
            if idle {
                part.enabled = new.next_enabled;
                part.step = -1;
            }
        }
        state.slot_switched = true;

        self.beat.cycle = BeatCycle::from_tempo(
            self.state.song.tempo,
            self.state.song.step_per_beat,
            self.state.song.swing,
        );
        debug!(tempo = self.state.song.tempo, "configuration reloaded");
    }

    /// Release every part and every button voice
    pub fn all_notes_off(&mut self, sink: &mut dyn MidiSink) {
        self.ledger.all_notes_off(sink);
        self.voices.all_off(sink);
    }

    /// Whether the arpeggio is stopped (no beat within the reset window)
    pub fn is_idle(&self) -> bool {
        self.beat.arpeggio_reset_remain < 0
    }

    fn on_autoplay_switch(&mut self, switch: AutoplaySwitch) {
        let start = match switch {
            AutoplaySwitch::Start => true,
            AutoplaySwitch::Stop => false,
            AutoplaySwitch::Toggle => self.state.autoplay == AutoPlay::None,
        };
        if start {
            if self.state.autoplay == AutoPlay::None {
                self.state.autoplay = AutoPlay::Waiting;
            }
        } else {
            self.state.autoplay = AutoPlay::None;
            self.beat.cancel_timers();
        }
        debug!(autoplay = ?self.state.autoplay, "autoplay switched");
    }

    fn part_switch(&mut self, part: usize, on: bool, sink: &mut dyn MidiSink) {
        let idle = self.is_idle();
        let Some(step) = self.state.parts.get_mut(part) else {
            return;
        };
        step.next_enabled = on;
        if idle {
            step.enabled = on;
            if !on {
                step.step = -1;
                self.ledger.chord_note_off(part, sink);
            }
        }
        debug!(part, on, idle, "part switch requested");
    }
}

fn min_deadline(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
