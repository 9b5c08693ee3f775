// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Beat and step engine.
//!
//! Tracks where inside the beat the arpeggio is (`beat_index`, one of
//! `step_per_beat` sub-steps), advances every part's step cursor on each
//! beat event and decides when the patterns start over. Beat events come
//! from explicit triggers, the auto-play on-beat timer and the off-beat
//! timer (auto style or self-timed).

use tracing::{debug, trace};

use super::command::{BeatKind, Command, CommandEvent};
use super::ledger::INACTIVE;
use super::ChordEngine;
use crate::midi::MidiSink;
use crate::state::{is_valid_degree, AutoPlay, ChordSelection, OffbeatStyle, MAX_PARTS};
use crate::timing::{accept_reactive_cycle, elapsed_between, onbeat_cycle_from_tempo, BeatCycle};

/// Degree and bass degree, compared between beats to detect a chord change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChordOption {
    pub degree: u8,
    pub bass_degree: u8,
}

/// Beat position, cycle lengths and countdown timers.
///
/// Countdowns are in microseconds; [`INACTIVE`] means not running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeatState {
    /// Sub-step inside the current beat, `0..step_per_beat`
    pub beat_index: u8,
    pub cycle: BeatCycle,
    /// Timestamp of the last explicit on-beat, origin for tempo tapping
    pub reactive_onbeat_usec: Option<u64>,
    /// Time left before an abandoned arpeggio starts over
    pub arpeggio_reset_remain: i32,
    pub autoplay_onbeat_remain: i32,
    pub autoplay_offbeat_remain: i32,
    /// Off-beat spacing measured from the first manual off-beat
    pub selftimed_offbeat_usec: i32,
}

impl BeatState {
    pub fn new(cycle: BeatCycle) -> Self {
        Self {
            beat_index: 0,
            cycle,
            reactive_onbeat_usec: None,
            arpeggio_reset_remain: INACTIVE,
            autoplay_onbeat_remain: INACTIVE,
            autoplay_offbeat_remain: INACTIVE,
            selftimed_offbeat_usec: INACTIVE,
        }
    }

    /// Stop both beat timers
    pub fn cancel_timers(&mut self) {
        self.autoplay_onbeat_remain = INACTIVE;
        self.autoplay_offbeat_remain = INACTIVE;
    }
}

impl Default for BeatState {
    fn default() -> Self {
        Self::new(BeatCycle::default())
    }
}

/// Number of steps a beat event consumes.
///
/// An on-beat always runs to the next beat boundary, so a quick run of
/// on-beats with the off-beats left out still lands every beat on its
/// on-beat step. An off-beat moves one step but never into the next beat.
pub fn calc_step_advance(step_per_beat: u8, beat_index: u8, on_beat: bool) -> u8 {
    if step_per_beat < 1 {
        return 0;
    }
    let beat_index = beat_index.min(step_per_beat - 1);
    if on_beat {
        (step_per_beat - beat_index - 1) % step_per_beat + 1
    } else if beat_index >= step_per_beat - 1 {
        0
    } else {
        1
    }
}

/// First on-beat step after `step`, wrapping to 0 at the loop end
pub fn next_aligned_step(step: i8, step_per_beat: u8, loop_step: u8) -> i8 {
    if step < 0 || step_per_beat == 0 {
        return 0;
    }
    let spb = step_per_beat as i16;
    let next = (step as i16 / spb + 1) * spb;
    if next >= loop_step as i16 {
        0
    } else {
        next as i8
    }
}

impl ChordEngine {
    pub(crate) fn on_chord_degree(&mut self, degree: u8, pressed: bool) {
        if !is_valid_degree(degree) {
            return;
        }
        if !pressed {
            if degree != self.state.chord.degree {
                trace!(degree, "stale degree release");
            }
            return;
        }

        if degree != self.state.chord.degree {
            self.state.chord.degree = degree;
        }
        self.next = ChordOption {
            degree,
            bass_degree: self.state.chord.bass_degree,
        };

        match self.state.autoplay {
            AutoPlay::None => {
                self.pending
                    .push_back(CommandEvent::press(Command::ChordBeat(BeatKind::On)));
            }
            AutoPlay::Waiting => {
                self.state.autoplay = AutoPlay::Running;
                self.beat.cycle = self.tempo_cycle();
                self.beat.autoplay_onbeat_remain = 0;
                debug!(degree, "autoplay running");
            }
            AutoPlay::Running => {
                if self.beat.autoplay_onbeat_remain < 0 {
                    debug!(degree, "autoplay timer re-armed");
                    self.beat.autoplay_onbeat_remain = 0;
                }
            }
        }
    }

    /// Explicit beat trigger. Manual input always pre-empts the timers.
    pub(crate) fn on_chord_beat(&mut self, kind: BeatKind, now_usec: u64, sink: &mut dyn MidiSink) {
        let onbeat_remain = self.beat.autoplay_onbeat_remain;
        self.beat.cancel_timers();
        let spb = self.state.song.step_per_beat;
        let selftimed = self.state.offbeat_style == OffbeatStyle::SelfTimed
            && self.state.autoplay == AutoPlay::None;

        match kind {
            BeatKind::On => {
                self.chord_beat(true, sink);

                let ceiling = self.beat.cycle.reset_timeout() as i64;
                let tapped = self.beat.reactive_onbeat_usec.and_then(|origin| {
                    accept_reactive_cycle(now_usec.saturating_sub(origin) as i64, ceiling)
                });
                self.beat.cycle.onbeat_usec = match tapped {
                    Some(cycle) => cycle,
                    None => onbeat_cycle_from_tempo(self.state.song.tempo),
                };
                self.beat.reactive_onbeat_usec = Some(now_usec);
                self.beat.selftimed_offbeat_usec = INACTIVE;
                if !selftimed {
                    self.beat.cycle.derive_offbeats(spb, self.state.song.swing);
                }
                trace!(onbeat_usec = self.beat.cycle.onbeat_usec, tapped = tapped.is_some(), "on-beat");

                if self.state.autoplay == AutoPlay::Running {
                    self.beat.autoplay_onbeat_remain = self.beat.cycle.onbeat_usec;
                }
                self.arm_offbeat_timer(0);
            }
            BeatKind::Off => {
                self.chord_beat(false, sink);

                if selftimed && spb >= 3 {
                    if self.beat.selftimed_offbeat_usec <= 0 {
                        if let Some(origin) = self.beat.reactive_onbeat_usec {
                            let interval = elapsed_between(origin, now_usec).min(i32::MAX as u32);
                            self.beat.selftimed_offbeat_usec = interval as i32;
                        }
                    }
                    if self.beat.selftimed_offbeat_usec > 0 && self.beat.beat_index + 1 < spb {
                        self.beat.autoplay_offbeat_remain = self.beat.selftimed_offbeat_usec;
                    }
                }

                // An off-beat between auto-played beats keeps the beat phase
                if self.state.autoplay == AutoPlay::Running {
                    self.beat.autoplay_onbeat_remain = if onbeat_remain >= 0 {
                        onbeat_remain
                    } else {
                        self.beat.cycle.onbeat_usec
                    };
                    if self.beat.beat_index + 1 < spb {
                        self.beat.autoplay_offbeat_remain = self.offbeat_interval();
                    }
                }
            }
        }
    }

    /// Consume the steps of one beat event and play each of them
    pub(crate) fn chord_beat(&mut self, on_beat: bool, sink: &mut dyn MidiSink) {
        let spb = self.state.song.step_per_beat;
        if spb >= 1 && !on_beat && self.beat.beat_index >= spb - 1 {
            self.beat.beat_index = spb - 1;
        }
        let advance = calc_step_advance(spb, self.beat.beat_index, on_beat);
        for _ in 0..advance {
            self.chord_step_advance(sink);
            self.play_step(sink);
        }
        self.beat.arpeggio_reset_remain = self.beat.cycle.reset_timeout();
    }

    /// Move to the next sub-step and update every part's cursor
    pub(crate) fn chord_step_advance(&mut self, sink: &mut dyn MidiSink) {
        let spb = self.state.song.step_per_beat;
        if spb < 1 {
            return;
        }
        self.state.highlighted_degree = None;
        self.beat.beat_index = (self.beat.beat_index.min(spb - 1) + 1) % spb;

        if self.beat.beat_index == 0 {
            self.advance_onbeat(sink);
        } else {
            let beat_index = self.beat.beat_index as i16;
            for part in self.state.parts.iter_mut() {
                if part.enabled && part.step >= 0 {
                    let aligned = part.step as i16 / spb as i16 * spb as i16 + beat_index;
                    part.step = aligned.min(i8::MAX as i16) as i8;
                }
            }
        }
    }

    fn advance_onbeat(&mut self, sink: &mut dyn MidiSink) {
        let spb = self.state.song.step_per_beat;
        let force =
            self.reset_request || !is_valid_degree(self.next.degree) || self.state.slot_switched;
        let normal = self.next != self.current || self.state.chord.shift_differs(&self.applied);

        if self.reset_request {
            self.beat.cycle = self.tempo_cycle();
            self.beat.reactive_onbeat_usec = None;
        }
        self.reset_request = false;
        self.state.slot_switched = false;

        self.current = self.next;
        self.applied = ChordSelection {
            degree: self.current.degree,
            bass_degree: self.current.bass_degree,
            ..self.state.chord
        };

        let mut candidates = [0i8; MAX_PARTS];
        let mut part_reset = false;
        let mut enabled_total = 0;
        let mut at_first_step = 0;
        for part in 0..MAX_PARTS {
            let step = self.state.parts[part].step;
            let pattern = &self.state.part_config[part].pattern;
            let loop_step = pattern.loop_step();

            let reset = force || (normal && step as i16 >= pattern.anchor_step() as i16);
            candidates[part] = if reset {
                part_reset |= !force && step >= 0;
                0
            } else {
                next_aligned_step(step, spb, loop_step)
            };
            if reset {
                self.ledger.chord_note_off(part, sink);
            }

            if self.state.parts[part].enabled && loop_step > 2 {
                enabled_total += 1;
                if candidates[part] <= 0 {
                    at_first_step += 1;
                }
            }
        }

        let first_step = force || part_reset || enabled_total == 0 || at_first_step * 2 > enabled_total;
        if force || part_reset {
            debug!(force, degree = self.current.degree, "arpeggio reset");
        }

        for (part, &candidate) in candidates.iter().enumerate() {
            let mut switched_off = false;
            let p = &mut self.state.parts[part];
            if (first_step || candidate <= 0) && p.next_enabled != p.enabled {
                if !p.next_enabled {
                    p.enabled = false;
                    switched_off = true;
                } else if first_step {
                    p.enabled = true;
                }
                debug!(part, enabled = p.enabled, "part switched");
            }
            let loop_step = self.state.part_config[part].pattern.loop_step();
            let p = &mut self.state.parts[part];
            p.step = if p.enabled && loop_step > 0 { candidate } else { -1 };
            if switched_off {
                self.ledger.chord_note_off(part, sink);
            }
        }

        if is_valid_degree(self.current.degree) {
            self.state.highlighted_degree = Some(self.current.degree);
        }
    }

    /// Request that every part starts over at the next on-beat
    pub(crate) fn chord_step_reset(&mut self) {
        self.reset_request = true;
        if self.beat.beat_index != 0 || self.state.song.step_per_beat < 2 {
            for part in self.state.parts.iter_mut() {
                part.step = -1;
            }
        }
        debug!(beat_index = self.beat.beat_index, "step reset requested");
    }

    /// Advance the beat timers. Returns whether any beat fired and the
    /// shortest remaining countdown.
    pub(crate) fn run_timers(&mut self, elapsed_usec: u32, sink: &mut dyn MidiSink) -> (bool, Option<u32>) {
        let elapsed = elapsed_usec.min(i32::MAX as u32) as i32;
        let mut fired = false;

        if self.beat.arpeggio_reset_remain >= 0 {
            self.beat.arpeggio_reset_remain = self.beat.arpeggio_reset_remain.saturating_sub(elapsed);
            if self.beat.arpeggio_reset_remain <= 0 {
                self.arpeggio_timeout(sink);
            }
        }

        if self.beat.autoplay_offbeat_remain >= 0 {
            let remain = self.beat.autoplay_offbeat_remain.saturating_sub(elapsed);
            self.beat.autoplay_offbeat_remain = remain;
            if remain <= 0 {
                self.chord_beat(false, sink);
                fired = true;
                let spb = self.state.song.step_per_beat;
                self.beat.autoplay_offbeat_remain = if self.beat.beat_index + 1 < spb {
                    (self.offbeat_interval() + remain).max(0)
                } else {
                    INACTIVE
                };
            }
        }

        if self.state.autoplay == AutoPlay::Running && self.beat.autoplay_onbeat_remain >= 0 {
            let remain = self.beat.autoplay_onbeat_remain.saturating_sub(elapsed);
            self.beat.autoplay_onbeat_remain = remain;
            if remain <= 0 {
                self.chord_beat(true, sink);
                fired = true;
                self.beat.autoplay_onbeat_remain = (self.beat.cycle.onbeat_usec + remain).max(0);
                self.arm_offbeat_timer(remain);
            }
        }

        let mut next: Option<u32> = None;
        let mut consider = |remain: i32| {
            if remain >= 0 {
                let remain = remain as u32;
                next = Some(next.map_or(remain, |n| n.min(remain)));
            }
        };
        consider(self.beat.arpeggio_reset_remain);
        consider(self.beat.autoplay_offbeat_remain);
        if self.state.autoplay == AutoPlay::Running {
            consider(self.beat.autoplay_onbeat_remain);
        }
        (fired, next)
    }

    /// No beat for a whole reset window: stop every part so the next
    /// on-beat starts the patterns from step 0.
    fn arpeggio_timeout(&mut self, sink: &mut dyn MidiSink) {
        debug!("arpeggio reset timeout");
        self.beat.arpeggio_reset_remain = INACTIVE;
        self.beat.beat_index = 0;
        self.reset_request = true;
        for part in 0..MAX_PARTS {
            let p = &mut self.state.parts[part];
            let switched_off = p.enabled && !p.next_enabled;
            p.enabled = p.next_enabled;
            p.step = -1;
            if switched_off {
                self.ledger.chord_note_off(part, sink);
            }
        }
    }

    /// Arm the off-beat timer after an on-beat when off-beats are generated
    fn arm_offbeat_timer(&mut self, carry_usec: i32) {
        let automatic = self.state.offbeat_style == OffbeatStyle::Auto
            || self.state.autoplay == AutoPlay::Running;
        if automatic && self.state.song.step_per_beat >= 2 {
            self.beat.autoplay_offbeat_remain = (self.beat.cycle.offbeat_after(0) + carry_usec).max(0);
        }
    }

    fn offbeat_interval(&self) -> i32 {
        if self.beat.selftimed_offbeat_usec > 0 {
            self.beat.selftimed_offbeat_usec
        } else {
            self.beat.cycle.offbeat_after(self.beat.beat_index)
        }
    }

    fn tempo_cycle(&self) -> BeatCycle {
        let song = &self.state.song;
        BeatCycle::from_tempo(song.tempo, song.step_per_beat, song.swing)
    }
}
