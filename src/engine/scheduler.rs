// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Note scheduler.
//!
//! Turns the current step of every playing part into timed notes. The
//! step's arpeggio style picks the order the pitch slots are walked in
//! and how far apart they land; each note goes to the pitch ledger as a
//! press/release countdown pair.

use super::ChordEngine;
use crate::midi::MidiSink;
use crate::state::{is_valid_degree, ArpeggioStyle, MAX_PARTS, MAX_PITCH, MAX_PITCH_WITH_DRUM};

/// Velocity of the muted "chuck" played on empty slots of a mute stroke
pub const MUTE_CHUCK_VELOCITY: u8 = 40;

/// Shortest release of a mute stroke
pub const MIN_MUTE_RELEASE_USEC: i32 = 20_000;

/// Timing of one stroke across the pitch slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stroke {
    /// Walk the slots from the highest pitch down
    pub descending: bool,
    /// Delay between consecutive notes
    pub displacement_usec: i32,
    pub autorelease_usec: i32,
    /// Empty and muted slots sound as chucks
    pub mute: bool,
}

impl Stroke {
    pub fn new(style: ArpeggioStyle, stroke_usec: i32, autorelease_usec: i32) -> Self {
        match style {
            ArpeggioStyle::SameTime => Self {
                descending: false,
                displacement_usec: 0,
                autorelease_usec,
                mute: false,
            },
            ArpeggioStyle::LowToHigh => Self {
                descending: false,
                displacement_usec: stroke_usec,
                autorelease_usec,
                mute: false,
            },
            ArpeggioStyle::HighToLow => Self {
                descending: true,
                displacement_usec: stroke_usec,
                autorelease_usec,
                mute: false,
            },
            ArpeggioStyle::Mute => {
                let displacement_usec = stroke_usec / 4;
                Self {
                    descending: true,
                    displacement_usec,
                    autorelease_usec: (displacement_usec * 2).max(MIN_MUTE_RELEASE_USEC),
                    mute: true,
                }
            }
        }
    }
}

impl ChordEngine {
    /// Schedule the current step of every playing part
    pub(crate) fn play_step(&mut self, sink: &mut dyn MidiSink) {
        let degree = self.current.degree;
        let autorelease_usec = self.state.song.autorelease_ms as i32 * 1_000;
        for part in 0..MAX_PARTS {
            let cursor = self.state.parts[part];
            if !cursor.enabled || cursor.step < 0 {
                continue;
            }
            self.schedule_step(part, cursor.step, degree, autorelease_usec, sink);
        }
    }

    /// Schedule one step of one part. Returns whether any note was handed
    /// to the ledger.
    pub(crate) fn schedule_step(
        &mut self,
        part: usize,
        step: i8,
        degree: u8,
        autorelease_usec: i32,
        sink: &mut dyn MidiSink,
    ) -> bool {
        let Some(config) = self.state.part_config.get(part) else {
            return false;
        };
        let Some(pattern_step) = config.pattern.step(step).copied() else {
            return false;
        };
        if !config.drum && !is_valid_degree(degree) {
            return false;
        }

        let (style, stroke_usec, pitch_count) = if config.drum {
            (ArpeggioStyle::SameTime, 0, MAX_PITCH_WITH_DRUM)
        } else {
            (pattern_step.style, config.stroke_ms as i32 * 1_000, MAX_PITCH)
        };
        let stroke = Stroke::new(style, stroke_usec, autorelease_usec);
        let channel = config.channel;

        let mut offset = 0;
        let mut scheduled = false;
        for i in 0..pitch_count {
            let pitch = if stroke.descending { pitch_count - 1 - i } else { i };
            let raw = pattern_step.velocities[pitch];
            let velocity = if stroke.mute {
                match raw {
                    0 => self.state.scale_velocity(MUTE_CHUCK_VELOCITY),
                    v => self.state.scale_velocity(v.unsigned_abs()),
                }
            } else if raw > 0 {
                self.state.scale_velocity(raw as u8)
            } else {
                continue;
            };

            let note = self.resolve_note(part, pitch, degree);
            self.ledger.set_pitch_manage(
                part,
                pitch,
                channel,
                note,
                velocity as i16,
                offset,
                offset.saturating_add(stroke.autorelease_usec),
                sink,
            );
            offset = offset.saturating_add(stroke.displacement_usec);
            scheduled = true;
        }

        if scheduled {
            let config = &self.state.part_config[part];
            sink.set_program_change(config.channel, config.program);
            sink.set_channel_volume(config.channel, self.state.scaled_volume(config.volume));
        }
        scheduled
    }

    /// MIDI note for a pitch slot of a part; 0 means silent
    pub(crate) fn resolve_note(&self, part: usize, pitch: usize, degree: u8) -> u8 {
        let Some(config) = self.state.part_config.get(part) else {
            return 0;
        };
        if config.drum {
            return self.state.buttons.drum_map.get(pitch).copied().unwrap_or(0);
        }
        if pitch >= MAX_PITCH {
            return 0;
        }
        let options = self.applied.options(config.voicing, config.position);
        self.theory
            .midi_note(pitch as u8 + 1, degree, self.state.slot_key(), &options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BeatKind, Command, CommandEvent};
    use crate::midi::{RecordingSink, SinkEvent};
    use crate::music::TriadTheory;
    use crate::state::{ArpeggioPattern, PatternStep, PerformanceState};

    fn engine_with_step(step: PatternStep, drum: bool) -> ChordEngine {
        let mut state = PerformanceState::default();
        state.part_config[0].channel = 2;
        state.part_config[0].program = 24;
        state.part_config[0].volume = 100;
        state.part_config[0].stroke_ms = 10;
        state.part_config[0].drum = drum;
        state.part_config[0].pattern = ArpeggioPattern::new(vec![step; 4], None, 0);
        state.enable_part(0, true);
        ChordEngine::new(state, Box::new(TriadTheory))
    }

    /// Press degree 1 and collect (note, press offset) pairs from the ledger
    fn first_step(engine: &mut ChordEngine, sink: &mut RecordingSink) -> Vec<(u8, i32)> {
        engine.dispatch(CommandEvent::press(Command::ChordDegree(1)), 0, sink);
        let mut notes: Vec<(u8, i32)> = (0..MAX_PITCH_WITH_DRUM)
            .flat_map(|pitch| engine.ledger().slots(0, pitch).to_vec())
            .filter(|s| s.is_active())
            .map(|s| (s.note, s.press_usec))
            .collect();
        notes.sort_by_key(|&(_, press)| press);
        notes
    }

    #[test]
    fn test_same_time_plays_together() {
        let step = PatternStep::new(ArpeggioStyle::SameTime, &[100, 100, 100]);
        let mut engine = engine_with_step(step, false);
        let mut sink = RecordingSink::new();

        let notes = first_step(&mut engine, &mut sink);
        assert_eq!(notes, vec![(36, 0), (48, 0), (52, 0)]);
    }

    #[test]
    fn test_low_to_high_staggers_upward() {
        let step = PatternStep::new(ArpeggioStyle::LowToHigh, &[0, 100, 100, 100]);
        let mut engine = engine_with_step(step, false);
        let mut sink = RecordingSink::new();

        let notes = first_step(&mut engine, &mut sink);
        assert_eq!(notes, vec![(48, 0), (52, 10_000), (55, 20_000)]);
    }

    #[test]
    fn test_high_to_low_staggers_downward() {
        let step = PatternStep::new(ArpeggioStyle::HighToLow, &[0, 100, 100, 100]);
        let mut engine = engine_with_step(step, false);
        let mut sink = RecordingSink::new();

        let notes = first_step(&mut engine, &mut sink);
        assert_eq!(notes, vec![(55, 0), (52, 10_000), (48, 20_000)]);
    }

    #[test]
    fn test_mute_stroke_plays_every_slot() {
        let step = PatternStep::new(ArpeggioStyle::Mute, &[0, -60, 0, 0, 0, 0]);
        let mut engine = engine_with_step(step, false);
        let mut sink = RecordingSink::new();

        first_step(&mut engine, &mut sink);
        let slots: Vec<_> = (0..MAX_PITCH)
            .map(|pitch| engine.ledger().slots(0, pitch)[3])
            .collect();

        assert!(slots.iter().all(|s| s.is_active()));
        assert_eq!(slots[1].velocity, 60);
        assert_eq!(slots[0].velocity, MUTE_CHUCK_VELOCITY);
        // Highest slot first, a quarter of the stroke apart
        assert_eq!(slots[5].press_usec, 0);
        assert_eq!(slots[0].press_usec, 5 * 2_500);
        assert_eq!(slots[0].release_usec, 5 * 2_500 + MIN_MUTE_RELEASE_USEC);
    }

    #[test]
    fn test_mute_stroke_release() {
        let stroke = Stroke::new(ArpeggioStyle::Mute, 200_000, 2_000_000);
        assert_eq!(stroke.displacement_usec, 50_000);
        assert_eq!(stroke.autorelease_usec, 100_000);
        assert!(stroke.descending);

        // A zero stroke speed still lets the chuck sound
        let stroke = Stroke::new(ArpeggioStyle::Mute, 0, 2_000_000);
        assert_eq!(stroke.displacement_usec, 0);
        assert_eq!(stroke.autorelease_usec, MIN_MUTE_RELEASE_USEC);
    }

    #[test]
    fn test_negative_velocity_skipped_outside_mute() {
        let step = PatternStep::new(ArpeggioStyle::SameTime, &[-50, 0, 90]);
        let mut engine = engine_with_step(step, false);
        let mut sink = RecordingSink::new();

        let notes = first_step(&mut engine, &mut sink);
        assert_eq!(notes, vec![(52, 0)]);
    }

    #[test]
    fn test_drum_part_uses_drum_map() {
        let step = PatternStep::new(ArpeggioStyle::HighToLow, &[100, 0, 80, 0, 0, 0, 70]);
        let mut engine = engine_with_step(step, true);
        let mut sink = RecordingSink::new();

        let mut notes = first_step(&mut engine, &mut sink);
        notes.sort();
        // Drums ignore the stroke style
        assert_eq!(notes, vec![(36, 0), (42, 0), (49, 0)]);
    }

    #[test]
    fn test_no_degree_is_silent() {
        let step = PatternStep::new(ArpeggioStyle::SameTime, &[100]);
        let mut engine = engine_with_step(step, false);
        let mut sink = RecordingSink::new();

        engine.dispatch(CommandEvent::press(Command::ChordBeat(BeatKind::On)), 0, &mut sink);
        assert_eq!(engine.state().parts[0].step, 0);
        engine.tick(0, &mut sink);
        assert!(sink.events.is_empty());
    }

    #[test]
    fn test_program_and_volume_follow_notes() {
        let step = PatternStep::new(ArpeggioStyle::SameTime, &[100]);
        let mut engine = engine_with_step(step, false);
        engine.state_mut().channel_volume = 64;
        let mut sink = RecordingSink::new();

        first_step(&mut engine, &mut sink);
        assert_eq!(
            sink.events,
            vec![
                SinkEvent::ProgramChange {
                    channel: 2,
                    program: 24
                },
                SinkEvent::ChannelVolume {
                    channel: 2,
                    volume: 50
                },
            ]
        );
    }

    #[test]
    fn test_velocity_scaled_by_press_velocity() {
        let step = PatternStep::new(ArpeggioStyle::SameTime, &[100]);
        let mut engine = engine_with_step(step, false);
        engine.state_mut().press_velocity = 50;
        let mut sink = RecordingSink::new();

        first_step(&mut engine, &mut sink);
        engine.tick(0, &mut sink);
        assert_eq!(sink.note_ons(), vec![(2, 36, 50)]);
    }

    #[test]
    fn test_key_transposes_chord_parts() {
        let step = PatternStep::new(ArpeggioStyle::SameTime, &[100]);
        let mut engine = engine_with_step(step, false);
        engine.state_mut().master_key = 2;
        let mut sink = RecordingSink::new();

        let notes = first_step(&mut engine, &mut sink);
        assert_eq!(notes, vec![(38, 0)]);
    }
}
