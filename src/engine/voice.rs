// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Button voices and pattern preview.
//!
//! Note and drum buttons play one note per button, released when the
//! button is let go. The preview path auditions the pattern cell or step
//! under the edit cursor through the pitch ledger.

use tracing::trace;

use super::command::SoundEffect;
use super::ChordEngine;
use crate::midi::{press_velocity, MidiSink, RELEASE_VELOCITY};
use crate::state::{is_valid_degree, MAX_BUTTONS, MAX_PARTS, MAX_PITCH, MAX_PITCH_WITH_DRUM};

/// Release time of previewed notes
pub const PREVIEW_RELEASE_USEC: i32 = 150_000;

/// Nominal button velocity before press-velocity scaling
const BUTTON_VELOCITY: u8 = 100;

/// The note a button is currently holding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonoVoiceSlot {
    pub channel: u8,
    pub note: Option<u8>,
}

/// One monophonic voice per physical button, shared by note and drum mode
#[derive(Debug, Clone, Default)]
pub struct MonoVoices {
    slots: [MonoVoiceSlot; MAX_BUTTONS],
}

impl MonoVoices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, index: usize) -> Option<&MonoVoiceSlot> {
        self.slots.get(index)
    }

    /// Start a note on a button, releasing whatever it was holding
    pub fn press(&mut self, index: usize, channel: u8, note: u8, velocity: u8, sink: &mut dyn MidiSink) {
        if index >= MAX_BUTTONS {
            return;
        }
        self.release(index, sink);
        sink.set_note_velocity(channel, note, press_velocity(velocity));
        self.slots[index] = MonoVoiceSlot {
            channel,
            note: Some(note),
        };
    }

    /// Release a button's note, if any
    pub fn release(&mut self, index: usize, sink: &mut dyn MidiSink) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        if let Some(note) = slot.note.take() {
            sink.set_note_velocity(slot.channel, note, RELEASE_VELOCITY);
        }
    }

    pub fn all_off(&mut self, sink: &mut dyn MidiSink) {
        for index in 0..MAX_BUTTONS {
            self.release(index, sink);
        }
    }
}

impl ChordEngine {
    pub(crate) fn note_button(&mut self, button: u8, pressed: bool, sink: &mut dyn MidiSink) {
        let Some(index) = button_index(button) else {
            return;
        };
        let buttons = self.state.buttons;
        let note = buttons.base_note as u16
            + buttons.scale.offset_of(index)
            + self.state.slot_key() as u16;
        self.button_voice(index, pressed, buttons.note_channel, buttons.note_program, note, sink);
    }

    pub(crate) fn drum_button(&mut self, button: u8, pressed: bool, sink: &mut dyn MidiSink) {
        let Some(index) = button_index(button) else {
            return;
        };
        let buttons = self.state.buttons;
        let note = buttons.drum_map[index] as u16;
        self.button_voice(index, pressed, buttons.drum_channel, buttons.drum_program, note, sink);
    }

    fn button_voice(
        &mut self,
        index: usize,
        pressed: bool,
        channel: u8,
        program: u8,
        note: u16,
        sink: &mut dyn MidiSink,
    ) {
        // The mapped note may have moved since the press, release the held one
        self.voices.release(index, sink);
        if !pressed || note > 127 {
            return;
        }
        sink.set_program_change(channel, program);
        sink.set_channel_volume(channel, self.state.scaled_volume(self.state.buttons.volume));
        let velocity = self.state.scale_velocity(BUTTON_VELOCITY);
        trace!(button = index + 1, note, "button voice");
        self.voices.press(index, channel, note as u8, velocity, sink);
    }

    /// Audition the pattern under the edit cursor
    pub(crate) fn sound_effect(&mut self, effect: SoundEffect, sink: &mut dyn MidiSink) {
        let edit = self.state.edit;
        let part = edit.part as usize;
        if part >= MAX_PARTS {
            return;
        }
        let Ok(step) = i8::try_from(edit.step) else {
            return;
        };
        let degree = if is_valid_degree(self.current.degree) {
            self.current.degree
        } else {
            1
        };

        match effect {
            SoundEffect::Single => {
                let config = &self.state.part_config[part];
                let pitch = edit.pitch as usize;
                let pitch_count = if config.drum { MAX_PITCH_WITH_DRUM } else { MAX_PITCH };
                let raw = config.pattern.velocity(step, pitch);
                if pitch >= pitch_count || raw == 0 {
                    return;
                }
                let (channel, program, volume) = (config.channel, config.program, config.volume);
                let velocity = self.state.scale_velocity(raw.unsigned_abs());
                let note = self.resolve_note(part, pitch, degree);
                self.ledger.set_pitch_manage(
                    part,
                    pitch,
                    channel,
                    note,
                    velocity as i16,
                    0,
                    PREVIEW_RELEASE_USEC,
                    sink,
                );
                sink.set_program_change(channel, program);
                sink.set_channel_volume(channel, self.state.scaled_volume(volume));
            }
            SoundEffect::Testplay => {
                self.schedule_step(part, step, degree, PREVIEW_RELEASE_USEC, sink);
            }
        }
    }
}

fn button_index(button: u8) -> Option<usize> {
    (1..=MAX_BUTTONS as u8)
        .contains(&button)
        .then(|| button as usize - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Command, CommandEvent};
    use crate::midi::{RecordingSink, SinkEvent};
    use crate::music::{ScaleType, TriadTheory};
    use crate::state::{ArpeggioPattern, ArpeggioStyle, EditCursor, PatternStep, PerformanceState};

    fn engine() -> ChordEngine {
        ChordEngine::new(PerformanceState::default(), Box::new(TriadTheory))
    }

    #[test]
    fn test_note_button_follows_scale_and_key() {
        let mut engine = engine();
        engine.state_mut().buttons.scale = ScaleType::NaturalMinor;
        engine.state_mut().master_key = 9;
        let mut sink = RecordingSink::new();

        engine.dispatch(CommandEvent::press(Command::NoteButton(3)), 0, &mut sink);
        // A minor, third degree: C above A4
        assert_eq!(sink.note_ons(), vec![(8, 72, 100)]);

        engine.dispatch(CommandEvent::release(Command::NoteButton(3)), 0, &mut sink);
        assert_eq!(sink.note_offs(), vec![(8, 72)]);
    }

    #[test]
    fn test_retrigger_releases_previous_note() {
        let mut engine = engine();
        let mut sink = RecordingSink::new();

        engine.dispatch(CommandEvent::press(Command::NoteButton(1)), 0, &mut sink);
        engine.state_mut().master_key = 2;
        engine.dispatch(CommandEvent::press(Command::NoteButton(1)), 0, &mut sink);

        assert_eq!(sink.note_ons(), vec![(8, 60, 100), (8, 62, 100)]);
        assert_eq!(sink.note_offs(), vec![(8, 60)]);

        // Release lets go of the note actually held, not the remapped one
        engine.state_mut().master_key = 4;
        engine.dispatch(CommandEvent::release(Command::NoteButton(1)), 0, &mut sink);
        assert_eq!(sink.note_offs(), vec![(8, 60), (8, 62)]);
    }

    #[test]
    fn test_drum_button_sets_program_and_volume() {
        let mut engine = engine();
        let mut sink = RecordingSink::new();

        engine.dispatch(CommandEvent::press(Command::DrumButton(2)), 0, &mut sink);
        assert_eq!(
            sink.events,
            vec![
                SinkEvent::ProgramChange {
                    channel: 9,
                    program: 0
                },
                SinkEvent::ChannelVolume {
                    channel: 9,
                    volume: 100
                },
                SinkEvent::NoteOn {
                    channel: 9,
                    note: 38,
                    velocity: 100
                },
            ]
        );
    }

    #[test]
    fn test_out_of_range_buttons_ignored() {
        let mut engine = engine();
        let mut sink = RecordingSink::new();

        engine.dispatch(CommandEvent::press(Command::NoteButton(0)), 0, &mut sink);
        engine.dispatch(CommandEvent::press(Command::DrumButton(16)), 0, &mut sink);
        assert!(sink.events.is_empty());
    }

    #[test]
    fn test_all_off_releases_held_buttons() {
        let mut voices = MonoVoices::new();
        let mut sink = RecordingSink::new();
        voices.press(0, 1, 60, 90, &mut sink);
        voices.press(4, 2, 64, 90, &mut sink);

        voices.all_off(&mut sink);
        assert_eq!(sink.note_offs(), vec![(1, 60), (2, 64)]);
        assert_eq!(voices.slot(0).and_then(|s| s.note), None);
    }

    fn preview_engine() -> ChordEngine {
        let mut state = PerformanceState::default();
        state.part_config[1].channel = 3;
        state.part_config[1].stroke_ms = 20;
        state.part_config[1].pattern = ArpeggioPattern::new(
            vec![
                PatternStep::new(ArpeggioStyle::SameTime, &[100]),
                PatternStep::new(ArpeggioStyle::LowToHigh, &[0, 80, -30, 90]),
            ],
            None,
            0,
        );
        state.edit = EditCursor {
            part: 1,
            step: 1,
            pitch: 2,
        };
        ChordEngine::new(state, Box::new(TriadTheory))
    }

    #[test]
    fn test_single_preview_plays_cursor_cell() {
        let mut engine = preview_engine();
        let mut sink = RecordingSink::new();

        engine.dispatch(
            CommandEvent::press(Command::SoundEffect(SoundEffect::Single)),
            0,
            &mut sink,
        );
        engine.tick(0, &mut sink);
        // Degree falls back to 1; slot 2 is the third
        assert_eq!(sink.note_ons(), vec![(3, 52, 30)]);

        engine.tick(PREVIEW_RELEASE_USEC as u64, &mut sink);
        assert_eq!(sink.note_offs(), vec![(3, 52)]);

        // Edited cells are heard on the next preview
        engine.state_mut().part_config[1].pattern.set_velocity(1, 2, 70);
        sink.clear();
        engine.dispatch(
            CommandEvent::press(Command::SoundEffect(SoundEffect::Single)),
            200_000,
            &mut sink,
        );
        engine.tick(200_000, &mut sink);
        assert_eq!(sink.note_ons(), vec![(3, 52, 70)]);
    }

    #[test]
    fn test_testplay_previews_whole_step() {
        let mut engine = preview_engine();
        let mut sink = RecordingSink::new();

        engine.dispatch(
            CommandEvent::press(Command::SoundEffect(SoundEffect::Testplay)),
            0,
            &mut sink,
        );
        engine.tick(0, &mut sink);
        assert_eq!(sink.note_ons(), vec![(3, 48, 80)]);
        engine.tick(20_000, &mut sink);
        assert_eq!(sink.note_ons(), vec![(3, 48, 80), (3, 55, 90)]);
    }
}
