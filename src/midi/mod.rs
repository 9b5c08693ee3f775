// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! MIDI output abstraction layer.
//!
//! Two levels of abstraction live here:
//! - [`MidiOutput`] sends raw MIDI bytes to a backend (midir, a mock, ...)
//! - [`MidiSink`] is what the engine talks to: note velocity, program
//!   change and channel volume requests, infallible from the caller's view
//!
//! [`ByteSink`] bridges the two. [`RecordingSink`] captures requests for
//! tests and [`TraceSink`] logs them for dry runs.

pub mod midir_backend;

use anyhow::Result;
use tracing::{info, warn};

pub use midir_backend::{list_destinations, print_destinations, MidirOutput};

/// Trait for raw MIDI output implementations.
pub trait MidiOutput: Send {
    /// Send a MIDI message immediately.
    ///
    /// # Arguments
    /// * `message` - Raw MIDI bytes (e.g., `[0x90, 60, 127]` for Note On)
    fn send(&mut self, message: &[u8]) -> Result<()>;
}

/// MIDI message constants
pub mod messages {
    // Channel Voice Messages (upper nibble, lower nibble is channel 0-15)
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;

    // Controller numbers
    pub const CC_CHANNEL_VOLUME: u8 = 7;
    pub const CC_ALL_NOTES_OFF: u8 = 123;
}

/// Number of MIDI channels
pub const MIDI_CHANNELS: usize = 16;

/// High bit of a sink velocity: the value is explicit. A bare 0 means
/// "no value" and is treated as a release.
pub const VELOCITY_PRESENT: u8 = 0x80;

/// Frame a note-on velocity for [`MidiSink::set_note_velocity`]
pub fn press_velocity(velocity: u8) -> u8 {
    VELOCITY_PRESENT | (velocity & 0x7F)
}

/// Framed velocity for a release
pub const RELEASE_VELOCITY: u8 = VELOCITY_PRESENT;

/// Destination for the engine's MIDI requests.
///
/// Calls are synchronous and must not block.
pub trait MidiSink {
    /// Press (`velocity & 0x7F > 0`) or release a note
    fn set_note_velocity(&mut self, channel: u8, note: u8, velocity: u8);

    /// Select the program on a channel
    fn set_program_change(&mut self, channel: u8, program: u8);

    /// Set the channel volume (0-127)
    fn set_channel_volume(&mut self, channel: u8, volume: u8);
}

/// Adapts a raw [`MidiOutput`] to the [`MidiSink`] contract.
///
/// Program and volume requests that would not change the channel are
/// not re-sent; the scheduler pushes both after every part step.
pub struct ByteSink<O: MidiOutput> {
    output: O,
    programs: [Option<u8>; MIDI_CHANNELS],
    volumes: [Option<u8>; MIDI_CHANNELS],
}

impl<O: MidiOutput> ByteSink<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            programs: [None; MIDI_CHANNELS],
            volumes: [None; MIDI_CHANNELS],
        }
    }

    /// Send All Notes Off on every channel
    pub fn all_notes_off(&mut self) {
        for channel in 0..MIDI_CHANNELS as u8 {
            self.write(&[
                messages::CONTROL_CHANGE | channel,
                messages::CC_ALL_NOTES_OFF,
                0,
            ]);
        }
    }

    /// Get the wrapped output back
    pub fn into_inner(self) -> O {
        self.output
    }

    fn write(&mut self, message: &[u8]) {
        if let Err(e) = self.output.send(message) {
            warn!("MIDI send failed: {:#}", e);
        }
    }
}

impl<O: MidiOutput> MidiSink for ByteSink<O> {
    fn set_note_velocity(&mut self, channel: u8, note: u8, velocity: u8) {
        if channel as usize >= MIDI_CHANNELS || note > 127 {
            return;
        }
        let value = if velocity & VELOCITY_PRESENT != 0 {
            velocity & 0x7F
        } else {
            0
        };
        if value > 0 {
            self.write(&[messages::NOTE_ON | channel, note, value]);
        } else {
            self.write(&[messages::NOTE_OFF | channel, note, 0]);
        }
    }

    fn set_program_change(&mut self, channel: u8, program: u8) {
        let Some(slot) = self.programs.get_mut(channel as usize) else {
            return;
        };
        let program = program & 0x7F;
        if *slot == Some(program) {
            return;
        }
        *slot = Some(program);
        self.write(&[messages::PROGRAM_CHANGE | channel, program]);
    }

    fn set_channel_volume(&mut self, channel: u8, volume: u8) {
        let Some(slot) = self.volumes.get_mut(channel as usize) else {
            return;
        };
        let volume = volume.min(127);
        if *slot == Some(volume) {
            return;
        }
        *slot = Some(volume);
        self.write(&[
            messages::CONTROL_CHANGE | channel,
            messages::CC_CHANNEL_VOLUME,
            volume,
        ]);
    }
}

/// A request received by a [`RecordingSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelVolume { channel: u8, volume: u8 },
}

/// Sink that records every request in order
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub events: Vec<SinkEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded note-ons as (channel, note, velocity)
    pub fn note_ons(&self) -> Vec<(u8, u8, u8)> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                SinkEvent::NoteOn {
                    channel,
                    note,
                    velocity,
                } => Some((channel, note, velocity)),
                _ => None,
            })
            .collect()
    }

    /// Recorded note-offs as (channel, note)
    pub fn note_offs(&self) -> Vec<(u8, u8)> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                SinkEvent::NoteOff { channel, note } => Some((channel, note)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl MidiSink for RecordingSink {
    fn set_note_velocity(&mut self, channel: u8, note: u8, velocity: u8) {
        let value = velocity & 0x7F;
        if velocity & VELOCITY_PRESENT != 0 && value > 0 {
            self.events.push(SinkEvent::NoteOn {
                channel,
                note,
                velocity: value,
            });
        } else {
            self.events.push(SinkEvent::NoteOff { channel, note });
        }
    }

    fn set_program_change(&mut self, channel: u8, program: u8) {
        self.events.push(SinkEvent::ProgramChange { channel, program });
    }

    fn set_channel_volume(&mut self, channel: u8, volume: u8) {
        self.events.push(SinkEvent::ChannelVolume { channel, volume });
    }
}

/// Sink that only logs, for running without MIDI hardware
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceSink;

impl MidiSink for TraceSink {
    fn set_note_velocity(&mut self, channel: u8, note: u8, velocity: u8) {
        let value = velocity & 0x7F;
        if velocity & VELOCITY_PRESENT != 0 && value > 0 {
            info!(channel, note, velocity = value, "note on");
        } else {
            info!(channel, note, "note off");
        }
    }

    fn set_program_change(&mut self, channel: u8, program: u8) {
        info!(channel, program, "program change");
    }

    fn set_channel_volume(&mut self, channel: u8, volume: u8) {
        info!(channel, volume, "channel volume");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock MIDI output for testing
    struct MockMidiOutput {
        messages: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl MockMidiOutput {
        fn new() -> (Self, Arc<Mutex<Vec<Vec<u8>>>>) {
            let messages = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    messages: Arc::clone(&messages),
                },
                messages,
            )
        }
    }

    impl MidiOutput for MockMidiOutput {
        fn send(&mut self, message: &[u8]) -> Result<()> {
            self.messages.lock().unwrap().push(message.to_vec());
            Ok(())
        }
    }

    struct FailingOutput;

    impl MidiOutput for FailingOutput {
        fn send(&mut self, _message: &[u8]) -> Result<()> {
            Err(anyhow::anyhow!("port closed"))
        }
    }

    #[test]
    fn test_byte_sink_note_on_off() {
        let (output, messages) = MockMidiOutput::new();
        let mut sink = ByteSink::new(output);

        sink.set_note_velocity(1, 60, press_velocity(100));
        sink.set_note_velocity(1, 60, RELEASE_VELOCITY);
        sink.set_note_velocity(1, 62, 0);

        let messages = messages.lock().unwrap();
        assert_eq!(messages[0], vec![0x91, 60, 100]);
        assert_eq!(messages[1], vec![0x81, 60, 0]);
        assert_eq!(messages[2], vec![0x81, 62, 0]);
    }

    #[test]
    fn test_byte_sink_skips_out_of_range() {
        let (output, messages) = MockMidiOutput::new();
        let mut sink = ByteSink::new(output);

        sink.set_note_velocity(16, 60, press_velocity(100));
        sink.set_note_velocity(0, 200, press_velocity(100));
        sink.set_program_change(20, 1);

        assert!(messages.lock().unwrap().is_empty());
    }

    #[test]
    fn test_byte_sink_deduplicates_program_and_volume() {
        let (output, messages) = MockMidiOutput::new();
        let mut sink = ByteSink::new(output);

        sink.set_program_change(0, 5);
        sink.set_program_change(0, 5);
        sink.set_channel_volume(0, 100);
        sink.set_channel_volume(0, 100);
        sink.set_channel_volume(0, 90);

        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], vec![0xC0, 5]);
        assert_eq!(messages[1], vec![0xB0, 7, 100]);
        assert_eq!(messages[2], vec![0xB0, 7, 90]);
    }

    #[test]
    fn test_byte_sink_survives_send_failure() {
        let mut sink = ByteSink::new(FailingOutput);
        sink.set_note_velocity(0, 60, press_velocity(100));
        sink.all_notes_off();
    }

    #[test]
    fn test_recording_sink() {
        let mut sink = RecordingSink::new();
        sink.set_note_velocity(2, 64, press_velocity(90));
        sink.set_note_velocity(2, 64, RELEASE_VELOCITY);

        assert_eq!(sink.note_ons(), vec![(2, 64, 90)]);
        assert_eq!(sink.note_offs(), vec![(2, 64)]);

        sink.clear();
        assert!(sink.events.is_empty());
    }

    #[test]
    fn test_velocity_framing() {
        assert_eq!(press_velocity(100), 0x80 | 100);
        assert_eq!(press_velocity(0), VELOCITY_PRESENT);
        assert_eq!(press_velocity(0xFF), 0xFF);
    }
}
