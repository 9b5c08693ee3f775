// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Engine commands.
//!
//! Input arrives as (kind, parameter, pressed) triples; [`Command::from_raw`]
//! turns one into a typed [`Command`], rejecting parameters out of range.

/// Which side of the beat a `chord_beat` trigger names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatKind {
    On,
    Off,
}

/// Parameter of `autoplay_switch`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoplaySwitch {
    Toggle,
    Start,
    Stop,
}

/// Parameter of `sound_effect`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundEffect {
    /// Audition the pattern cell under the edit cursor
    Single,
    /// Audition the whole step under the edit cursor
    Testplay,
}

/// Raw command kinds as delivered by the input layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    ChordDegree,
    ChordBeat,
    ChordStepResetRequest,
    AutoplaySwitch,
    NoteButton,
    DrumButton,
    SoundEffect,
    SetVelocity,
    PartOn,
    PartOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Degree button 1-7
    ChordDegree(u8),
    ChordBeat(BeatKind),
    ChordStepResetRequest,
    AutoplaySwitch(AutoplaySwitch),
    /// Note button 1-15
    NoteButton(u8),
    /// Drum button 1-15
    DrumButton(u8),
    SoundEffect(SoundEffect),
    /// Press velocity percentage 0-127
    SetVelocity(u8),
    /// Request a part on or off; 0-based part index
    PartSwitch { part: u8, on: bool },
}

impl Command {
    /// Decode a raw (kind, parameter) pair
    pub fn from_raw(kind: CommandKind, param: i8) -> Option<Self> {
        let unsigned = u8::try_from(param).ok();
        let command = match kind {
            CommandKind::ChordDegree => Command::ChordDegree(unsigned.filter(|d| (1..=7).contains(d))?),
            CommandKind::ChordBeat => Command::ChordBeat(match param {
                1 => BeatKind::On,
                2 => BeatKind::Off,
                _ => return None,
            }),
            CommandKind::ChordStepResetRequest => Command::ChordStepResetRequest,
            CommandKind::AutoplaySwitch => Command::AutoplaySwitch(match param {
                0 => AutoplaySwitch::Toggle,
                1 => AutoplaySwitch::Start,
                2 => AutoplaySwitch::Stop,
                _ => return None,
            }),
            CommandKind::NoteButton => Command::NoteButton(unsigned.filter(|b| (1..=15).contains(b))?),
            CommandKind::DrumButton => Command::DrumButton(unsigned.filter(|b| (1..=15).contains(b))?),
            CommandKind::SoundEffect => Command::SoundEffect(match param {
                0 => SoundEffect::Single,
                1 => SoundEffect::Testplay,
                _ => return None,
            }),
            CommandKind::SetVelocity => Command::SetVelocity(unsigned?),
            CommandKind::PartOn => Command::PartSwitch {
                part: unsigned?,
                on: true,
            },
            CommandKind::PartOff => Command::PartSwitch {
                part: unsigned?,
                on: false,
            },
        };
        Some(command)
    }
}

/// A command with its button state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEvent {
    pub command: Command,
    pub pressed: bool,
}

impl CommandEvent {
    pub fn press(command: Command) -> Self {
        Self {
            command,
            pressed: true,
        }
    }

    pub fn release(command: Command) -> Self {
        Self {
            command,
            pressed: false,
        }
    }
}
