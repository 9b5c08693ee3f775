// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Shared performance state.
//!
//! The system of record for chord selection, part cursors, part
//! configuration, song settings and global flags. The engine task is
//! the only writer of the fields it drives (part steps and enable flags,
//! chord degree, highlight); everything else reads a clone between ticks.

pub mod pattern;

use serde::{Deserialize, Serialize};

use crate::music::{normalize_key, ChordOptions, ScaleType, CHORD_PITCHES};

pub use pattern::{ArpeggioPattern, ArpeggioStyle, PatternStep};

/// Number of arpeggiated parts
pub const MAX_PARTS: usize = 6;

/// Chord pitch slots per part
pub const MAX_PITCH: usize = CHORD_PITCHES;

/// Pitch slots including the extra drum voice
pub const MAX_PITCH_WITH_DRUM: usize = MAX_PITCH + 1;

/// Physical note/drum buttons
pub const MAX_BUTTONS: usize = 15;

/// Highest chord degree
pub const MAX_DEGREE: u8 = 7;

/// Whether a degree names a chord
pub fn is_valid_degree(degree: u8) -> bool {
    (1..=MAX_DEGREE).contains(&degree)
}

/// Where off-beats come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffbeatStyle {
    /// Off-beats only from explicit beat input
    #[default]
    Manual,
    /// The first manual off-beat of a beat sets the spacing of the rest
    SelfTimed,
    /// Off-beats generated from tempo and swing after every on-beat
    Auto,
}

/// Automatic on-beat generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoPlay {
    #[default]
    None,
    /// Armed; starts on the next degree press
    Waiting,
    Running,
}

/// Current chord selection as edited by the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChordSelection {
    /// 1-7, 0 = none
    pub degree: u8,
    pub modifier: u8,
    pub semitone: i8,
    /// 1-7, 0 = same as degree
    pub bass_degree: u8,
    pub bass_semitone: i8,
    pub minor_swap: bool,
}

impl ChordSelection {
    /// Options handed to the chord theory for one part
    pub fn options(&self, voicing: u8, position: i8) -> ChordOptions {
        ChordOptions {
            modifier: self.modifier,
            semitone: self.semitone,
            bass_degree: self.bass_degree,
            bass_semitone: self.bass_semitone,
            minor_swap: self.minor_swap,
            voicing,
            position,
        }
    }

    /// Whether the pitch-shifting fields differ from `other`
    pub fn shift_differs(&self, other: &ChordSelection) -> bool {
        self.semitone != other.semitone
            || self.bass_semitone != other.bass_semitone
            || self.minor_swap != other.minor_swap
    }
}

/// Arpeggio cursor of one part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartStep {
    /// Current step, -1 when the part is stopped
    pub step: i8,
    pub enabled: bool,
    /// Requested enable state, applied at a first-step boundary
    pub next_enabled: bool,
}

impl Default for PartStep {
    fn default() -> Self {
        Self {
            step: -1,
            enabled: false,
            next_enabled: false,
        }
    }
}

/// Static configuration of one part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartConfig {
    pub channel: u8,
    pub program: u8,
    pub volume: u8,
    pub voicing: u8,
    pub position: i8,
    /// Stagger between strummed pitches
    pub stroke_ms: u16,
    /// Pitches resolve through the drum table instead of the chord theory
    pub drum: bool,
    pub pattern: ArpeggioPattern,
}

impl Default for PartConfig {
    fn default() -> Self {
        Self {
            channel: 0,
            program: 0,
            volume: 100,
            voicing: 0,
            position: 0,
            stroke_ms: 15,
            drum: false,
            pattern: ArpeggioPattern::default(),
        }
    }
}

/// Song-level timing and key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SongSettings {
    pub tempo: u16,
    /// 0-100
    pub swing: u8,
    pub step_per_beat: u8,
    /// Added to the master key
    pub key_offset: i8,
    /// Release time for arpeggiated notes
    pub autorelease_ms: u16,
}

impl Default for SongSettings {
    fn default() -> Self {
        Self {
            tempo: 120,
            swing: 0,
            step_per_beat: 2,
            key_offset: 0,
            autorelease_ms: 2_000,
        }
    }
}

/// Note and drum button mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonSettings {
    pub scale: ScaleType,
    /// Note for button 1 before key transposition
    pub base_note: u8,
    pub note_channel: u8,
    pub note_program: u8,
    pub drum_channel: u8,
    pub drum_program: u8,
    pub volume: u8,
    pub drum_map: [u8; MAX_BUTTONS],
}

impl Default for ButtonSettings {
    fn default() -> Self {
        Self {
            scale: ScaleType::Major,
            base_note: 60,
            note_channel: 8,
            note_program: 0,
            drum_channel: 9,
            drum_program: 0,
            volume: 100,
            drum_map: [36, 38, 42, 46, 45, 50, 49, 51, 39, 37, 56, 47, 41, 43, 57],
        }
    }
}

/// Pattern cell selected in the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EditCursor {
    pub part: u8,
    pub step: u8,
    pub pitch: u8,
}

/// The shared performance state
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceState {
    pub chord: ChordSelection,
    pub parts: [PartStep; MAX_PARTS],
    pub part_config: [PartConfig; MAX_PARTS],
    pub song: SongSettings,
    pub buttons: ButtonSettings,
    /// Pitch class of the master key
    pub master_key: u8,
    /// Percentage applied to pattern velocities
    pub press_velocity: u8,
    /// Ceiling applied to part volumes
    pub channel_volume: u8,
    pub offbeat_style: OffbeatStyle,
    pub autoplay: AutoPlay,
    pub edit: EditCursor,
    /// A different song slot was loaded; force a reset on the next on-beat
    pub slot_switched: bool,
    /// Degree lit on the UI
    pub highlighted_degree: Option<u8>,
}

impl Default for PerformanceState {
    fn default() -> Self {
        Self {
            chord: ChordSelection::default(),
            parts: [PartStep::default(); MAX_PARTS],
            part_config: Default::default(),
            song: SongSettings::default(),
            buttons: ButtonSettings::default(),
            master_key: 0,
            press_velocity: 100,
            channel_volume: 127,
            offbeat_style: OffbeatStyle::default(),
            autoplay: AutoPlay::default(),
            edit: EditCursor::default(),
            slot_switched: false,
            highlighted_degree: None,
        }
    }
}

impl PerformanceState {
    /// Master key plus the song's key offset, in `[0, 12)`
    pub fn slot_key(&self) -> u8 {
        normalize_key(self.master_key as i16 + self.song.key_offset as i16)
    }

    /// Enable a part immediately (initial configuration)
    pub fn enable_part(&mut self, part: usize, enabled: bool) {
        if let Some(p) = self.parts.get_mut(part) {
            p.enabled = enabled;
            p.next_enabled = enabled;
        }
    }

    /// Scale a pattern velocity by the press-velocity percentage
    pub fn scale_velocity(&self, velocity: u8) -> u8 {
        (velocity as u32 * self.press_velocity as u32 / 100).clamp(1, 127) as u8
    }

    /// Part volume under the channel-volume ceiling
    pub fn scaled_volume(&self, volume: u8) -> u8 {
        (volume as u32 * self.channel_volume as u32 / 127).min(127) as u8
    }
}
