// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Performance file configuration.
//!
//! A performance file is YAML with four optional sections: `song`,
//! `settings`, `parts` and `buttons`. It is parsed into [`PerformanceFile`],
//! validated, and turned into the [`PerformanceState`] the engine runs on.

pub mod watcher;

pub use watcher::{validate_config, ConfigEvent, ConfigWatcher};

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::midi::MIDI_CHANNELS;
use crate::music::{Note, ScaleType};
use crate::state::{
    ArpeggioPattern, ArpeggioStyle, AutoPlay, ButtonSettings, OffbeatStyle, PartConfig,
    PatternStep, PerformanceState, SongSettings, MAX_BUTTONS, MAX_PARTS, MAX_PITCH,
    MAX_PITCH_WITH_DRUM,
};
use crate::timing::cycle::MAX_SWING_PERCENT;

/// Most sub-steps a beat may be divided into
pub const MAX_STEP_PER_BEAT: u8 = 16;

/// Most steps a pattern may hold
pub const MAX_PATTERN_STEPS: usize = 64;

/// Structural problems in a performance file
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("step_per_beat must be between 1 and {max}, got {0}", max = MAX_STEP_PER_BEAT)]
    StepPerBeat(u8),

    #[error("swing must be at most {max}%, got {0}", max = MAX_SWING_PERCENT)]
    Swing(u8),

    #[error("at most {max} parts are supported, got {0}", max = MAX_PARTS)]
    TooManyParts(usize),

    #[error("part {part}: pattern has {steps} steps, at most {max} are supported", max = MAX_PATTERN_STEPS)]
    TooManySteps { part: usize, steps: usize },

    #[error("part {part} step {step}: {count} velocities, at most {max} pitch slots")]
    TooManyVelocities {
        part: usize,
        step: usize,
        count: usize,
        max: usize,
    },

    #[error("part {part}: loop_step {loop_step} exceeds the {steps} listed steps")]
    LoopBeyondSteps { part: usize, loop_step: u8, steps: usize },

    #[error("part {part}: anchor_step {anchor_step} is beyond loop length {loop_step}")]
    AnchorBeyondLoop {
        part: usize,
        anchor_step: u8,
        loop_step: u8,
    },

    #[error("{field} is out of range: {value} (max {max})")]
    OutOfRange {
        field: String,
        value: i64,
        max: i64,
    },

    #[error("drum_map needs {max} notes, got {0}", max = MAX_BUTTONS)]
    DrumMapLength(usize),

    #[error("unknown key name: {0:?}")]
    UnknownKey(String),
}

/// Root of a performance file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PerformanceFile {
    #[serde(default)]
    pub song: SongSection,
    #[serde(default)]
    pub settings: SettingsSection,
    #[serde(default)]
    pub parts: Vec<PartSection>,
    #[serde(default)]
    pub buttons: ButtonSection,
}

impl PerformanceFile {
    /// Load a performance from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read performance file: {:?}", path.as_ref()))?;
        Self::from_yaml(&contents)
    }

    /// Parse a performance from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse performance YAML")
    }

    /// Serialize to a YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize performance to YAML")
    }

    /// Save the performance to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = self.to_yaml()?;
        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write performance file: {:?}", path.as_ref()))
    }

    /// Check everything the engine relies on
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let song = &self.song;
        if !(1..=MAX_STEP_PER_BEAT).contains(&song.step_per_beat) {
            return Err(ConfigError::StepPerBeat(song.step_per_beat));
        }
        if song.swing > MAX_SWING_PERCENT {
            return Err(ConfigError::Swing(song.swing));
        }
        self.settings.key()?;
        check_range("settings.press_velocity", self.settings.press_velocity as i64, 127)?;
        check_range("settings.channel_volume", self.settings.channel_volume as i64, 127)?;

        if self.parts.len() > MAX_PARTS {
            return Err(ConfigError::TooManyParts(self.parts.len()));
        }
        for (index, part) in self.parts.iter().enumerate() {
            part.validate(index)?;
        }

        self.buttons.validate()
    }

    /// Validate and build the engine's state
    pub fn into_state(&self) -> std::result::Result<PerformanceState, ConfigError> {
        self.validate()?;

        let mut state = PerformanceState {
            song: SongSettings {
                tempo: self.song.tempo,
                swing: self.song.swing,
                step_per_beat: self.song.step_per_beat,
                key_offset: self.song.key_offset,
                autorelease_ms: self.song.autorelease_ms,
            },
            buttons: self.buttons.settings(),
            master_key: self.settings.key()?.pitch_class(),
            press_velocity: self.settings.press_velocity,
            channel_volume: self.settings.channel_volume,
            offbeat_style: self.settings.offbeat_style,
            // Auto-play never starts on its own, at most armed
            autoplay: match self.settings.autoplay {
                AutoPlay::None => AutoPlay::None,
                AutoPlay::Waiting | AutoPlay::Running => AutoPlay::Waiting,
            },
            ..Default::default()
        };
        for (index, part) in self.parts.iter().enumerate() {
            state.part_config[index] = part.config();
            state.enable_part(index, part.enabled);
        }
        Ok(state)
    }

    /// A small built-in performance: a strummed guitar-like part, a bass
    /// part and a drum part at 100 BPM.
    pub fn demo() -> Self {
        let step = |style, velocities: &[i8]| StepSection {
            style,
            velocities: velocities.to_vec(),
        };
        Self {
            song: SongSection {
                name: "Demo".to_string(),
                tempo: 100,
                swing: 30,
                ..Default::default()
            },
            settings: SettingsSection::default(),
            parts: vec![
                PartSection {
                    channel: 0,
                    program: 25,
                    stroke_ms: 12,
                    pattern: PatternSection {
                        anchor_step: 4,
                        loop_step: None,
                        steps: vec![
                            step(ArpeggioStyle::LowToHigh, &[0, 100, 90, 90, 80, 80]),
                            step(ArpeggioStyle::Mute, &[0, 0, 0, -50, -50, -50]),
                            step(ArpeggioStyle::HighToLow, &[0, 70, 70, 70, 60, 60]),
                            step(ArpeggioStyle::LowToHigh, &[0, 80, 80, 80, 70, 70]),
                        ],
                    },
                    ..Default::default()
                },
                PartSection {
                    channel: 1,
                    program: 33,
                    pattern: PatternSection {
                        anchor_step: 2,
                        loop_step: None,
                        steps: vec![
                            step(ArpeggioStyle::SameTime, &[110]),
                            step(ArpeggioStyle::SameTime, &[]),
                            step(ArpeggioStyle::SameTime, &[0, 80]),
                            step(ArpeggioStyle::SameTime, &[]),
                        ],
                    },
                    ..Default::default()
                },
                PartSection {
                    channel: 9,
                    drum: true,
                    pattern: PatternSection {
                        anchor_step: 4,
                        loop_step: None,
                        steps: vec![
                            step(ArpeggioStyle::SameTime, &[110, 0, 70]),
                            step(ArpeggioStyle::SameTime, &[0, 0, 60]),
                            step(ArpeggioStyle::SameTime, &[0, 100, 70]),
                            step(ArpeggioStyle::SameTime, &[0, 0, 60]),
                        ],
                    },
                    ..Default::default()
                },
            ],
            buttons: ButtonSection::default(),
        }
    }
}

fn check_range(field: &str, value: i64, max: i64) -> std::result::Result<(), ConfigError> {
    if (0..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field: field.to_string(),
            value,
            max,
        })
    }
}

/// Song-level settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SongSection {
    #[serde(default = "default_name")]
    pub name: String,
    /// Tempo in BPM; below 30 falls back to 120
    #[serde(default = "default_tempo")]
    pub tempo: u16,
    /// Swing percentage, 0-100
    #[serde(default)]
    pub swing: u8,
    #[serde(default = "default_step_per_beat")]
    pub step_per_beat: u8,
    /// Semitones added to the master key
    #[serde(default)]
    pub key_offset: i8,
    #[serde(default = "default_autorelease_ms")]
    pub autorelease_ms: u16,
}

fn default_name() -> String {
    "Untitled".to_string()
}
fn default_tempo() -> u16 {
    120
}
fn default_step_per_beat() -> u8 {
    2
}
fn default_autorelease_ms() -> u16 {
    2_000
}

impl Default for SongSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            tempo: default_tempo(),
            swing: 0,
            step_per_beat: default_step_per_beat(),
            key_offset: 0,
            autorelease_ms: default_autorelease_ms(),
        }
    }
}

/// Global performance settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingsSection {
    /// Master key name (e.g., "C", "F#", "Bb")
    #[serde(default = "default_key")]
    pub master_key: String,
    /// Percentage applied to pattern velocities
    #[serde(default = "default_percent")]
    pub press_velocity: u8,
    /// Ceiling applied to part volumes
    #[serde(default = "default_channel_volume")]
    pub channel_volume: u8,
    #[serde(default)]
    pub offbeat_style: OffbeatStyle,
    #[serde(default)]
    pub autoplay: AutoPlay,
}

fn default_key() -> String {
    "C".to_string()
}
fn default_percent() -> u8 {
    100
}
fn default_channel_volume() -> u8 {
    127
}

impl SettingsSection {
    fn key(&self) -> std::result::Result<Note, ConfigError> {
        Note::parse(&self.master_key).ok_or_else(|| ConfigError::UnknownKey(self.master_key.clone()))
    }
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            master_key: default_key(),
            press_velocity: default_percent(),
            channel_volume: default_channel_volume(),
            offbeat_style: OffbeatStyle::default(),
            autoplay: AutoPlay::default(),
        }
    }
}

/// One arpeggiated part
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartSection {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// MIDI channel (0-15)
    #[serde(default)]
    pub channel: u8,
    #[serde(default)]
    pub program: u8,
    #[serde(default = "default_volume")]
    pub volume: u8,
    #[serde(default)]
    pub voicing: u8,
    #[serde(default)]
    pub position: i8,
    /// Stagger between strummed pitches
    #[serde(default = "default_stroke_ms")]
    pub stroke_ms: u16,
    /// Pitches come from the drum map instead of the chord
    #[serde(default)]
    pub drum: bool,
    #[serde(default)]
    pub pattern: PatternSection,
}

fn default_enabled() -> bool {
    true
}
fn default_volume() -> u8 {
    100
}
fn default_stroke_ms() -> u16 {
    15
}

impl Default for PartSection {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            channel: 0,
            program: 0,
            volume: default_volume(),
            voicing: 0,
            position: 0,
            stroke_ms: default_stroke_ms(),
            drum: false,
            pattern: PatternSection::default(),
        }
    }
}

impl PartSection {
    fn validate(&self, index: usize) -> std::result::Result<(), ConfigError> {
        let field = |name: &str| format!("parts[{index}].{name}");
        check_range(&field("channel"), self.channel as i64, MIDI_CHANNELS as i64 - 1)?;
        check_range(&field("program"), self.program as i64, 127)?;
        check_range(&field("volume"), self.volume as i64, 127)?;

        let pattern = &self.pattern;
        let steps = pattern.steps.len();
        if steps > MAX_PATTERN_STEPS {
            return Err(ConfigError::TooManySteps { part: index, steps });
        }
        let max = if self.drum { MAX_PITCH_WITH_DRUM } else { MAX_PITCH };
        for (step, section) in pattern.steps.iter().enumerate() {
            if section.velocities.len() > max {
                return Err(ConfigError::TooManyVelocities {
                    part: index,
                    step,
                    count: section.velocities.len(),
                    max,
                });
            }
        }

        let loop_step = match pattern.loop_step {
            Some(loop_step) if loop_step as usize > steps => {
                return Err(ConfigError::LoopBeyondSteps {
                    part: index,
                    loop_step,
                    steps,
                });
            }
            Some(loop_step) => loop_step,
            None => steps as u8,
        };
        if pattern.anchor_step > loop_step {
            return Err(ConfigError::AnchorBeyondLoop {
                part: index,
                anchor_step: pattern.anchor_step,
                loop_step,
            });
        }
        Ok(())
    }

    fn config(&self) -> PartConfig {
        PartConfig {
            channel: self.channel,
            program: self.program,
            volume: self.volume,
            voicing: self.voicing,
            position: self.position,
            stroke_ms: self.stroke_ms,
            drum: self.drum,
            pattern: self.pattern.pattern(),
        }
    }
}

/// Arpeggio pattern of a part
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PatternSection {
    /// Steps below this keep playing through a chord change
    #[serde(default)]
    pub anchor_step: u8,
    /// Pattern length; defaults to the number of steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_step: Option<u8>,
    #[serde(default)]
    pub steps: Vec<StepSection>,
}

impl PatternSection {
    fn pattern(&self) -> ArpeggioPattern {
        let steps = self
            .steps
            .iter()
            .map(|s| PatternStep::new(s.style, &s.velocities))
            .collect();
        ArpeggioPattern::new(steps, self.loop_step, self.anchor_step)
    }
}

/// One pattern step: stroke style and a velocity per pitch slot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StepSection {
    #[serde(default)]
    pub style: ArpeggioStyle,
    /// 0 silent, negative muted, positive normal
    #[serde(default)]
    pub velocities: Vec<i8>,
}

/// Note and drum button mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ButtonSection {
    #[serde(default)]
    pub scale: ScaleType,
    #[serde(default = "default_base_note")]
    pub base_note: u8,
    #[serde(default = "default_note_channel")]
    pub note_channel: u8,
    #[serde(default)]
    pub note_program: u8,
    #[serde(default = "default_drum_channel")]
    pub drum_channel: u8,
    #[serde(default)]
    pub drum_program: u8,
    #[serde(default = "default_volume")]
    pub volume: u8,
    #[serde(default = "default_drum_map")]
    pub drum_map: Vec<u8>,
}

fn default_base_note() -> u8 {
    60
}
fn default_note_channel() -> u8 {
    8
}
fn default_drum_channel() -> u8 {
    9
}
fn default_drum_map() -> Vec<u8> {
    ButtonSettings::default().drum_map.to_vec()
}

impl Default for ButtonSection {
    fn default() -> Self {
        Self {
            scale: ScaleType::default(),
            base_note: default_base_note(),
            note_channel: default_note_channel(),
            note_program: 0,
            drum_channel: default_drum_channel(),
            drum_program: 0,
            volume: default_volume(),
            drum_map: default_drum_map(),
        }
    }
}

impl ButtonSection {
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        let channel_max = MIDI_CHANNELS as i64 - 1;
        check_range("buttons.base_note", self.base_note as i64, 127)?;
        check_range("buttons.note_channel", self.note_channel as i64, channel_max)?;
        check_range("buttons.note_program", self.note_program as i64, 127)?;
        check_range("buttons.drum_channel", self.drum_channel as i64, channel_max)?;
        check_range("buttons.drum_program", self.drum_program as i64, 127)?;
        check_range("buttons.volume", self.volume as i64, 127)?;
        if self.drum_map.len() != MAX_BUTTONS {
            return Err(ConfigError::DrumMapLength(self.drum_map.len()));
        }
        for (index, &note) in self.drum_map.iter().enumerate() {
            check_range(&format!("buttons.drum_map[{index}]"), note as i64, 127)?;
        }
        Ok(())
    }

    fn settings(&self) -> ButtonSettings {
        let mut drum_map = [0u8; MAX_BUTTONS];
        for (slot, &note) in drum_map.iter_mut().zip(&self.drum_map) {
            *slot = note;
        }
        ButtonSettings {
            scale: self.scale,
            base_note: self.base_note,
            note_channel: self.note_channel,
            note_program: self.note_program,
            drum_channel: self.drum_channel,
            drum_program: self.drum_program,
            volume: self.volume,
            drum_map,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PERFORMANCE: &str = r#"
song:
  name: "Test"
  tempo: 96
  swing: 25
  step_per_beat: 4
  key_offset: -2
settings:
  master_key: "D"
  press_velocity: 90
  offbeat_style: self_timed
  autoplay: waiting
parts:
  - channel: 0
    program: 25
    stroke_ms: 20
    pattern:
      anchor_step: 4
      steps:
        - { style: low_to_high, velocities: [0, 100, 90, 80] }
        - { style: mute, velocities: [0, -40] }
        - { velocities: [] }
        - { style: high_to_low, velocities: [0, 70, 70, 70] }
  - channel: 9
    drum: true
    enabled: false
    pattern:
      loop_step: 2
      steps:
        - { velocities: [100, 0, 0, 0, 0, 0, 80] }
        - { velocities: [0, 100] }
        - { velocities: [0, 0, 60] }
"#;

    #[test]
    fn test_parse_performance() {
        let file = PerformanceFile::from_yaml(PERFORMANCE).unwrap();

        assert_eq!(file.song.name, "Test");
        assert_eq!(file.song.tempo, 96);
        assert_eq!(file.song.autorelease_ms, 2_000);
        assert_eq!(file.settings.offbeat_style, OffbeatStyle::SelfTimed);
        assert_eq!(file.parts.len(), 2);
        assert_eq!(file.parts[0].pattern.steps[1].style, ArpeggioStyle::Mute);
        assert_eq!(file.parts[0].pattern.steps[2].style, ArpeggioStyle::SameTime);
        assert!(file.parts[0].enabled);
        assert!(!file.parts[1].enabled);
        assert_eq!(file.buttons.drum_map.len(), MAX_BUTTONS);
    }

    #[test]
    fn test_into_state() {
        let state = PerformanceFile::from_yaml(PERFORMANCE)
            .unwrap()
            .into_state()
            .unwrap();

        assert_eq!(state.master_key, 2);
        assert_eq!(state.slot_key(), 0);
        assert_eq!(state.press_velocity, 90);
        assert_eq!(state.song.step_per_beat, 4);
        assert_eq!(state.autoplay, AutoPlay::Waiting);

        assert!(state.parts[0].enabled);
        assert!(!state.parts[1].enabled);
        assert!(!state.parts[2].enabled);

        let part = &state.part_config[0];
        assert_eq!(part.program, 25);
        assert_eq!(part.pattern.loop_step(), 4);
        assert_eq!(part.pattern.velocity(0, 1), 100);
        assert_eq!(part.pattern.velocity(1, 1), -40);

        let drums = &state.part_config[1];
        assert!(drums.drum);
        assert_eq!(drums.pattern.loop_step(), 2);
        assert_eq!(drums.pattern.velocity(0, 6), 80);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = PerformanceFile::from_yaml("{}").unwrap();
        assert_eq!(file, PerformanceFile::default());

        let state = file.into_state().unwrap();
        assert_eq!(state.song, SongSettings::default());
        assert_eq!(state.buttons, ButtonSettings::default());
        assert!(state.parts.iter().all(|p| !p.enabled));
    }

    #[test]
    fn test_validation_errors() {
        let mut file = PerformanceFile::default();
        file.song.step_per_beat = 0;
        assert_eq!(file.validate(), Err(ConfigError::StepPerBeat(0)));

        let mut file = PerformanceFile::default();
        file.song.swing = 120;
        assert_eq!(file.validate(), Err(ConfigError::Swing(120)));

        let mut file = PerformanceFile::default();
        file.settings.master_key = "H".to_string();
        assert_eq!(file.validate(), Err(ConfigError::UnknownKey("H".to_string())));

        let mut file = PerformanceFile::default();
        file.parts = vec![PartSection::default(); MAX_PARTS + 1];
        assert_eq!(file.validate(), Err(ConfigError::TooManyParts(MAX_PARTS + 1)));

        let mut file = PerformanceFile::default();
        file.parts.push(PartSection {
            channel: 16,
            ..Default::default()
        });
        assert!(matches!(file.validate(), Err(ConfigError::OutOfRange { .. })));

        let mut file = PerformanceFile::default();
        file.buttons.drum_map.pop();
        assert_eq!(
            file.validate(),
            Err(ConfigError::DrumMapLength(MAX_BUTTONS - 1))
        );
    }

    #[test]
    fn test_pattern_validation() {
        let mut part = PartSection::default();
        part.pattern.steps = vec![StepSection::default(); 4];
        part.pattern.anchor_step = 5;
        assert_eq!(
            part.validate(0),
            Err(ConfigError::AnchorBeyondLoop {
                part: 0,
                anchor_step: 5,
                loop_step: 4
            })
        );

        part.pattern.anchor_step = 0;
        part.pattern.loop_step = Some(6);
        assert!(matches!(
            part.validate(0),
            Err(ConfigError::LoopBeyondSteps { .. })
        ));

        part.pattern.loop_step = None;
        part.pattern.steps[2].velocities = vec![1; MAX_PITCH_WITH_DRUM];
        assert!(matches!(
            part.validate(0),
            Err(ConfigError::TooManyVelocities { step: 2, .. })
        ));
        part.drum = true;
        assert!(part.validate(0).is_ok());
    }

    #[test]
    fn test_error_messages() {
        let err = ConfigError::AnchorBeyondLoop {
            part: 1,
            anchor_step: 9,
            loop_step: 8,
        };
        assert_eq!(
            err.to_string(),
            "part 1: anchor_step 9 is beyond loop length 8"
        );
    }

    #[test]
    fn test_demo_is_valid() {
        let demo = PerformanceFile::demo();
        let state = demo.into_state().unwrap();
        assert!(state.parts[..3].iter().all(|p| p.enabled));
        assert!(state.part_config[2].drum);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("demo.yaml");

        let demo = PerformanceFile::demo();
        demo.save(&path).unwrap();
        let loaded = PerformanceFile::load(&path).unwrap();
        assert_eq!(loaded, demo);
    }

    #[test]
    fn test_load_missing_file() {
        let result = PerformanceFile::load("/nonexistent/performance.yaml");
        assert!(result.is_err());
    }
}
