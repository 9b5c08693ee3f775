// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Chord theory seam.
//!
//! The engine resolves every chord pitch through [`ChordTheory`]. The
//! trait is a pure function of its inputs so an implementation can be
//! swapped for a richer voicing engine without touching the scheduler.
//! [`TriadTheory`] is a small stacked-thirds implementation used by the
//! binary and the tests.

use super::scale::{MidiNote, ScaleType};

/// Number of pitch slots a chord part can voice
pub const CHORD_PITCHES: usize = 6;

/// Chord quality modifiers understood by [`TriadTheory`]
pub mod modifier {
    pub const NONE: u8 = 0;
    pub const SEVENTH: u8 = 1;
    pub const SUS4: u8 = 2;
    pub const ADD9: u8 = 3;
}

/// Voicing styles understood by [`TriadTheory`]
pub mod voicing {
    pub const CLOSE: u8 = 0;
    pub const OPEN: u8 = 1;
}

/// Snapshot of everything besides degree and key that shapes a chord pitch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChordOptions {
    /// Chord quality alteration (see [`modifier`])
    pub modifier: u8,
    /// Semitone shift applied to the chord tones
    pub semitone: i8,
    /// Bass degree (0 = same as chord degree)
    pub bass_degree: u8,
    /// Semitone shift applied to the bass
    pub bass_semitone: i8,
    /// Swap major and minor third
    pub minor_swap: bool,
    /// Note-spread style (see [`voicing`])
    pub voicing: u8,
    /// Fine pitch offset in semitones
    pub position: i8,
}

/// Maps a chord pitch slot to a MIDI note.
///
/// Returns 0 when the slot should stay silent.
pub trait ChordTheory: Send {
    fn midi_note(&self, pitch_index: u8, degree: u8, key: u8, options: &ChordOptions) -> MidiNote;
}

/// Stacked-thirds chords built on the major scale of the key
#[derive(Debug, Clone, Copy, Default)]
pub struct TriadTheory;

impl TriadTheory {
    const BASS_BASE: i16 = 36;
    const CHORD_BASE: i16 = 48;

    /// Semitones from the key root to the `steps`-th scale tone above `degree`
    fn tone(degree: u8, steps: usize) -> i16 {
        ScaleType::Major.offset_of(degree as usize - 1 + steps) as i16
    }
}

impl ChordTheory for TriadTheory {
    fn midi_note(&self, pitch_index: u8, degree: u8, key: u8, options: &ChordOptions) -> MidiNote {
        if !(1..=CHORD_PITCHES as u8).contains(&pitch_index) || !(1..=7).contains(&degree) {
            return 0;
        }

        let note = if pitch_index == 1 {
            let bass = if (1..=7).contains(&options.bass_degree) {
                options.bass_degree
            } else {
                degree
            };
            Self::BASS_BASE + key as i16 + Self::tone(bass, 0) + options.bass_semitone as i16
        } else {
            // Slots 2..=6 walk root, third, fifth, then the next octave up
            let slot = (pitch_index - 2) as usize;
            let mut steps = [0, 2, 4, 7, 9][slot];
            if options.modifier == modifier::SUS4 && steps % 7 == 2 {
                steps += 1;
            }
            if options.modifier == modifier::SEVENTH && slot == 4 {
                steps = 6;
            }
            if options.modifier == modifier::ADD9 && slot == 4 {
                steps = 8;
            }

            let mut offset = Self::tone(degree, steps);
            let is_third = steps % 7 == 2 && options.modifier != modifier::SUS4;
            if options.minor_swap && is_third {
                let third = Self::tone(degree, 2) - Self::tone(degree, 0);
                offset += if third == 4 { -1 } else { 1 };
            }
            if options.voicing == voicing::OPEN && slot == 1 {
                offset += 12;
            }
            Self::CHORD_BASE + key as i16 + offset + options.semitone as i16
        };

        (note + options.position as i16).clamp(1, 127) as MidiNote
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_major_triad() {
        let theory = TriadTheory;
        let options = ChordOptions::default();
        let notes: Vec<u8> = (1..=6).map(|p| theory.midi_note(p, 1, 0, &options)).collect();
        assert_eq!(notes, vec![36, 48, 52, 55, 60, 64]);
    }

    #[test]
    fn test_minor_chord_on_sixth_degree() {
        let theory = TriadTheory;
        let options = ChordOptions::default();
        // A minor in C: A C E
        assert_eq!(theory.midi_note(2, 6, 0, &options), 57);
        assert_eq!(theory.midi_note(3, 6, 0, &options), 60);
        assert_eq!(theory.midi_note(4, 6, 0, &options), 64);
    }

    #[test]
    fn test_minor_swap_flips_third() {
        let theory = TriadTheory;
        let options = ChordOptions {
            minor_swap: true,
            ..Default::default()
        };
        assert_eq!(theory.midi_note(3, 1, 0, &options), 51);
        assert_eq!(theory.midi_note(3, 6, 0, &options), 61);
    }

    #[test]
    fn test_bass_degree_and_key() {
        let theory = TriadTheory;
        let options = ChordOptions {
            bass_degree: 5,
            ..Default::default()
        };
        // G bass under C, in the key of D
        assert_eq!(theory.midi_note(1, 1, 2, &options), 45);
    }

    #[test]
    fn test_out_of_range_inputs_are_silent() {
        let theory = TriadTheory;
        let options = ChordOptions::default();
        assert_eq!(theory.midi_note(0, 1, 0, &options), 0);
        assert_eq!(theory.midi_note(7, 1, 0, &options), 0);
        assert_eq!(theory.midi_note(1, 0, 0, &options), 0);
        assert_eq!(theory.midi_note(1, 8, 0, &options), 0);
    }

    #[test]
    fn test_deterministic() {
        let theory = TriadTheory;
        let options = ChordOptions {
            modifier: modifier::SEVENTH,
            semitone: 1,
            position: -2,
            ..Default::default()
        };
        for pitch in 1..=6 {
            let a = theory.midi_note(pitch, 4, 7, &options);
            let b = theory.midi_note(pitch, 4, 7, &options);
            assert_eq!(a, b);
        }
    }
}
