// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Music theory utilities.
//!
//! Scale tables for the note buttons and the chord theory seam the
//! note scheduler resolves pitches through.

pub mod chord;
pub mod scale;

pub use chord::{ChordOptions, ChordTheory, TriadTheory, CHORD_PITCHES};
pub use scale::{normalize_key, MidiNote, Note, ScaleType};
