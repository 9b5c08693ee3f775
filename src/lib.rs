// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Chord arpeggiation and MIDI note scheduling.
//!
//! A degree press picks the chord, beats (tapped, timed or auto-played)
//! walk each part through its arpeggio pattern, and every resulting note
//! is tracked per part and pitch slot until its release.

pub mod config;
pub mod engine;
pub mod midi;
pub mod music;
pub mod runtime;
pub mod state;
pub mod timing;
