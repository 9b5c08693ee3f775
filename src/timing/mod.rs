// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Timing utilities.
//!
//! This module provides the monotonic microsecond clock and the
//! tempo/swing cycle calculations used by the beat engine.

pub mod clock;
pub mod cycle;

pub use clock::{elapsed_between, MicroClock};
pub use cycle::{
    accept_reactive_cycle, arpeggio_reset_timeout, onbeat_cycle_from_tempo, swing_ratio,
    BeatCycle, DEFAULT_BPM, MIN_BPM, MIN_REACTIVE_CYCLE_USEC,
};
