// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Beat cycle lengths.
//!
//! Converts tempo and swing into the on-beat period and the two
//! alternating off-beat slot lengths, and decides whether a tapped
//! on-beat interval is a usable tempo.

/// Tempos below this fall back to [`DEFAULT_BPM`]
pub const MIN_BPM: u16 = 30;

/// Tempo used when the song tempo is unusable
pub const DEFAULT_BPM: u16 = 120;

/// Tapped on-beat intervals shorter than this are contact noise
pub const MIN_REACTIVE_CYCLE_USEC: i64 = 16_384;

/// Maximum swing percentage (2:1 on/off ratio)
pub const MAX_SWING_PERCENT: u8 = 100;

/// On-beat period in microseconds for a tempo
pub fn onbeat_cycle_from_tempo(bpm: u16) -> i32 {
    let bpm = i64::from(if bpm < MIN_BPM { DEFAULT_BPM } else { bpm });
    ((60_000_000 + bpm / 2) / bpm) as i32
}

/// Swing in 1/10000 of a step: 0% is even, 100% shifts a third of a step
pub fn swing_ratio(swing_percent: u8) -> i32 {
    swing_percent.min(MAX_SWING_PERCENT) as i32 * 100 / 3
}

/// Arpeggio auto-reset window: 4.2 beats
pub fn arpeggio_reset_timeout(onbeat_usec: i32) -> i32 {
    (onbeat_usec as i64 * 42 / 10).min(i32::MAX as i64) as i32
}

/// Interpret a tapped on-beat interval.
///
/// Returns `None` when the interval is noise (too short) or a new phrase
/// (longer than `ceiling_usec`); the caller then falls back to the tempo.
pub fn accept_reactive_cycle(elapsed_usec: i64, ceiling_usec: i64) -> Option<i32> {
    if (MIN_REACTIVE_CYCLE_USEC..=ceiling_usec).contains(&elapsed_usec) {
        Some(elapsed_usec.min(i32::MAX as i64) as i32)
    } else {
        None
    }
}

/// On-beat period plus the swing-adjusted off-beat slots.
///
/// `offbeat_usec[0]` is the gap after an even sub-step (the longer one
/// under swing), `offbeat_usec[1]` the gap after an odd sub-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatCycle {
    pub onbeat_usec: i32,
    pub offbeat_usec: [i32; 2],
}

impl BeatCycle {
    /// Cycle derived from the song tempo
    pub fn from_tempo(bpm: u16, step_per_beat: u8, swing_percent: u8) -> Self {
        Self::from_onbeat(onbeat_cycle_from_tempo(bpm), step_per_beat, swing_percent)
    }

    /// Cycle derived from a known on-beat period (tempo or tapped)
    pub fn from_onbeat(onbeat_usec: i32, step_per_beat: u8, swing_percent: u8) -> Self {
        let mut cycle = Self {
            onbeat_usec,
            offbeat_usec: [onbeat_usec; 2],
        };
        cycle.derive_offbeats(step_per_beat, swing_percent);
        cycle
    }

    /// Recompute the off-beat slots from the current on-beat period
    pub fn derive_offbeats(&mut self, step_per_beat: u8, swing_percent: u8) {
        if step_per_beat == 0 {
            self.offbeat_usec = [self.onbeat_usec; 2];
            return;
        }
        let step = self.onbeat_usec as i64 / step_per_beat as i64;
        // Swing only pairs up when sub-steps come in twos
        let shift = if step_per_beat % 2 == 0 {
            step * swing_ratio(swing_percent) as i64 / 10_000
        } else {
            0
        };
        self.offbeat_usec = [(step + shift) as i32, (step - shift) as i32];
    }

    /// Gap before the sub-step following `beat_index`
    pub fn offbeat_after(&self, beat_index: u8) -> i32 {
        self.offbeat_usec[(beat_index & 1) as usize]
    }

    /// Arpeggio auto-reset window for this cycle
    pub fn reset_timeout(&self) -> i32 {
        arpeggio_reset_timeout(self.onbeat_usec)
    }
}

impl Default for BeatCycle {
    fn default() -> Self {
        Self::from_tempo(DEFAULT_BPM, 2, 0)
    }
}
