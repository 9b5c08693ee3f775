// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Monotonic microsecond clock.
//!
//! The engine works on countdowns, so all it needs from the clock is a
//! monotonic timestamp; it keeps the previous sample itself.

use std::time::Instant;

/// Monotonic clock reporting microseconds since its creation
#[derive(Debug, Clone, Copy)]
pub struct MicroClock {
    origin: Instant,
}

impl MicroClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Microseconds since the clock was created
    pub fn now_usec(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

impl Default for MicroClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Delta between two timestamps, zero if `now` is behind `previous`
pub fn elapsed_between(previous_usec: u64, now_usec: u64) -> u32 {
    now_usec
        .saturating_sub(previous_usec)
        .min(u32::MAX as u64) as u32
}
