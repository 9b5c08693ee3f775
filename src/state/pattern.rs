// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Arpeggio patterns.
//!
//! A pattern is a table of signed velocities indexed by step and pitch
//! slot: 0 is silent, a negative value is a mute dot, a positive value a
//! normal hit. Each step also carries the stroke style used to spread
//! its pitches in time.

use serde::{Deserialize, Serialize};

use super::MAX_PITCH_WITH_DRUM;

/// How the pitches of one step are spread in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArpeggioStyle {
    /// Every pitch at once
    #[default]
    SameTime,
    /// Strum upward
    LowToHigh,
    /// Strum downward
    HighToLow,
    /// Fast, short, muted downstroke over every slot
    Mute,
}

/// One step of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatternStep {
    pub style: ArpeggioStyle,
    pub velocities: [i8; MAX_PITCH_WITH_DRUM],
}

impl PatternStep {
    pub fn new(style: ArpeggioStyle, velocities: &[i8]) -> Self {
        let mut step = Self {
            style,
            ..Default::default()
        };
        for (slot, &v) in step.velocities.iter_mut().zip(velocities) {
            *slot = v;
        }
        step
    }
}

/// A part's arpeggio pattern
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArpeggioPattern {
    steps: Vec<PatternStep>,
    loop_step: u8,
    anchor_step: u8,
}

impl ArpeggioPattern {
    /// Build a pattern; `loop_step` is clamped to the number of steps
    pub fn new(steps: Vec<PatternStep>, loop_step: Option<u8>, anchor_step: u8) -> Self {
        let available = steps.len().min(u8::MAX as usize) as u8;
        let loop_step = loop_step.unwrap_or(available).min(available);
        Self {
            steps,
            loop_step,
            anchor_step,
        }
    }

    /// Pattern length before it wraps
    pub fn loop_step(&self) -> u8 {
        self.loop_step
    }

    /// Steps below this survive a chord change without resetting
    pub fn anchor_step(&self) -> u8 {
        self.anchor_step
    }

    pub fn is_empty(&self) -> bool {
        self.loop_step == 0
    }

    /// The step at `step`, if it lies inside the loop
    pub fn step(&self, step: i8) -> Option<&PatternStep> {
        if step < 0 || step as u8 >= self.loop_step {
            return None;
        }
        self.steps.get(step as usize)
    }

    /// Signed velocity at (step, pitch); 0 outside the table
    pub fn velocity(&self, step: i8, pitch: usize) -> i8 {
        self.step(step)
            .and_then(|s| s.velocities.get(pitch).copied())
            .unwrap_or(0)
    }

    /// Replace one cell, used by pattern editing
    pub fn set_velocity(&mut self, step: u8, pitch: usize, velocity: i8) {
        if let Some(cell) = self
            .steps
            .get_mut(step as usize)
            .and_then(|s| s.velocities.get_mut(pitch))
        {
            *cell = velocity;
        }
    }
}
