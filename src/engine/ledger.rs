// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Pitch history ledger.
//!
//! Every (part, pitch slot) owns a small ring of scheduled notes. Each
//! entry counts down to its press and to its release; the ledger emits
//! note-on/off at the sink when a countdown crosses zero.
//!
//! Two rules keep the output clean:
//! - a new entry cancels entries of the same slot that would press at or
//!   after it, and pulls earlier releases forward to its press time, so
//!   at most one note per slot is sounding and awaiting release
//! - a release is swallowed while another pitch slot of the same part
//!   still holds the same (channel, note), so voicings that collapse two
//!   slots onto one MIDI note never cut each other off

use tracing::trace;

use crate::midi::{press_velocity, MidiSink, RELEASE_VELOCITY};
use crate::state::{MAX_PARTS, MAX_PITCH_WITH_DRUM};

/// Entries remembered per (part, pitch slot)
pub const MAX_MANAGE_HISTORY: usize = 4;

/// Note number of an unused entry
pub const EMPTY_NOTE: u8 = 0xFF;

/// Countdown value of a timer that is not running
pub const INACTIVE: i32 = -1;

/// One scheduled note
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchHistorySlot {
    pub note: u8,
    pub channel: u8,
    pub velocity: u8,
    /// Microseconds until note-on, [`INACTIVE`] once pressed
    pub press_usec: i32,
    /// Microseconds until note-off, [`INACTIVE`] once released
    pub release_usec: i32,
}

impl PitchHistorySlot {
    pub const EMPTY: Self = Self {
        note: EMPTY_NOTE,
        channel: 0,
        velocity: 0,
        press_usec: INACTIVE,
        release_usec: INACTIVE,
    };

    pub fn is_empty(&self) -> bool {
        self.note == EMPTY_NOTE
    }

    /// Pressed and waiting for its release
    pub fn is_sounding(&self) -> bool {
        !self.is_empty() && self.velocity > 0 && self.press_usec < 0 && self.release_usec >= 0
    }

    /// Holds a note that is pending or sounding
    pub fn is_active(&self) -> bool {
        !self.is_empty() && self.velocity > 0 && (self.press_usec >= 0 || self.release_usec >= 0)
    }

    /// Sounding (channel, note). A note still waiting for its press does
    /// not hold the key; it may be superseded before it ever sounds.
    fn holds(&self, channel: u8, note: u8) -> bool {
        self.is_sounding() && self.channel == channel && self.note == note
    }
}

impl Default for PitchHistorySlot {
    fn default() -> Self {
        Self::EMPTY
    }
}

type Ring = [PitchHistorySlot; MAX_MANAGE_HISTORY];

/// Fixed-size note history for every part and pitch slot
#[derive(Debug, Clone)]
pub struct PitchLedger {
    history: [[Ring; MAX_PITCH_WITH_DRUM]; MAX_PARTS],
}

impl PitchLedger {
    pub fn new() -> Self {
        Self {
            history: [[[PitchHistorySlot::EMPTY; MAX_MANAGE_HISTORY]; MAX_PITCH_WITH_DRUM];
                MAX_PARTS],
        }
    }

    /// History of one slot, oldest first
    pub fn slots(&self, part: usize, pitch: usize) -> &[PitchHistorySlot] {
        match self.history.get(part).and_then(|p| p.get(pitch)) {
            Some(ring) => ring,
            None => &[],
        }
    }

    /// Entries of a slot that are sounding and awaiting release
    pub fn sounding_count(&self, part: usize, pitch: usize) -> usize {
        self.slots(part, pitch).iter().filter(|s| s.is_sounding()).count()
    }

    /// Whether nothing is pending or sounding anywhere
    pub fn is_idle(&self) -> bool {
        self.history
            .iter()
            .flatten()
            .flatten()
            .all(|s| !s.is_active())
    }

    /// Schedule a note for (part, pitch).
    ///
    /// `press_usec` and `release_usec` are countdowns from now. A
    /// negative velocity or note 0 is a stop request: whatever the slot
    /// has sounding is released at `press_usec` and nothing new plays.
    #[allow(clippy::too_many_arguments)]
    pub fn set_pitch_manage(
        &mut self,
        part: usize,
        pitch: usize,
        channel: u8,
        note: u8,
        velocity: i16,
        press_usec: i32,
        release_usec: i32,
        sink: &mut dyn MidiSink,
    ) {
        if part >= MAX_PARTS || pitch >= MAX_PITCH_WITH_DRUM {
            return;
        }

        let oldest = self.history[part][pitch][0];
        if oldest.is_sounding() && !self.check_other_pitch_note(part, pitch, oldest.channel, oldest.note)
        {
            trace!(part, pitch, note = oldest.note, "history full, releasing oldest");
            sink.set_note_velocity(oldest.channel, oldest.note, RELEASE_VELOCITY);
        }

        let ring = &mut self.history[part][pitch];
        ring.rotate_left(1);
        ring[MAX_MANAGE_HISTORY - 1] = PitchHistorySlot::EMPTY;

        for slot in ring[..MAX_MANAGE_HISTORY - 1].iter_mut() {
            if slot.is_empty() {
                continue;
            }
            if slot.press_usec >= press_usec {
                *slot = PitchHistorySlot::EMPTY;
            } else if slot.release_usec > press_usec {
                slot.release_usec = press_usec;
            }
        }

        let entry = if velocity < 0 || note == 0 {
            PitchHistorySlot {
                note,
                channel,
                velocity: 0,
                press_usec: INACTIVE,
                release_usec: press_usec,
            }
        } else {
            PitchHistorySlot {
                note,
                channel,
                velocity: velocity.min(127) as u8,
                press_usec,
                release_usec,
            }
        };
        ring[MAX_MANAGE_HISTORY - 1] = entry;
    }

    /// Whether a pitch slot other than `pitch` in `part` still holds
    /// (channel, note)
    pub fn check_other_pitch_note(&self, part: usize, pitch: usize, channel: u8, note: u8) -> bool {
        let Some(rings) = self.history.get(part) else {
            return false;
        };
        rings
            .iter()
            .enumerate()
            .filter(|(p, _)| *p != pitch)
            .any(|(_, ring)| ring.iter().any(|s| s.holds(channel, note)))
    }

    /// Advance every countdown by `elapsed_usec`, emitting the presses and
    /// releases that came due.
    ///
    /// Returns the shortest remaining countdown, or `None` when nothing
    /// is pending.
    pub fn process(&mut self, elapsed_usec: u32, sink: &mut dyn MidiSink) -> Option<u32> {
        let elapsed = elapsed_usec.min(i32::MAX as u32) as i32;
        let mut next: Option<u32> = None;

        for part in 0..MAX_PARTS {
            for pitch in 0..MAX_PITCH_WITH_DRUM {
                for h in 0..MAX_MANAGE_HISTORY {
                    let mut slot = self.history[part][pitch][h];
                    if slot.is_empty() {
                        continue;
                    }

                    if slot.press_usec >= 0 {
                        slot.press_usec = slot.press_usec.saturating_sub(elapsed);
                        if slot.press_usec <= 0 {
                            slot.press_usec = INACTIVE;
                            if slot.velocity > 0 {
                                trace!(part, pitch, note = slot.note, velocity = slot.velocity, "press");
                                sink.set_note_velocity(
                                    slot.channel,
                                    slot.note,
                                    press_velocity(slot.velocity),
                                );
                            }
                        }
                    }

                    if slot.release_usec >= 0 {
                        slot.release_usec = slot.release_usec.saturating_sub(elapsed).max(0);
                        if slot.release_usec == 0 && slot.press_usec < 0 {
                            slot.release_usec = INACTIVE;
                            // Clear first so this slot never counts as the other holder
                            self.history[part][pitch][h] = slot;
                            if slot.velocity > 0
                                && !self.check_other_pitch_note(part, pitch, slot.channel, slot.note)
                            {
                                trace!(part, pitch, note = slot.note, "release");
                                sink.set_note_velocity(slot.channel, slot.note, RELEASE_VELOCITY);
                            }
                        }
                    }

                    if slot.press_usec < 0 && slot.release_usec < 0 {
                        slot = PitchHistorySlot::EMPTY;
                    } else {
                        let remaining = if slot.press_usec >= 0 {
                            slot.press_usec
                        } else {
                            slot.release_usec
                        } as u32;
                        next = Some(next.map_or(remaining, |n| n.min(remaining)));
                    }
                    self.history[part][pitch][h] = slot;
                }
            }
        }

        next
    }

    /// Release everything a part has pending or sounding, now.
    pub fn chord_note_off(&mut self, part: usize, sink: &mut dyn MidiSink) {
        if part >= MAX_PARTS {
            return;
        }
        for pitch in 0..MAX_PITCH_WITH_DRUM {
            for h in 0..MAX_MANAGE_HISTORY {
                let slot = self.history[part][pitch][h];
                if slot.is_empty() {
                    continue;
                }
                self.history[part][pitch][h] = PitchHistorySlot::EMPTY;
                if slot.is_sounding()
                    && !self.check_other_pitch_note(part, pitch, slot.channel, slot.note)
                {
                    sink.set_note_velocity(slot.channel, slot.note, RELEASE_VELOCITY);
                }
            }
        }
    }

    /// Release every part
    pub fn all_notes_off(&mut self, sink: &mut dyn MidiSink) {
        for part in 0..MAX_PARTS {
            self.chord_note_off(part, sink);
        }
    }
}

impl Default for PitchLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{RecordingSink, SinkEvent};

    fn pending(ledger: &PitchLedger, part: usize, pitch: usize) -> Vec<PitchHistorySlot> {
        ledger
            .slots(part, pitch)
            .iter()
            .filter(|s| s.is_active())
            .copied()
            .collect()
    }

    #[test]
    fn test_press_and_release_fire_in_order() {
        let mut ledger = PitchLedger::new();
        let mut sink = RecordingSink::new();

        ledger.set_pitch_manage(0, 0, 1, 60, 100, 0, 1_000, &mut sink);
        assert!(sink.events.is_empty());

        let next = ledger.process(0, &mut sink);
        assert_eq!(sink.note_ons(), vec![(1, 60, 100)]);
        assert_eq!(next, Some(1_000));

        let next = ledger.process(600, &mut sink);
        assert!(sink.note_offs().is_empty());
        assert_eq!(next, Some(400));

        let next = ledger.process(400, &mut sink);
        assert_eq!(sink.note_offs(), vec![(1, 60)]);
        assert_eq!(next, None);
        assert!(ledger.is_idle());
    }

    #[test]
    fn test_identical_schedule_is_idempotent() {
        let mut ledger = PitchLedger::new();
        let mut sink = RecordingSink::new();

        ledger.set_pitch_manage(0, 2, 0, 64, 90, 0, 100, &mut sink);
        ledger.set_pitch_manage(0, 2, 0, 64, 90, 0, 100, &mut sink);

        assert_eq!(pending(&ledger, 0, 2).len(), 1);

        ledger.process(0, &mut sink);
        assert_eq!(sink.note_ons().len(), 1);
    }

    #[test]
    fn test_new_note_shortens_sounding_note() {
        let mut ledger = PitchLedger::new();
        let mut sink = RecordingSink::new();

        ledger.set_pitch_manage(0, 0, 0, 60, 100, 0, 10_000, &mut sink);
        ledger.process(0, &mut sink);

        ledger.set_pitch_manage(0, 0, 0, 62, 100, 500, 10_000, &mut sink);
        let sounding = ledger.slots(0, 0)[MAX_MANAGE_HISTORY - 2];
        assert_eq!(sounding.note, 60);
        assert_eq!(sounding.release_usec, 500);

        sink.clear();
        ledger.process(500, &mut sink);
        assert_eq!(
            sink.events,
            vec![
                SinkEvent::NoteOff { channel: 0, note: 60 },
                SinkEvent::NoteOn {
                    channel: 0,
                    note: 62,
                    velocity: 100
                },
            ]
        );
    }

    #[test]
    fn test_at_most_one_sounding_per_slot() {
        let mut ledger = PitchLedger::new();
        let mut sink = RecordingSink::new();

        for i in 0..20 {
            let note = 50 + (i % 5) as u8;
            ledger.set_pitch_manage(1, 3, 0, note, 80, (i % 3) * 100, 5_000, &mut sink);
            ledger.process(70, &mut sink);
            assert!(ledger.sounding_count(1, 3) <= 1);
        }
    }

    #[test]
    fn test_stop_request_releases_at_press_time() {
        let mut ledger = PitchLedger::new();
        let mut sink = RecordingSink::new();

        ledger.set_pitch_manage(0, 0, 0, 60, 100, 0, 10_000, &mut sink);
        ledger.process(0, &mut sink);

        ledger.set_pitch_manage(0, 0, 0, 0, 100, 300, 10_000, &mut sink);
        sink.clear();
        ledger.process(300, &mut sink);

        assert_eq!(sink.note_offs(), vec![(0, 60)]);
        assert!(sink.note_ons().is_empty());
        assert_eq!(ledger.sounding_count(0, 0), 0);
    }

    #[test]
    fn test_negative_velocity_is_a_stop() {
        let mut ledger = PitchLedger::new();
        let mut sink = RecordingSink::new();

        ledger.set_pitch_manage(0, 1, 0, 67, -20, 0, 500, &mut sink);
        let entry = ledger.slots(0, 1)[MAX_MANAGE_HISTORY - 1];
        assert_eq!(entry.velocity, 0);
        assert_eq!(entry.press_usec, INACTIVE);
        assert_eq!(entry.release_usec, 0);

        ledger.process(0, &mut sink);
        assert!(sink.events.is_empty());
    }

    #[test]
    fn test_aliased_release_waits_for_last_holder() {
        let mut ledger = PitchLedger::new();
        let mut sink = RecordingSink::new();

        ledger.set_pitch_manage(0, 0, 0, 60, 100, 0, 100, &mut sink);
        ledger.set_pitch_manage(0, 1, 0, 60, 100, 0, 200, &mut sink);
        ledger.process(0, &mut sink);

        ledger.process(100, &mut sink);
        assert!(sink.note_offs().is_empty());

        ledger.process(100, &mut sink);
        assert_eq!(sink.note_offs(), vec![(0, 60)]);
    }

    #[test]
    fn test_release_not_held_by_unpressed_alias() {
        let mut ledger = PitchLedger::new();
        let mut sink = RecordingSink::new();

        ledger.set_pitch_manage(0, 0, 0, 60, 100, 0, 100, &mut sink);
        ledger.set_pitch_manage(0, 1, 0, 60, 100, 150, 300, &mut sink);
        ledger.process(0, &mut sink);

        // The other slot has not pressed yet, so it does not hold the key
        ledger.process(100, &mut sink);
        assert_eq!(sink.note_offs(), vec![(0, 60)]);

        // The pending 60 is superseded before it ever sounds
        ledger.set_pitch_manage(0, 1, 0, 64, 100, 0, 200, &mut sink);
        ledger.process(0, &mut sink);
        ledger.process(200, &mut sink);

        assert_eq!(sink.note_offs(), vec![(0, 60), (0, 64)]);
        assert_eq!(sink.note_ons().len(), 2);
        assert!(ledger.is_idle());
    }

    #[test]
    fn test_aliasing_is_per_part() {
        let mut ledger = PitchLedger::new();
        let mut sink = RecordingSink::new();

        ledger.set_pitch_manage(0, 0, 0, 60, 100, 0, 100, &mut sink);
        ledger.set_pitch_manage(1, 0, 0, 60, 100, 0, 200, &mut sink);
        ledger.process(0, &mut sink);
        ledger.process(100, &mut sink);

        assert_eq!(sink.note_offs(), vec![(0, 60)]);
    }

    #[test]
    fn test_chord_note_off_releases_aliased_note_once() {
        let mut ledger = PitchLedger::new();
        let mut sink = RecordingSink::new();

        ledger.set_pitch_manage(2, 0, 3, 60, 100, 0, 5_000, &mut sink);
        ledger.set_pitch_manage(2, 1, 3, 60, 100, 0, 5_000, &mut sink);
        ledger.set_pitch_manage(2, 2, 3, 64, 100, 0, 5_000, &mut sink);
        ledger.set_pitch_manage(2, 3, 3, 67, 100, 2_000, 5_000, &mut sink);
        ledger.process(0, &mut sink);
        sink.clear();

        ledger.chord_note_off(2, &mut sink);

        let mut offs = sink.note_offs();
        offs.sort();
        assert_eq!(offs, vec![(3, 60), (3, 64)]);
        assert!(ledger.is_idle());

        // The pending note never sounds
        sink.clear();
        ledger.process(5_000, &mut sink);
        assert!(sink.events.is_empty());
    }

    #[test]
    fn test_full_history_releases_oldest_sounding() {
        let mut ledger = PitchLedger::new();
        let mut sink = RecordingSink::new();

        ledger.set_pitch_manage(0, 0, 0, 60, 100, 0, 50_000, &mut sink);
        ledger.process(0, &mut sink);
        for i in 1..MAX_MANAGE_HISTORY as i32 {
            // Later presses keep the sounding note's release intact
            ledger.set_pitch_manage(0, 0, 0, 70, 0, 60_000 + i, 70_000, &mut sink);
        }
        assert!(sink.note_offs().is_empty());

        ledger.set_pitch_manage(0, 0, 0, 72, 100, 80_000, 90_000, &mut sink);
        assert_eq!(sink.note_offs(), vec![(0, 60)]);
    }

    #[test]
    fn test_out_of_range_indices_are_ignored() {
        let mut ledger = PitchLedger::new();
        let mut sink = RecordingSink::new();

        ledger.set_pitch_manage(MAX_PARTS, 0, 0, 60, 100, 0, 100, &mut sink);
        ledger.set_pitch_manage(0, MAX_PITCH_WITH_DRUM, 0, 60, 100, 0, 100, &mut sink);
        ledger.chord_note_off(MAX_PARTS, &mut sink);

        assert!(ledger.is_idle());
        assert!(ledger.slots(MAX_PARTS, 0).is_empty());
    }
}
