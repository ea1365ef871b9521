//! Loop-relative MIDI patterns exchanged between generator, editor and scheduler

use serde::{Deserialize, Serialize};

/// Sixteenth-note steps per 4/4 bar
pub const STEPS_PER_BAR: u32 = 16;

/// Maximum number of tracks a pattern may address
pub const MAX_TRACKS: u8 = 16;

/// Longest loop and latest note position a pattern can hold, in steps.
/// A whole number of bars, and twice it still fits in a `u32`.
pub const MAX_PATTERN_STEPS: u32 = 1 << 30;

/// A single generated note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MidiNote {
    /// MIDI note number (0-127, 60 = middle C)
    pub note: u8,
    /// Start position in steps, relative to the loop start
    pub start_step: u32,
    /// Duration in steps (>= 1)
    pub length_steps: u32,
    /// Velocity (1-127)
    pub velocity: u8,
    /// MIDI channel (1-16)
    pub channel: u8,
    /// Track / voice index (0-15)
    pub track: u8,
}

impl MidiNote {
    /// Build a note with every field clamped into its valid range
    pub fn new(note: i32, start_step: u32, length_steps: u32, velocity: i32, channel: u8, track: u8) -> Self {
        Self {
            note: note.clamp(0, 127) as u8,
            start_step,
            length_steps: length_steps.max(1),
            velocity: velocity.clamp(1, 127) as u8,
            channel: channel.clamp(1, 16),
            track: track.min(MAX_TRACKS - 1),
        }
    }

    /// End step (start + length)
    pub fn end_step(&self) -> u32 {
        self.start_step.saturating_add(self.length_steps)
    }
}

/// A looping multi-track pattern. Has no notion of absolute time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeneratedPattern {
    /// Loop length in steps (>= 16)
    pub length_steps: u32,
    /// Number of tracks in use (1-16)
    pub num_tracks: u8,
    /// Notes in generation order
    pub notes: Vec<MidiNote>,
}

impl Default for GeneratedPattern {
    fn default() -> Self {
        Self {
            length_steps: 4 * STEPS_PER_BAR,
            num_tracks: 1,
            notes: Vec::new(),
        }
    }
}

impl GeneratedPattern {
    pub fn new(length_steps: u32, num_tracks: u8) -> Self {
        Self {
            length_steps,
            num_tracks,
            notes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Floor the loop length at one bar and clamp the track count to 1-16.
    /// Applied to patterns coming from outside the generator (edits, imports).
    pub fn normalized(mut self) -> Self {
        self.length_steps = self.length_steps.max(STEPS_PER_BAR);
        self.num_tracks = self.num_tracks.clamp(1, MAX_TRACKS);
        self
    }

    /// Notes on one track, in pattern order
    pub fn track_notes(&self, track: u8) -> impl Iterator<Item = &MidiNote> {
        self.notes.iter().filter(move |n| n.track == track)
    }

    /// Latest end step over all notes (0 for an empty pattern)
    pub fn last_end_step(&self) -> u32 {
        self.notes.iter().map(MidiNote::end_step).max().unwrap_or(0)
    }
}

/// Round a step count up to the next whole bar, never below one bar and
/// never above [`MAX_PATTERN_STEPS`]
pub fn round_up_to_bar(steps: u32) -> u32 {
    steps.min(MAX_PATTERN_STEPS).div_ceil(STEPS_PER_BAR).max(1) * STEPS_PER_BAR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_fields_are_clamped() {
        let n = MidiNote::new(140, 3, 0, 0, 0, 40);
        assert_eq!(n.note, 127);
        assert_eq!(n.length_steps, 1);
        assert_eq!(n.velocity, 1);
        assert_eq!(n.channel, 1);
        assert_eq!(n.track, 15);
        assert_eq!(n.end_step(), 4);

        let n = MidiNote::new(-3, 0, 2, 300, 20, 0);
        assert_eq!(n.note, 0);
        assert_eq!(n.velocity, 127);
        assert_eq!(n.channel, 16);
    }

    #[test]
    fn test_huge_step_counts_saturate() {
        assert_eq!(round_up_to_bar(0), 16);
        assert_eq!(round_up_to_bar(17), 32);
        assert_eq!(round_up_to_bar(u32::MAX), MAX_PATTERN_STEPS);
        let n = MidiNote { start_step: u32::MAX - 1, ..MidiNote::new(60, 0, 4, 100, 1, 0) };
        assert_eq!(n.end_step(), u32::MAX);
    }

    #[test]
    fn test_normalized_pattern() {
        let p = GeneratedPattern::new(5, 0).normalized();
        assert_eq!(p.length_steps, 16);
        assert_eq!(p.num_tracks, 1);

        let p = GeneratedPattern::new(70, 30).normalized();
        assert_eq!(p.length_steps, 70);
        assert_eq!(p.num_tracks, 16);
    }

    #[test]
    fn test_round_up_to_bar() {
        assert_eq!(round_up_to_bar(0), 16);
        assert_eq!(round_up_to_bar(1), 16);
        assert_eq!(round_up_to_bar(16), 16);
        assert_eq!(round_up_to_bar(17), 32);
        assert_eq!(round_up_to_bar(64), 64);
    }
}
