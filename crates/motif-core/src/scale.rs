//! Scale membership, scale snapping and seventh-chord stacks

use serde::{Deserialize, Serialize};

/// Scale/mode types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMode {
    #[default]
    Major,
    Minor,
}

impl ScaleMode {
    /// Get scale intervals (semitones from root)
    pub fn intervals(&self) -> &'static [u8; 7] {
        match self {
            Self::Major => &[0, 2, 4, 5, 7, 9, 11],
            Self::Minor => &[0, 2, 3, 5, 7, 8, 10],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Major => "Major",
            Self::Minor => "Minor",
        }
    }

    /// Mode from a choice index (0 = major, anything else = minor)
    pub fn from_index(index: u8) -> Self {
        if index == 0 { Self::Major } else { Self::Minor }
    }

    /// The four-voice chord built on each snapped chord root
    pub fn seventh_chord(&self) -> ChordQuality {
        match self {
            Self::Major => ChordQuality::Major7,
            Self::Minor => ChordQuality::Minor7,
        }
    }
}

/// Chord quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChordQuality {
    Major7,
    Minor7,
}

impl ChordQuality {
    /// Get chord intervals from root
    pub fn intervals(&self) -> &'static [i32; 4] {
        match self {
            Self::Major7 => &[0, 4, 7, 11],
            Self::Minor7 => &[0, 3, 7, 10],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Major7 => "Maj7",
            Self::Minor7 => "Min7",
        }
    }
}

/// Whether `note` belongs to the scale of `key_root` (0-11) in `mode`.
/// Works for any integer pitch, including ones outside the MIDI range.
pub fn is_in_scale(note: i32, key_root: u8, mode: ScaleMode) -> bool {
    let relative = (note - key_root as i32).rem_euclid(12) as u8;
    mode.intervals().contains(&relative)
}

/// Snap a pitch to the nearest note of the scale.
///
/// The pitch is clamped to 0-127 first. In-scale pitches come back unchanged;
/// otherwise the neighbours are searched outward in the order +1, -1, +2, -2
/// (staying inside the MIDI range) and the first in-scale one wins.
pub fn snap_to_scale(note: i32, key_root: u8, mode: ScaleMode) -> u8 {
    let note = note.clamp(0, 127);
    if is_in_scale(note, key_root, mode) {
        return note as u8;
    }

    for delta in 1..=2 {
        let up = note + delta;
        if up <= 127 && is_in_scale(up, key_root, mode) {
            return up as u8;
        }
        let down = note - delta;
        if down >= 0 && is_in_scale(down, key_root, mode) {
            return down as u8;
        }
    }

    note as u8
}

/// Clamp an arbitrary pitch into the MIDI note range
pub fn clamp_note(note: i32) -> u8 {
    note.clamp(0, 127) as u8
}
