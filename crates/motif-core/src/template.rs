//! Quantized chord/melody templates and their tonal/rhythmic features

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pattern::{round_up_to_bar, GeneratedPattern, MAX_PATTERN_STEPS};

/// Ticks per quarter note assumed when a source does not declare one
pub const DEFAULT_TICKS_PER_QUARTER: u32 = 960;

/// Number of rhythm bins in a feature vector (four bars of steps)
pub const RHYTHM_BINS: usize = 64;

/// Weight of the pitch-class term in [`similarity`]
const PITCH_WEIGHT: f64 = 0.55;
/// Weight of the rhythm term in [`similarity`]
const RHYTHM_WEIGHT: f64 = 0.45;

/// Which half of the catalog a template belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Chord,
    Melody,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chord => f.write_str("chord"),
            Self::Melody => f.write_str("melody"),
        }
    }
}

/// A single quantized template note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateNote {
    /// Pitch relative to an arbitrary tonal center
    pub note: u8,
    pub start_step: u32,
    /// Duration in steps (>= 1)
    pub length_steps: u32,
    /// Velocity (1-127)
    pub velocity: u8,
}

/// An unquantized note in MIDI ticks, as authored or imported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickNote {
    pub note: u8,
    pub velocity: u8,
    pub start_tick: u64,
    pub end_tick: u64,
}

/// A quantized template: notes on a sixteenth-note grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSequence {
    /// Loop length in steps, a positive multiple of 16
    pub length_steps: u32,
    /// Notes ordered by start step
    pub notes: Vec<TemplateNote>,
}

impl Default for TemplateSequence {
    fn default() -> Self {
        Self {
            length_steps: round_up_to_bar(0),
            notes: Vec::new(),
        }
    }
}

/// Quantize a fractional step position, capped at [`MAX_PATTERN_STEPS`]
fn ticks_to_steps(steps: f64, rounding: fn(f64) -> f64) -> u32 {
    rounding(steps).clamp(0.0, MAX_PATTERN_STEPS as f64) as u32
}

impl TemplateSequence {
    /// Quantize tick-based notes onto the step grid.
    ///
    /// Starts and lengths are rounded to the nearest step (length at least 1),
    /// and the sequence length is the last note end rounded up to whole bars.
    pub fn from_tick_notes(notes: &[TickNote], ticks_per_quarter: u32) -> Self {
        let tpq = if ticks_per_quarter == 0 { DEFAULT_TICKS_PER_QUARTER } else { ticks_per_quarter };
        let step_ticks = tpq as f64 / 4.0;

        let mut ordered: Vec<&TickNote> = notes.iter().collect();
        ordered.sort_by_key(|n| n.start_tick);

        let mut max_end_tick = 0u64;
        let notes = ordered
            .into_iter()
            .map(|n| {
                let end_tick = n.end_tick.max(n.start_tick);
                max_end_tick = max_end_tick.max(end_tick);
                TemplateNote {
                    note: n.note.min(127),
                    start_step: ticks_to_steps(n.start_tick as f64 / step_ticks, f64::round),
                    length_steps: ticks_to_steps((end_tick - n.start_tick) as f64 / step_ticks, f64::round).max(1),
                    velocity: n.velocity.clamp(1, 127),
                }
            })
            .collect();

        let max_step = ticks_to_steps(max_end_tick as f64 / step_ticks, f64::ceil);
        Self {
            length_steps: round_up_to_bar(max_step),
            notes,
        }
    }

    /// View a pattern's notes as a template (used to match imported patterns)
    pub fn from_pattern(pattern: &GeneratedPattern) -> Self {
        let mut notes: Vec<TemplateNote> = pattern
            .notes
            .iter()
            .map(|n| TemplateNote {
                note: n.note,
                start_step: n.start_step,
                length_steps: n.length_steps.max(1),
                velocity: n.velocity,
            })
            .collect();
        notes.sort_by_key(|n| n.start_step);

        Self {
            length_steps: round_up_to_bar(pattern.length_steps),
            notes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

/// Normalized pitch-class and step-position histograms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub pitch: [f64; 12],
    pub rhythm: [f64; RHYTHM_BINS],
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self {
            pitch: [0.0; 12],
            rhythm: [0.0; RHYTHM_BINS],
        }
    }
}

impl FeatureVector {
    /// Histogram a sequence: pitch by `note mod 12`, rhythm by `start mod 64`.
    /// An empty sequence yields the all-zero vector.
    pub fn from_sequence(sequence: &TemplateSequence) -> Self {
        let mut features = Self::default();
        if sequence.notes.is_empty() {
            return features;
        }

        for n in &sequence.notes {
            features.pitch[(n.note % 12) as usize] += 1.0;
            features.rhythm[n.start_step as usize % RHYTHM_BINS] += 1.0;
        }

        let total = sequence.notes.len() as f64;
        features.pitch.iter_mut().for_each(|v| *v /= total);
        features.rhythm.iter_mut().for_each(|v| *v /= total);
        features
    }

    /// True for the vector of an empty sequence
    pub fn is_zero(&self) -> bool {
        self.pitch.iter().all(|&v| v == 0.0)
    }
}

/// Weighted histogram intersection in [0, 1]
pub fn similarity(a: &FeatureVector, b: &FeatureVector) -> f64 {
    let pitch: f64 = a.pitch.iter().zip(&b.pitch).map(|(x, y)| x.min(*y)).sum();
    let rhythm: f64 = a.rhythm.iter().zip(&b.rhythm).map(|(x, y)| x.min(*y)).sum();
    PITCH_WEIGHT * pitch.clamp(0.0, 1.0) + RHYTHM_WEIGHT * rhythm.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(note: u8, start: u64, end: u64) -> TickNote {
        TickNote { note, velocity: 100, start_tick: start, end_tick: end }
    }

    #[test]
    fn test_quantize_rounds_to_steps() {
        // 960 tpq -> 240 ticks per step
        let seq = TemplateSequence::from_tick_notes(
            &[tick(60, 0, 240), tick(62, 250, 300), tick(64, 960, 2880)],
            960,
        );
        assert_eq!(seq.length_steps, 16);
        assert_eq!(seq.notes[0].start_step, 0);
        assert_eq!(seq.notes[0].length_steps, 1);
        // 50 ticks rounds to zero steps, floored at 1
        assert_eq!(seq.notes[1].start_step, 1);
        assert_eq!(seq.notes[1].length_steps, 1);
        assert_eq!(seq.notes[2].start_step, 4);
        assert_eq!(seq.notes[2].length_steps, 8);
    }

    #[test]
    fn test_quantize_length_rounds_up_to_bar() {
        // Ends on step 17 -> two bars
        let seq = TemplateSequence::from_tick_notes(&[tick(60, 0, 17 * 240)], 960);
        assert_eq!(seq.length_steps, 32);

        let empty = TemplateSequence::from_tick_notes(&[], 960);
        assert_eq!(empty.length_steps, 16);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_quantize_sorts_and_handles_zero_tpq() {
        let seq = TemplateSequence::from_tick_notes(&[tick(64, 480, 720), tick(60, 0, 240)], 0);
        assert_eq!(seq.notes[0].note, 60);
        assert_eq!(seq.notes[1].start_step, 2);
    }

    #[test]
    fn test_features_are_distributions() {
        let seq = TemplateSequence::from_tick_notes(
            &[tick(60, 0, 240), tick(72, 0, 240), tick(67, 480, 720), tick(61, 70 * 240, 71 * 240)],
            960,
        );
        let f = FeatureVector::from_sequence(&seq);
        assert!((f.pitch.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((f.rhythm.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(f.pitch[0], 0.5);
        // Step 70 wraps onto rhythm bin 6
        assert_eq!(f.rhythm[6], 0.25);
    }

    #[test]
    fn test_similarity_identity_and_symmetry() {
        let a = FeatureVector::from_sequence(&TemplateSequence::from_tick_notes(
            &[tick(60, 0, 240), tick(64, 480, 720), tick(67, 960, 1200)],
            960,
        ));
        let b = FeatureVector::from_sequence(&TemplateSequence::from_tick_notes(
            &[tick(62, 0, 240), tick(64, 240, 480)],
            960,
        ));
        assert!((similarity(&a, &a) - 1.0).abs() < 1e-9);
        assert!((similarity(&b, &b) - 1.0).abs() < 1e-9);
        assert_eq!(similarity(&a, &b), similarity(&b, &a));
        assert!(similarity(&a, &b) < 1.0);
    }

    #[test]
    fn test_empty_features_never_match() {
        let zero = FeatureVector::from_sequence(&TemplateSequence::default());
        assert!(zero.is_zero());
        let a = FeatureVector::from_sequence(&TemplateSequence::from_tick_notes(&[tick(60, 0, 240)], 960));
        assert_eq!(similarity(&zero, &a), 0.0);
        assert_eq!(similarity(&zero, &zero), 0.0);
    }
}
