//! Read-only template catalog with similarity search

use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::error::{MotifError, Result};
use crate::pattern::{GeneratedPattern, STEPS_PER_BAR};
use crate::template::{similarity, FeatureVector, TemplateKind, TemplateSequence, TickNote};

/// Minimum similarity for a match to be reported
pub const MATCH_THRESHOLD: f64 = 0.85;

/// A reference to one catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    pub kind: TemplateKind,
    pub index: usize,
}

/// Outcome of a catalog-wide similarity search
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchResult {
    /// True when `score` reaches [`MATCH_THRESHOLD`]
    pub matched: bool,
    /// Best-scoring template, `None` when nothing scored above zero
    pub best: Option<TemplateRef>,
    /// Similarity of the best template (0-1)
    pub score: f64,
}

impl MatchResult {
    /// Human-readable label for a matched template
    pub fn label(&self) -> Option<String> {
        let best = self.best.filter(|_| self.matched)?;
        Some(match best.kind {
            TemplateKind::Chord => format!("Matched Chords {:03}", best.index),
            TemplateKind::Melody => format!("Matched Melody {:03}", best.index),
        })
    }
}

struct Entry {
    sequence: TemplateSequence,
    features: FeatureVector,
}

impl Entry {
    fn new(sequence: TemplateSequence) -> Self {
        let features = FeatureVector::from_sequence(&sequence);
        Self { sequence, features }
    }
}

/// The chord and melody template catalog.
///
/// Built once, never mutated; share it behind an `Arc`.
pub struct TemplateLibrary {
    chords: Vec<Entry>,
    melodies: Vec<Entry>,
}

impl TemplateLibrary {
    /// The builtin catalog.
    ///
    /// # Panics
    /// If the builtin templates violate the catalog invariants, which is a
    /// defect in the catalog authoring code rather than a runtime condition.
    pub fn builtin() -> Self {
        match Self::from_templates(catalog::chord_templates(), catalog::melody_templates()) {
            Ok(library) => library,
            Err(e) => panic!("builtin template catalog is malformed: {e}"),
        }
    }

    /// Build a library from explicit templates, validating every entry
    pub fn from_templates(chords: Vec<TemplateSequence>, melodies: Vec<TemplateSequence>) -> Result<Self> {
        if chords.is_empty() {
            return Err(MotifError::EmptyCatalog(TemplateKind::Chord));
        }
        if melodies.is_empty() {
            return Err(MotifError::EmptyCatalog(TemplateKind::Melody));
        }
        for (index, tpl) in chords.iter().enumerate() {
            validate(TemplateKind::Chord, index, tpl)?;
        }
        for (index, tpl) in melodies.iter().enumerate() {
            validate(TemplateKind::Melody, index, tpl)?;
        }

        Ok(Self {
            chords: chords.into_iter().map(Entry::new).collect(),
            melodies: melodies.into_iter().map(Entry::new).collect(),
        })
    }

    pub fn len(&self, kind: TemplateKind) -> usize {
        self.entries(kind).len()
    }

    /// Look up a template; out-of-range indices are clamped
    pub fn template(&self, kind: TemplateKind, index: usize) -> &TemplateSequence {
        &self.entry(kind, index).sequence
    }

    /// Cached features of a template; out-of-range indices are clamped
    pub fn features(&self, kind: TemplateKind, index: usize) -> &FeatureVector {
        &self.entry(kind, index).features
    }

    /// Best catalog match for a sequence.
    ///
    /// Chord templates are scanned before melody templates, each in ascending
    /// index order; only a strictly better score replaces the current best.
    pub fn match_sequence(&self, sequence: &TemplateSequence) -> MatchResult {
        let features = FeatureVector::from_sequence(sequence);
        let mut result = MatchResult::default();

        let candidates = [TemplateKind::Chord, TemplateKind::Melody]
            .into_iter()
            .flat_map(|kind| self.entries(kind).iter().enumerate().map(move |(index, e)| (kind, index, e)));

        for (kind, index, entry) in candidates {
            let score = similarity(&features, &entry.features);
            if score > result.score {
                result.score = score;
                result.best = Some(TemplateRef { kind, index });
            }
        }

        result.matched = result.score >= MATCH_THRESHOLD;
        result
    }

    /// Match raw tick notes quantized at `ticks_per_quarter`
    pub fn match_tick_notes(&self, notes: &[TickNote], ticks_per_quarter: u32) -> MatchResult {
        self.match_sequence(&TemplateSequence::from_tick_notes(notes, ticks_per_quarter))
    }

    /// Match an already-quantized pattern
    pub fn match_pattern(&self, pattern: &GeneratedPattern) -> MatchResult {
        self.match_sequence(&TemplateSequence::from_pattern(pattern))
    }

    fn entries(&self, kind: TemplateKind) -> &[Entry] {
        match kind {
            TemplateKind::Chord => &self.chords,
            TemplateKind::Melody => &self.melodies,
        }
    }

    fn entry(&self, kind: TemplateKind, index: usize) -> &Entry {
        let entries = self.entries(kind);
        &entries[index.min(entries.len() - 1)]
    }
}

fn validate(kind: TemplateKind, index: usize, tpl: &TemplateSequence) -> Result<()> {
    let malformed = |reason: String| MotifError::MalformedTemplate { kind, index, reason };

    if tpl.length_steps == 0 || tpl.length_steps % STEPS_PER_BAR != 0 {
        return Err(malformed(format!("length {} is not a positive multiple of 16", tpl.length_steps)));
    }
    for n in &tpl.notes {
        if n.note > 127 {
            return Err(malformed(format!("note number {} out of range", n.note)));
        }
        if n.length_steps == 0 {
            return Err(malformed(format!("zero-length note at step {}", n.start_step)));
        }
        if !(1..=127).contains(&n.velocity) {
            return Err(malformed(format!("velocity {} out of range", n.velocity)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateNote;

    fn simple(notes: &[(u8, u32)]) -> TemplateSequence {
        TemplateSequence {
            length_steps: 16,
            notes: notes
                .iter()
                .map(|&(note, start_step)| TemplateNote { note, start_step, length_steps: 1, velocity: 100 })
                .collect(),
        }
    }

    #[test]
    fn test_builtin_counts() {
        let lib = TemplateLibrary::builtin();
        assert_eq!(lib.len(TemplateKind::Chord), catalog::CHORD_TEMPLATE_COUNT);
        assert_eq!(lib.len(TemplateKind::Melody), catalog::MELODY_TEMPLATE_COUNT);
    }

    #[test]
    fn test_template_index_is_clamped() {
        let lib = TemplateLibrary::builtin();
        let last = lib.len(TemplateKind::Melody) - 1;
        assert_eq!(
            lib.template(TemplateKind::Melody, 10_000),
            lib.template(TemplateKind::Melody, last)
        );
    }

    #[test]
    fn test_verbatim_template_matches() {
        let lib = TemplateLibrary::builtin();
        for (kind, index) in [
            (TemplateKind::Chord, 0),
            (TemplateKind::Chord, 123),
            (TemplateKind::Melody, 7),
            (TemplateKind::Melody, 199),
        ] {
            let copy = lib.template(kind, index).clone();
            let result = lib.match_sequence(&copy);
            assert!(result.matched, "{kind} {index}");
            assert!(result.score >= MATCH_THRESHOLD);
            assert!((result.score - 1.0).abs() < 1e-9);

            // Earlier templates with identical features win ties
            let best = result.best.expect("a best template");
            let resolved = lib.features(best.kind, best.index);
            assert!((similarity(resolved, &FeatureVector::from_sequence(&copy)) - 1.0).abs() < 1e-9);
            if best.kind == kind {
                assert!(best.index <= index);
            } else {
                assert_eq!(best.kind, TemplateKind::Chord);
            }
        }
    }

    #[test]
    fn test_empty_sequence_is_unmatched() {
        let lib = TemplateLibrary::builtin();
        let result = lib.match_sequence(&TemplateSequence::default());
        assert!(!result.matched);
        assert_eq!(result.best, None);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.label(), None);
    }

    #[test]
    fn test_ties_go_to_first_chord() {
        let a = simple(&[(60, 0), (67, 4)]);
        let lib = TemplateLibrary::from_templates(vec![simple(&[(61, 2)]), a.clone(), a.clone()], vec![a.clone()])
            .expect("valid templates");
        let result = lib.match_sequence(&a);
        assert_eq!(result.best, Some(TemplateRef { kind: TemplateKind::Chord, index: 1 }));
        assert_eq!(result.label().as_deref(), Some("Matched Chords 001"));
    }

    #[test]
    fn test_near_miss_is_unmatched() {
        let lib = TemplateLibrary::from_templates(
            vec![simple(&[(60, 0), (64, 4), (67, 8), (71, 12)])],
            vec![simple(&[(62, 1)])],
        )
        .expect("valid templates");
        // Shares half the pitches and half the onsets
        let result = lib.match_sequence(&simple(&[(60, 0), (64, 4), (66, 9), (69, 13)]));
        assert_eq!(result.best, Some(TemplateRef { kind: TemplateKind::Chord, index: 0 }));
        assert!((result.score - 0.5).abs() < 1e-9);
        assert!(!result.matched);
    }

    #[test]
    fn test_malformed_templates_are_rejected() {
        let mut bad = simple(&[(60, 0)]);
        bad.length_steps = 20;
        assert!(matches!(
            TemplateLibrary::from_templates(vec![bad], vec![simple(&[(60, 0)])]),
            Err(MotifError::MalformedTemplate { kind: TemplateKind::Chord, index: 0, .. })
        ));

        let mut zero_len = simple(&[(60, 0)]);
        zero_len.notes[0].length_steps = 0;
        assert!(matches!(
            TemplateLibrary::from_templates(vec![simple(&[(60, 0)])], vec![zero_len]),
            Err(MotifError::MalformedTemplate { kind: TemplateKind::Melody, .. })
        ));

        assert!(matches!(
            TemplateLibrary::from_templates(Vec::new(), vec![simple(&[(60, 0)])]),
            Err(MotifError::EmptyCatalog(TemplateKind::Chord))
        ));
    }
}
