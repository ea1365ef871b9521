//! Template-driven pattern generation and candidate scoring

use std::collections::HashMap;

use fastrand::Rng;
use serde::{Deserialize, Serialize};

use crate::library::TemplateLibrary;
use crate::params::{GenerationParams, GenerationType};
use crate::pattern::{GeneratedPattern, MidiNote};
use crate::scale::{is_in_scale, snap_to_scale, ScaleMode};
use crate::template::{TemplateKind, TemplateNote, TemplateSequence};

/// Base chord velocities, picked by `(seed + 13) mod 5`
const CHORD_VELOCITIES: [i32; 5] = [40, 55, 70, 85, 100];

/// Largest melodic interval allowed between notes at different steps
pub const MAX_LEAP: i32 = 13;

/// Track the hybrid melody is written to
const HYBRID_MELODY_TRACK: u8 = 4;

/// A generated pattern together with the seed that produced it and its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPattern {
    pub pattern: GeneratedPattern,
    pub seed: u32,
    pub score: f64,
}

/// Blend a base velocity toward the input velocity by `sensitivity` percent
pub fn blend_velocity(base: i32, input: u8, sensitivity: u8) -> u8 {
    let s = sensitivity.min(100) as f64 / 100.0;
    let v = ((1.0 - s) * base as f64 + s * input as f64).round() as i32;
    v.clamp(1, 127) as u8
}

/// Chord tones keyed by the step they start on, in order of appearance
type ChordToneLookup = HashMap<u32, Vec<u8>>;

struct Request<'a> {
    params: GenerationParams,
    root: i32,
    velocity: u8,
    channel: u8,
    library: &'a TemplateLibrary,
    rng: Rng,
}

impl Request<'_> {
    fn snap(&self, note: i32) -> u8 {
        snap_to_scale(note, self.params.key, self.params.mode)
    }

    fn chord_part(&mut self) -> (Vec<MidiNote>, ChordToneLookup) {
        let seed = self.params.seed;
        let library = self.library;
        let tpl = library.template(TemplateKind::Chord, seed as usize % library.len(TemplateKind::Chord));

        let base = CHORD_VELOCITIES[(seed.wrapping_add(13) % 5) as usize];
        let velocity = blend_velocity(base, self.velocity, self.params.velocity_sensitivity);
        let arpeggiate = self.params.genre % 2 == 1 || self.rng.bool();
        let intervals = self.params.mode.seventh_chord().intervals();
        let total = self.params.total_steps();

        let mut notes = Vec::new();
        let mut lookup = ChordToneLookup::new();
        for (start, n) in tiled(tpl, total) {
            let chord_root = self.snap(self.root + (n.note % 12) as i32);
            let duration = n.length_steps.clamp(1, total - start);

            for (voice, interval) in intervals.iter().enumerate() {
                let pitch = self.snap(chord_root as i32 + interval);
                let (note_start, length) = if arpeggiate {
                    (start + voice as u32 % duration.min(4), 1)
                } else {
                    (start, duration)
                };
                notes.push(MidiNote::new(
                    pitch as i32,
                    note_start,
                    length,
                    velocity as i32,
                    self.channel,
                    voice as u8,
                ));

                let tones = lookup.entry(note_start).or_default();
                if !tones.contains(&pitch) {
                    tones.push(pitch);
                }
            }
        }
        (notes, lookup)
    }

    fn melody_part(&mut self, track: u8, chord_tones: Option<&ChordToneLookup>) -> Vec<MidiNote> {
        let library = self.library;
        let index = self.params.seed.wrapping_mul(17).wrapping_add(3) as usize % library.len(TemplateKind::Melody);
        let tpl = library.template(TemplateKind::Melody, index);
        let total = self.params.total_steps();
        let follow = self.params.melody_follow_chord_chance;

        let mut notes = Vec::new();
        let mut prev_note = self.snap(self.root) as i32;
        let mut prev_step: Option<u32> = None;

        for (start, n) in tiled(tpl, total) {
            let mut pitch = self.snap(self.root + n.note as i32 - 60);

            if let Some(lookup) = chord_tones
                && self.rng.f64() < follow
                && let Some(tones) = lookup.get(&start).filter(|t| !t.is_empty())
            {
                pitch = tones[self.rng.usize(..tones.len())];
            }

            if prev_step != Some(start) {
                pitch = limit_leap(pitch as i32, prev_note, self.params.key, self.params.mode);
            }

            let r = 0.05 + 0.10 * self.rng.f64();
            let scale = if self.rng.bool() { 1.0 + r } else { 1.0 - r };
            let jittered = (n.velocity as f64 * scale).round() as i32;
            let velocity = blend_velocity(jittered, self.velocity, self.params.velocity_sensitivity);

            notes.push(MidiNote::new(
                pitch as i32,
                start,
                n.length_steps.clamp(1, total - start),
                velocity as i32,
                self.channel,
                track,
            ));
            prev_note = pitch as i32;
            prev_step = Some(start);
        }
        notes
    }
}

/// Tile a template across `total` steps, yielding absolute starts (always
/// before the end) with the note they came from
fn tiled(tpl: &TemplateSequence, total: u32) -> impl Iterator<Item = (u32, &TemplateNote)> {
    let period = tpl.length_steps.max(1);
    (0..total.div_ceil(period))
        .flat_map(move |k| tpl.notes.iter().map(move |n| (k * period + n.start_step, n)))
        .filter(move |(start, _)| *start < total)
}

/// Pull `pitch` within [`MAX_LEAP`] semitones of `prev`: octave shifts toward
/// the previous note first, then the widest in-scale interval that fits.
fn limit_leap(pitch: i32, prev: i32, key: u8, mode: ScaleMode) -> u8 {
    let mut pitch = pitch;
    for _ in 0..8 {
        if (pitch - prev).abs() <= MAX_LEAP {
            return pitch as u8;
        }
        let shifted = if pitch > prev { pitch - 12 } else { pitch + 12 };
        pitch = snap_to_scale(shifted, key, mode) as i32;
    }
    if (pitch - prev).abs() <= MAX_LEAP {
        return pitch as u8;
    }

    let direction = (pitch - prev).signum();
    (0..=MAX_LEAP)
        .rev()
        .map(|d| prev + direction * d)
        .find(|&p| (0..=127).contains(&p) && is_in_scale(p, key, mode))
        .unwrap_or(prev) as u8
}

/// Generate one pattern.
///
/// Deterministic for identical inputs: all randomness comes from a PRNG seeded
/// with `params.seed`. Root, velocity and channel are clamped into MIDI range.
pub fn generate(
    params: &GenerationParams,
    root: i32,
    velocity: i32,
    channel: u8,
    library: &TemplateLibrary,
) -> GeneratedPattern {
    let params = params.normalized();
    let mut req = Request {
        params,
        root: root.clamp(0, 127),
        velocity: velocity.clamp(1, 127) as u8,
        channel: channel.clamp(1, 16),
        library,
        rng: Rng::with_seed(params.seed as u64),
    };

    let mut pattern = GeneratedPattern::new(params.total_steps(), 1);
    match params.kind {
        GenerationType::Chord => {
            let (notes, _) = req.chord_part();
            pattern.notes = notes;
            pattern.num_tracks = 4;
        }
        GenerationType::Melody => {
            pattern.notes = req.melody_part(0, None);
            pattern.num_tracks = 1;
        }
        GenerationType::Hybrid => {
            let (mut notes, lookup) = req.chord_part();
            notes.extend(req.melody_part(HYBRID_MELODY_TRACK, Some(&lookup)));
            pattern.notes = notes;
            pattern.num_tracks = HYBRID_MELODY_TRACK + 1;
        }
    }
    pattern
}

/// Heuristic quality of a pattern; higher is better, -1 for an empty pattern.
///
/// Rewards note count, penalizes distance from a target density (notes per
/// step) and melodic leaps wider than a fifth between distinct steps.
pub fn score(pattern: &GeneratedPattern, kind: GenerationType) -> f64 {
    if pattern.is_empty() {
        return -1.0;
    }

    let n = pattern.notes.len() as f64;
    let density = n / pattern.length_steps.max(1) as f64;
    let target = if kind == GenerationType::Melody { 0.50 } else { 0.35 };

    let melodic: Vec<&MidiNote> = match kind.melodic_track() {
        Some(track) => pattern.track_notes(track).collect(),
        None => pattern.notes.iter().collect(),
    };
    let leap_penalty: f64 = melodic
        .windows(2)
        .filter(|w| w[0].start_step != w[1].start_step)
        .map(|w| ((w[1].note as i32 - w[0].note as i32).abs() - 7).max(0) as f64 * 0.02)
        .sum();

    0.01 * n - 2.0 * (density - target).abs() - leap_penalty
}

/// Generate `candidates` patterns from consecutive seeds starting at
/// `params.seed` and keep the best-scoring one (the first on ties)
pub fn generate_best(
    params: &GenerationParams,
    root: i32,
    velocity: i32,
    channel: u8,
    library: &TemplateLibrary,
    candidates: u32,
) -> ScoredPattern {
    let mut best: Option<ScoredPattern> = None;
    for i in 0..candidates.max(1) {
        let seed = params.seed.wrapping_add(i);
        let pattern = generate(&params.with_seed(seed), root, velocity, channel, library);
        let score = score(&pattern, params.kind);
        if best.as_ref().is_none_or(|b| score > b.score) {
            best = Some(ScoredPattern { pattern, seed, score });
        }
    }
    best.unwrap_or_else(|| ScoredPattern {
        pattern: GeneratedPattern::default(),
        seed: params.seed,
        score: -1.0,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::hash::{DefaultHasher, Hash, Hasher};
    use std::sync::LazyLock;

    use super::*;
    use crate::scale::ScaleMode;

    static LIBRARY: LazyLock<TemplateLibrary> = LazyLock::new(TemplateLibrary::builtin);

    fn params(kind: GenerationType, seed: u32) -> GenerationParams {
        GenerationParams { kind, seed, ..GenerationParams::default() }
    }

    fn melodic_leaps_ok(notes: &[&MidiNote]) -> bool {
        notes
            .windows(2)
            .filter(|w| w[0].start_step != w[1].start_step)
            .all(|w| (w[1].note as i32 - w[0].note as i32).abs() <= MAX_LEAP)
    }

    #[test]
    fn test_chord_validation_scenario() {
        // C major, 4 bars, seed 42, middle C at full velocity
        let p = params(GenerationType::Chord, 42);
        let pattern = generate(&p, 60, 100, 1, &LIBRARY);
        assert_eq!(pattern.length_steps, 64);
        assert_eq!(pattern.num_tracks, 4);
        for track in 0..4 {
            assert!(pattern.track_notes(track).count() >= 1, "track {track} is empty");
        }
        for n in &pattern.notes {
            assert!(n.note <= 127);
            assert!(n.track < 4);
            assert!(n.start_step < 64);
            assert!(n.end_step() <= 64);
            assert!(is_in_scale(n.note as i32, 0, ScaleMode::Major));
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        for kind in [GenerationType::Chord, GenerationType::Melody, GenerationType::Hybrid] {
            let p = GenerationParams { key: 5, mode: ScaleMode::Minor, bars: 8, ..params(kind, 1234) };
            assert_eq!(generate(&p, 57, 90, 3, &LIBRARY), generate(&p, 57, 90, 3, &LIBRARY));
        }
    }

    #[test]
    fn test_pattern_length_follows_bars() {
        for bars in [4, 8, 12, 16] {
            for kind in [GenerationType::Chord, GenerationType::Melody, GenerationType::Hybrid] {
                let p = GenerationParams { bars, ..params(kind, 77) };
                let pattern = generate(&p, 60, 100, 1, &LIBRARY);
                assert_eq!(pattern.length_steps, bars * 16);
                assert!(pattern.notes.iter().all(|n| n.start_step < bars * 16));
            }
        }
    }

    #[test]
    fn test_melody_leaps_are_bounded() {
        for seed in 0..200 {
            for kind in [GenerationType::Melody, GenerationType::Hybrid] {
                let p = GenerationParams { key: (seed % 12) as u8, melody_follow_chord_chance: 0.8, ..params(kind, seed) };
                let pattern = generate(&p, 30 + (seed % 70) as i32, 100, 1, &LIBRARY);
                let track = kind.melodic_track().unwrap_or(0);
                let melody: Vec<&MidiNote> = pattern.track_notes(track).collect();
                assert!(!melody.is_empty());
                assert!(melodic_leaps_ok(&melody), "seed {seed} {kind}");
            }
        }
    }

    #[test]
    fn test_melody_randomization_variance() {
        let mut hashes = HashSet::new();
        for seed in 1000..1100 {
            let p = GenerationParams { key: 2, genre: 10, velocity_sensitivity: 50, ..params(GenerationType::Melody, seed) };
            let pattern = generate(&p, 62, 100, 1, &LIBRARY);
            let mut hasher = DefaultHasher::new();
            pattern.hash(&mut hasher);
            hashes.insert(hasher.finish());
        }
        assert!(hashes.len() > 95, "only {} distinct patterns", hashes.len());
    }

    #[test]
    fn test_hybrid_layout() {
        let p = GenerationParams { melody_follow_chord_chance: 0.8, ..params(GenerationType::Hybrid, 9) };
        let pattern = generate(&p, 60, 100, 2, &LIBRARY);
        assert_eq!(pattern.num_tracks, 5);
        assert!(pattern.track_notes(4).count() > 0);
        assert!(pattern.notes.iter().all(|n| n.track <= 4 && n.channel == 2));

        // Chord notes come first, then the melody
        let first_melody = pattern.notes.iter().position(|n| n.track == 4).unwrap();
        assert!(pattern.notes[first_melody..].iter().all(|n| n.track == 4));
    }

    #[test]
    fn test_melody_notes_are_in_key() {
        let p = GenerationParams { key: 7, mode: ScaleMode::Minor, ..params(GenerationType::Melody, 3) };
        let pattern = generate(&p, 67, 100, 1, &LIBRARY);
        assert_eq!(pattern.num_tracks, 1);
        assert!(pattern.notes.iter().all(|n| n.track == 0));
        assert!(pattern.notes.iter().all(|n| is_in_scale(n.note as i32, 7, ScaleMode::Minor)));
    }

    #[test]
    fn test_velocity_blend() {
        assert_eq!(blend_velocity(40, 100, 0), 40);
        assert_eq!(blend_velocity(40, 100, 100), 100);
        assert_eq!(blend_velocity(40, 100, 50), 70);
        assert_eq!(blend_velocity(300, 127, 0), 127);
        assert_eq!(blend_velocity(-5, 1, 0), 1);

        // Fully sensitive chords just echo the input velocity
        let p = GenerationParams { velocity_sensitivity: 100, ..params(GenerationType::Chord, 5) };
        let pattern = generate(&p, 60, 33, 1, &LIBRARY);
        assert!(pattern.notes.iter().all(|n| n.velocity == 33));

        // Insensitive chords use the seed's base velocity: (5 + 13) mod 5 = 3
        let p = GenerationParams { velocity_sensitivity: 0, ..params(GenerationType::Chord, 5) };
        let pattern = generate(&p, 60, 33, 1, &LIBRARY);
        assert!(pattern.notes.iter().all(|n| n.velocity == 85));
    }

    #[test]
    fn test_inputs_are_clamped() {
        let pattern = generate(&params(GenerationType::Chord, 1), 400, 0, 99, &LIBRARY);
        assert!(pattern.notes.iter().all(|n| n.channel == 16 && n.note <= 127 && n.velocity >= 1));
    }

    #[test]
    fn test_limit_leap() {
        // Octave shift toward the previous note
        assert_eq!(limit_leap(84, 60, 0, ScaleMode::Major), 72);
        assert_eq!(limit_leap(40, 60, 0, ScaleMode::Major), 52);
        // Already close enough
        assert_eq!(limit_leap(67, 60, 0, ScaleMode::Major), 67);
        for prev in (0..128).filter(|&p| is_in_scale(p, 2, ScaleMode::Major)) {
            for pitch in (0..128).filter(|&p| is_in_scale(p, 2, ScaleMode::Major)) {
                let out = limit_leap(pitch, prev, 2, ScaleMode::Major) as i32;
                assert!((out - prev).abs() <= MAX_LEAP);
                assert!(is_in_scale(out, 2, ScaleMode::Major));
            }
        }
    }

    #[test]
    fn test_score() {
        assert_eq!(score(&GeneratedPattern::default(), GenerationType::Chord), -1.0);

        // 16 notes over 32 steps hits the melody target exactly, all steps
        let mut p = GeneratedPattern::new(32, 1);
        p.notes = (0..16).map(|i| MidiNote::new(60 + (i % 2) * 2, i as u32 * 2, 1, 100, 1, 0)).collect();
        assert!((score(&p, GenerationType::Melody) - 0.16).abs() < 1e-9);

        // A spike of 12 semitones costs (12 - 7) * 0.02 on each side
        p.notes[8].note = 74;
        p.notes[7].note = 62;
        p.notes[9].note = 62;
        assert!((score(&p, GenerationType::Melody) - (0.16 - 2.0 * 0.1)).abs() < 1e-9);

        // Notes sharing a step are not leaps
        let mut q = GeneratedPattern::new(16, 1);
        q.notes = vec![MidiNote::new(40, 0, 1, 100, 1, 0), MidiNote::new(90, 0, 1, 100, 1, 0)];
        let expected = 0.02 - 2.0 * (2.0 / 16.0 - 0.35f64).abs();
        assert!((score(&q, GenerationType::Chord) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_generate_best_keeps_highest_score() {
        let p = GenerationParams { melody_follow_chord_chance: 0.8, ..params(GenerationType::Hybrid, 500) };
        let best = generate_best(&p, 60, 100, 1, &LIBRARY, 10);
        assert!((500..510).contains(&best.seed));
        for seed in 500..510 {
            let candidate = generate(&p.with_seed(seed), 60, 100, 1, &LIBRARY);
            let s = score(&candidate, GenerationType::Hybrid);
            assert!(s <= best.score);
            if seed < best.seed {
                assert!(s < best.score, "earlier seed {seed} ties the winner");
            }
        }
        assert_eq!(best.pattern, generate(&p.with_seed(best.seed), 60, 100, 1, &LIBRARY));
    }

    #[test]
    fn test_generate_best_wraps_seeds() {
        let p = params(GenerationType::Melody, u32::MAX - 1);
        let best = generate_best(&p, 60, 100, 1, &LIBRARY, 4);
        assert!([u32::MAX - 1, u32::MAX, 0, 1].contains(&best.seed));

        let single = generate_best(&p, 60, 100, 1, &LIBRARY, 0);
        assert_eq!(single.seed, u32::MAX - 1);
    }
}
