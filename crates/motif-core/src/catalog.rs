//! Builtin template catalog
//!
//! Every template is authored in MIDI ticks from a fixed per-template seed and
//! then quantized exactly like an imported file, so the catalog is stable
//! across runs and platforms.

use fastrand::Rng;

use crate::template::{TemplateSequence, TickNote, DEFAULT_TICKS_PER_QUARTER};

/// Number of builtin chord progression templates
pub const CHORD_TEMPLATE_COUNT: usize = 300;
/// Number of builtin melody one-shot templates
pub const MELODY_TEMPLATE_COUNT: usize = 200;

const CHORD_SEED_BASE: u64 = 1000;
const MELODY_SEED_BASE: u64 = 5000;

const TPQ: u64 = DEFAULT_TICKS_PER_QUARTER as u64;
const TICKS_PER_STEP: u64 = TPQ / 4;

/// I - V - vi - IV root motion, as pitch-class offsets
const PROGRESSION: [u8; 4] = [0, 7, 9, 5];

/// Natural minor, the tonal palette of the melody one-shots
const MELODY_SCALE: [u8; 7] = [0, 2, 3, 5, 7, 8, 10];

/// All builtin chord templates, in catalog order
pub fn chord_templates() -> Vec<TemplateSequence> {
    (0..CHORD_TEMPLATE_COUNT)
        .map(|i| {
            let bars = 4 + (i % 5) as u64;
            let notes = author_chord_progression(CHORD_SEED_BASE + i as u64, bars);
            TemplateSequence::from_tick_notes(&notes, DEFAULT_TICKS_PER_QUARTER)
        })
        .collect()
}

/// All builtin melody templates, in catalog order
pub fn melody_templates() -> Vec<TemplateSequence> {
    (0..MELODY_TEMPLATE_COUNT)
        .map(|i| {
            let bars = 1 + (i % 4) as u64;
            let notes = author_melody_shot(MELODY_SEED_BASE + i as u64, bars);
            TemplateSequence::from_tick_notes(&notes, DEFAULT_TICKS_PER_QUARTER)
        })
        .collect()
}

/// Chord roots on the beat, two bars per chord. Beats 2 and 4 are
/// skipped a little over half the time.
fn author_chord_progression(seed: u64, bars: u64) -> Vec<TickNote> {
    let mut rng = Rng::with_seed(seed);
    let total_ticks = bars * 4 * TPQ;
    let base = [36u8, 48, 60][rng.usize(..3)];

    let mut notes = Vec::with_capacity((bars * 4) as usize);
    for bar in 0..bars {
        let chord_root = base + PROGRESSION[((bar / 2) % 4) as usize];
        for beat in 0..4u64 {
            if (beat == 1 || beat == 3) && rng.f64() < 0.55 {
                continue;
            }
            let start = (bar * 4 + beat) * TPQ;
            let duration = [TPQ, TPQ * 2, TPQ / 2][rng.usize(..3)]
                .min(total_ticks - start - TICKS_PER_STEP);
            notes.push(TickNote {
                note: chord_root,
                velocity: rng.u8(60..105),
                start_tick: start,
                end_tick: start + duration,
            });
        }
    }
    notes
}

/// A stepwise walk through natural minor with occasional octave leaps
fn author_melody_shot(seed: u64, bars: u64) -> Vec<TickNote> {
    let mut rng = Rng::with_seed(seed);
    let total_ticks = bars * 4 * TPQ;
    let base = if rng.bool() { 60i32 } else { 72 };

    let mut notes = Vec::new();
    let mut t = 0u64;
    let mut last_note = base + MELODY_SCALE[rng.usize(..MELODY_SCALE.len())] as i32;

    while t < total_ticks {
        let step = rng.i32(-2..=2);
        let degree = MELODY_SCALE
            .iter()
            .position(|&d| d as i32 == (last_note - base).rem_euclid(12))
            .unwrap_or(0) as i32;
        let idx = (degree + step).rem_euclid(MELODY_SCALE.len() as i32) as usize;
        let octave = if rng.f64() < 0.2 { [-12, 0, 12][rng.usize(..3)] } else { 0 };
        let note = (base + MELODY_SCALE[idx] as i32 + octave).clamp(36, 96);

        let duration = [TPQ / 4, TPQ / 2, TPQ][rng.usize(..3)];
        notes.push(TickNote {
            note: note as u8,
            velocity: rng.u8(55..110),
            start_tick: t,
            end_tick: t + duration,
        });

        t += [TPQ / 4, TPQ / 2, TPQ / 8][rng.usize(..3)];
        last_note = note;
    }
    notes
}
