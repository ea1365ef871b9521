//! Sample-accurate scheduling of looping patterns into audio blocks
//!
//! Patterns are loop-relative; a [`LoopCursor`] pins a pattern to an absolute
//! anchor step and remembers how far it has been emitted, so every note
//! occurrence is produced exactly once no matter how the host slices blocks.

use fastrand::Rng;
use serde::{Deserialize, Serialize};

use crate::pattern::{GeneratedPattern, MidiNote};
use crate::transport::{BlockClock, STEPS_PER_QUARTER};

/// Default humanization range, in milliseconds either side
pub const DEFAULT_JITTER_MS: f64 = 10.0;

/// Host positions this close behind the cursor still count as contiguous
const CONTIGUITY_EPSILON: f64 = 1e-6;

/// A scheduled note event inside the current block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiEvent {
    pub note: u8,
    pub velocity: u8,
    pub channel: u8,
    pub sample_offset: u32,
    pub is_note_on: bool,
}

impl MidiEvent {
    pub fn note_on(note: u8, velocity: u8, channel: u8, sample_offset: u32) -> Self {
        Self { note, velocity, channel, sample_offset, is_note_on: true }
    }

    pub fn note_off(note: u8, channel: u8, sample_offset: u32) -> Self {
        Self { note, velocity: 0, channel, sample_offset, is_note_on: false }
    }
}

/// Sort events by offset, note-offs first at equal offsets
pub fn sort_events(events: &mut [MidiEvent]) {
    events.sort_by_key(|e| (e.sample_offset, e.is_note_on));
}

/// Per-source playback options
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VoiceOptions {
    /// Fraction of a step odd steps are delayed by
    pub swing: f64,
    /// Randomize note-on timing
    pub humanize: bool,
    /// Send every event on this channel instead of the note's own
    pub channel: Option<u8>,
}

/// Where a pattern is anchored and how far it has been scheduled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopCursor {
    anchor_step: i64,
    one_shot: bool,
    scheduled_to: f64,
    /// Occurrences whose note-on falls earlier than this (ppq) are skipped
    first_onset: f64,
}

impl LoopCursor {
    /// Loop a pattern forever from `anchor_step`
    pub fn new(anchor_step: i64) -> Self {
        Self {
            anchor_step,
            one_shot: false,
            scheduled_to: anchor_step as f64 / STEPS_PER_QUARTER,
            first_onset: f64::NEG_INFINITY,
        }
    }

    /// Keep the anchor and position for a pattern swapped in under this
    /// cursor, skipping every occurrence that starts before the swap
    pub fn continued(&self) -> Self {
        Self {
            first_onset: self.scheduled_to,
            ..*self
        }
    }

    /// Play a pattern's first pass from `anchor_step`, then stop
    pub fn one_shot(anchor_step: i64) -> Self {
        Self { one_shot: true, ..Self::new(anchor_step) }
    }

    pub fn anchor_step(&self) -> i64 {
        self.anchor_step
    }

    pub fn is_one_shot(&self) -> bool {
        self.one_shot
    }

    /// Musical time (ppq) up to which events have been emitted
    pub fn scheduled_to(&self) -> f64 {
        self.scheduled_to
    }

    /// Step after which a one-shot of `pattern` has nothing left to emit
    pub fn expiry_step(&self, pattern: &GeneratedPattern) -> i64 {
        let span = pattern.length_steps.max(1).max(pattern.last_end_step());
        self.anchor_step + span as i64 + 1
    }

    /// The ppq window this block is responsible for.
    ///
    /// Resumes from the cursor when the host is contiguous with it (or at most
    /// one step ahead); otherwise the transport jumped and the window restarts
    /// at the block start.
    pub fn window(&self, clock: &BlockClock) -> (f64, f64) {
        let step = 1.0 / STEPS_PER_QUARTER;
        let resumes = self.scheduled_to <= clock.start_ppq + CONTIGUITY_EPSILON
            && clock.start_ppq - self.scheduled_to < step;
        let start = if resumes { self.scheduled_to } else { clock.start_ppq };
        (start, clock.end_ppq)
    }

    fn accepts(&self, occurrence: i64, on_step: i64, on_time: f64) -> bool {
        if on_time < self.first_onset {
            return false;
        }
        if self.one_shot {
            occurrence == 0
        } else {
            on_step >= self.anchor_step
        }
    }
}

/// Event time in ppq of an absolute step, with odd steps swung late
pub fn step_time(step: i64, swing: f64) -> f64 {
    let delay = if step.rem_euclid(2) == 1 { swing } else { 0.0 };
    (step as f64 + delay) / STEPS_PER_QUARTER
}

/// Absolute steps `base + k * period` whose swung time falls in `[start, end)`
fn steps_in_window(base: i64, period: i64, start: f64, end: f64, swing: f64) -> impl Iterator<Item = i64> {
    let first = ((start * STEPS_PER_QUARTER - swing).floor() as i64 - 1 - base).div_euclid(period);
    let last = ((end * STEPS_PER_QUARTER).ceil() as i64 - base).div_euclid(period) + 1;
    (first..=last).map(move |k| base + k * period).filter(move |&s| {
        let t = step_time(s, swing);
        t >= start && t < end
    })
}

/// Turns loop-relative patterns into sample-offset events
pub struct Scheduler {
    rng: Rng,
    jitter_ms: f64,
}

impl Scheduler {
    pub fn new(seed: u64, jitter_ms: f64) -> Self {
        Self {
            rng: Rng::with_seed(seed),
            jitter_ms: jitter_ms.max(0.0),
        }
    }

    /// Largest humanization offset in samples at a sample rate
    pub fn max_jitter_samples(&self, sample_rate: f64) -> i64 {
        (sample_rate * self.jitter_ms / 1000.0).round() as i64
    }

    /// Append this block's events for `pattern` to `out` and advance the cursor.
    ///
    /// Each occurrence `anchor + start + k * length` is emitted iff the cursor
    /// accepts it and its (swung) time lies in the cursor's window. Offsets are
    /// clamped into the block; only note-ons are humanized.
    pub fn schedule(
        &mut self,
        pattern: &GeneratedPattern,
        cursor: &mut LoopCursor,
        clock: &BlockClock,
        voice: &VoiceOptions,
        out: &mut Vec<MidiEvent>,
    ) {
        let (start, end) = cursor.window(clock);
        if start != cursor.scheduled_to {
            // Transport jumped; nothing from before a pattern swap is held
            cursor.first_onset = f64::NEG_INFINITY;
        }
        cursor.scheduled_to = end;
        if end <= start || clock.num_samples == 0 {
            return;
        }

        let first_new = out.len();
        let period = pattern.length_steps.max(1) as i64;
        let swing = voice.swing.max(0.0);
        let jitter = if voice.humanize { self.max_jitter_samples(clock.sample_rate) } else { 0 };

        for n in &pattern.notes {
            let channel = voice.channel.unwrap_or(n.channel);
            let base_on = cursor.anchor_step + n.start_step as i64;
            let length = n.length_steps.max(1) as i64;

            for on_step in steps_in_window(base_on, period, start, end, swing) {
                let on_time = step_time(on_step, swing);
                if !cursor.accepts((on_step - base_on) / period, on_step, on_time) {
                    continue;
                }
                let mut offset = clock.offset_of(on_time);
                if jitter > 0 {
                    offset += self.rng.i64(-jitter..=jitter);
                }
                out.push(MidiEvent::note_on(n.note, n.velocity, channel, clock.clamp_offset(offset)));
            }

            let base_off = base_on + length;
            for off_step in steps_in_window(base_off, period, start, end, swing) {
                let on_step = off_step - length;
                if !cursor.accepts((on_step - base_on) / period, on_step, step_time(on_step, swing)) {
                    continue;
                }
                let offset = clock.offset_of(step_time(off_step, swing));
                out.push(MidiEvent::note_off(n.note, channel, clock.clamp_offset(offset)));
            }
        }

        sort_events(&mut out[first_new..]);
    }
}

/// Notes of `pattern` that have been switched on but not yet off as of `ppq`.
/// One entry per sounding occurrence.
pub fn sounding_notes<'p>(
    pattern: &'p GeneratedPattern,
    cursor: &LoopCursor,
    ppq: f64,
    swing: f64,
) -> Vec<&'p MidiNote> {
    let period = pattern.length_steps.max(1) as i64;
    let now = ppq * STEPS_PER_QUARTER;

    let mut sounding = Vec::new();
    for n in &pattern.notes {
        let base_on = cursor.anchor_step + n.start_step as i64;
        let length = n.length_steps.max(1) as i64;
        let first = (now.floor() as i64 - length - 1 - base_on).div_euclid(period);
        let last = (now.ceil() as i64 - base_on).div_euclid(period);

        for k in first..=last {
            let on_step = base_on + k * period;
            let on_time = step_time(on_step, swing);
            if !cursor.accepts(k, on_step, on_time) {
                continue;
            }
            if on_time < ppq && step_time(on_step + length, swing) >= ppq {
                sounding.push(n);
            }
        }
    }
    sounding
}
