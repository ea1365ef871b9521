//! Host transport position and per-block timing

use serde::{Deserialize, Serialize};

/// Tempo assumed when the host does not report one
pub const DEFAULT_BPM: f64 = 120.0;

/// Steps per quarter note
pub const STEPS_PER_QUARTER: f64 = 4.0;

/// What the host reports about the current block. Either field may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HostPosition {
    /// Tempo in BPM
    pub bpm: Option<f64>,
    /// Block start in quarter notes since the song start
    pub ppq: Option<f64>,
}

impl HostPosition {
    pub fn new(bpm: f64, ppq: f64) -> Self {
        Self {
            bpm: Some(bpm),
            ppq: Some(ppq),
        }
    }

    /// Host tempo if it is usable, otherwise `fallback`
    pub fn tempo_or(&self, fallback: f64) -> f64 {
        self.bpm.filter(|b| b.is_finite() && *b > 0.0).unwrap_or(fallback)
    }
}

/// Timing of one audio block in musical time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockClock {
    pub sample_rate: f64,
    pub num_samples: u32,
    pub bpm: f64,
    pub samples_per_quarter: f64,
    /// Block start in quarter notes
    pub start_ppq: f64,
    /// Block end (exclusive) in quarter notes
    pub end_ppq: f64,
    /// Step containing the block start
    pub start_step: i64,
}

impl BlockClock {
    /// Clock for a block at `position`. A missing tempo uses [`DEFAULT_BPM`],
    /// a missing position starts at 0.
    pub fn new(position: HostPosition, sample_rate: f64, num_samples: u32) -> Self {
        let bpm = position.tempo_or(DEFAULT_BPM);
        let start_ppq = position.ppq.filter(|p| p.is_finite()).unwrap_or(0.0);
        Self::at(start_ppq, bpm, sample_rate, num_samples)
    }

    /// Clock for a block starting at `start_ppq` at a known tempo
    pub fn at(start_ppq: f64, bpm: f64, sample_rate: f64, num_samples: u32) -> Self {
        let samples_per_quarter = sample_rate * 60.0 / bpm;
        Self {
            sample_rate,
            num_samples,
            bpm,
            samples_per_quarter,
            start_ppq,
            end_ppq: start_ppq + num_samples as f64 / samples_per_quarter,
            start_step: (start_ppq * STEPS_PER_QUARTER).floor() as i64,
        }
    }

    /// Length of the block in quarter notes
    pub fn duration_ppq(&self) -> f64 {
        self.end_ppq - self.start_ppq
    }

    /// Sample offset of a musical time, relative to the block start (unclamped)
    pub fn offset_of(&self, ppq: f64) -> i64 {
        ((ppq - self.start_ppq) * self.samples_per_quarter).round() as i64
    }

    /// Clamp an offset into the block
    pub fn clamp_offset(&self, offset: i64) -> u32 {
        offset.clamp(0, self.num_samples.saturating_sub(1) as i64) as u32
    }

    /// Position of the next block when the host reports none
    pub fn next_ppq(&self) -> f64 {
        self.end_ppq
    }
}
