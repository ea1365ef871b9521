//! Standard MIDI file import for one-shot slots

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use midly::{MidiMessage, Smf, Timing, TrackEventKind};
use motif_core::template::DEFAULT_TICKS_PER_QUARTER;
use motif_core::{GeneratedPattern, MidiNote, TemplateSequence, TickNote};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to read MIDI file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse MIDI data: {0}")]
    Parse(#[from] midly::Error),
    #[error("No slot {0}")]
    NoSuchSlot(usize),
}

/// Notes of one imported track, in ticks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedSequence {
    /// Notes ordered by start tick
    pub notes: Vec<TickNote>,
    pub ticks_per_quarter: u32,
}

impl ImportedSequence {
    pub fn quantized(&self) -> TemplateSequence {
        TemplateSequence::from_tick_notes(&self.notes, self.ticks_per_quarter)
    }

    pub fn to_pattern(&self) -> GeneratedPattern {
        sequence_to_pattern(&self.notes, self.ticks_per_quarter)
    }
}

pub fn read_midi_file(path: &Path) -> Result<ImportedSequence, ImportError> {
    let data = std::fs::read(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_midi_bytes(&data)
}

/// Parse a standard MIDI file and extract the first track that has notes.
///
/// Note-ons are paired with note-offs first-in first-out per (channel, key);
/// a note-on with velocity 0 counts as a note-off. Notes still held when the
/// track ends are closed at its last event. Timecode-based files are read as
/// if they had 960 ticks per quarter.
pub fn read_midi_bytes(bytes: &[u8]) -> Result<ImportedSequence, ImportError> {
    let smf = Smf::parse(bytes)?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(tpq) if tpq.as_int() > 0 => tpq.as_int() as u32,
        _ => DEFAULT_TICKS_PER_QUARTER,
    };

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut held: HashMap<(u8, u8), VecDeque<(u64, u8)>> = HashMap::new();
        let mut notes = Vec::new();
        let mut tick = 0u64;

        for event in track {
            tick += event.delta.as_int() as u64;
            let TrackEventKind::Midi { channel, message } = event.kind else { continue };
            let ch = channel.as_int();

            let (key, on_velocity) = match message {
                MidiMessage::NoteOn { key, vel } => (key.as_int(), vel.as_int()),
                MidiMessage::NoteOff { key, .. } => (key.as_int(), 0),
                _ => continue,
            };

            if on_velocity > 0 {
                held.entry((ch, key)).or_default().push_back((tick, on_velocity));
            } else if let Some((start_tick, velocity)) = held.get_mut(&(ch, key)).and_then(VecDeque::pop_front) {
                notes.push(TickNote { note: key, velocity, start_tick, end_tick: tick });
            }
        }

        for ((_, key), queue) in held {
            for (start_tick, velocity) in queue {
                notes.push(TickNote { note: key, velocity, start_tick, end_tick: tick });
            }
        }

        if !notes.is_empty() {
            notes.sort_by_key(|n| (n.start_tick, n.note));
            debug!(track = track_idx, notes = notes.len(), ticks_per_quarter, "MIDI track imported");
            return Ok(ImportedSequence { notes, ticks_per_quarter });
        }
    }

    Ok(ImportedSequence {
        notes: Vec::new(),
        ticks_per_quarter,
    })
}

/// Quantize tick notes into a single-track pattern on channel 1
pub fn sequence_to_pattern(notes: &[TickNote], ticks_per_quarter: u32) -> GeneratedPattern {
    let seq = TemplateSequence::from_tick_notes(notes, ticks_per_quarter);
    let mut pattern = GeneratedPattern::new(seq.length_steps, 1);
    pattern.notes = seq
        .notes
        .iter()
        .map(|n| MidiNote::new(n.note as i32, n.start_step, n.length_steps, n.velocity as i32, 1, 0))
        .collect();
    pattern
}
