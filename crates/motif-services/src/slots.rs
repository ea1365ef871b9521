//! Four one-shot slots filled from imported MIDI files

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use motif_core::{GeneratedPattern, LoopCursor, MatchResult, TemplateLibrary};
use serde::Serialize;
use tracing::info;

use crate::import::{read_midi_bytes, read_midi_file, ImportError, ImportedSequence};

pub const SLOT_COUNT: usize = 4;

/// What the editor shows for a slot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotInfo {
    pub label: String,
    /// Similarity to the matched template, only set when it matched
    pub score: Option<f64>,
}

impl SlotInfo {
    pub fn empty() -> Self {
        Self {
            label: "Empty".into(),
            score: None,
        }
    }

    /// Catalog label when matched, otherwise the source name
    pub fn from_match(result: &MatchResult, source_name: &str) -> Self {
        match result.label() {
            Some(label) => Self {
                label,
                score: Some(result.score),
            },
            None => Self {
                label: source_name.to_string(),
                score: None,
            },
        }
    }
}

impl Default for SlotInfo {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Clone)]
pub struct LoadedSlot {
    pub pattern: Arc<GeneratedPattern>,
    pub info: SlotInfo,
}

/// Slot contents shared between the editor (imports) and the audio thread
/// (triggers)
#[derive(Debug, Default)]
pub struct SlotBank {
    slots: Mutex<[Option<LoadedSlot>; SLOT_COUNT]>,
}

impl SlotBank {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, [Option<LoadedSlot>; SLOT_COUNT]> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_index(index: usize) -> Result<(), ImportError> {
        if index < SLOT_COUNT { Ok(()) } else { Err(ImportError::NoSuchSlot(index)) }
    }

    /// Put a pattern into a slot, replacing what was there
    pub fn load(&self, index: usize, pattern: GeneratedPattern, info: SlotInfo) -> Result<(), ImportError> {
        Self::check_index(index)?;
        info!(slot = index, label = %info.label, notes = pattern.notes.len(), "Slot loaded");
        self.lock()[index] = Some(LoadedSlot {
            pattern: Arc::new(pattern.normalized()),
            info,
        });
        Ok(())
    }

    /// Read a MIDI file, quantize it, match it against the catalog and store it
    pub fn import_file(&self, index: usize, path: &Path, library: &TemplateLibrary) -> Result<SlotInfo, ImportError> {
        Self::check_index(index)?;
        let sequence = read_midi_file(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.store_sequence(index, &sequence, &name, library)
    }

    /// Same as [`SlotBank::import_file`] for in-memory MIDI data
    pub fn import_bytes(
        &self,
        index: usize,
        name: &str,
        bytes: &[u8],
        library: &TemplateLibrary,
    ) -> Result<SlotInfo, ImportError> {
        Self::check_index(index)?;
        let sequence = read_midi_bytes(bytes)?;
        self.store_sequence(index, &sequence, name, library)
    }

    fn store_sequence(
        &self,
        index: usize,
        sequence: &ImportedSequence,
        name: &str,
        library: &TemplateLibrary,
    ) -> Result<SlotInfo, ImportError> {
        let result = library.match_sequence(&sequence.quantized());
        let info = SlotInfo::from_match(&result, name);
        info!(slot = index, matched = result.matched, score = result.score, "MIDI file matched");
        self.load(index, sequence.to_pattern(), info.clone())?;
        Ok(info)
    }

    pub fn clear(&self, index: usize) {
        if let Some(slot) = self.lock().get_mut(index) {
            *slot = None;
        }
    }

    pub fn info(&self, index: usize) -> SlotInfo {
        self.lock()
            .get(index)
            .and_then(|s| s.as_ref().map(|s| s.info.clone()))
            .unwrap_or_default()
    }

    pub fn is_loaded(&self, index: usize) -> bool {
        self.lock().get(index).is_some_and(Option::is_some)
    }

    /// Pattern in a slot, for the audio thread. `None` when the slot is empty,
    /// out of range, or being written right now.
    pub fn try_pattern(&self, index: usize) -> Option<Arc<GeneratedPattern>> {
        let guard = self.slots.try_lock().ok()?;
        guard.get(index)?.as_ref().map(|s| s.pattern.clone())
    }
}

/// A triggered slot playing its pattern once
#[derive(Debug, Clone)]
pub struct SlotVoice {
    pub pattern: Arc<GeneratedPattern>,
    pub cursor: LoopCursor,
    pub channel: u8,
    expiry_step: i64,
}

impl SlotVoice {
    pub fn start(pattern: Arc<GeneratedPattern>, anchor_step: i64, channel: u8) -> Self {
        let cursor = LoopCursor::one_shot(anchor_step);
        let expiry_step = cursor.expiry_step(&pattern);
        Self {
            pattern,
            cursor,
            channel: channel.clamp(1, 16),
            expiry_step,
        }
    }

    /// Whether the one-shot has finished by a block starting at `block_start_step`
    pub fn is_expired(&self, block_start_step: i64) -> bool {
        block_start_step > self.expiry_step
    }

    pub fn expiry_step(&self) -> i64 {
        self.expiry_step
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use motif_core::{MidiNote, TemplateKind};

    use super::*;
    use crate::import::tests::smf_bytes;

    static LIBRARY: LazyLock<TemplateLibrary> = LazyLock::new(TemplateLibrary::builtin);

    /// Write a catalog template back out as MIDI at 960 tpq
    fn template_as_midi(kind: TemplateKind, index: usize) -> Vec<u8> {
        let tpl = LIBRARY.template(kind, index);
        let mut events: Vec<(u64, u8, u8)> = Vec::new();
        for n in &tpl.notes {
            events.push((n.start_step as u64 * 240, n.note, n.velocity));
            events.push(((n.start_step + n.length_steps) as u64 * 240, n.note, 0));
        }
        // Offs before ons at the same tick
        events.sort_by_key(|&(tick, _, vel)| (tick, vel != 0));

        let mut last = 0;
        let track = events
            .into_iter()
            .map(|(tick, note, vel)| {
                let delta = (tick - last) as u32;
                last = tick;
                (delta, 0, note, vel)
            })
            .collect();
        smf_bytes(960, &[track], true)
    }

    #[test]
    fn test_empty_slots() {
        let bank = SlotBank::new();
        for i in 0..SLOT_COUNT {
            assert!(!bank.is_loaded(i));
            assert_eq!(bank.info(i), SlotInfo::empty());
            assert!(bank.try_pattern(i).is_none());
        }
        assert_eq!(bank.info(9).label, "Empty");
    }

    #[test]
    fn test_import_matching_template() {
        let bank = SlotBank::new();
        let bytes = template_as_midi(TemplateKind::Chord, 12);
        let info = bank.import_bytes(2, "progression.mid", &bytes, &LIBRARY).unwrap();
        assert!(info.label.starts_with("Matched Chords "), "{}", info.label);
        assert!(info.score.is_some_and(|s| s >= 0.85));
        assert_eq!(bank.info(2), info);

        let pattern = bank.try_pattern(2).unwrap();
        assert_eq!(pattern.length_steps, LIBRARY.template(TemplateKind::Chord, 12).length_steps);
        assert!(pattern.notes.iter().all(|n| n.channel == 1 && n.track == 0));
    }

    #[test]
    fn test_import_unmatched_uses_file_name() {
        let bank = SlotBank::new();
        // A lone chromatic cluster matches nothing well
        let bytes = smf_bytes(
            480,
            &[vec![(0, 0, 61, 100), (0, 0, 66, 100), (0, 0, 70, 100), (1000, 0, 61, 0), (0, 0, 66, 0), (0, 0, 70, 0)]],
            true,
        );
        let info = bank.import_bytes(0, "cluster.mid", &bytes, &LIBRARY).unwrap();
        assert_eq!(info.label, "cluster.mid");
        assert_eq!(info.score, None);
        assert!(bank.is_loaded(0));
    }

    #[test]
    fn test_invalid_slot_and_bad_file() {
        let bank = SlotBank::new();
        assert!(matches!(
            bank.import_bytes(4, "x.mid", b"junk", &LIBRARY),
            Err(ImportError::NoSuchSlot(4))
        ));
        assert!(matches!(bank.import_bytes(1, "x.mid", b"junk", &LIBRARY), Err(ImportError::Parse(_))));
        assert!(!bank.is_loaded(1));
    }

    #[test]
    fn test_clear_and_load() {
        let bank = SlotBank::new();
        bank.load(3, GeneratedPattern::new(8, 0), SlotInfo::from_match(&MatchResult::default(), "a.mid"))
            .unwrap();
        assert_eq!(bank.try_pattern(3).unwrap().length_steps, 16);
        bank.clear(3);
        assert!(!bank.is_loaded(3));
    }

    #[test]
    fn test_slot_voice_expiry() {
        let mut p = GeneratedPattern::new(16, 1);
        p.notes.push(MidiNote::new(60, 14, 6, 100, 1, 0));
        let voice = SlotVoice::start(Arc::new(p), 100, 0);
        assert_eq!(voice.channel, 1);
        // The last note ends at step 20, past the loop length
        assert_eq!(voice.expiry_step(), 121);
        assert!(!voice.is_expired(121));
        assert!(voice.is_expired(122));
    }
}
