//! Per-block engine: trigger detection, pattern swaps and event scheduling

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use motif_core::{
    sort_events, sounding_notes, swing_feel, BlockClock, GeneratedPattern, GenerationType, HostPosition,
    LoopCursor, MidiEvent, PatternSettings, Scheduler, TemplateLibrary, VoiceOptions,
};
use tracing::{info, trace};

use crate::config::EngineConfig;
use crate::import::ImportError;
use crate::pattern_cell::PatternCell;
use crate::slots::{SlotBank, SlotInfo, SlotVoice, SLOT_COUNT};
use crate::worker::{GenerationRequest, GenerationService, GenerationWorker, InlineGeneration, WorkerError};

/// State shared between the audio thread and the editor
pub struct EngineShared {
    pub library: Arc<TemplateLibrary>,
    pub cell: Arc<PatternCell>,
    pub slots: SlotBank,
    settings: Mutex<PatternSettings>,
    generate_requested: AtomicBool,
}

/// Editor-side access to a running engine
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<EngineShared>,
}

impl EngineHandle {
    /// Ask the engine to generate from the last played note on its next block
    pub fn trigger_generation(&self) {
        self.shared.generate_requested.store(true, Ordering::SeqCst);
    }

    /// Replace the current pattern with an edited one; playback keeps its phase
    pub fn commit_edited_pattern(&self, pattern: GeneratedPattern) -> u64 {
        let revision = self.shared.cell.commit_edited(pattern);
        info!(revision, "Edited pattern committed");
        revision
    }

    pub fn current_pattern(&self) -> Arc<GeneratedPattern> {
        self.shared.cell.pattern()
    }

    pub fn settings(&self) -> PatternSettings {
        match self.shared.settings.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_settings(&self, settings: PatternSettings) {
        let settings = settings.normalized();
        match self.shared.settings.lock() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }

    pub fn slot_info(&self, index: usize) -> SlotInfo {
        self.shared.slots.info(index)
    }

    pub fn import_slot(&self, index: usize, path: &Path) -> Result<SlotInfo, ImportError> {
        self.shared.slots.import_file(index, path, &self.shared.library)
    }

    pub fn import_slot_bytes(&self, index: usize, name: &str, bytes: &[u8]) -> Result<SlotInfo, ImportError> {
        self.shared.slots.import_bytes(index, name, bytes, &self.shared.library)
    }

    pub fn clear_slot(&self, index: usize) {
        self.shared.slots.clear(index);
    }

    pub fn library(&self) -> &TemplateLibrary {
        &self.shared.library
    }
}

/// The note (or chord) that last triggered generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Trigger {
    root: u8,
    velocity: u8,
    channel: u8,
}

impl Default for Trigger {
    fn default() -> Self {
        Self {
            root: 60,
            velocity: 100,
            channel: 1,
        }
    }
}

/// The real-time side of the engine. Owned by the audio thread.
pub struct MotifEngine {
    config: EngineConfig,
    shared: Arc<EngineShared>,
    generator: Box<dyn GenerationService>,
    scheduler: Scheduler,
    settings: PatternSettings,
    main_cursor: LoopCursor,
    current: Arc<GeneratedPattern>,
    current_revision: u64,
    gate_open: bool,
    slot_voices: [Option<SlotVoice>; SLOT_COUNT],
    last_trigger: Trigger,
    seed_counter: u32,
    internal_ppq: f64,
}

impl MotifEngine {
    /// Engine using the generation backend the config asks for
    pub fn new(config: EngineConfig, library: Arc<TemplateLibrary>) -> Result<Self, WorkerError> {
        let cell = Arc::new(PatternCell::new());
        let generator: Box<dyn GenerationService> = if config.worker.threaded {
            Box::new(GenerationWorker::spawn(library.clone(), cell.clone(), config.worker.queue_capacity)?)
        } else {
            Box::new(InlineGeneration::new(library.clone(), cell.clone()))
        };
        Ok(Self::with_service(config, library, cell, generator))
    }

    /// Engine that generates synchronously inside `process_block`
    pub fn inline(config: EngineConfig, library: Arc<TemplateLibrary>) -> Self {
        let cell = Arc::new(PatternCell::new());
        let generator = Box::new(InlineGeneration::new(library.clone(), cell.clone()));
        Self::with_service(config, library, cell, generator)
    }

    pub fn with_service(
        config: EngineConfig,
        library: Arc<TemplateLibrary>,
        cell: Arc<PatternCell>,
        generator: Box<dyn GenerationService>,
    ) -> Self {
        let settings = config.generation.initial.normalized();
        let snapshot = cell.snapshot();
        let shared = Arc::new(EngineShared {
            library,
            cell,
            slots: SlotBank::new(),
            settings: Mutex::new(settings),
            generate_requested: AtomicBool::new(false),
        });
        let scheduler = Scheduler::new(config.playback.jitter_seed, config.playback.jitter_ms);
        info!(
            threaded = config.worker.threaded,
            candidates = config.generation.candidates,
            "Motif engine created"
        );

        Self {
            config,
            shared,
            generator,
            scheduler,
            settings,
            main_cursor: LoopCursor::new(0),
            current: snapshot.pattern,
            current_revision: snapshot.revision,
            gate_open: false,
            slot_voices: Default::default(),
            last_trigger: Trigger::default(),
            seed_counter: 1,
            internal_ppq: 0.0,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether the main pattern is being played (after the first generation)
    pub fn is_gate_open(&self) -> bool {
        self.gate_open
    }

    pub fn is_slot_active(&self, index: usize) -> bool {
        self.slot_voices.get(index).is_some_and(Option::is_some)
    }

    /// Process one block and return its events, sorted by sample offset
    pub fn process_block(
        &mut self,
        position: HostPosition,
        sample_rate: f64,
        num_samples: u32,
        input: &[MidiEvent],
    ) -> Vec<MidiEvent> {
        let mut out = Vec::new();
        self.process_block_into(position, sample_rate, num_samples, input, &mut out);
        out
    }

    /// Same as [`MotifEngine::process_block`], appending to a caller-owned buffer
    pub fn process_block_into(
        &mut self,
        position: HostPosition,
        sample_rate: f64,
        num_samples: u32,
        input: &[MidiEvent],
        out: &mut Vec<MidiEvent>,
    ) {
        if !self.config.playback.supports_sample_rate(sample_rate) {
            trace!(sample_rate, "Unsupported sample rate, block skipped");
            return;
        }

        let bpm = position.tempo_or(self.config.playback.default_bpm);
        let ppq = position.ppq.filter(|p| p.is_finite()).unwrap_or(self.internal_ppq);
        let clock = BlockClock::at(ppq, bpm, sample_rate, num_samples);
        self.internal_ppq = clock.next_ppq();

        if let Ok(settings) = self.shared.settings.try_lock() {
            self.settings = *settings;
        }

        if self.shared.generate_requested.swap(false, Ordering::SeqCst) {
            let kind = self.settings.kind;
            let follow = if kind == GenerationType::Hybrid { self.config.generation.ui_follow_chance } else { 0.0 };
            self.request_generation(self.last_trigger, kind, follow, clock.start_step);
        }

        self.detect_trigger(input, clock.start_step);

        let first_new = out.len();
        self.observe_pattern(out);
        self.trigger_slots(input, clock.start_step, out);

        if self.gate_open {
            let voice = VoiceOptions {
                swing: swing_feel(self.settings.swing),
                humanize: self.config.playback.humanize,
                channel: None,
            };
            self.scheduler.schedule(&self.current, &mut self.main_cursor, &clock, &voice, out);
        }

        for slot in self.slot_voices.iter_mut() {
            let Some(voice) = slot else { continue };
            let options = VoiceOptions {
                swing: 0.0,
                humanize: self.config.playback.humanize,
                channel: Some(voice.channel),
            };
            self.scheduler.schedule(&voice.pattern, &mut voice.cursor, &clock, &options, out);
            if voice.is_expired(clock.start_step) {
                trace!(expiry = voice.expiry_step(), "Slot finished");
                *slot = None;
            }
        }

        sort_events(&mut out[first_new..]);
    }

    fn next_seed(&mut self) -> u32 {
        let seed = self.seed_counter;
        self.seed_counter = self.seed_counter.wrapping_add(1);
        seed
    }

    fn request_generation(&mut self, trigger: Trigger, kind: GenerationType, follow: f64, anchor_step: i64) {
        let seed = self.next_seed();
        let request = GenerationRequest {
            params: self.settings.params(kind, seed, follow),
            root: trigger.root,
            velocity: trigger.velocity,
            channel: trigger.channel,
            anchor_step,
            candidates: self.config.generation.candidates,
        };
        if self.generator.submit(request) {
            trace!(seed, root = trigger.root, %kind, anchor_step, "Generation requested");
        }
    }

    /// Note-ons in this block trigger generation. Enough near-simultaneous
    /// notes count as a chord and force hybrid mode from its lowest note.
    fn detect_trigger(&mut self, input: &[MidiEvent], anchor_step: i64) {
        let note_ons: Vec<&MidiEvent> = input.iter().filter(|e| e.is_note_on && e.velocity > 0).collect();
        let Some(first) = note_ons.first() else { return };

        let trigger_cfg = &self.config.trigger;
        let near = note_ons
            .iter()
            .filter(|e| e.sample_offset.abs_diff(first.sample_offset) <= trigger_cfg.chord_window_samples)
            .count();
        let is_chord = note_ons.len() >= trigger_cfg.chord_min_notes && near >= trigger_cfg.chord_min_notes;

        let (trigger, kind, follow) = if is_chord {
            let trigger = Trigger {
                root: note_ons.iter().map(|e| e.note).min().unwrap_or(first.note),
                velocity: note_ons.iter().map(|e| e.velocity).max().unwrap_or(first.velocity),
                channel: first.channel,
            };
            (trigger, GenerationType::Hybrid, self.config.generation.chord_follow_chance)
        } else {
            let trigger = Trigger {
                root: first.note,
                velocity: first.velocity,
                channel: first.channel,
            };
            (trigger, self.settings.kind, 0.0)
        };

        self.last_trigger = trigger;
        self.request_generation(trigger, kind, follow, anchor_step);
    }

    /// Pick up a newly committed pattern, releasing the old one's held notes
    fn observe_pattern(&mut self, out: &mut Vec<MidiEvent>) {
        let Some(snapshot) = self.shared.cell.try_snapshot() else { return };
        if snapshot.revision == self.current_revision {
            return;
        }

        if self.gate_open {
            let swing = swing_feel(self.settings.swing);
            let at = self.main_cursor.scheduled_to();
            out.extend(
                sounding_notes(&self.current, &self.main_cursor, at, swing)
                    .into_iter()
                    .map(|n| MidiEvent::note_off(n.note, n.channel, 0)),
            );
        }

        self.current = snapshot.pattern;
        self.current_revision = snapshot.revision;
        match snapshot.anchor_step {
            Some(anchor) => {
                self.main_cursor = LoopCursor::new(anchor);
                self.gate_open = true;
            }
            None => self.main_cursor = self.main_cursor.continued(),
        }
        trace!(revision = self.current_revision, anchor = ?snapshot.anchor_step, "Pattern swapped in");
    }

    /// Start slots whose trigger note was played. A retriggered slot first
    /// releases whatever its previous run still holds.
    fn trigger_slots(&mut self, input: &[MidiEvent], anchor_step: i64, out: &mut Vec<MidiEvent>) {
        let base = self.config.trigger.slot_base_note as usize;
        for e in input.iter().filter(|e| e.is_note_on && e.velocity > 0) {
            let Some(index) = (e.note as usize).checked_sub(base).filter(|i| *i < SLOT_COUNT) else {
                continue;
            };
            let Some(pattern) = self.shared.slots.try_pattern(index) else { continue };
            if let Some(old) = &self.slot_voices[index] {
                out.extend(
                    sounding_notes(&old.pattern, &old.cursor, old.cursor.scheduled_to(), 0.0)
                        .into_iter()
                        .map(|n| MidiEvent::note_off(n.note, old.channel, 0)),
                );
            }
            trace!(slot = index, channel = e.channel, anchor_step, "Slot triggered");
            self.slot_voices[index] = Some(SlotVoice::start(pattern, anchor_step, e.channel));
        }
    }
}
