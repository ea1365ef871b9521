//! motif-services: Real-time engine, generation worker, slots and configuration

pub mod config;
pub mod engine;
pub mod import;
pub mod pattern_cell;
pub mod slots;
pub mod worker;

pub use config::{
    config_path, load_config, load_config_from, save_config, ConfigError, EngineConfig, GenerationConfig,
    PlaybackConfig, TriggerConfig, WorkerConfig,
};
pub use engine::{EngineHandle, EngineShared, MotifEngine};
pub use import::{read_midi_bytes, read_midi_file, sequence_to_pattern, ImportError, ImportedSequence};
pub use pattern_cell::{PatternCell, PatternSnapshot};
pub use slots::{LoadedSlot, SlotBank, SlotInfo, SlotVoice, SLOT_COUNT};
pub use worker::{GenerationRequest, GenerationService, GenerationWorker, InlineGeneration, WorkerError};
