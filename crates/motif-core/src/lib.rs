//! motif-core: Domain types and algorithms for the motif pattern engine

mod catalog;
mod error;
pub mod generator;
pub mod library;
pub mod params;
pub mod pattern;
pub mod scale;
pub mod scheduler;
pub mod template;
mod transport;

pub use catalog::{CHORD_TEMPLATE_COUNT, MELODY_TEMPLATE_COUNT};
pub use error::{MotifError, Result};
pub use generator::{blend_velocity, generate, generate_best, score, ScoredPattern, MAX_LEAP};
pub use library::{MatchResult, TemplateLibrary, TemplateRef, MATCH_THRESHOLD};
pub use params::{swing_feel, BarLength, GenerationParams, GenerationType, PatternSettings, GENRES, KEYS};
pub use pattern::{round_up_to_bar, GeneratedPattern, MidiNote, MAX_PATTERN_STEPS, MAX_TRACKS, STEPS_PER_BAR};
pub use scale::{is_in_scale, snap_to_scale, ChordQuality, ScaleMode};
pub use scheduler::{
    sort_events, sounding_notes, step_time, LoopCursor, MidiEvent, Scheduler, VoiceOptions, DEFAULT_JITTER_MS,
};
pub use template::{similarity, FeatureVector, TemplateKind, TemplateNote, TemplateSequence, TickNote};
pub use transport::{BlockClock, HostPosition, DEFAULT_BPM};
