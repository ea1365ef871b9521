//! Engine configuration, loaded from `<config dir>/motif/config.toml`

use std::path::{Path, PathBuf};

use motif_core::{PatternSettings, DEFAULT_BPM, DEFAULT_JITTER_MS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Candidates generated per request; the best-scoring one is kept
    pub candidates: u32,
    /// Melody-follows-chord chance for editor-triggered hybrid patterns
    pub ui_follow_chance: f64,
    /// Melody-follows-chord chance when a played chord forces hybrid mode
    pub chord_follow_chance: f64,
    /// Settings the engine starts with
    pub initial: PatternSettings,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            candidates: 10,
            ui_follow_chance: 0.80,
            chord_follow_chance: 0.70,
            initial: PatternSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Note-ons needed to count as a played chord
    pub chord_min_notes: usize,
    /// Window after the first note-on in which chord notes must land
    pub chord_window_samples: u32,
    /// Note of slot 0; slots 1-3 follow chromatically
    pub slot_base_note: u8,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            chord_min_notes: 4,
            chord_window_samples: 64,
            slot_base_note: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Tempo used when the host reports none
    pub default_bpm: f64,
    pub humanize: bool,
    /// Humanization range either side, in milliseconds
    pub jitter_ms: f64,
    pub jitter_seed: u64,
    pub min_sample_rate: f64,
    pub max_sample_rate: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_bpm: DEFAULT_BPM,
            humanize: true,
            jitter_ms: DEFAULT_JITTER_MS,
            jitter_seed: 0x6d6f_7469_66,
            min_sample_rate: 44_100.0,
            max_sample_rate: 192_000.0,
        }
    }
}

impl PlaybackConfig {
    pub fn supports_sample_rate(&self, sample_rate: f64) -> bool {
        sample_rate >= self.min_sample_rate && sample_rate <= self.max_sample_rate
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Generate on a background thread (otherwise inline)
    pub threaded: bool,
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threaded: true,
            queue_capacity: 8,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&s, path)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("motif")
        .join("config.toml")
}

/// Load the user config, falling back to defaults when it is missing or invalid
pub fn load_config() -> EngineConfig {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> EngineConfig {
    if !path.exists() {
        debug!(path = %path.display(), "No config file, using defaults");
        return EngineConfig::default();
    }
    match EngineConfig::from_path(path) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Ignoring config file");
            EngineConfig::default()
        }
    }
}

pub fn save_config(config: &EngineConfig, path: &Path) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, config.to_toml_string()?).map_err(io_err)
}
