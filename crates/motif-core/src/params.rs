//! User-facing generation parameters

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pattern::STEPS_PER_BAR;
use crate::scale::ScaleMode;

/// Genre names, indexed by the genre parameter
pub const GENRES: [&str; 32] = [
    "House",
    "Deep House",
    "Tech House",
    "Progressive House",
    "Future House",
    "Bass House",
    "Electro House",
    "Big Room",
    "Techno",
    "Melodic Techno",
    "Minimal",
    "Trance",
    "Progressive Trance",
    "Hardstyle",
    "Dubstep",
    "Future Bass",
    "Drum & Bass",
    "Liquid DnB",
    "Garage",
    "UK Bass",
    "Trap",
    "Hip Hop",
    "R&B",
    "Pop",
    "Synthwave",
    "Disco",
    "Funk",
    "Ambient",
    "Lo-Fi",
    "EDM",
    "Tropical House",
    "Afro House",
];

/// Key names, indexed by pitch class
pub const KEYS: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// What the generator produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationType {
    /// Four-voice seventh chords on tracks 0-3
    #[default]
    Chord,
    /// A single melodic line on track 0
    Melody,
    /// Chords on tracks 0-3 plus a melody on track 4
    Hybrid,
}

impl GenerationType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Chord => "chord",
            Self::Melody => "melody",
            Self::Hybrid => "hybrid",
        }
    }

    /// Type from a choice index; out-of-range indices clamp to hybrid
    pub fn from_index(index: u8) -> Self {
        match index {
            0 => Self::Chord,
            1 => Self::Melody,
            _ => Self::Hybrid,
        }
    }

    /// Track carrying the melodic line, if the type has one
    pub fn melodic_track(&self) -> Option<u8> {
        match self {
            Self::Chord => None,
            Self::Melody => Some(0),
            Self::Hybrid => Some(4),
        }
    }
}

impl fmt::Display for GenerationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for GenerationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chord" | "chords" => Ok(Self::Chord),
            "melody" => Ok(Self::Melody),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown generation type '{other}'")),
        }
    }
}

/// Pattern length choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarLength {
    #[default]
    Four,
    Eight,
    Twelve,
    Sixteen,
}

impl BarLength {
    pub fn bars(&self) -> u32 {
        match self {
            Self::Four => 4,
            Self::Eight => 8,
            Self::Twelve => 12,
            Self::Sixteen => 16,
        }
    }

    /// Nearest supported length, rounding down (anything under 8 is 4 bars)
    pub fn from_bars(bars: u32) -> Self {
        match bars {
            0..=7 => Self::Four,
            8..=11 => Self::Eight,
            12..=15 => Self::Twelve,
            _ => Self::Sixteen,
        }
    }

    pub fn steps(&self) -> u32 {
        self.bars() * STEPS_PER_BAR
    }
}

/// Quantize the 0-50 swing parameter to one of three feels,
/// returned as the fraction of a step odd steps are delayed by
pub fn swing_feel(swing: u8) -> f64 {
    match swing {
        0..17 => 0.0,
        17..34 => 0.15,
        _ => 0.30,
    }
}

/// The editor-facing musical settings shared between UI and engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSettings {
    /// Genre index (0-31)
    pub genre: u8,
    /// Key pitch class (0-11, 0 = C)
    pub key: u8,
    pub mode: ScaleMode,
    pub bars: BarLength,
    pub kind: GenerationType,
    /// How much the input velocity drives output velocity (0-100)
    pub velocity_sensitivity: u8,
    /// Swing amount (0-50)
    pub swing: u8,
}

impl Default for PatternSettings {
    fn default() -> Self {
        Self {
            genre: 0,
            key: 0,
            mode: ScaleMode::Major,
            bars: BarLength::Four,
            kind: GenerationType::Chord,
            velocity_sensitivity: 50,
            swing: 0,
        }
    }
}

impl PatternSettings {
    pub fn normalized(mut self) -> Self {
        self.genre = self.genre.min(GENRES.len() as u8 - 1);
        self.key = self.key.min(11);
        self.velocity_sensitivity = self.velocity_sensitivity.min(100);
        self.swing = self.swing.min(50);
        self
    }

    pub fn genre_name(&self) -> &'static str {
        GENRES[(self.genre as usize).min(GENRES.len() - 1)]
    }

    pub fn key_name(&self) -> &'static str {
        KEYS[(self.key as usize) % 12]
    }

    /// Generation parameters for one request
    pub fn params(&self, kind: GenerationType, seed: u32, melody_follow_chord_chance: f64) -> GenerationParams {
        GenerationParams {
            genre: self.genre,
            key: self.key,
            mode: self.mode,
            bars: self.bars.bars(),
            kind,
            velocity_sensitivity: self.velocity_sensitivity,
            swing: self.swing,
            seed,
            melody_follow_chord_chance,
        }
        .normalized()
    }
}

/// Everything the generator needs besides the trigger note
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub genre: u8,
    pub key: u8,
    pub mode: ScaleMode,
    /// Pattern length in bars (4, 8, 12 or 16)
    pub bars: u32,
    pub kind: GenerationType,
    pub velocity_sensitivity: u8,
    pub swing: u8,
    pub seed: u32,
    /// Probability (0-1) that a hybrid melody note is replaced by a chord tone
    pub melody_follow_chord_chance: f64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        PatternSettings::default().params(GenerationType::Chord, 0, 0.0)
    }
}

impl GenerationParams {
    /// Clamp every field into its valid range
    pub fn normalized(mut self) -> Self {
        self.genre = self.genre.min(GENRES.len() as u8 - 1);
        self.key = self.key.min(11);
        self.bars = BarLength::from_bars(self.bars).bars();
        self.velocity_sensitivity = self.velocity_sensitivity.min(100);
        self.swing = self.swing.min(50);
        self.melody_follow_chord_chance = if self.melody_follow_chord_chance.is_nan() {
            0.0
        } else {
            self.melody_follow_chord_chance.clamp(0.0, 1.0)
        };
        self
    }

    pub fn total_steps(&self) -> u32 {
        self.bars * STEPS_PER_BAR
    }

    /// Same request with another seed
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }
}
