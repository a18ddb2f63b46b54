//! A table-driven ADSR envelope engine for sample-clocked polyphonic synthesizers.
//!
//! The engine precomputes a multiplier curve whenever the envelope parameters change, then
//! advances every sounding note along that curve once per output sample:
//!
//! ```plaintext
//! 1.0 |    *
//!     |   /:\
//!     |  / : \
//!   s |-/--:--*.................*       note_off jumps from the held step
//!     |/   :  :                  \      to the release segment
//!   0 *----+--+---|--------------|*---+--> step
//!     0    a a+d  a+d+1   ...   a+d+r
//!     attack decay  release segment        sustain holds step a+d
//! ```
//!
//! The audio path calls [`EnvelopeEngine::tick`] once per sample and then
//! [`EnvelopeEngine::get_multiplier`] once per sounding note. Note events and reconfiguration
//! come from a slower context; see [`control`] for running the two sides on different threads.

pub mod control;
pub mod engine;
pub mod envelope;
mod error;
pub mod note;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use engine::EnvelopeEngine;
pub use envelope::{params::EnvelopeParameters, Phase};
pub use error::{ConfigError, ControlError, NoteOutOfRange};
pub use note::NoteNumber;

/// Longest attack, in table steps.
pub const MAX_ATTACK: u8 = 255;
/// Longest decay, in table steps.
pub const MAX_DECAY: u8 = 255;
/// Longest release, in table steps.
pub const MAX_RELEASE: u8 = 255;
/// Sustain value that maps to a multiplier of 1.
pub const MAX_SUSTAIN: u8 = 255;

pub const MIN_ATTACK: u8 = 1;
pub const MIN_DECAY: u8 = 1;
pub const MIN_RELEASE: u8 = 1;

/// Lowest playable note (A0).
pub const NOTE_MIN: u8 = 21;
/// Highest playable note (C8).
pub const NOTE_MAX: u8 = 108;
pub const NOTE_COUNT: usize = (NOTE_MAX - NOTE_MIN) as usize + 1;

/// Default limit on notes releasing at once.
pub const RELEASE_QUEUE_CAPACITY: usize = MAX_RELEASE as usize;

/// Number of entries in a [`envelope::table::MultiplierTable`].
pub const TABLE_CAPACITY: usize =
    MAX_ATTACK as usize + 1 + MAX_DECAY as usize + 1 + MAX_RELEASE as usize;

/// Platform settings: how fast the sample clock runs, how long each phase lasts at its maximum
/// parameter value, and how many notes may release at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// The rate at which [`EnvelopeEngine::tick`] is called, in Hz.
    pub sample_rate_hz: u32,
    /// Real duration of the attack phase when `attack == MAX_ATTACK`, in milliseconds.
    pub attack_max_ms: u32,
    /// Real duration of the decay phase when `decay == MAX_DECAY`, in milliseconds.
    pub decay_max_ms: u32,
    /// Real duration of the release phase when `release == MAX_RELEASE`, in milliseconds.
    pub release_max_ms: u32,
    /// Releasing notes beyond this many cut off the oldest release.
    pub release_queue_capacity: usize,
    /// Parameters applied when the engine is created.
    pub initial: EnvelopeParameters,
}

pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 48_000;
pub const DEFAULT_ATTACK_MAX_MS: u32 = 2_000;
pub const DEFAULT_DECAY_MAX_MS: u32 = 2_000;
pub const DEFAULT_RELEASE_MAX_MS: u32 = 4_000;

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            attack_max_ms: DEFAULT_ATTACK_MAX_MS,
            decay_max_ms: DEFAULT_DECAY_MAX_MS,
            release_max_ms: DEFAULT_RELEASE_MAX_MS,
            release_queue_capacity: RELEASE_QUEUE_CAPACITY,
            initial: EnvelopeParameters::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a YAML document. Fields that are absent keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::info!("loading engine configuration from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }
}
