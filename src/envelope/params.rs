use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{MAX_SUSTAIN, MIN_ATTACK, MIN_DECAY, MIN_RELEASE};

/// Envelope settings as raw 8-bit magnitudes.
///
/// `attack`, `decay` and `release` are lengths in table steps; the real time each step takes is
/// derived from [`crate::EngineConfig`]. `sustain` is a level, with `MAX_SUSTAIN` meaning a
/// multiplier of 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeParameters {
    pub attack: u8,
    pub decay: u8,
    pub sustain: u8,
    pub release: u8,
}

impl Default for EnvelopeParameters {
    fn default() -> Self {
        Self {
            attack: MIN_ATTACK,
            decay: MIN_DECAY,
            sustain: MAX_SUSTAIN,
            release: MIN_RELEASE,
        }
    }
}

/// Which fields of a [`EnvelopeParameters::apply`] call were ignored for being too small.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamReport {
    pub attack_ignored: bool,
    pub decay_ignored: bool,
    pub release_ignored: bool,
}

impl ParamReport {
    pub fn all_applied(&self) -> bool {
        !(self.attack_ignored || self.decay_ignored || self.release_ignored)
    }
}

impl EnvelopeParameters {
    pub fn new(attack: u8, decay: u8, sustain: u8, release: u8) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }

    /// Apply new settings field by field. A duration below its minimum keeps the previous
    /// value; the remaining fields are still applied. Sustain is always accepted.
    pub fn apply(&mut self, attack: u8, decay: u8, sustain: u8, release: u8) -> ParamReport {
        let mut report = ParamReport::default();

        if attack >= MIN_ATTACK {
            self.attack = attack;
        } else {
            warn!(attack, kept = self.attack, "attack below minimum, ignored");
            report.attack_ignored = true;
        }
        if decay >= MIN_DECAY {
            self.decay = decay;
        } else {
            warn!(decay, kept = self.decay, "decay below minimum, ignored");
            report.decay_ignored = true;
        }
        if release >= MIN_RELEASE {
            self.release = release;
        } else {
            warn!(release, kept = self.release, "release below minimum, ignored");
            report.release_ignored = true;
        }
        self.sustain = sustain;

        debug!(
            attack = self.attack,
            decay = self.decay,
            sustain = self.sustain,
            release = self.release,
            "envelope parameters applied"
        );
        report
    }

    /// The sustain multiplier, in `0.0..=1.0`.
    pub fn sustain_level(&self) -> f32 {
        self.sustain as f32 / MAX_SUSTAIN as f32
    }

    /// Whether every duration is at or above its minimum.
    pub fn is_valid(&self) -> bool {
        self.attack >= MIN_ATTACK && self.decay >= MIN_DECAY && self.release >= MIN_RELEASE
    }
}
