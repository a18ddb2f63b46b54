//! The precomputed multiplier curve.
//!
//! Layout for parameters `a`, `d`, `r` and sustain level `s`:
//!
//! ```plaintext
//! step:   0 ..= a       a+1 ..= a+d        a+d+1 ..= a+d+r      rest
//! value:  0 -> 1        1 -> s             s -> 0               0
//!         attack        decay              release
//! ```
//!
//! Step `a` is the peak shared by attack and decay, step `a+d` is the sustain step.

use super::{params::EnvelopeParameters, Phase};
use crate::{
    EngineConfig, MAX_ATTACK, MAX_DECAY, MAX_RELEASE, MIN_ATTACK, MIN_DECAY, MIN_RELEASE,
    TABLE_CAPACITY,
};

/// Number of samples each phase spans at the current parameters. Used as the divisor when
/// turning elapsed samples into table steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeScales {
    pub attack: u64,
    pub decay: u64,
    pub release: u64,
}

fn time_scale(sample_rate_hz: u32, max_ms: u32, value: u8, max_value: u8) -> u64 {
    let samples = (sample_rate_hz as u64)
        .saturating_mul(max_ms as u64)
        .saturating_mul(value as u64);
    (samples / (1000 * max_value as u64)).max(1)
}

impl TimeScales {
    pub fn new(params: &EnvelopeParameters, clock: &EngineConfig) -> Self {
        Self {
            attack: time_scale(
                clock.sample_rate_hz,
                clock.attack_max_ms,
                params.attack,
                MAX_ATTACK,
            ),
            decay: time_scale(clock.sample_rate_hz, clock.decay_max_ms, params.decay, MAX_DECAY),
            release: time_scale(
                clock.sample_rate_hz,
                clock.release_max_ms,
                params.release,
                MAX_RELEASE,
            ),
        }
    }
}

/// A complete envelope curve together with the parameters and time scales it was built from.
///
/// Readers only ever see a finished table: the engine rebuilds into a spare buffer and then
/// swaps it in.
#[derive(Debug, Clone)]
pub struct MultiplierTable {
    values: [f32; TABLE_CAPACITY],
    params: EnvelopeParameters,
    scales: TimeScales,
}

impl MultiplierTable {
    pub fn new(params: &EnvelopeParameters, clock: &EngineConfig) -> Self {
        let mut table = Self {
            values: [0.0; TABLE_CAPACITY],
            params: *params,
            scales: TimeScales::new(params, clock),
        };
        table.rebuild(params, clock);
        table
    }

    /// Overwrite every entry for new parameters.
    pub fn rebuild(&mut self, params: &EnvelopeParameters, clock: &EngineConfig) {
        let params = EnvelopeParameters {
            attack: params.attack.max(MIN_ATTACK),
            decay: params.decay.max(MIN_DECAY),
            release: params.release.max(MIN_RELEASE),
            ..*params
        };
        let attack = params.attack as usize;
        let decay = params.decay as usize;
        let release = params.release as usize;
        let sustain = params.sustain_level();

        for i in 0..=attack {
            self.values[i] = i as f32 / attack as f32;
        }
        // Written from the sustain end so the last decay entry is exactly the sustain level.
        for k in 1..=decay {
            let remaining = (decay - k) as f32 / decay as f32;
            self.values[attack + k] = (sustain + (1.0 - sustain) * remaining).min(1.0);
        }
        for k in 1..=release {
            let remaining = (release - k) as f32 / release as f32;
            self.values[attack + decay + k] = sustain * remaining;
        }
        for value in self.values[attack + decay + release + 1..].iter_mut() {
            *value = 0.0;
        }

        self.params = params;
        self.scales = TimeScales::new(&params, clock);
    }

    pub fn params(&self) -> &EnvelopeParameters {
        &self.params
    }

    pub fn scales(&self) -> &TimeScales {
        &self.scales
    }

    /// Number of live entries; everything past them is zero.
    pub fn len(&self) -> usize {
        self.params.attack as usize + self.params.decay as usize + self.params.release as usize + 1
    }

    pub fn last_step(&self) -> u16 {
        (self.len() - 1) as u16
    }

    /// The step where attack ends at a multiplier of 1.
    pub fn peak_step(&self) -> u16 {
        self.params.attack as u16
    }

    /// The step held while a note is sustained.
    pub fn sustain_step(&self) -> u16 {
        self.params.attack as u16 + self.params.decay as u16
    }

    /// The first step of the release segment.
    pub fn release_start(&self) -> u16 {
        self.sustain_step() + 1
    }

    /// The multiplier at `step`, clamped to the last live entry.
    pub fn get(&self, step: u16) -> f32 {
        self.values[step.min(self.last_step()) as usize]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values[..self.len()]
    }

    /// The entries a note passes through in `phase`, including the entry it starts from.
    pub fn segment(&self, phase: Phase) -> &[f32] {
        let peak = self.peak_step() as usize;
        let sustain = self.sustain_step() as usize;
        match phase {
            Phase::Off => &[],
            Phase::Attack => &self.values[..=peak],
            Phase::Decay => &self.values[peak..=sustain],
            Phase::Sustain => &self.values[sustain..=sustain],
            Phase::Release => &self.values[sustain..self.len()],
        }
    }

    /// The last attack step at or below `level`.
    pub fn attack_entry(&self, level: f32) -> u16 {
        let below = self.segment(Phase::Attack).partition_point(|&value| value <= level);
        below.saturating_sub(1) as u16
    }

    /// The first decay step at or below `level`. Past the sustain step if `level` is under the
    /// sustain level.
    pub fn decay_entry(&self, level: f32) -> u16 {
        let above = self.segment(Phase::Decay).partition_point(|&value| value > level);
        self.peak_step() + above as u16
    }

    /// Where a note currently at `level` should enter the release segment: the boundary step,
    /// or further in if the segment starts above `level`.
    pub fn release_entry(&self, level: f32) -> u16 {
        let start = self.release_start() as usize;
        let release = &self.values[start..self.len()];
        let skipped = release.partition_point(|&value| value > level);
        (start + skipped) as u16
    }
}
