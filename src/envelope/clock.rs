use super::{params::EnvelopeParameters, table::TimeScales, Phase};

/// How many table steps a note in each phase moves during the current sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepDeltas {
    pub attack: u16,
    pub decay: u16,
    pub release: u16,
}

impl StepDeltas {
    pub fn for_phase(&self, phase: Phase) -> u16 {
        match phase {
            Phase::Attack => self.attack,
            Phase::Decay => self.decay,
            Phase::Release => self.release,
            Phase::Off | Phase::Sustain => 0,
        }
    }
}

/// Sub-sample counters shared by every note. One counter per timed phase accumulates elapsed
/// samples until they add up to at least one table step, then starts over.
#[derive(Debug, Clone, Default)]
pub struct SampleClock {
    attack_counter: u64,
    decay_counter: u64,
    release_counter: u64,
    deltas: StepDeltas,
}

fn carry(counter: &mut u64, value: u8, scale: u64) -> u16 {
    *counter += 1;
    let delta = value as u64 * *counter / scale;
    if delta != 0 {
        *counter = 0;
    }
    delta.min(u16::MAX as u64) as u16
}

impl SampleClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by one sample and return this sample's step deltas.
    pub fn tick(&mut self, params: &EnvelopeParameters, scales: &TimeScales) -> StepDeltas {
        self.deltas = StepDeltas {
            attack: carry(&mut self.attack_counter, params.attack, scales.attack),
            decay: carry(&mut self.decay_counter, params.decay, scales.decay),
            release: carry(&mut self.release_counter, params.release, scales.release),
        };
        self.deltas
    }

    /// The deltas computed by the most recent [`SampleClock::tick`].
    pub fn deltas(&self) -> StepDeltas {
        self.deltas
    }
}
