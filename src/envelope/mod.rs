use clock::StepDeltas;
use table::MultiplierTable;

pub mod clock;
pub mod params;
pub mod table;

/// The lifecycle stage of a note's envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Off,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// A note's envelope position: its phase together with its step in the multiplier table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NoteEnvelope {
    #[default]
    Off,
    Attack(u16),
    Decay(u16),
    Sustain(u16),
    Release(u16),
}

impl NoteEnvelope {
    pub fn phase(&self) -> Phase {
        match self {
            NoteEnvelope::Off => Phase::Off,
            NoteEnvelope::Attack(_) => Phase::Attack,
            NoteEnvelope::Decay(_) => Phase::Decay,
            NoteEnvelope::Sustain(_) => Phase::Sustain,
            NoteEnvelope::Release(_) => Phase::Release,
        }
    }

    pub fn step(&self) -> u16 {
        match *self {
            NoteEnvelope::Off => 0,
            NoteEnvelope::Attack(step)
            | NoteEnvelope::Decay(step)
            | NoteEnvelope::Sustain(step)
            | NoteEnvelope::Release(step) => step,
        }
    }

    /// The multiplier this state reads from `table` without advancing.
    pub fn level(&self, table: &MultiplierTable) -> f32 {
        match *self {
            NoteEnvelope::Off => 0.0,
            NoteEnvelope::Sustain(_) => table.get(table.sustain_step()),
            other => table.get(other.step()),
        }
    }

    /// Carry this state from `old` over to `new` at the same multiplier, staying in the same
    /// phase where the new curve allows it. Steps are only meaningful within one table, so every
    /// note goes through here when the curve changes.
    pub fn rebase(self, old: &MultiplierTable, new: &MultiplierTable) -> NoteEnvelope {
        let level = self.level(old);
        match self {
            NoteEnvelope::Off => NoteEnvelope::Off,
            NoteEnvelope::Attack(_) => {
                let step = new.attack_entry(level);
                if step >= new.peak_step() {
                    decay_or_sustain(step, new)
                } else {
                    NoteEnvelope::Attack(step)
                }
            }
            NoteEnvelope::Decay(_) => decay_or_sustain(new.decay_entry(level), new),
            NoteEnvelope::Sustain(_) => NoteEnvelope::Sustain(new.sustain_step()),
            NoteEnvelope::Release(_) => NoteEnvelope::Release(new.release_entry(level)),
        }
    }
}

/// The outcome of advancing a note by one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Advance {
    pub state: NoteEnvelope,
    pub multiplier: f32,
}

fn decay_or_sustain(step: u16, table: &MultiplierTable) -> NoteEnvelope {
    if step >= table.sustain_step() {
        NoteEnvelope::Sustain(table.sustain_step())
    } else {
        NoteEnvelope::Decay(step)
    }
}

/// Move a note along `table` by this sample's `deltas`.
///
/// Attack hands over to decay once the step reaches the peak, and decay to sustain once it
/// reaches the sustain step, where it is pinned. A step that carries past both boundaries in one
/// sample lands directly in sustain. Sustain does not move. A release that runs past the last
/// live entry turns the note off.
pub fn advance(state: NoteEnvelope, deltas: &StepDeltas, table: &MultiplierTable) -> Advance {
    let state = match state {
        NoteEnvelope::Off => NoteEnvelope::Off,
        NoteEnvelope::Attack(step) => {
            let step = step.saturating_add(deltas.attack);
            if step >= table.peak_step() {
                decay_or_sustain(step, table)
            } else {
                NoteEnvelope::Attack(step)
            }
        }
        NoteEnvelope::Decay(step) => decay_or_sustain(step.saturating_add(deltas.decay), table),
        NoteEnvelope::Sustain(_) => NoteEnvelope::Sustain(table.sustain_step()),
        NoteEnvelope::Release(step) => {
            let step = step.saturating_add(deltas.release);
            if step > table.last_step() {
                NoteEnvelope::Off
            } else {
                NoteEnvelope::Release(step)
            }
        }
    };

    Advance {
        state,
        multiplier: state.level(table),
    }
}
