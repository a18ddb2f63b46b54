use tracing::{debug, trace, warn};

use crate::envelope::{
    advance,
    clock::{SampleClock, StepDeltas},
    params::{EnvelopeParameters, ParamReport},
    table::MultiplierTable,
    NoteEnvelope, Phase,
};
use crate::note::{NoteNumber, ReleaseQueue};
use crate::{EngineConfig, NoteOutOfRange, NOTE_COUNT};

/// Envelope state for every playable note, plus the curve they share.
///
/// Call [`EnvelopeEngine::tick`] once per output sample, then [`EnvelopeEngine::get_multiplier`]
/// once for each sounding note. Nothing on that path allocates or blocks.
pub struct EnvelopeEngine {
    config: EngineConfig,
    params: EnvelopeParameters,
    /// Double buffer: `configure` writes the back table, then flips `front`.
    tables: [Box<MultiplierTable>; 2],
    front: usize,
    clock: SampleClock,
    notes: [NoteEnvelope; NOTE_COUNT],
    released: ReleaseQueue,
}

impl EnvelopeEngine {
    pub fn new(config: EngineConfig) -> Self {
        let mut params = EnvelopeParameters::default();
        let initial = config.initial;
        params.apply(initial.attack, initial.decay, initial.sustain, initial.release);
        let table = MultiplierTable::new(&params, &config);
        let released = ReleaseQueue::new(config.release_queue_capacity.max(1));

        Self {
            config,
            params,
            tables: [Box::new(table.clone()), Box::new(table)],
            front: 0,
            clock: SampleClock::new(),
            notes: [NoteEnvelope::Off; NOTE_COUNT],
            released,
        }
    }

    /// Change the envelope. Durations below their minimum keep their previous value; see
    /// [`EnvelopeParameters::apply`].
    pub fn configure(&mut self, attack: u8, decay: u8, sustain: u8, release: u8) -> ParamReport {
        let report = self.params.apply(attack, decay, sustain, release);
        let back = 1 - self.front;
        self.tables[back].rebuild(&self.params, &self.config);
        let (old, new) = (&self.tables[self.front], &self.tables[back]);
        for state in self.notes.iter_mut() {
            *state = state.rebase(old, new);
        }
        self.front = back;
        report
    }

    /// Publish a table built elsewhere and return the one it replaces.
    pub(crate) fn install_table(&mut self, table: Box<MultiplierTable>) -> Box<MultiplierTable> {
        self.params = *table.params();
        let old = std::mem::replace(&mut self.tables[self.front], table);
        let new = &self.tables[self.front];
        for state in self.notes.iter_mut() {
            *state = state.rebase(&old, new);
        }
        old
    }

    /// Start (or restart) a note from the beginning of its attack.
    pub fn note_on(&mut self, note: u8) -> Result<(), NoteOutOfRange> {
        let note = checked(note)?;
        self.start(note);
        Ok(())
    }

    /// Move a sounding note into its release. Off or already releasing notes are left alone.
    pub fn note_off(&mut self, note: u8) -> Result<(), NoteOutOfRange> {
        let note = checked(note)?;
        self.release(note);
        Ok(())
    }

    /// Silence a note immediately.
    pub fn finish(&mut self, note: u8) -> Result<(), NoteOutOfRange> {
        let note = checked(note)?;
        self.stop(note);
        Ok(())
    }

    pub(crate) fn start(&mut self, note: NoteNumber) {
        self.released.remove(note);
        self.notes[note.index()] = NoteEnvelope::Attack(0);
    }

    pub(crate) fn release(&mut self, note: NoteNumber) {
        let state = self.notes[note.index()];
        if matches!(state, NoteEnvelope::Off | NoteEnvelope::Release(_)) {
            return;
        }

        let table = self.table();
        let entry = table.release_entry(state.level(table));
        if let Some(evicted) = self.released.push(note) {
            debug!(note = evicted.get(), "release queue full, cutting off oldest release");
            self.notes[evicted.index()] = NoteEnvelope::Off;
        }
        self.notes[note.index()] = NoteEnvelope::Release(entry);
    }

    pub(crate) fn stop(&mut self, note: NoteNumber) {
        self.released.remove(note);
        self.notes[note.index()] = NoteEnvelope::Off;
    }

    /// Advance the sample clock. Call exactly once per output sample, before querying notes.
    pub fn tick(&mut self) -> StepDeltas {
        let table = &self.tables[self.front];
        self.clock.tick(table.params(), table.scales())
    }

    /// Advance `note` by this sample's deltas and return its gain. Notes outside the playable
    /// range read as silent.
    pub fn get_multiplier(&mut self, note: u8) -> f32 {
        self.try_multiplier(note).unwrap_or(0.0)
    }

    pub fn try_multiplier(&mut self, note: u8) -> Result<f32, NoteOutOfRange> {
        let note = NoteNumber::new(note)?;
        let state = self.notes[note.index()];
        let deltas = self.clock.deltas();
        let step = advance(state, &deltas, &self.tables[self.front]);

        if state != NoteEnvelope::Off && step.state == NoteEnvelope::Off {
            trace!(note = note.get(), "release finished");
            self.released.remove(note);
        }
        self.notes[note.index()] = step.state;
        Ok(step.multiplier)
    }

    pub fn phase(&self, note: u8) -> Result<Phase, NoteOutOfRange> {
        Ok(self.notes[NoteNumber::new(note)?.index()].phase())
    }

    pub fn step(&self, note: u8) -> Result<u16, NoteOutOfRange> {
        Ok(self.notes[NoteNumber::new(note)?.index()].step())
    }

    /// Notes in their release phase, oldest first.
    pub fn released(&self) -> impl Iterator<Item = NoteNumber> + '_ {
        self.released.iter()
    }

    /// Notes that are not off, lowest first.
    pub fn sounding(&self) -> impl Iterator<Item = NoteNumber> + '_ {
        self.notes
            .iter()
            .enumerate()
            .filter(|(_, state)| state.phase() != Phase::Off)
            .filter_map(|(index, _)| NoteNumber::new(crate::NOTE_MIN + index as u8).ok())
    }

    pub fn parameters(&self) -> &EnvelopeParameters {
        &self.params
    }

    pub fn table(&self) -> &MultiplierTable {
        &self.tables[self.front]
    }

    pub fn deltas(&self) -> StepDeltas {
        self.clock.deltas()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

fn checked(note: u8) -> Result<NoteNumber, NoteOutOfRange> {
    NoteNumber::new(note).map_err(|e| {
        warn!(note, "note out of range, ignored");
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MAX_ATTACK, MAX_DECAY, MAX_RELEASE, NOTE_MAX, NOTE_MIN};
    use float_cmp::approx_eq;
    use rand::Rng;

    /// One table step per sample for every phase.
    fn unit_clock() -> EngineConfig {
        EngineConfig {
            sample_rate_hz: 1000,
            attack_max_ms: MAX_ATTACK as u32,
            decay_max_ms: MAX_DECAY as u32,
            release_max_ms: MAX_RELEASE as u32,
            ..Default::default()
        }
    }

    fn engine(attack: u8, decay: u8, sustain: u8, release: u8) -> EnvelopeEngine {
        let mut engine = EnvelopeEngine::new(unit_clock());
        assert!(engine.configure(attack, decay, sustain, release).all_applied());
        engine
    }

    fn run(engine: &mut EnvelopeEngine, note: u8, samples: usize) -> Vec<f32> {
        (0..samples)
            .map(|_| {
                engine.tick();
                engine.get_multiplier(note)
            })
            .collect()
    }

    #[test]
    fn full_envelope_walkthrough() {
        let mut engine = engine(10, 10, 128, 10);
        engine.note_on(60).unwrap();
        assert_eq!(engine.phase(60), Ok(Phase::Attack));

        let attack = run(&mut engine, 60, 9);
        assert_eq!(engine.phase(60), Ok(Phase::Attack));
        assert!(attack.windows(2).all(|w| w[0] < w[1]));

        run(&mut engine, 60, 1);
        assert_eq!(engine.phase(60), Ok(Phase::Decay));

        run(&mut engine, 60, 10);
        assert_eq!(engine.phase(60), Ok(Phase::Sustain));
        for m in run(&mut engine, 60, 500) {
            assert!(approx_eq!(f32, m, 128.0 / 255.0, epsilon = 1e-6));
        }

        engine.note_off(60).unwrap();
        assert_eq!(engine.phase(60), Ok(Phase::Release));
        assert_eq!(engine.released().collect::<Vec<_>>(), vec![NoteNumber::new(60).unwrap()]);

        let release = run(&mut engine, 60, 10);
        assert!(release.windows(2).all(|w| w[0] >= w[1]));
        assert!(release[0] < 128.0 / 255.0);
        assert_eq!(*release.last().unwrap(), 0.0);
        assert_eq!(engine.phase(60), Ok(Phase::Off));
        assert_eq!(engine.released().count(), 0);

        assert_eq!(run(&mut engine, 60, 5), vec![0.0; 5]);
    }

    #[test]
    fn sustain_reached_after_attack_plus_decay_steps() {
        for (attack, decay) in [(1, 1), (3, 40), (200, 55), (255, 255)] {
            let mut engine = engine(attack, decay, 77, 5);
            engine.note_on(NOTE_MIN).unwrap();
            let steps = attack as usize + decay as usize;
            run(&mut engine, NOTE_MIN, steps - 1);
            assert_ne!(engine.phase(NOTE_MIN), Ok(Phase::Sustain));
            run(&mut engine, NOTE_MIN, 1);
            assert_eq!(engine.phase(NOTE_MIN), Ok(Phase::Sustain));
            assert_eq!(engine.step(NOTE_MIN), Ok(steps as u16));
        }
    }

    #[test]
    fn note_off_during_attack_falls_from_the_current_level() {
        let mut engine = engine(100, 10, 200, 50);
        engine.note_on(70).unwrap();
        let before = *run(&mut engine, 70, 20).last().unwrap();

        engine.note_off(70).unwrap();
        assert_eq!(engine.phase(70), Ok(Phase::Release));
        let release = run(&mut engine, 70, 60);
        assert!(release[0] <= before);
        assert!(release.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(engine.phase(70), Ok(Phase::Off));
    }

    #[test]
    fn note_off_during_decay_enters_at_the_boundary() {
        let mut engine = engine(10, 10, 128, 10);
        engine.note_on(60).unwrap();
        run(&mut engine, 60, 15);
        assert_eq!(engine.phase(60), Ok(Phase::Decay));
        let before = engine.table().get(engine.step(60).unwrap());
        engine.note_off(60).unwrap();
        assert_eq!(engine.step(60), Ok(engine.table().release_start()));

        let release = run(&mut engine, 60, 10);
        assert!(release[0] <= before);
        assert!(release.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(*release.last().unwrap(), 0.0);
        assert_eq!(engine.phase(60), Ok(Phase::Off));
    }

    fn release_until_off(engine: &mut EnvelopeEngine, note: u8, mut last: f32) -> usize {
        let mut samples = 0;
        while engine.phase(note) != Ok(Phase::Off) {
            engine.tick();
            let m = engine.get_multiplier(note);
            assert!(m <= last, "release rose from {} to {}", last, m);
            last = m;
            samples += 1;
            assert!(samples < 1_000, "release never finished");
        }
        assert_eq!(last, 0.0);
        samples
    }

    #[test]
    fn reconfiguring_during_release_keeps_falling() {
        let mut engine = engine(5, 5, 128, 10);
        engine.note_on(60).unwrap();
        run(&mut engine, 60, 10);
        engine.note_off(60).unwrap();
        let before = run(&mut engine, 60, 1)[0];

        engine.configure(100, 100, 128, 10);
        assert_eq!(engine.phase(60), Ok(Phase::Release));
        assert_eq!(engine.table().get(engine.step(60).unwrap()), before);
        let samples = release_until_off(&mut engine, 60, before);
        assert!(samples <= 10);
        assert_eq!(engine.released().count(), 0);
    }

    #[test]
    fn reconfiguring_mid_attack_and_decay_keeps_the_level() {
        let mut engine = engine(5, 5, 128, 10);
        engine.note_on(61).unwrap();
        run(&mut engine, 61, 7);
        engine.note_on(60).unwrap();
        assert_eq!(run(&mut engine, 60, 2), vec![0.2, 0.4]);

        assert_eq!(engine.phase(60), Ok(Phase::Attack));
        assert_eq!(engine.phase(61), Ok(Phase::Decay));
        let decay_level = engine.table().get(engine.step(61).unwrap());

        engine.configure(100, 100, 128, 10);
        assert_eq!(engine.phase(60), Ok(Phase::Attack));
        assert_eq!(engine.step(60), Ok(40));
        assert_eq!(engine.phase(61), Ok(Phase::Decay));
        assert!(engine.table().get(engine.step(61).unwrap()) <= decay_level);

        let rising = run(&mut engine, 60, 5);
        assert!(rising.iter().all(|&m| m > 0.4));
        let falling = run(&mut engine, 61, 5);
        assert!(falling.windows(2).all(|w| w[0] >= w[1]));
        assert!(falling[0] <= decay_level);
    }

    #[test]
    fn note_on_restarts_and_leaves_the_release_queue() {
        let mut engine = engine(10, 10, 128, 10);
        engine.note_on(60).unwrap();
        run(&mut engine, 60, 30);
        engine.note_off(60).unwrap();
        run(&mut engine, 60, 3);

        engine.note_on(60).unwrap();
        assert_eq!(engine.phase(60), Ok(Phase::Attack));
        assert_eq!(engine.step(60), Ok(0));
        assert_eq!(engine.released().count(), 0);

        engine.note_on(60).unwrap();
        assert_eq!(engine.step(60), Ok(0));
    }

    #[test]
    fn note_off_on_a_silent_note_does_nothing() {
        let mut engine = engine(10, 10, 128, 10);
        engine.note_off(60).unwrap();
        assert_eq!(engine.phase(60), Ok(Phase::Off));
        assert_eq!(engine.released().count(), 0);
    }

    #[test]
    fn finish_is_a_hard_stop() {
        let mut engine = engine(10, 10, 128, 10);
        engine.note_on(60).unwrap();
        engine.note_on(61).unwrap();
        run(&mut engine, 60, 12);
        engine.note_off(60).unwrap();
        engine.finish(60).unwrap();
        engine.finish(61).unwrap();
        assert_eq!(engine.phase(60), Ok(Phase::Off));
        assert_eq!(engine.phase(61), Ok(Phase::Off));
        assert_eq!(engine.released().count(), 0);
        assert_eq!(engine.sounding().count(), 0);
    }

    #[test]
    fn out_of_range_notes_are_rejected_without_effect() {
        let mut engine = engine(10, 10, 128, 10);
        for note in [0, NOTE_MIN - 1, NOTE_MAX + 1, u8::MAX] {
            assert_eq!(engine.note_on(note), Err(NoteOutOfRange(note)));
            assert_eq!(engine.note_off(note), Err(NoteOutOfRange(note)));
            assert_eq!(engine.finish(note), Err(NoteOutOfRange(note)));
            assert_eq!(engine.try_multiplier(note), Err(NoteOutOfRange(note)));
            assert_eq!(engine.get_multiplier(note), 0.0);
        }
        assert_eq!(engine.sounding().count(), 0);
    }

    #[test]
    fn too_many_releases_cut_off_the_oldest() {
        let capacity = 4;
        let mut engine = EnvelopeEngine::new(EngineConfig {
            release_queue_capacity: capacity,
            ..unit_clock()
        });
        engine.configure(1, 1, 255, 255);
        let notes: Vec<u8> = (60..70).collect();
        for &note in &notes {
            engine.note_on(note).unwrap();
        }
        for &note in &notes {
            engine.note_off(note).unwrap();
        }

        let overflow = notes.len() - capacity;
        let queued: Vec<u8> = engine.released().map(NoteNumber::get).collect();
        assert_eq!(queued, notes[overflow..].to_vec());
        for &note in &notes[..overflow] {
            assert_eq!(engine.phase(note), Ok(Phase::Off));
        }
        for &note in &notes[overflow..] {
            assert_eq!(engine.phase(note), Ok(Phase::Release));
        }

        // A note that finishes on its own frees its slot without evicting anyone.
        engine.finish(notes[overflow]).unwrap();
        engine.note_on(50).unwrap();
        engine.note_off(50).unwrap();
        assert_eq!(engine.released().count(), capacity);
        assert_eq!(engine.phase(notes[overflow + 1]), Ok(Phase::Release));
    }

    #[test]
    fn reconfiguring_moves_held_notes_to_the_new_sustain() {
        let mut engine = engine(5, 5, 255, 5);
        engine.note_on(60).unwrap();
        run(&mut engine, 60, 10);
        assert_eq!(engine.phase(60), Ok(Phase::Sustain));

        engine.configure(20, 20, 51, 20);
        let m = run(&mut engine, 60, 1)[0];
        assert!(approx_eq!(f32, m, 0.2, epsilon = 1e-6));
        assert_eq!(engine.step(60), Ok(40));
    }

    #[test]
    fn too_small_fields_keep_the_previous_value() {
        let mut engine = engine(10, 20, 128, 30);
        let report = engine.configure(0, 0, 64, 0);
        assert!(report.attack_ignored && report.decay_ignored && report.release_ignored);
        assert_eq!(*engine.parameters(), EnvelopeParameters::new(10, 20, 64, 30));
        assert_eq!(engine.table().params(), engine.parameters());
    }

    #[test]
    fn multipliers_stay_in_unit_range() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let mut engine = EnvelopeEngine::new(EngineConfig {
                sample_rate_hz: rng.gen_range(1_000..=96_000),
                attack_max_ms: rng.gen_range(1..=50),
                decay_max_ms: rng.gen_range(1..=50),
                release_max_ms: rng.gen_range(1..=50),
                ..Default::default()
            });
            engine.configure(
                rng.gen_range(1..=255),
                rng.gen_range(1..=255),
                rng.gen(),
                rng.gen_range(1..=255),
            );
            let note = rng.gen_range(NOTE_MIN..=NOTE_MAX);
            engine.note_on(note).unwrap();
            let held = rng.gen_range(0..5_000);
            for m in run(&mut engine, note, held) {
                assert!((0.0..=1.0).contains(&m));
            }
            engine.note_off(note).unwrap();

            let mut samples = 0;
            while engine.phase(note) != Ok(Phase::Off) {
                engine.tick();
                let m = engine.get_multiplier(note);
                assert!((0.0..=1.0).contains(&m));
                samples += 1;
                assert!(samples < 1_000_000, "release never finished");
            }
        }
    }

    #[test]
    fn real_clock_attack_timing() {
        let mut engine = EnvelopeEngine::new(EngineConfig {
            sample_rate_hz: 48_000,
            attack_max_ms: 2_000,
            ..Default::default()
        });
        engine.configure(51, 10, 128, 10);
        engine.note_on(60).unwrap();

        // 51 steps of 377 samples each.
        run(&mut engine, 60, 51 * 377 - 1);
        assert_eq!(engine.phase(60), Ok(Phase::Attack));
        assert_eq!(engine.step(60), Ok(50));
        run(&mut engine, 60, 1);
        assert_eq!(engine.phase(60), Ok(Phase::Decay));
    }
}
