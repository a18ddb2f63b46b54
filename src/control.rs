//! Running the note-event side and the sample side on different threads.
//!
//! [`EnvelopeEngine::split`] hands the engine to an [`EnvelopeVoice`] that lives in the audio
//! callback and returns an [`EnvelopeController`] for the keyboard or MIDI thread. The two talk
//! over bounded channels: the controller never blocks, and the voice never allocates or frees.
//!
//! ```
//! use table_adsr::{EngineConfig, EnvelopeEngine, Phase};
//!
//! let (mut control, mut voice) = EnvelopeEngine::new(EngineConfig::default()).split(64);
//! control.configure(10, 10, 128, 10).unwrap();
//! control.note_on(60).unwrap();
//!
//! voice.tick();
//! let gain = voice.get_multiplier(60);
//! assert!((0.0..=1.0).contains(&gain));
//! assert_eq!(voice.engine().phase(60), Ok(Phase::Attack));
//! ```

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use crate::envelope::{
    clock::StepDeltas,
    params::{EnvelopeParameters, ParamReport},
    table::MultiplierTable,
};
use crate::{ControlError, EngineConfig, EnvelopeEngine, NoteNumber};

enum ControlEvent {
    NoteOn(NoteNumber),
    NoteOff(NoteNumber),
    Finish(NoteNumber),
    /// A fully built replacement curve.
    Table(Box<MultiplierTable>),
}

/// The event-side handle. Validates note numbers and builds new curves, then queues them for
/// the voice.
pub struct EnvelopeController {
    events: Sender<ControlEvent>,
    recycled: Receiver<Box<MultiplierTable>>,
    config: EngineConfig,
    params: EnvelopeParameters,
}

/// The sample-side handle. Owns the engine; applies queued events at the start of each
/// [`EnvelopeVoice::tick`].
pub struct EnvelopeVoice {
    engine: EnvelopeEngine,
    events: Receiver<ControlEvent>,
    recycle: Sender<Box<MultiplierTable>>,
    max_events: usize,
}

impl EnvelopeEngine {
    /// Split into a controller and a voice. `capacity` bounds both the number of queued events
    /// and how many of them one tick applies.
    pub fn split(self, capacity: usize) -> (EnvelopeController, EnvelopeVoice) {
        let capacity = capacity.max(1);
        let (events_tx, events_rx) = bounded(capacity);
        // Every queued table returns one buffer, plus the one the engine starts with.
        let (recycle_tx, recycle_rx) = bounded(capacity + 1);

        let controller = EnvelopeController {
            events: events_tx,
            recycled: recycle_rx,
            config: self.config().clone(),
            params: *self.parameters(),
        };
        let voice = EnvelopeVoice {
            engine: self,
            events: events_rx,
            recycle: recycle_tx,
            max_events: capacity,
        };
        (controller, voice)
    }
}

impl EnvelopeController {
    pub fn note_on(&self, note: u8) -> Result<(), ControlError> {
        let note = NoteNumber::new(note)?;
        Ok(self.events.try_send(ControlEvent::NoteOn(note))?)
    }

    pub fn note_off(&self, note: u8) -> Result<(), ControlError> {
        let note = NoteNumber::new(note)?;
        Ok(self.events.try_send(ControlEvent::NoteOff(note))?)
    }

    pub fn finish(&self, note: u8) -> Result<(), ControlError> {
        let note = NoteNumber::new(note)?;
        Ok(self.events.try_send(ControlEvent::Finish(note))?)
    }

    /// Build a new curve here and queue it for the voice. The voice switches to it between two
    /// samples. If the queue is full nothing changes, including the parameters seen by the next
    /// call.
    pub fn configure(
        &mut self,
        attack: u8,
        decay: u8,
        sustain: u8,
        release: u8,
    ) -> Result<ParamReport, ControlError> {
        let mut params = self.params;
        let report = params.apply(attack, decay, sustain, release);

        let table = match self.recycled.try_recv() {
            Ok(mut table) => {
                table.rebuild(&params, &self.config);
                table
            }
            Err(_) => Box::new(MultiplierTable::new(&params, &self.config)),
        };
        self.events.try_send(ControlEvent::Table(table))?;
        self.params = params;
        Ok(report)
    }

    /// The parameters of the most recently queued curve.
    pub fn parameters(&self) -> &EnvelopeParameters {
        &self.params
    }
}

impl EnvelopeVoice {
    /// Apply pending events, then advance the sample clock.
    pub fn tick(&mut self) -> StepDeltas {
        self.drain();
        self.engine.tick()
    }

    pub fn get_multiplier(&mut self, note: u8) -> f32 {
        self.engine.get_multiplier(note)
    }

    pub fn engine(&self) -> &EnvelopeEngine {
        &self.engine
    }

    fn drain(&mut self) {
        for event in self.events.try_iter().take(self.max_events) {
            match event {
                ControlEvent::NoteOn(note) => self.engine.start(note),
                ControlEvent::NoteOff(note) => self.engine.release(note),
                ControlEvent::Finish(note) => self.engine.stop(note),
                ControlEvent::Table(table) => {
                    let old = self.engine.install_table(table);
                    if self.recycle.try_send(old).is_err() {
                        debug!("controller gone, dropping replaced envelope table");
                    }
                }
            }
        }
    }

    /// Take the engine back, e.g. to run it single-threaded again.
    pub fn into_engine(self) -> EnvelopeEngine {
        self.engine
    }
}
