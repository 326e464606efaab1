//! Drives an in-memory engine through a scripted [`Transcript`].

use tracing::{debug, warn};

use crate::core::config::EngineConfig;
use crate::core::engine::{EngineError, ProcessOutcome, SyncEngine};
use crate::core::events::{RecordingBus, VecMessages};
use crate::core::store::MemoryStore;
use crate::schema::event::HostEvent;
use crate::schema::transcript::{Step, Transcript};

pub type MemoryEngine = SyncEngine<MemoryStore, VecMessages, RecordingBus>;

/// What happened at one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub index: usize,
    pub now_ms: u64,
    pub step: Step,
    pub outcomes: Vec<ProcessOutcome>,
    /// Entity names in the cache after the step.
    pub entities: Vec<String>,
}

/// A host simulation: one chat held in memory, with the engine wired up.
pub struct Replay {
    engine: MemoryEngine,
    now_ms: u64,
    steps_run: usize,
}

impl Replay {
    pub fn new(config: EngineConfig) -> Result<Replay, EngineError> {
        let mut engine = SyncEngine::new(config, MemoryStore::new(), VecMessages::new(), RecordingBus::new())?;
        engine.init();
        Ok(Replay {
            engine,
            now_ms: 0,
            steps_run: 0,
        })
    }

    /// Build from the transcript's own config, or `fallback` when it has none.
    pub fn for_transcript(transcript: &Transcript, fallback: EngineConfig) -> Result<Replay, EngineError> {
        Self::new(transcript.config.clone().unwrap_or(fallback))
    }

    pub fn run(&mut self, transcript: &Transcript) -> Vec<StepReport> {
        transcript.steps.iter().map(|step| self.step(step)).collect()
    }

    pub fn step(&mut self, step: &Step) -> StepReport {
        debug!(step = ?step, now_ms = self.now_ms, "replay step");
        let outcomes = match step {
            Step::Generate(text) => {
                let id = self.engine.messages_mut().push(text.clone());
                let store_id = self.engine.store_mut().push_message();
                if store_id != id {
                    warn!(message_id = id, store_id, "message and store ids diverged");
                }
                self.dispatch(HostEvent::GenerationComplete { message_id: id })
            }
            Step::Swipe { message_id, text } => {
                self.engine.messages_mut().replace(*message_id, text.clone());
                if let Err(err) = self.engine.store_mut().replace_document(*message_id, None) {
                    warn!(message_id = *message_id, error = %err, "swipe target missing");
                }
                self.dispatch(HostEvent::BranchSwitch { message_id: *message_id })
            }
            Step::Edit { message_id, text } => {
                self.engine.messages_mut().replace(*message_id, text.clone());
                self.dispatch(HostEvent::UserEdit { message_id: *message_id })
            }
            Step::DeleteLast => {
                let remaining = self.engine.messages().len().saturating_sub(1);
                self.engine.messages_mut().truncate(remaining);
                self.engine.store_mut().truncate(remaining);
                self.dispatch(HostEvent::MessageDeleted {
                    message_id: Some(remaining as u32),
                })
            }
            Step::Event(event) => self.dispatch(event.clone()),
            Step::Wait(ms) => {
                self.now_ms = self.now_ms.saturating_add(*ms);
                self.engine.poll(self.now_ms)
            }
        };

        let report = StepReport {
            index: self.steps_run,
            now_ms: self.now_ms,
            step: step.clone(),
            outcomes,
            entities: self.engine.list_entity_names(),
        };
        self.steps_run += 1;
        report
    }

    fn dispatch(&mut self, event: HostEvent) -> Vec<ProcessOutcome> {
        self.engine.dispatch(event, self.now_ms).into_iter().collect()
    }

    pub fn engine(&self) -> &MemoryEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut MemoryEngine {
        &mut self.engine
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }
}
