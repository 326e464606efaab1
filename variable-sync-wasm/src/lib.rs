//! WASM bindings for variable-sync: lets a browser host drive the engine.

use serde::Serialize;
use wasm_bindgen::prelude::*;

use variable_sync::core::config::EngineConfig;
use variable_sync::core::hash::hash_content;
use variable_sync::core::replay::{Replay, StepReport};
use variable_sync::schema::event::{EventKind, HostEvent};
use variable_sync::schema::transcript::Step;

// ---------------------------------------------------------------------------
// Embedded defaults, compiled into the WASM binary
// ---------------------------------------------------------------------------
mod data {
    pub const DEFAULT_CONFIG: &str = include_str!("../../config/engine.ron");
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(Serialize)]
struct OutcomeInfo {
    scope: String,
    policy: String,
    parsed: bool,
    skipped: bool,
    applied: usize,
    synced: usize,
    error: Option<String>,
}

#[derive(Serialize)]
struct StepInfo {
    now_ms: u64,
    outcomes: Vec<OutcomeInfo>,
    entities: Vec<String>,
    next_deadline: Option<u64>,
}

#[derive(Serialize)]
struct DirectiveInfo {
    path: String,
    value: serde_json::Value,
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

// ---------------------------------------------------------------------------
// SyncSession, the main exported struct
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct SyncSession {
    replay: Replay,
}

#[wasm_bindgen]
impl SyncSession {
    /// Create a session with an in-memory chat. `config_ron` overrides the
    /// bundled engine configuration.
    #[wasm_bindgen(constructor)]
    pub fn new(config_ron: Option<String>) -> Result<SyncSession, JsError> {
        let source = config_ron.as_deref().unwrap_or(data::DEFAULT_CONFIG);
        let config = EngineConfig::parse_ron(source)
            .map_err(|e| JsError::new(&format!("Config parse error: {e}")))?;
        let replay = Replay::new(config).map_err(|e| JsError::new(&format!("Engine build error: {e}")))?;
        Ok(SyncSession { replay })
    }

    /// Append a generated message and process it.
    pub fn generate(&mut self, text: &str) -> Result<String, JsError> {
        self.run(Step::Generate(text.to_string()))
    }

    /// Swipe message `message_id` to a fresh alternative.
    pub fn swipe(&mut self, message_id: u32, text: &str) -> Result<String, JsError> {
        self.run(Step::Swipe {
            message_id,
            text: text.to_string(),
        })
    }

    pub fn edit(&mut self, message_id: u32, text: &str) -> Result<String, JsError> {
        self.run(Step::Edit {
            message_id,
            text: text.to_string(),
        })
    }

    pub fn delete_last(&mut self) -> Result<String, JsError> {
        self.run(Step::DeleteLast)
    }

    /// Deliver a raw host event given as JSON, e.g. `{"GenericUpdate":{}}`
    /// or `"PreGeneration"`.
    pub fn dispatch(&mut self, event_json: &str) -> Result<String, JsError> {
        let event: HostEvent = serde_json::from_str(event_json)
            .map_err(|e| JsError::new(&format!("Invalid event JSON: {e}")))?;
        self.run(Step::Event(event))
    }

    /// Advance host time and run deferred work that became due.
    pub fn advance(&mut self, ms: u64) -> Result<String, JsError> {
        self.run(Step::Wait(ms))
    }

    /// Return the cached entities as a JSON object keyed by name.
    pub fn entities(&self) -> Result<String, JsError> {
        let entities: serde_json::Map<String, serde_json::Value> = self
            .replay
            .engine()
            .cache()
            .entities()
            .iter()
            .map(|(name, record)| (name.clone(), record.to_value()))
            .collect();
        to_json(&entities)
    }

    /// Return the cached scenario as JSON, or `null`.
    pub fn scenario(&self) -> Result<String, JsError> {
        to_json(&self.replay.engine().get_scenario())
    }

    /// Return the cached pairwise interactions as a JSON array.
    pub fn interactions(&self) -> Result<String, JsError> {
        to_json(&self.replay.engine().get_interactions())
    }

    /// Parse `text` without touching any state. Returns a JSON array of
    /// `{path, value}`.
    pub fn parse(&self, text: &str) -> Result<String, JsError> {
        let directives: Vec<DirectiveInfo> = self
            .replay
            .engine()
            .parser()
            .parse_directives(text)
            .into_iter()
            .map(|d| DirectiveInfo {
                path: d.path.to_string(),
                value: d.value,
            })
            .collect();
        to_json(&directives)
    }

    /// Content hash used for processed-message bookkeeping.
    pub fn hash(text: &str) -> String {
        hash_content(text)
    }

    /// Return JSON array of event kind tags.
    pub fn event_kinds() -> String {
        let tags: Vec<&str> = EventKind::ALL.iter().map(|k| k.tag()).collect();
        serde_json::to_string(&tags).unwrap_or_else(|_| "[]".to_string())
    }

    fn run(&mut self, step: Step) -> Result<String, JsError> {
        let report = self.replay.step(&step);
        to_json(&self.step_info(report))
    }

    fn step_info(&self, report: StepReport) -> StepInfo {
        StepInfo {
            now_ms: report.now_ms,
            outcomes: report
                .outcomes
                .into_iter()
                .map(|o| OutcomeInfo {
                    scope: o.scope.to_string(),
                    policy: format!("{:?}", o.policy),
                    parsed: o.parsed,
                    skipped: o.skipped,
                    applied: o.applied,
                    synced: o.report.entity_count,
                    error: o.report.error,
                })
                .collect(),
            entities: report.entities,
            next_deadline: self.replay.engine().next_deadline(),
        }
    }
}
