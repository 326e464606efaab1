//! Bookkeeping that lets the engine skip re-parsing a message it has
//! already handled.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::hash::hash_content;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingState {
    pub message_id: u32,
    pub content_hash: String,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub entities: Vec<String>,
}

impl ProcessingState {
    pub fn new(message_id: u32, text: &str, timestamp: u64, entities: Vec<String>) -> Self {
        Self {
            message_id,
            content_hash: hash_content(text),
            timestamp,
            entities,
        }
    }

    pub fn from_value(value: &Value) -> Option<ProcessingState> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn matches(&self, message_id: u32, content_hash: &str) -> bool {
        self.message_id == message_id && self.content_hash == content_hash
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessingTracker {
    last: Option<ProcessingState>,
}

impl ProcessingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `text` for `message_id` is exactly what was last processed.
    pub fn is_processed(&self, message_id: u32, text: &str) -> bool {
        let hash = hash_content(text);
        let processed = self
            .last
            .as_ref()
            .is_some_and(|state| state.matches(message_id, &hash));
        if processed {
            debug!(message_id, hash = %hash, "message already processed");
        }
        processed
    }

    pub fn record(&mut self, state: ProcessingState) {
        self.last = Some(state);
    }

    pub fn last(&self) -> Option<&ProcessingState> {
        self.last.as_ref()
    }

    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Restore from a persisted value; malformed input leaves the tracker empty.
    pub fn restore(&mut self, value: Option<&Value>) -> bool {
        self.last = value.and_then(ProcessingState::from_value);
        self.last.is_some()
    }
}
