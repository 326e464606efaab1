use serde::{Deserialize, Serialize};
use std::path::Path;

use super::event::HostEvent;
use crate::core::config::{ConfigError, EngineConfig};

/// One scripted step of a chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    /// A new generated message; the engine sees generation-complete.
    Generate(String),
    /// Swipe to a fresh alternative of a message that has no variables yet.
    Swipe { message_id: u32, text: String },
    /// The user rewrote a message.
    Edit { message_id: u32, text: String },
    /// Delete the newest message.
    DeleteLast,
    /// Deliver a raw host event.
    Event(HostEvent),
    /// Let host time pass, then poll deferred work.
    Wait(u64),
}

/// A scripted session, loadable from RON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub config: Option<EngineConfig>,
    pub steps: Vec<Step>,
}

impl Transcript {
    pub fn load_from_ron(path: &Path) -> Result<Transcript, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<Transcript, ConfigError> {
        let transcript: Transcript = ron::from_str(input)?;
        if let Some(config) = &transcript.config {
            config.validate()?;
        }
        Ok(transcript)
    }
}
