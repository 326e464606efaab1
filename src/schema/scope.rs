//! Message scope: the isolation boundary of the store and the cache.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The message a store document belongs to, or the newest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawScope", into = "RawScope")]
pub enum MessageScope {
    Message(u32),
    Latest,
}

impl MessageScope {
    pub fn message_id(&self) -> Option<u32> {
        match self {
            Self::Message(id) => Some(*id),
            Self::Latest => None,
        }
    }

    pub fn is_latest(&self) -> bool {
        matches!(self, Self::Latest)
    }
}

impl Default for MessageScope {
    fn default() -> Self {
        Self::Latest
    }
}

impl From<u32> for MessageScope {
    fn from(id: u32) -> Self {
        Self::Message(id)
    }
}

impl fmt::Display for MessageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(id) => write!(f, "{id}"),
            Self::Latest => f.write_str("latest"),
        }
    }
}

// Hosts send either an integer id or the string "latest"; anything
// unrecognised is treated as "latest".
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawScope {
    Id(u32),
    Name(String),
}

impl From<RawScope> for MessageScope {
    fn from(raw: RawScope) -> Self {
        match raw {
            RawScope::Id(id) => Self::Message(id),
            RawScope::Name(name) => match name.trim().parse::<u32>() {
                Ok(id) => Self::Message(id),
                Err(_) => Self::Latest,
            },
        }
    }
}

impl From<MessageScope> for RawScope {
    fn from(scope: MessageScope) -> Self {
        match scope {
            MessageScope::Message(id) => RawScope::Id(id),
            MessageScope::Latest => RawScope::Name("latest".to_string()),
        }
    }
}
