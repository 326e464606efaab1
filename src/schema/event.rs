use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle notifications the host can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    BranchSwitch,
    UserEdit,
    GenericUpdate,
    MessageDeleted,
    GenerationComplete,
    ChatSwitch,
    PreGeneration,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        Self::BranchSwitch,
        Self::UserEdit,
        Self::GenericUpdate,
        Self::MessageDeleted,
        Self::GenerationComplete,
        Self::ChatSwitch,
        Self::PreGeneration,
    ];

    /// Returns the tag string for this kind (e.g., "event:branch_switch").
    pub fn tag(&self) -> &'static str {
        match self {
            Self::BranchSwitch => "event:branch_switch",
            Self::UserEdit => "event:user_edit",
            Self::GenericUpdate => "event:generic_update",
            Self::MessageDeleted => "event:message_deleted",
            Self::GenerationComplete => "event:generation_complete",
            Self::ChatSwitch => "event:chat_switch",
            Self::PreGeneration => "event:pre_generation",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One delivered host event with its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostEvent {
    /// The user swiped to another generated alternative of a message.
    BranchSwitch { message_id: u32 },
    UserEdit { message_id: u32 },
    GenericUpdate {
        #[serde(default)]
        message_id: Option<u32>,
    },
    MessageDeleted {
        #[serde(default)]
        message_id: Option<u32>,
    },
    GenerationComplete { message_id: u32 },
    ChatSwitch {
        #[serde(default)]
        chat_id: Option<String>,
    },
    PreGeneration,
}

impl HostEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::BranchSwitch { .. } => EventKind::BranchSwitch,
            Self::UserEdit { .. } => EventKind::UserEdit,
            Self::GenericUpdate { .. } => EventKind::GenericUpdate,
            Self::MessageDeleted { .. } => EventKind::MessageDeleted,
            Self::GenerationComplete { .. } => EventKind::GenerationComplete,
            Self::ChatSwitch { .. } => EventKind::ChatSwitch,
            Self::PreGeneration => EventKind::PreGeneration,
        }
    }
}
