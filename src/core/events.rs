//! Host-facing seams: event subscription and message text access.

use rustc_hash::FxHashMap;
use std::fmt;
use thiserror::Error;

use crate::schema::event::EventKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BusError {
    #[error("event {0} is not supported by this host")]
    Unsupported(EventKind),
    #[error("unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),
}

/// Registration with the host's event system.
pub trait EventBus {
    fn subscribe(&mut self, kind: EventKind) -> Result<SubscriptionId, BusError>;
    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), BusError>;
}

/// In-memory bus that records live subscriptions. Kinds marked with
/// [`RecordingBus::reject`] fail to subscribe.
#[derive(Debug, Clone, Default)]
pub struct RecordingBus {
    next_id: u64,
    live: FxHashMap<SubscriptionId, EventKind>,
    rejected: Vec<EventKind>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(mut self, kind: EventKind) -> Self {
        self.rejected.push(kind);
        self
    }

    pub fn is_subscribed(&self, kind: EventKind) -> bool {
        self.live.values().any(|k| *k == kind)
    }

    pub fn subscription_count(&self) -> usize {
        self.live.len()
    }
}

impl EventBus for RecordingBus {
    fn subscribe(&mut self, kind: EventKind) -> Result<SubscriptionId, BusError> {
        if self.rejected.contains(&kind) {
            return Err(BusError::Unsupported(kind));
        }
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.live.insert(id, kind);
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), BusError> {
        self.live
            .remove(&id)
            .map(|_| ())
            .ok_or(BusError::UnknownSubscription(id))
    }
}

/// Read access to chat message text.
pub trait MessageSource {
    fn message_text(&self, id: u32) -> Option<String>;
    fn latest_message_id(&self) -> Option<u32>;
}

/// Messages held in a vector, indexed by id.
#[derive(Debug, Clone, Default)]
pub struct VecMessages {
    messages: Vec<String>,
}

impl VecMessages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new message's id.
    pub fn push(&mut self, text: impl Into<String>) -> u32 {
        self.messages.push(text.into());
        (self.messages.len() - 1) as u32
    }

    /// Replace a message's text, as a swipe or edit does. Returns false
    /// when the id does not exist.
    pub fn replace(&mut self, id: u32, text: impl Into<String>) -> bool {
        match self.messages.get_mut(id as usize) {
            Some(slot) => {
                *slot = text.into();
                true
            }
            None => false,
        }
    }

    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl MessageSource for VecMessages {
    fn message_text(&self, id: u32) -> Option<String> {
        self.messages.get(id as usize).cloned()
    }

    fn latest_message_id(&self) -> Option<u32> {
        self.messages.len().checked_sub(1).map(|n| n as u32)
    }
}

impl<T: MessageSource + ?Sized> MessageSource for &T {
    fn message_text(&self, id: u32) -> Option<String> {
        (**self).message_text(id)
    }

    fn latest_message_id(&self) -> Option<u32> {
        (**self).latest_message_id()
    }
}

/// How a message is turned into cache state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Use persisted variables when the scope holds valid data, else parse.
    VariableFirst,
    /// Parse, then write only directives that differ from the store.
    ValueDiff,
    /// Parse and write every directive.
    AlwaysParse,
}
