//! The host's message-scoped variable store, behind a narrow trait.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::document;
use crate::schema::path::{KeyPath, PathError};
use crate::schema::scope::MessageScope;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("message {requested} is out of range (history holds {available} messages)")]
    OutOfRange { requested: u32, available: usize },
    #[error("store has no messages")]
    Empty,
    #[error("path error: {0}")]
    Path(#[from] PathError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// True when retrying at [`MessageScope::Latest`] may succeed.
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Self::OutOfRange { .. })
    }
}

/// A path-addressable JSON document per message.
///
/// Implementors provide whole-document reads and an atomic `update`; the
/// path helpers are layered on top. `update` must apply the transform to
/// the scoped document and persist the result as one step, and must fail
/// before calling the transform when the scope cannot be resolved.
pub trait VariableStore {
    fn document(&self, scope: MessageScope) -> Result<Option<Value>, StoreError>;

    fn update(
        &mut self,
        scope: MessageScope,
        transform: &mut dyn FnMut(&mut Value),
    ) -> Result<(), StoreError>;

    fn get(&self, path: &KeyPath, scope: MessageScope) -> Result<Option<Value>, StoreError> {
        Ok(self
            .document(scope)?
            .and_then(|doc| document::get(&doc, path).cloned()))
    }

    fn set(&mut self, path: &KeyPath, value: Value, scope: MessageScope) -> Result<(), StoreError> {
        let mut outcome = Ok(());
        let mut value = Some(value);
        self.update(scope, &mut |doc| {
            if let Some(value) = value.take() {
                outcome = document::set(doc, path, value);
            }
        })?;
        Ok(outcome?)
    }

    /// The scope a read of `scope` should use. A message id past the end of
    /// the history reads from `latest`, the same place writes fall back to.
    fn readable_scope(&self, scope: MessageScope) -> MessageScope {
        match self.document(scope) {
            Err(err) if err.is_out_of_range() && !scope.is_latest() => MessageScope::Latest,
            _ => scope,
        }
    }

    /// Returns whether anything was removed.
    fn unset(&mut self, path: &KeyPath, scope: MessageScope) -> Result<bool, StoreError> {
        let mut removed = false;
        self.update(scope, &mut |doc| {
            removed = document::unset(doc, path).is_some();
        })?;
        Ok(removed)
    }
}

/// In-memory store holding one document per message.
///
/// Mirrors the host's behaviour: `latest` resolves to the newest message,
/// ids past the end are out of range, and a new message starts from a copy
/// of the previous message's variables. Every `update` attempt is logged so
/// tests can observe fallback routing.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    messages: Vec<Option<Value>>,
    attempts: Vec<MessageScope>,
    commits: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with `count` messages and no variables yet.
    pub fn with_messages(count: usize) -> Self {
        Self {
            messages: vec![None; count],
            ..Self::default()
        }
    }

    /// Append a message that inherits the previous message's variables.
    /// Returns its id.
    pub fn push_message(&mut self) -> u32 {
        let inherited = self.messages.last().cloned().flatten();
        self.messages.push(inherited);
        (self.messages.len() - 1) as u32
    }

    /// Append a message with no variables. Returns its id.
    pub fn push_empty_message(&mut self) -> u32 {
        self.messages.push(None);
        (self.messages.len() - 1) as u32
    }

    /// Drop every message from `len` onwards.
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }

    /// Replace one message's document wholesale, as a host swipe does.
    pub fn replace_document(&mut self, id: u32, doc: Option<Value>) -> Result<(), StoreError> {
        let index = self.resolve(MessageScope::Message(id))?;
        self.messages[index] = doc;
        Ok(())
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Scopes of every `update` call, in order, including failed ones.
    pub fn attempts(&self) -> &[MessageScope] {
        &self.attempts
    }

    /// Number of successful `update` calls.
    pub fn commits(&self) -> usize {
        self.commits
    }

    fn resolve(&self, scope: MessageScope) -> Result<usize, StoreError> {
        match scope {
            MessageScope::Latest => self.messages.len().checked_sub(1).ok_or(StoreError::Empty),
            MessageScope::Message(id) => {
                if (id as usize) < self.messages.len() {
                    Ok(id as usize)
                } else {
                    Err(StoreError::OutOfRange {
                        requested: id,
                        available: self.messages.len(),
                    })
                }
            }
        }
    }
}

impl VariableStore for MemoryStore {
    fn document(&self, scope: MessageScope) -> Result<Option<Value>, StoreError> {
        let index = self.resolve(scope)?;
        Ok(self.messages[index].clone())
    }

    fn update(
        &mut self,
        scope: MessageScope,
        transform: &mut dyn FnMut(&mut Value),
    ) -> Result<(), StoreError> {
        self.attempts.push(scope);
        let index = self.resolve(scope)?;
        let mut doc = self.messages[index]
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));
        transform(&mut doc);
        self.messages[index] = Some(doc);
        self.commits += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> KeyPath {
        KeyPath::parse(s).unwrap()
    }

    #[test]
    fn set_then_get() {
        let mut store = MemoryStore::with_messages(2);
        store.set(&path("p.x"), json!(12), MessageScope::Message(0)).unwrap();
        assert_eq!(store.get(&path("p.x"), MessageScope::Message(0)).unwrap(), Some(json!(12)));
        assert_eq!(store.get(&path("p.x"), MessageScope::Message(1)).unwrap(), None);
    }

    #[test]
    fn latest_resolves_to_newest_message() {
        let mut store = MemoryStore::with_messages(3);
        store.set(&path("p.x"), json!(1), MessageScope::Latest).unwrap();
        assert_eq!(store.get(&path("p.x"), MessageScope::Message(2)).unwrap(), Some(json!(1)));
    }

    #[test]
    fn out_of_range_and_empty() {
        let mut store = MemoryStore::with_messages(1);
        let err = store.set(&path("p.x"), json!(1), MessageScope::Message(5)).unwrap_err();
        assert_eq!(err, StoreError::OutOfRange { requested: 5, available: 1 });
        assert!(err.is_out_of_range());

        let empty = MemoryStore::new();
        assert_eq!(empty.document(MessageScope::Latest), Err(StoreError::Empty));
    }

    #[test]
    fn readable_scope_falls_back_past_the_end() {
        let store = MemoryStore::with_messages(2);
        assert_eq!(store.readable_scope(MessageScope::Message(1)), MessageScope::Message(1));
        assert_eq!(store.readable_scope(MessageScope::Message(999)), MessageScope::Latest);
        assert_eq!(MemoryStore::new().readable_scope(MessageScope::Latest), MessageScope::Latest);
    }

    #[test]
    fn unset_reports_removal() {
        let mut store = MemoryStore::with_messages(1);
        store.set(&path("p.x"), json!(1), MessageScope::Latest).unwrap();
        assert!(store.unset(&path("p.x"), MessageScope::Latest).unwrap());
        assert!(!store.unset(&path("p.x"), MessageScope::Latest).unwrap());
    }

    #[test]
    fn set_reports_path_conflicts() {
        let mut store = MemoryStore::with_messages(1);
        store.set(&path("p"), json!(1), MessageScope::Latest).unwrap();
        let err = store.set(&path("p.x"), json!(2), MessageScope::Latest).unwrap_err();
        assert!(matches!(err, StoreError::Path(_)));
    }

    #[test]
    fn new_messages_inherit_variables() {
        let mut store = MemoryStore::with_messages(1);
        store.set(&path("p.x"), json!(7), MessageScope::Latest).unwrap();
        let id = store.push_message();
        assert_eq!(id, 1);
        assert_eq!(store.get(&path("p.x"), MessageScope::Message(1)).unwrap(), Some(json!(7)));
        let blank = store.push_empty_message();
        assert_eq!(store.document(MessageScope::Message(blank)).unwrap(), None);
    }

    #[test]
    fn attempts_are_logged() {
        let mut store = MemoryStore::with_messages(1);
        let _ = store.set(&path("p.x"), json!(1), MessageScope::Message(9));
        let _ = store.set(&path("p.x"), json!(1), MessageScope::Latest);
        assert_eq!(store.attempts(), &[MessageScope::Message(9), MessageScope::Latest]);
        assert_eq!(store.commits(), 1);
    }
}
