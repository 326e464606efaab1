//! The synchronization engine: event routing, processing policies and
//! the downstream read/write API.

use std::path::Path;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::cache::EntityCache;
use crate::core::compare::filter_changed;
use crate::core::config::{ConfigError, EngineConfig};
use crate::core::directives::DirectiveParser;
use crate::core::events::{EventBus, MessageSource, Policy, SubscriptionId};
use crate::core::layout::StoreLayout;
use crate::core::model::{ScaleModel, StandardScaleModel};
use crate::core::processing::{ProcessingState, ProcessingTracker};
use crate::core::reader::StoreReader;
use crate::core::store::VariableStore;
use crate::core::sync::{Reconciler, SyncReport};
use crate::core::timer::Deadline;
use crate::core::writer::StoreWriter;
use crate::schema::entity::EntityRecord;
use crate::schema::event::{EventKind, HostEvent};
use crate::schema::scenario::{InteractionRecord, ScenarioRecord};
use crate::schema::scope::MessageScope;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("write to {scope} failed, including the fallback to latest")]
    WriteFailed { scope: MessageScope },
}

/// Receives the cache before each generation so derived prompt content
/// can be refreshed. Must not mutate engine state.
pub trait PromptHook {
    fn refresh(&mut self, cache: &EntityCache);
}

/// What one processing run did.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    /// Scope the cache was reconciled against.
    pub scope: MessageScope,
    pub policy: Policy,
    /// True when message text was parsed.
    pub parsed: bool,
    /// True when parsing was skipped because the message was already processed.
    pub skipped: bool,
    pub applied: usize,
    pub report: SyncReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    Update(Option<u32>),
    Reparse,
}

/// Keeps the entity cache coherent with a message-scoped variable store
/// as host events arrive.
///
/// The host owns time: events are delivered with [`SyncEngine::dispatch`]
/// and deferred work (the generic-update debounce and the chat-switch
/// reparse) runs when [`SyncEngine::poll`] is called at or after
/// [`SyncEngine::next_deadline`].
pub struct SyncEngine<S, M, B> {
    config: EngineConfig,
    layout: StoreLayout,
    parser: DirectiveParser,
    store: S,
    messages: M,
    bus: B,
    model: Box<dyn ScaleModel>,
    prompt_hook: Option<Box<dyn PromptHook>>,
    cache: EntityCache,
    tracker: ProcessingTracker,
    subscriptions: Vec<(EventKind, SubscriptionId)>,
    debounce: Deadline<Deferred>,
    chat_switch: Deadline<Deferred>,
    initialized: bool,
}

impl<S, M, B> SyncEngine<S, M, B>
where
    S: VariableStore,
    M: MessageSource,
    B: EventBus,
{
    pub fn new(config: EngineConfig, store: S, messages: M, bus: B) -> Result<Self, EngineError> {
        config.validate()?;
        let parser = DirectiveParser::new(&config.parser)?;
        let layout = StoreLayout::new(&config.parser).map_err(ConfigError::from)?;
        Ok(Self {
            config,
            layout,
            parser,
            store,
            messages,
            bus,
            model: Box::new(StandardScaleModel::default()),
            prompt_hook: None,
            cache: EntityCache::new(),
            tracker: ProcessingTracker::new(),
            subscriptions: Vec::new(),
            debounce: Deadline::new(),
            chat_switch: Deadline::new(),
            initialized: false,
        })
    }

    /// Build an engine from a RON config file.
    pub fn from_config_file(path: &Path, store: S, messages: M, bus: B) -> Result<Self, EngineError> {
        let config = EngineConfig::load_from_ron(path)?;
        Self::new(config, store, messages, bus)
    }

    pub fn with_model(mut self, model: impl ScaleModel + 'static) -> Self {
        self.model = Box::new(model);
        self
    }

    pub fn with_prompt_hook(mut self, hook: impl PromptHook + 'static) -> Self {
        self.prompt_hook = Some(Box::new(hook));
        self
    }

    /// Subscribe to every event kind, migrate legacy data and restore the
    /// persisted processing state. A failed subscription is logged and the
    /// rest still register. Returns the number of live subscriptions.
    pub fn init(&mut self) -> usize {
        if self.initialized {
            debug!("engine already initialized");
            return self.subscriptions.len();
        }

        for kind in EventKind::ALL {
            match self.bus.subscribe(kind) {
                Ok(id) => self.subscriptions.push((kind, id)),
                Err(err) => error!(event = %kind, error = %err, "subscription failed"),
            }
        }

        let latest = self.store.document(MessageScope::Latest).ok().flatten();
        let reader = StoreReader::new(&self.layout);
        let has_legacy = latest
            .as_ref()
            .and_then(|doc| reader.read(doc))
            .is_some_and(|snapshot| !snapshot.legacy_names.is_empty());
        let persisted = latest.as_ref().and_then(|doc| reader.processing_state(doc));
        if has_legacy {
            self.writer(0).migrate_legacy_layout(MessageScope::Latest);
        }

        if self.tracker.restore(persisted) {
            debug!(state = ?self.tracker.last(), "restored processing state");
        }

        self.initialized = true;
        info!(subscriptions = self.subscriptions.len(), "sync engine initialized");
        self.subscriptions.len()
    }

    /// Unsubscribe everything, cancel pending work and forget all state.
    pub fn teardown(&mut self) {
        for (kind, id) in self.subscriptions.drain(..) {
            if let Err(err) = self.bus.unsubscribe(id) {
                warn!(event = %kind, error = %err, "unsubscribe failed");
            }
        }
        self.debounce.cancel();
        self.chat_switch.cancel();
        self.cache.clear_all();
        self.tracker.reset();
        self.initialized = false;
        info!("sync engine torn down");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Deliver one host event. Immediate work runs now; a failure is logged
    /// and never affects later events.
    pub fn dispatch(&mut self, event: HostEvent, now_ms: u64) -> Option<ProcessOutcome> {
        if !self.initialized {
            warn!(event = %event.kind(), "event before init, ignoring");
            return None;
        }
        debug!(event = ?event, now_ms, "dispatching event");

        let result = match event {
            HostEvent::BranchSwitch { message_id } => {
                self.process(MessageScope::Message(message_id), Policy::VariableFirst, now_ms)
            }
            HostEvent::UserEdit { message_id } => {
                self.process(MessageScope::Message(message_id), Policy::ValueDiff, now_ms)
            }
            HostEvent::GenericUpdate { message_id } => {
                if self.debounce.schedule(now_ms, self.config.debounce_ms, Deferred::Update(message_id)) {
                    debug!("debounced update superseded");
                }
                return None;
            }
            HostEvent::MessageDeleted { .. } => {
                self.process(MessageScope::Latest, Policy::VariableFirst, now_ms)
            }
            HostEvent::GenerationComplete { message_id } => {
                self.process(MessageScope::Message(message_id), Policy::AlwaysParse, now_ms)
            }
            HostEvent::ChatSwitch { chat_id } => {
                info!(chat = ?chat_id, "chat switched, clearing state");
                self.cache.clear_all();
                self.tracker.reset();
                self.debounce.cancel();
                self.chat_switch
                    .schedule(now_ms, self.config.chat_switch_delay_ms, Deferred::Reparse);
                return None;
            }
            HostEvent::PreGeneration => {
                self.refresh_prompt();
                return None;
            }
        };

        match result {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                error!(error = %err, "event handler failed");
                None
            }
        }
    }

    /// Run deferred work whose deadline has passed.
    pub fn poll(&mut self, now_ms: u64) -> Vec<ProcessOutcome> {
        let due: Vec<Deferred> = [self.chat_switch.take_due(now_ms), self.debounce.take_due(now_ms)]
            .into_iter()
            .flatten()
            .collect();

        let mut outcomes = Vec::new();
        for task in due {
            let result = match task {
                Deferred::Update(message_id) => {
                    let scope = message_id.map(MessageScope::Message).unwrap_or_default();
                    self.process(scope, Policy::VariableFirst, now_ms)
                }
                Deferred::Reparse => self.process(MessageScope::Latest, Policy::AlwaysParse, now_ms),
            };
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => error!(error = %err, "deferred task failed"),
            }
        }
        outcomes
    }

    /// Earliest time `poll` has work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        match (self.debounce.due_at(), self.chat_switch.due_at()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Turn one message scope into cache state under `policy`.
    ///
    /// Variable-first reconciles straight from the store when the scope
    /// already holds a valid entity and otherwise parses. Parsing is
    /// skipped for a message whose id and content hash match the last
    /// processed one, except under [`Policy::ValueDiff`] which always
    /// parses. Reconciliation runs in every case. A message id past the end
    /// of the store history is read and written at `latest`.
    pub fn process(
        &mut self,
        scope: MessageScope,
        policy: Policy,
        now_ms: u64,
    ) -> Result<ProcessOutcome, EngineError> {
        let requested = scope;
        let scope = self.store.readable_scope(requested);
        if scope != requested {
            debug!(requested = %requested, "scope out of range, reading latest");
        }
        let mut outcome = ProcessOutcome {
            scope,
            policy,
            parsed: false,
            skipped: false,
            applied: 0,
            report: SyncReport::default(),
        };

        if policy == Policy::VariableFirst && self.scope_has_valid_data(scope) {
            debug!(scope = %scope, "using persisted variables");
            outcome.report = self.sync_store_to_cache(scope);
            return Ok(outcome);
        }

        let message_id = requested.message_id().or_else(|| self.messages.latest_message_id());
        let text = message_id.and_then(|id| self.messages.message_text(id).map(|text| (id, text)));

        match text {
            None => debug!(scope = %scope, "no message text to parse"),
            Some((id, text)) => {
                let force = policy == Policy::ValueDiff;
                if !force && self.tracker.is_processed(id, &text) {
                    outcome.skipped = true;
                } else {
                    let (applied, landed) = self.parse_and_apply(id, &text, scope, policy, now_ms)?;
                    outcome.parsed = true;
                    outcome.applied = applied;
                    outcome.scope = landed;
                }
            }
        }

        outcome.report = self.sync_store_to_cache(outcome.scope);
        Ok(outcome)
    }

    fn parse_and_apply(
        &mut self,
        message_id: u32,
        text: &str,
        scope: MessageScope,
        policy: Policy,
        now_ms: u64,
    ) -> Result<(usize, MessageScope), EngineError> {
        let mut directives = if self.parser.has_directives(text) {
            self.parser.parse_directives(text)
        } else {
            Vec::new()
        };
        let entities = self.parser.affected_entity_names(&directives);
        if policy == Policy::ValueDiff {
            let before = directives.len();
            directives = filter_changed(&self.store, scope, &directives);
            debug!(kept = directives.len(), dropped = before - directives.len(), "value diff");
        }

        let receipt = self.writer(now_ms).apply_directives_with_receipt(&directives, scope);
        let landed = receipt.scope.ok_or(EngineError::WriteFailed { scope })?;

        let state = ProcessingState::new(message_id, text, now_ms, entities);
        self.writer(now_ms).write_processing_state(&state, landed);
        self.tracker.record(state);
        info!(message_id, applied = receipt.applied, scope = %landed, "processed message");
        Ok((receipt.applied, landed))
    }

    fn scope_has_valid_data(&self, scope: MessageScope) -> bool {
        match self.store.document(scope) {
            Ok(Some(doc)) => StoreReader::new(&self.layout)
                .read(&doc)
                .is_some_and(|snapshot| snapshot.has_valid_entity()),
            Ok(None) => false,
            Err(err) => {
                debug!(scope = %scope, error = %err, "scope unreadable");
                false
            }
        }
    }

    fn refresh_prompt(&mut self) {
        if !self.config.auto_inject {
            debug!("prompt injection disabled");
            return;
        }
        if let Some(hook) = self.prompt_hook.as_mut() {
            hook.refresh(&self.cache);
        }
    }

    /// Rebuild the cache for `scope` from the store.
    pub fn sync_store_to_cache(&mut self, scope: MessageScope) -> SyncReport {
        Reconciler::new(&self.config, &self.layout, self.model.as_ref())
            .sync_store_to_cache(&self.store, &mut self.cache, scope)
    }

    /// Persist cache edits made through the write API.
    pub fn sync_cache_to_store(&mut self, now_ms: u64) -> SyncReport {
        Reconciler::new(&self.config, &self.layout, self.model.as_ref())
            .sync_cache_to_store(&mut self.store, &self.cache, now_ms)
    }

    /// Direct store writes using the configured layout and history cap.
    pub fn writer(&mut self, now_ms: u64) -> StoreWriter<'_> {
        StoreWriter::new(&mut self.store, &self.layout, self.config.history_cap).at(now_ms)
    }

    pub fn list_entity_names(&self) -> Vec<String> {
        self.cache.list_entity_names()
    }

    pub fn get_entity(&self, name: &str) -> Option<&EntityRecord> {
        self.cache.get_entity(name)
    }

    pub fn get_scenario(&self) -> Option<&ScenarioRecord> {
        self.cache.get_scenario()
    }

    pub fn get_interactions(&self) -> Vec<&InteractionRecord> {
        self.cache.get_interactions().values().collect()
    }

    pub fn has_any_entity(&self) -> bool {
        self.cache.has_any_entity()
    }

    pub fn upsert_entity(&mut self, name: &str, record: EntityRecord) {
        self.cache.upsert_entity(name, record);
    }

    pub fn remove_entity(&mut self, name: &str) -> Option<EntityRecord> {
        self.cache.remove_entity(name)
    }

    /// Empty the cache. The store is untouched.
    pub fn clear_all(&mut self) {
        self.cache.clear_all();
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn parser(&self) -> &DirectiveParser {
        &self.parser
    }

    pub fn processing_state(&self) -> Option<&ProcessingState> {
        self.tracker.last()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn messages(&self) -> &M {
        &self.messages
    }

    pub fn messages_mut(&mut self) -> &mut M {
        &mut self.messages
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ParserConfig;
    use crate::core::events::{RecordingBus, VecMessages};
    use crate::core::store::MemoryStore;
    use crate::schema::path::KeyPath;
    use serde_json::json;

    type TestEngine = SyncEngine<MemoryStore, VecMessages, RecordingBus>;

    fn config() -> EngineConfig {
        EngineConfig {
            parser: ParserConfig {
                prefix: "p".to_string(),
                block_tag: "UPDATE_BLOCK".to_string(),
                setter: "setter".to_string(),
            },
            ..EngineConfig::default()
        }
    }

    fn engine(store: MemoryStore, messages: VecMessages) -> TestEngine {
        let mut engine = SyncEngine::new(config(), store, messages, RecordingBus::new()).unwrap();
        engine.init();
        engine
    }

    #[test]
    fn init_subscribes_every_kind() {
        let mut engine = engine(MemoryStore::new(), VecMessages::new());
        assert_eq!(engine.bus().subscription_count(), EventKind::ALL.len());
        engine.teardown();
        assert_eq!(engine.bus().subscription_count(), 0);
        assert!(!engine.is_initialized());
    }

    #[test]
    fn events_before_init_are_ignored() {
        let mut engine =
            SyncEngine::new(config(), MemoryStore::with_messages(1), VecMessages::new(), RecordingBus::new())
                .unwrap();
        assert!(engine.dispatch(HostEvent::GenerationComplete { message_id: 0 }, 0).is_none());
    }

    #[test]
    fn generation_complete_parses_and_syncs() {
        let mut messages = VecMessages::new();
        messages.push("<UPDATE_BLOCK>setter('p.entity.A.currentScale', 12)</UPDATE_BLOCK>");
        let mut engine = engine(MemoryStore::with_messages(1), messages);

        let outcome = engine
            .dispatch(HostEvent::GenerationComplete { message_id: 0 }, 10)
            .unwrap();
        assert!(outcome.parsed);
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.report.entity_count, 1);
        assert_eq!(engine.get_entity("A").unwrap().current_scale, Some(12.0));
        assert_eq!(engine.processing_state().unwrap().entities, vec!["A".to_string()]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut bad = config();
        bad.parser.prefix = String::new();
        let result = SyncEngine::new(bad, MemoryStore::new(), VecMessages::new(), RecordingBus::new());
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn debounce_coalesces_updates() {
        let mut messages = VecMessages::new();
        messages.push("setter('p.entity.A.currentScale', 2)");
        let mut engine = engine(MemoryStore::with_messages(1), messages);

        assert!(engine.dispatch(HostEvent::GenericUpdate { message_id: None }, 0).is_none());
        assert!(engine.dispatch(HostEvent::GenericUpdate { message_id: None }, 60).is_none());
        assert_eq!(engine.next_deadline(), Some(160));
        assert!(engine.poll(120).is_empty());
        let outcomes = engine.poll(160);
        assert_eq!(outcomes.len(), 1);
        assert!(engine.has_any_entity());
        assert!(engine.poll(1_000).is_empty());
    }

    #[test]
    fn pre_generation_is_gated() {
        use std::cell::Cell;
        use std::rc::Rc;

        struct Counter(Rc<Cell<usize>>);
        impl PromptHook for Counter {
            fn refresh(&mut self, _cache: &EntityCache) {
                self.0.set(self.0.get() + 1);
            }
        }

        let calls = Rc::new(Cell::new(0));
        let mut engine = engine(MemoryStore::with_messages(1), VecMessages::new())
            .with_prompt_hook(Counter(calls.clone()));
        engine.dispatch(HostEvent::PreGeneration, 0);
        assert_eq!(calls.get(), 1);

        engine.config.auto_inject = false;
        engine.dispatch(HostEvent::PreGeneration, 0);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn init_restores_processing_state_and_migrates() {
        let mut store = MemoryStore::with_messages(1);
        store
            .set(
                &KeyPath::parse("p").unwrap(),
                json!({
                    "Old": { "currentScale": 3 },
                    "meta": { "processing": { "messageId": 0, "contentHash": "0" } },
                }),
                MessageScope::Latest,
            )
            .unwrap();
        let engine = engine(store, VecMessages::new());
        assert_eq!(engine.processing_state().unwrap().message_id, 0);
        assert_eq!(
            engine
                .store()
                .get(&KeyPath::parse("p.entity.Old.currentScale").unwrap(), MessageScope::Latest)
                .unwrap(),
            Some(json!(3))
        );
    }
}
