//! Scope-bound in-memory snapshot read by the rest of the application.

use std::collections::BTreeMap;
use tracing::debug;

use crate::schema::entity::EntityRecord;
use crate::schema::scenario::{InteractionRecord, ScenarioRecord};
use crate::schema::scope::MessageScope;

/// Normalized entity, scenario and interaction state for one message scope.
///
/// All records belong to the scope last passed to [`EntityCache::ensure_scope`].
/// Moving to a different scope drops every record before anything new can
/// be admitted.
#[derive(Debug, Clone, Default)]
pub struct EntityCache {
    scope: Option<MessageScope>,
    entities: BTreeMap<String, EntityRecord>,
    scenario: Option<ScenarioRecord>,
    interactions: BTreeMap<String, InteractionRecord>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self) -> Option<MessageScope> {
        self.scope
    }

    /// Bind the cache to `scope`. Returns true when this cleared state.
    pub fn ensure_scope(&mut self, scope: MessageScope) -> bool {
        if self.scope == Some(scope) {
            return false;
        }
        let had_state = !self.is_empty();
        debug!(from = ?self.scope, to = %scope, "cache scope changed");
        self.clear_records();
        self.scope = Some(scope);
        had_state
    }

    pub fn list_entity_names(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }

    pub fn get_entity(&self, name: &str) -> Option<&EntityRecord> {
        self.entities.get(name)
    }

    pub fn entities(&self) -> &BTreeMap<String, EntityRecord> {
        &self.entities
    }

    pub fn get_scenario(&self) -> Option<&ScenarioRecord> {
        self.scenario.as_ref()
    }

    pub fn get_interactions(&self) -> &BTreeMap<String, InteractionRecord> {
        &self.interactions
    }

    pub fn has_any_entity(&self) -> bool {
        !self.entities.is_empty()
    }

    pub fn upsert_entity(&mut self, name: impl Into<String>, record: EntityRecord) {
        self.entities.insert(name.into(), record);
    }

    pub fn remove_entity(&mut self, name: &str) -> Option<EntityRecord> {
        self.interactions
            .retain(|_, pair| pair.larger != name && pair.smaller != name);
        self.entities.remove(name)
    }

    pub fn set_scenario(&mut self, scenario: Option<ScenarioRecord>) {
        self.scenario = scenario;
    }

    pub fn set_interactions(&mut self, interactions: BTreeMap<String, InteractionRecord>) {
        self.interactions = interactions;
    }

    /// Swap in a freshly reconciled snapshot for the current scope.
    pub fn replace(
        &mut self,
        entities: BTreeMap<String, EntityRecord>,
        scenario: Option<ScenarioRecord>,
        interactions: BTreeMap<String, InteractionRecord>,
    ) {
        self.entities = entities;
        self.scenario = scenario;
        self.interactions = interactions;
    }

    /// Drop all records and forget the scope.
    pub fn clear_all(&mut self) {
        self.clear_records();
        self.scope = None;
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.scenario.is_none() && self.interactions.is_empty()
    }

    fn clear_records(&mut self) {
        self.entities.clear();
        self.scenario = None;
        self.interactions.clear();
    }
}
