//! Persisted-store writer.
//!
//! Every write goes through [`StoreWriter::safe_apply`]: the transform runs
//! at the requested scope, and when the host reports that message as out of
//! range it is retried once at `latest`. A failure after the retry is logged
//! and reported through the return value; nothing here panics or returns an
//! error to the caller.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use crate::core::document;
use crate::core::hash::deep_equal;
use crate::core::layout::{StoreLayout, ENTITY_KEY};
use crate::core::processing::ProcessingState;
use crate::core::reader::legacy_entities;
use crate::core::store::VariableStore;
use crate::schema::directive::Directive;
use crate::schema::entity::{fields, lenient_f64, EntityRecord, HistoryEntry};
use crate::schema::path::KeyPath;
use crate::schema::scenario::ScenarioRecord;
use crate::schema::scope::MessageScope;

/// How `append_to_array` decides two items are the same.
pub enum DedupeKey<'k> {
    /// Compare one named field of object items.
    Field(&'k str),
    /// Compare a key derived from each item.
    Derived(&'k dyn Fn(&Value) -> String),
}

impl DedupeKey<'_> {
    fn key_of(&self, item: &Value) -> Option<Value> {
        match self {
            Self::Field(name) => item.get(*name).cloned(),
            Self::Derived(derive) => Some(Value::String(derive(item))),
        }
    }
}

/// Result of a batch application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReceipt {
    pub applied: usize,
    /// Scope the write landed in, `None` when it failed.
    pub scope: Option<MessageScope>,
}

pub struct StoreWriter<'a> {
    store: &'a mut dyn VariableStore,
    layout: &'a StoreLayout,
    history_cap: usize,
    now_ms: u64,
}

impl<'a> StoreWriter<'a> {
    pub fn new(store: &'a mut dyn VariableStore, layout: &'a StoreLayout, history_cap: usize) -> Self {
        Self {
            store,
            layout,
            history_cap: history_cap.max(1),
            now_ms: 0,
        }
    }

    /// Timestamp stamped onto history entries written by this writer.
    pub fn at(mut self, now_ms: u64) -> Self {
        self.now_ms = now_ms;
        self
    }

    /// Run `transform` at `scope`, falling back to `latest` when the scope
    /// is out of range. Returns the scope the write landed in.
    pub fn safe_apply(
        &mut self,
        scope: MessageScope,
        transform: &mut dyn FnMut(&mut Value),
    ) -> Option<MessageScope> {
        match self.store.update(scope, transform) {
            Ok(()) => Some(scope),
            Err(err) if err.is_out_of_range() && !scope.is_latest() => {
                warn!(scope = %scope, error = %err, "scope out of range, retrying at latest");
                match self.store.update(MessageScope::Latest, transform) {
                    Ok(()) => Some(MessageScope::Latest),
                    Err(err) => {
                        error!(error = %err, "write failed after fallback to latest");
                        None
                    }
                }
            }
            Err(err) => {
                error!(scope = %scope, error = %err, "write failed");
                None
            }
        }
    }

    /// Apply a batch of directives in one atomic update. Directives that
    /// set an entity's current scale also append a history entry.
    pub fn apply_directives(&mut self, directives: &[Directive], scope: MessageScope) -> usize {
        self.apply_directives_with_receipt(directives, scope).applied
    }

    pub fn apply_directives_with_receipt(
        &mut self,
        directives: &[Directive],
        scope: MessageScope,
    ) -> WriteReceipt {
        if directives.is_empty() {
            return WriteReceipt {
                applied: 0,
                scope: Some(self.store.readable_scope(scope)),
            };
        }

        let layout = self.layout;
        let cap = self.history_cap;
        let now = self.now_ms;
        let mut applied = 0;
        let landed = self.safe_apply(scope, &mut |doc| {
            applied = 0;
            for directive in directives {
                if let Err(err) = document::set(doc, &directive.path, directive.value.clone()) {
                    warn!(path = %directive.path, error = %err, "directive not applied");
                    continue;
                }
                applied += 1;

                let Some(entity) = layout.entity_path(&directive.path) else {
                    continue;
                };
                if entity.field == Some(fields::CURRENT_SCALE) {
                    if let Some(scale) = lenient_f64(&directive.value) {
                        let entry = HistoryEntry::new(scale, None, now);
                        push_history(doc, &layout.history(entity.name), entry, cap);
                    }
                }
            }
        });

        match landed {
            Some(landed) => {
                info!(applied, scope = %landed, "directives applied");
                WriteReceipt { applied, scope: Some(landed) }
            }
            None => WriteReceipt { applied: 0, scope: None },
        }
    }

    pub fn write_entity_field(&mut self, name: &str, field: &str, value: Value, scope: MessageScope) -> bool {
        let path = self.layout.entity_field(name, fields::canonical(field));
        self.write_path(&path, value, scope)
    }

    /// Append to an entity's history unless the scale repeats the last
    /// entry. Returns whether an entry was added.
    pub fn append_history(&mut self, name: &str, entry: HistoryEntry, scope: MessageScope) -> bool {
        let path = self.layout.history(name);
        let cap = self.history_cap;
        let mut added = false;
        let landed = self.safe_apply(scope, &mut |doc| {
            added = push_history(doc, &path, entry.clone(), cap);
        });
        landed.is_some() && added
    }

    pub fn write_scenario(&mut self, scenario: &ScenarioRecord, scope: MessageScope) -> bool {
        let path = self.layout.scenario().clone();
        self.write_path(&path, scenario.to_value(), scope)
    }

    /// Remove an entity and the interactions that mention it.
    pub fn delete_entity(&mut self, name: &str, scope: MessageScope) -> bool {
        let entity = self.layout.entity(name);
        let interactions = self.layout.interactions().clone();
        let legacy = self.layout.root().join(name);
        self.safe_apply(scope, &mut |doc| {
            document::unset(doc, &entity);
            document::unset(doc, &legacy);
            if let Some(Value::Object(map)) = document::get_mut(doc, &interactions) {
                map.retain(|_, v| {
                    v.get("larger").and_then(Value::as_str) != Some(name)
                        && v.get("smaller").and_then(Value::as_str) != Some(name)
                });
            }
        })
        .is_some()
    }

    /// Remove everything under the prefix.
    pub fn clear_all(&mut self, scope: MessageScope) -> bool {
        let root = self.layout.root().clone();
        let cleared = self
            .safe_apply(scope, &mut |doc| {
                document::unset(doc, &root);
            })
            .is_some();
        if cleared {
            info!(scope = %scope, "cleared all engine variables");
        }
        cleared
    }

    /// Write whole entity records (and optionally the scenario) in one update.
    /// Returns the number of entities written.
    pub fn batch_update_entities(
        &mut self,
        entities: &BTreeMap<String, EntityRecord>,
        scenario: Option<&ScenarioRecord>,
        scope: MessageScope,
    ) -> usize {
        if entities.is_empty() && scenario.is_none() {
            return 0;
        }
        let layout = self.layout;
        let mut written = 0;
        let landed = self.safe_apply(scope, &mut |doc| {
            written = 0;
            for (name, record) in entities {
                match document::set(doc, &layout.entity(name), record.to_value()) {
                    Ok(()) => written += 1,
                    Err(err) => warn!(entity = %name, error = %err, "entity not written"),
                }
            }
            if let Some(scenario) = scenario {
                if let Err(err) = document::set(doc, layout.scenario(), scenario.to_value()) {
                    warn!(error = %err, "scenario not written");
                }
            }
        });
        if landed.is_some() {
            written
        } else {
            0
        }
    }

    /// Set-like append: `item` is skipped when an element with the same
    /// dedupe key is already present. Returns whether it was inserted.
    pub fn append_to_array(
        &mut self,
        path: &KeyPath,
        item: Value,
        dedupe: &DedupeKey<'_>,
        scope: MessageScope,
    ) -> bool {
        let mut inserted = false;
        let landed = self.safe_apply(scope, &mut |doc| {
            inserted = false;
            match document::get(doc, path) {
                Some(Value::Array(_)) => {}
                Some(other) => {
                    warn!(path = %path, found = %other, "append target is not an array");
                    return;
                }
                None => {
                    if let Err(err) = document::set(doc, path, Value::Array(Vec::new())) {
                        warn!(path = %path, error = %err, "cannot create array");
                        return;
                    }
                }
            }
            let Some(Value::Array(array)) = document::get_mut(doc, path) else {
                return;
            };
            inserted = append_unique(array, item.clone(), dedupe);
        });
        landed.is_some() && inserted
    }

    /// Persist the processing bookkeeping record.
    pub fn write_processing_state(&mut self, state: &ProcessingState, scope: MessageScope) -> bool {
        let path = self.layout.processing().clone();
        self.write_path(&path, state.to_value(), scope)
    }

    /// Move entity records stored directly under the prefix root into the
    /// namespaced layout. Canonical values win over legacy ones field by
    /// field. Returns how many records were migrated; a second call on the
    /// same data returns 0.
    pub fn migrate_legacy_layout(&mut self, scope: MessageScope) -> usize {
        let layout = self.layout;
        let mut migrated = 0;
        let landed = self.safe_apply(scope, &mut |doc| {
            migrated = 0;
            let Some(Value::Object(root)) = document::get_mut(doc, layout.root()) else {
                return;
            };
            let legacy: Vec<(String, Value)> = legacy_entities(root)
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();
            if legacy.is_empty() {
                return;
            }

            for (name, _) in &legacy {
                root.remove(name);
            }
            let entities = root
                .entry(ENTITY_KEY)
                .or_insert_with(|| Value::Object(Map::new()));
            if !entities.is_object() {
                *entities = Value::Object(Map::new());
            }
            let Value::Object(entities) = entities else {
                return;
            };

            for (name, legacy_value) in legacy {
                let merged = match (entities.remove(&name), legacy_value) {
                    (Some(Value::Object(canonical)), Value::Object(old)) => {
                        let mut old = canonical_fields(old);
                        old.extend(canonical_fields(canonical));
                        Value::Object(old)
                    }
                    (_, Value::Object(old)) => Value::Object(canonical_fields(old)),
                    (_, old) => old,
                };
                entities.insert(name, merged);
                migrated += 1;
            }
        });

        if landed.is_none() {
            return 0;
        }
        if migrated > 0 {
            info!(migrated, "migrated legacy entity records");
        } else {
            debug!("no legacy entity records to migrate");
        }
        migrated
    }

    fn write_path(&mut self, path: &KeyPath, value: Value, scope: MessageScope) -> bool {
        let mut outcome = Ok(());
        let landed = self.safe_apply(scope, &mut |doc| {
            outcome = document::set(doc, path, value.clone());
        });
        match (landed, outcome) {
            (Some(_), Ok(())) => true,
            (Some(_), Err(err)) => {
                warn!(path = %path, error = %err, "value not written");
                false
            }
            (None, _) => false,
        }
    }
}

/// Append `entry` to the history array at `path` unless its scale equals
/// the last recorded one, then drop the oldest entries beyond `cap`.
fn push_history(doc: &mut Value, path: &KeyPath, entry: HistoryEntry, cap: usize) -> bool {
    let mut history = match document::get(doc, path) {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let scale = Value::from(entry.scale);
    let repeats_last = history
        .last()
        .map(|last| deep_equal(last.get("scale"), Some(&scale)))
        .unwrap_or(false);
    if repeats_last {
        debug!(path = %path, "history unchanged, skipping append");
        return false;
    }

    history.push(entry.to_value());
    if history.len() > cap {
        let excess = history.len() - cap;
        history.drain(..excess);
    }
    document::set(doc, path, Value::Array(history)).is_ok()
}

fn append_unique(array: &mut Vec<Value>, item: Value, dedupe: &DedupeKey<'_>) -> bool {
    let key = dedupe.key_of(&item);
    let duplicate = array
        .iter()
        .any(|existing| deep_equal(dedupe.key_of(existing).as_ref(), key.as_ref()));
    if duplicate {
        return false;
    }
    array.push(item);
    true
}

/// Rename snake_case field keys to their camelCase form. A key already
/// spelled canonically wins over its alias.
fn canonical_fields(record: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    let mut aliased = Vec::new();
    for (key, value) in record {
        let canonical = fields::canonical(&key);
        if canonical == key {
            out.insert(key, value);
        } else {
            aliased.push((canonical.to_string(), value));
        }
    }
    for (key, value) in aliased {
        out.entry(key).or_insert(value);
    }
    out
}
