//! Extracts normalized records from a scoped store document.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::core::document;
use crate::core::layout::{StoreLayout, RESERVED_KEYS};
use crate::schema::entity::{fields, EntityRecord};
use crate::schema::scenario::{InteractionRecord, ScenarioRecord};

/// Everything the engine owns inside one scoped document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub entities: BTreeMap<String, EntityRecord>,
    pub scenario: Option<ScenarioRecord>,
    pub interactions: BTreeMap<String, InteractionRecord>,
    /// Names that were found only in the legacy flat layout.
    pub legacy_names: Vec<String>,
}

impl StoreSnapshot {
    /// Entities with a usable scale, in name order.
    pub fn valid_entities(&self) -> impl Iterator<Item = (&String, &EntityRecord)> {
        self.entities.iter().filter(|(_, record)| record.is_valid())
    }

    pub fn has_valid_entity(&self) -> bool {
        self.valid_entities().next().is_some()
    }
}

pub struct StoreReader<'a> {
    layout: &'a StoreLayout,
}

impl<'a> StoreReader<'a> {
    pub fn new(layout: &'a StoreLayout) -> Self {
        Self { layout }
    }

    /// Read the engine's records out of `doc`. `None` when the prefix root
    /// is missing or not an object.
    pub fn read(&self, doc: &Value) -> Option<StoreSnapshot> {
        let root = document::get(doc, self.layout.root())?.as_object()?;
        let mut snapshot = StoreSnapshot::default();

        if let Some(entities) = document::get(doc, self.layout.entities()).and_then(Value::as_object) {
            for (name, value) in entities {
                if let Some(record) = EntityRecord::from_value(value) {
                    snapshot.entities.insert(name.clone(), record);
                }
            }
        }

        for (name, value) in legacy_entities(root) {
            if snapshot.entities.contains_key(name) {
                continue;
            }
            if let Some(record) = EntityRecord::from_value(value) {
                debug!(entity = %name, "read entity from legacy layout");
                snapshot.legacy_names.push(name.clone());
                snapshot.entities.insert(name.clone(), record);
            }
        }

        snapshot.scenario = document::get(doc, self.layout.scenario()).and_then(ScenarioRecord::from_value);

        if let Some(interactions) =
            document::get(doc, self.layout.interactions()).and_then(Value::as_object)
        {
            for (key, value) in interactions {
                if let Some(record) = InteractionRecord::from_value(value) {
                    snapshot.interactions.insert(key.clone(), record);
                }
            }
        }

        Some(snapshot)
    }

    /// Read and tolerate an absent document.
    pub fn read_optional(&self, doc: Option<&Value>) -> Option<StoreSnapshot> {
        doc.and_then(|doc| self.read(doc))
    }

    /// Raw value currently stored at the processing-state path.
    pub fn processing_state<'d>(&self, doc: &'d Value) -> Option<&'d Value> {
        document::get(doc, self.layout.processing())
    }
}

/// Children of the root that look like entity records stored in the
/// legacy flat layout: non-reserved objects carrying a current scale.
pub fn legacy_entities(root: &Map<String, Value>) -> impl Iterator<Item = (&String, &Value)> {
    root.iter().filter(|(key, value)| {
        !RESERVED_KEYS.contains(&key.as_str())
            && value.as_object().is_some_and(|obj| {
                obj.contains_key(fields::CURRENT_SCALE) || obj.contains_key("current_scale")
            })
    })
}
