//! Where engine-owned records live inside a scoped store document.

use crate::core::config::ParserConfig;
use crate::schema::entity::fields;
use crate::schema::path::{KeyPath, PathError};

pub const ENTITY_KEY: &str = "entity";
pub const SCENARIO_KEY: &str = "scenario";
pub const INTERACTIONS_KEY: &str = "interactions";
pub const META_KEY: &str = "meta";
pub const PROCESSING_KEY: &str = "processing";

/// Children of the root that are never legacy entity records.
pub const RESERVED_KEYS: &[&str] = &[ENTITY_KEY, SCENARIO_KEY, INTERACTIONS_KEY, META_KEY];

/// Resolved paths for one configured prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreLayout {
    root: KeyPath,
    entities: KeyPath,
    scenario: KeyPath,
    interactions: KeyPath,
    processing: KeyPath,
}

/// A path that addresses something below one entity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityPath<'a> {
    pub name: &'a str,
    /// First segment below the entity, if any.
    pub field: Option<&'a str>,
}

impl StoreLayout {
    pub fn new(config: &ParserConfig) -> Result<StoreLayout, PathError> {
        let root = KeyPath::parse(&config.prefix)?;
        Ok(StoreLayout {
            entities: root.join(ENTITY_KEY),
            scenario: root.join(SCENARIO_KEY),
            interactions: root.join(INTERACTIONS_KEY),
            processing: root.join(META_KEY).join(PROCESSING_KEY),
            root,
        })
    }

    pub fn root(&self) -> &KeyPath {
        &self.root
    }

    pub fn entities(&self) -> &KeyPath {
        &self.entities
    }

    pub fn scenario(&self) -> &KeyPath {
        &self.scenario
    }

    pub fn interactions(&self) -> &KeyPath {
        &self.interactions
    }

    pub fn processing(&self) -> &KeyPath {
        &self.processing
    }

    pub fn entity(&self, name: &str) -> KeyPath {
        self.entities.join(name)
    }

    pub fn entity_field(&self, name: &str, field: &str) -> KeyPath {
        self.entities.join(name).join(field)
    }

    pub fn history(&self, name: &str) -> KeyPath {
        self.entity_field(name, fields::HISTORY)
    }

    /// Recognise the canonical entity-path shape `<prefix>.entity.<name>[.<field>...]`.
    pub fn entity_path<'a>(&self, path: &'a KeyPath) -> Option<EntityPath<'a>> {
        let rest = path.strip_prefix(&self.entities)?;
        let name = rest.first()?;
        Some(EntityPath {
            name: name.as_str(),
            field: rest.get(1).map(String::as_str),
        })
    }

    /// True for paths at or below the configured prefix.
    pub fn owns(&self, path: &KeyPath) -> bool {
        path.starts_with(&self.root)
    }
}
