//! Reconciliation between the persisted store and the in-memory cache.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::core::cache::EntityCache;
use crate::core::config::EngineConfig;
use crate::core::layout::StoreLayout;
use crate::core::model::ScaleModel;
use crate::core::reader::StoreReader;
use crate::core::store::VariableStore;
use crate::core::writer::StoreWriter;
use crate::schema::entity::EntityRecord;
use crate::schema::scenario::InteractionRecord;
use crate::schema::scope::MessageScope;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub success: bool,
    pub entity_count: usize,
    pub error: Option<String>,
}

impl SyncReport {
    fn ok(entity_count: usize) -> Self {
        Self {
            success: true,
            entity_count,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            entity_count: 0,
            error: Some(error.into()),
        }
    }
}

pub struct Reconciler<'a> {
    config: &'a EngineConfig,
    layout: &'a StoreLayout,
    model: &'a dyn ScaleModel,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a EngineConfig, layout: &'a StoreLayout, model: &'a dyn ScaleModel) -> Self {
        Self {
            config,
            layout,
            model,
        }
    }

    /// Rebuild the cache for `scope` from the store, recomputing every
    /// derived field. The cache is emptied first whatever the outcome.
    pub fn sync_store_to_cache(
        &self,
        store: &dyn VariableStore,
        cache: &mut EntityCache,
        scope: MessageScope,
    ) -> SyncReport {
        cache.ensure_scope(scope);
        cache.replace(BTreeMap::new(), None, BTreeMap::new());

        let doc = match store.document(scope) {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                debug!(scope = %scope, "no variables stored for scope");
                return SyncReport::failed("no variables stored for scope");
            }
            Err(err) => {
                warn!(scope = %scope, error = %err, "cannot read store");
                return SyncReport::failed(err.to_string());
            }
        };
        let Some(snapshot) = StoreReader::new(self.layout).read(&doc) else {
            debug!(scope = %scope, root = %self.layout.root(), "no engine data in scope");
            return SyncReport::failed("no engine data in scope");
        };

        let density = self.config.density_for(snapshot.scenario.as_ref());
        let mut entities = BTreeMap::new();
        for (name, record) in snapshot.entities {
            match self.derive(record, density) {
                Some(record) => {
                    entities.insert(name, record);
                }
                None => debug!(entity = %name, "skipping entity without a valid scale"),
            }
        }

        let interactions = if self.config.interactions_enabled && entities.len() >= 2 {
            self.interactions(&entities)
        } else {
            BTreeMap::new()
        };

        let entity_count = entities.len();
        info!(
            scope = %scope,
            entities = entity_count,
            interactions = interactions.len(),
            "synced store to cache"
        );
        cache.replace(entities, snapshot.scenario, interactions);
        SyncReport::ok(entity_count)
    }

    /// Persist every cached entity and the scenario in one write. Does not
    /// touch the store when the cache holds nothing.
    pub fn sync_cache_to_store(
        &self,
        store: &mut dyn VariableStore,
        cache: &EntityCache,
        now_ms: u64,
    ) -> SyncReport {
        if cache.is_empty() {
            debug!("cache empty, nothing to persist");
            return SyncReport::ok(0);
        }
        let scope = cache.scope().unwrap_or_default();
        let written = StoreWriter::new(store, self.layout, self.config.history_cap)
            .at(now_ms)
            .batch_update_entities(cache.entities(), cache.get_scenario(), scope);

        if written == 0 && cache.has_any_entity() {
            return SyncReport::failed("store rejected cache write");
        }
        info!(scope = %scope, entities = written, "synced cache to store");
        SyncReport::ok(written)
    }

    fn derive(&self, mut record: EntityRecord, density: f64) -> Option<EntityRecord> {
        let current = record.valid_scale()?;
        record.calculation =
            Some(self.model.calculation(current, record.base_scale, &record.custom_overrides));
        record.damage = if self.config.damage_enabled && record.is_growing() {
            Some(self.model.damage(current, record.base_scale, &record.custom_overrides, density))
        } else {
            None
        };
        Some(record)
    }

    fn interactions(
        &self,
        entities: &BTreeMap<String, EntityRecord>,
    ) -> BTreeMap<String, InteractionRecord> {
        let scaled: Vec<(&String, f64)> = entities
            .iter()
            .filter_map(|(name, record)| record.valid_scale().map(|s| (name, s)))
            .collect();

        let mut pairs = BTreeMap::new();
        for (i, (first, first_scale)) in scaled.iter().enumerate() {
            for (second, second_scale) in &scaled[i + 1..] {
                let ((larger, big), (smaller, small)) = if second_scale > first_scale {
                    ((*second, *second_scale), (*first, *first_scale))
                } else {
                    ((*first, *first_scale), (*second, *second_scale))
                };
                let record = InteractionRecord {
                    larger: larger.clone(),
                    smaller: smaller.clone(),
                    ratio: big / small,
                    limits: self.model.interaction(big, small),
                };
                pairs.insert(record.key(), record);
            }
        }
        pairs
    }
}

/// Scenario currently visible to prompt consumers.
pub fn scenario_label(cache: &EntityCache) -> Option<&str> {
    cache.get_scenario().and_then(|s| s.current.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ParserConfig;
    use crate::core::model::StandardScaleModel;
    use crate::core::store::MemoryStore;
    use crate::schema::path::KeyPath;
    use serde_json::{json, Value};

    struct Fixture {
        config: EngineConfig,
        layout: StoreLayout,
        model: StandardScaleModel,
    }

    impl Fixture {
        fn new() -> Self {
            let config = EngineConfig {
                parser: ParserConfig {
                    prefix: "p".to_string(),
                    ..ParserConfig::default()
                },
                ..EngineConfig::default()
            };
            let layout = StoreLayout::new(&config.parser).unwrap();
            Self {
                config,
                layout,
                model: StandardScaleModel::default(),
            }
        }

        fn reconciler(&self) -> Reconciler<'_> {
            Reconciler::new(&self.config, &self.layout, &self.model)
        }
    }

    fn seed(store: &mut MemoryStore, scope: MessageScope, root: Value) {
        store.set(&KeyPath::parse("p").unwrap(), root, scope).unwrap();
    }

    #[test]
    fn derives_fields_for_valid_entities() {
        let fixture = Fixture::new();
        let mut store = MemoryStore::with_messages(1);
        seed(
            &mut store,
            MessageScope::Latest,
            json!({
                "entity": {
                    "Alice": { "currentScale": 12 },
                    "Bob": { "currentScale": 1 },
                    "Ghost": { "currentScale": -1 },
                },
                "scenario": { "current": "City" },
            }),
        );
        let mut cache = EntityCache::new();
        let report = fixture.reconciler().sync_store_to_cache(&store, &mut cache, MessageScope::Latest);

        assert_eq!(report, SyncReport::ok(2));
        let alice = cache.get_entity("Alice").unwrap();
        assert!(alice.calculation.is_some());
        assert_eq!(alice.damage.as_ref().unwrap()["density"], json!(10_000.0));
        assert!(cache.get_entity("Bob").unwrap().damage.is_none());
        assert!(cache.get_entity("Ghost").is_none());
        let pair = &cache.get_interactions()["Alice__Bob"];
        assert_eq!(pair.ratio, 12.0);
        assert_eq!(scenario_label(&cache), Some("City"));
    }

    #[test]
    fn density_override_wins() {
        let fixture = Fixture::new();
        let mut store = MemoryStore::with_messages(1);
        seed(
            &mut store,
            MessageScope::Latest,
            json!({
                "entity": { "A": { "currentScale": 3 } },
                "scenario": { "current": "city", "density": 5 },
            }),
        );
        let mut cache = EntityCache::new();
        fixture.reconciler().sync_store_to_cache(&store, &mut cache, MessageScope::Latest);
        assert_eq!(cache.get_entity("A").unwrap().damage.as_ref().unwrap()["density"], json!(5.0));
    }

    #[test]
    fn damage_disabled() {
        let mut fixture = Fixture::new();
        fixture.config.damage_enabled = false;
        fixture.config.interactions_enabled = false;
        let mut store = MemoryStore::with_messages(1);
        seed(
            &mut store,
            MessageScope::Latest,
            json!({ "entity": { "A": { "currentScale": 3 }, "B": { "currentScale": 2 } } }),
        );
        let mut cache = EntityCache::new();
        fixture.reconciler().sync_store_to_cache(&store, &mut cache, MessageScope::Latest);
        assert!(cache.get_entity("A").unwrap().damage.is_none());
        assert!(cache.get_interactions().is_empty());
    }

    #[test]
    fn missing_document_clears_cache() {
        let fixture = Fixture::new();
        let mut store = MemoryStore::with_messages(2);
        seed(
            &mut store,
            MessageScope::Message(0),
            json!({ "entity": { "A": { "currentScale": 3 } } }),
        );
        let mut cache = EntityCache::new();
        let reconciler = fixture.reconciler();
        assert!(reconciler.sync_store_to_cache(&store, &mut cache, MessageScope::Message(0)).success);
        assert!(cache.has_any_entity());

        let report = reconciler.sync_store_to_cache(&store, &mut cache, MessageScope::Message(1));
        assert!(!report.success);
        assert_eq!(report.entity_count, 0);
        assert!(cache.is_empty());
        assert_eq!(cache.scope(), Some(MessageScope::Message(1)));
    }

    #[test]
    fn same_scope_resync_drops_deleted_entities() {
        let fixture = Fixture::new();
        let mut store = MemoryStore::with_messages(1);
        seed(&mut store, MessageScope::Latest, json!({ "entity": { "A": { "currentScale": 3 } } }));
        let mut cache = EntityCache::new();
        let reconciler = fixture.reconciler();
        reconciler.sync_store_to_cache(&store, &mut cache, MessageScope::Latest);
        seed(&mut store, MessageScope::Latest, json!({ "entity": {} }));
        let report = reconciler.sync_store_to_cache(&store, &mut cache, MessageScope::Latest);
        assert_eq!(report, SyncReport::ok(0));
        assert!(!cache.has_any_entity());
    }

    #[test]
    fn cache_to_store_is_batched() {
        let fixture = Fixture::new();
        let mut store = MemoryStore::with_messages(1);
        let mut cache = EntityCache::new();
        cache.ensure_scope(MessageScope::Latest);
        cache.upsert_entity("A", EntityRecord::with_scale(2.0));
        cache.upsert_entity("B", EntityRecord::with_scale(4.0));

        let report = fixture.reconciler().sync_cache_to_store(&mut store, &cache, 0);
        assert_eq!(report, SyncReport::ok(2));
        assert_eq!(store.commits(), 1);
        assert_eq!(
            store.get(&KeyPath::parse("p.entity.B.currentScale").unwrap(), MessageScope::Latest).unwrap(),
            Some(json!(4.0))
        );
    }

    #[test]
    fn empty_cache_makes_no_store_call() {
        let fixture = Fixture::new();
        let mut store = MemoryStore::with_messages(1);
        let report = fixture.reconciler().sync_cache_to_store(&mut store, &EntityCache::new(), 0);
        assert!(report.success);
        assert!(store.attempts().is_empty());
    }
}
