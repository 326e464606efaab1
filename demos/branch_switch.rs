/// Branch Switch example: a giantess story told across swipes and edits.
///
/// Generation → second message → swipe to an alternative → user edit →
/// swipe back to persisted variables → prompt refresh.
///
/// Run with: cargo run --example branch_switch

use variable_sync::core::cache::EntityCache;
use variable_sync::core::config::EngineConfig;
use variable_sync::core::engine::{PromptHook, SyncEngine};
use variable_sync::core::events::{RecordingBus, VecMessages};
use variable_sync::core::store::{MemoryStore, VariableStore};
use variable_sync::schema::event::HostEvent;
use variable_sync::schema::scope::MessageScope;

/// Prints the size summary a prompt template would receive.
struct SizeSummary;

impl PromptHook for SizeSummary {
    fn refresh(&mut self, cache: &EntityCache) {
        println!("  [prompt] scenario: {}", cache.get_scenario().and_then(|s| s.current.as_deref()).unwrap_or("unknown"));
        for (name, entity) in cache.entities() {
            let height = entity
                .calculation
                .as_ref()
                .and_then(|c| c["heightM"].as_f64())
                .unwrap_or_default();
            println!("  [prompt] {} stands {:.1} m tall", name, height);
        }
    }
}

fn show<S: VariableStore>(label: &str, engine: &SyncEngine<S, VecMessages, RecordingBus>) {
    println!("--- {} ---", label);
    for name in engine.list_entity_names() {
        if let Some(entity) = engine.get_entity(&name) {
            println!(
                "  {}: x{} ({} history entries)",
                name,
                entity.current_scale.unwrap_or_default(),
                entity.history.len()
            );
        }
    }
    for pair in engine.get_interactions() {
        println!("  {} is {:.1}x {}", pair.larger, pair.ratio, pair.smaller);
    }
    println!();
}

fn main() {
    let config = EngineConfig::load_from_ron(std::path::Path::new("config/engine.ron"))
        .expect("Failed to load engine config");

    let mut engine = SyncEngine::new(config, MemoryStore::new(), VecMessages::new(), RecordingBus::new())
        .expect("Failed to build engine")
        .with_prompt_hook(SizeSummary);
    engine.init();

    // --- Message 0: the potion ---
    engine.messages_mut().push(
        "Lena uncorks the vial and the tavern floor drops away beneath her.\n\
         <UpdateVariable>\n\
         _.set('scale.entity.Lena.currentScale', 1, 6);\n\
         _.set('scale.entity.Lena.reason', 'shrinking potion, reversed');\n\
         _.set('scale.entity.Rook.currentScale', 1);\n\
         _.set('scale.scenario.current', 'town');\n\
         </UpdateVariable>",
    );
    engine.store_mut().push_message();
    engine.dispatch(HostEvent::GenerationComplete { message_id: 0 }, 0);
    show("after message 0", &engine);

    // --- Message 1: she keeps growing ---
    engine.messages_mut().push(
        "The rafters split. _.set('scale.entity.Lena.currentScale', 40) Rook scrambles onto her palm.",
    );
    engine.store_mut().push_message();
    engine.dispatch(HostEvent::GenerationComplete { message_id: 1 }, 1_000);
    show("after message 1", &engine);

    // --- Swipe: a fresh alternative with no variables yet ---
    engine.messages_mut().replace(
        1,
        "She stops at the roofline. <UpdateVariable>_.set('scale.entity.Lena.currentScale', 12);</UpdateVariable>",
    );
    engine
        .store_mut()
        .replace_document(1, None)
        .expect("message 1 exists");
    let outcome = engine.dispatch(HostEvent::BranchSwitch { message_id: 1 }, 2_000);
    println!("swipe parsed text: {}", outcome.is_some_and(|o| o.parsed));
    show("after swipe", &engine);

    // --- User edit: only the changed value is written ---
    engine.messages_mut().replace(
        1,
        "She stops at the roofline. <UpdateVariable>_.set('scale.entity.Lena.currentScale', 15);</UpdateVariable>",
    );
    if let Some(outcome) = engine.dispatch(HostEvent::UserEdit { message_id: 1 }, 3_000) {
        println!("edit wrote {} value(s)", outcome.applied);
    }
    show("after edit", &engine);

    // --- Swipe back: persisted variables win, nothing is parsed ---
    let outcome = engine.dispatch(HostEvent::BranchSwitch { message_id: 0 }, 4_000);
    println!("swipe back parsed text: {}", outcome.is_some_and(|o| o.parsed));
    show("message 0 again", &engine);

    // --- Before the next generation ---
    engine.sync_store_to_cache(MessageScope::Latest);
    engine.dispatch(HostEvent::PreGeneration, 5_000);
}
