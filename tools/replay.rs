/// Replay: runs a scripted chat transcript through an in-memory engine.
///
/// Usage: replay <transcript.ron> [--config <engine.ron>] [--json]
///
/// Each step prints what the engine did and the cached entities afterwards.
/// With --json the final cache is also dumped as JSON.

use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;
use variable_sync::core::config::EngineConfig;
use variable_sync::core::replay::{Replay, StepReport};
use variable_sync::schema::transcript::Transcript;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,variable_sync=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let transcript_path = args[1].clone();
    let mut config_path = None;
    let mut dump_json = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--json" => dump_json = true,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let transcript = match Transcript::load_from_ron(Path::new(&transcript_path)) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("ERROR: Failed to load transcript: {}", e);
            process::exit(1);
        }
    };

    let fallback = match config_path {
        Some(path) => match EngineConfig::load_from_ron(Path::new(&path)) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("ERROR: Failed to load config: {}", e);
                process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    let mut replay = match Replay::for_transcript(&transcript, fallback) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("ERROR: Failed to build engine: {}", e);
            process::exit(1);
        }
    };

    println!("Replaying {} step(s) from {}\n", transcript.steps.len(), transcript_path);
    for step in &transcript.steps {
        let report = replay.step(step);
        print_report(&report);
    }

    let engine = replay.engine();
    println!("\n=== Final cache ===");
    for name in engine.list_entity_names() {
        if let Some(entity) = engine.get_entity(&name) {
            println!(
                "  {}: scale {} (base {}), {} history entries",
                name,
                entity.current_scale.unwrap_or_default(),
                entity.base_scale,
                entity.history.len()
            );
        }
    }
    if let Some(scenario) = engine.get_scenario() {
        println!("  scenario: {}", scenario.current.as_deref().unwrap_or("-"));
    }
    for pair in engine.get_interactions() {
        println!("  {} > {} (x{:.2})", pair.larger, pair.smaller, pair.ratio);
    }

    if dump_json {
        let entities: serde_json::Map<String, serde_json::Value> = engine
            .cache()
            .entities()
            .iter()
            .map(|(name, record)| (name.clone(), record.to_value()))
            .collect();
        let dump = serde_json::json!({
            "entities": entities,
            "scenario": engine.get_scenario().map(|s| s.to_value()),
        });
        match serde_json::to_string_pretty(&dump) {
            Ok(text) => println!("\n{}", text),
            Err(e) => eprintln!("ERROR: Failed to serialize cache: {}", e),
        }
    }
}

fn print_report(report: &StepReport) {
    println!("[{:>3}] t={}ms {:?}", report.index, report.now_ms, report.step);
    for outcome in &report.outcomes {
        println!(
            "      {:?} at {}: parsed={} skipped={} applied={} synced={}",
            outcome.policy,
            outcome.scope,
            outcome.parsed,
            outcome.skipped,
            outcome.applied,
            outcome.report.entity_count
        );
    }
    println!("      entities: [{}]", report.entities.join(", "));
}

fn print_usage() {
    println!("Usage: replay <transcript.ron> [--config <engine.ron>] [--json]");
}
