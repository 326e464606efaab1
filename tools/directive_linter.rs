/// Directive Linter: checks generator output for malformed variable updates.
///
/// Usage: directive_linter <file_or_dir> [--config <engine.ron>]

use std::collections::HashMap;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;
use variable_sync::core::config::EngineConfig;
use variable_sync::core::directives::DirectiveParser;
use variable_sync::core::layout::StoreLayout;
use variable_sync::core::tokenizer::scan_calls;
use variable_sync::schema::entity::{fields, lenient_f64};
use variable_sync::schema::path::KeyPath;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: directive_linter <file_or_dir> [--config <engine.ron>]");
        process::exit(0);
    }

    let target = &args[1];
    let mut config_path = None;

    let mut i = 2;
    while i < args.len() {
        if args[i] == "--config" && i + 1 < args.len() {
            i += 1;
            config_path = Some(args[i].clone());
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => match EngineConfig::load_from_ron(Path::new(&path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("ERROR: Failed to load config: {}", e);
                process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    let parser = match DirectiveParser::new(&config.parser) {
        Ok(parser) => parser,
        Err(e) => {
            eprintln!("ERROR: Invalid parser config: {}", e);
            process::exit(1);
        }
    };
    let layout = match StoreLayout::new(&config.parser) {
        Ok(layout) => layout,
        Err(e) => {
            eprintln!("ERROR: Invalid prefix: {}", e);
            process::exit(1);
        }
    };

    let mut files = Vec::new();
    let target_path = Path::new(target);
    if target_path.is_file() {
        files.push(target_path.to_path_buf());
    } else if target_path.is_dir() {
        collect_text_files(target_path, &mut files);
    } else {
        eprintln!("ERROR: Path '{}' does not exist", target);
        process::exit(1);
    }

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for file in &files {
        let text = match std::fs::read_to_string(file) {
            Ok(text) => text,
            Err(e) => {
                errors.push(format!("{}: cannot read: {}", file.display(), e));
                continue;
            }
        };
        let name = file.display().to_string();
        let directives = parser.parse_directives(&text);
        println!("{}: {} directive(s)", name, directives.len());
        for directive in &directives {
            println!("  {} = {}", directive.path, directive.value);
        }
        lint_text(&name, &text, &parser, &layout, &mut errors, &mut warnings);
    }

    println!("\n=== Directive Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!("\nSummary: {} errors, {} warnings", errors.len(), warnings.len());

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn collect_text_files(dir: &Path, files: &mut Vec<std::path::PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_text_files(&path, files);
            } else if matches!(path.extension().and_then(|s| s.to_str()), Some("txt" | "md")) {
                files.push(path);
            }
        }
    }
}

fn lint_text(
    name: &str,
    text: &str,
    parser: &DirectiveParser,
    layout: &StoreLayout,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    let setter = &parser.config().setter;
    let mut seen: HashMap<String, usize> = HashMap::new();

    for call in scan_calls(text, setter, 0) {
        let line = text[..call.offset].matches('\n').count() + 1;
        let path = match KeyPath::parse(&call.path) {
            Ok(path) => path,
            Err(e) => {
                errors.push(format!("{}:{}: invalid path '{}': {}", name, line, call.path, e));
                continue;
            }
        };

        match call.value_literal().map(str::trim) {
            None | Some("") => {
                errors.push(format!("{}:{}: '{}' has no value", name, line, path));
                continue;
            }
            Some(_) if call.args.len() > 1 => {
                warnings.push(format!(
                    "{}:{}: '{}' passes {} values, only the last is used",
                    name,
                    line,
                    path,
                    call.args.len()
                ));
            }
            Some(_) => {}
        }

        if let Some(previous) = seen.insert(path.to_string(), line) {
            warnings.push(format!(
                "{}:{}: '{}' already set on line {}, the later value wins",
                name, line, path, previous
            ));
        }

        let Some(entity) = layout.entity_path(&path) else {
            continue;
        };
        let Some(field) = entity.field else {
            warnings.push(format!("{}:{}: '{}' replaces a whole entity record", name, line, path));
            continue;
        };
        let canonical = fields::canonical(field);
        if canonical != field {
            warnings.push(format!("{}:{}: '{}' uses legacy field name, prefer '{}'", name, line, field, canonical));
        } else if !fields::KNOWN.contains(&field) {
            warnings.push(format!("{}:{}: unknown entity field '{}'", name, line, field));
        }
        if canonical == fields::CURRENT_SCALE {
            let numeric = call
                .value_literal()
                .and_then(variable_sync::core::literal::parse_literal)
                .as_ref()
                .and_then(lenient_f64)
                .is_some_and(|s| s > 0.0);
            if !numeric {
                errors.push(format!("{}:{}: '{}' is not a positive number", name, line, path));
            }
        }
    }
}
