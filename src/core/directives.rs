//! Directive parser: tagged blocks and standalone setter calls.

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::core::config::{ConfigError, ParserConfig};
use crate::core::layout::StoreLayout;
use crate::core::literal::parse_literal;
use crate::core::tokenizer::{scan_calls, RawCall};
use crate::schema::directive::Directive;
use crate::schema::entity::fields;
use crate::schema::path::KeyPath;

/// Extracts directives from generator output.
///
/// Text may carry directives in two forms at once: calls inside a
/// `<Tag>...</Tag>` block (any path), and standalone calls anywhere whose
/// path sits under the configured prefix. Both are folded in source order,
/// so when a path repeats the later call wins.
#[derive(Debug, Clone)]
pub struct DirectiveParser {
    config: ParserConfig,
    layout: StoreLayout,
    block: Regex,
    tag_probe: Regex,
    prefix_probe: Regex,
}

impl DirectiveParser {
    pub fn new(config: &ParserConfig) -> Result<DirectiveParser, ConfigError> {
        let layout = StoreLayout::new(config)?;
        let tag = regex::escape(config.block_tag.trim());
        let block = Regex::new(&format!(r"(?is)<\s*{tag}\s*>(.*?)<\s*/\s*{tag}\s*>"))?;
        let tag_probe = Regex::new(&format!(r"(?i)<\s*{tag}\s*>"))?;
        let prefix_probe = Regex::new(&format!(
            r#"{}\s*\(\s*['"`]\s*{}\."#,
            regex::escape(&config.setter),
            regex::escape(&layout.root().to_string()),
        ))?;

        Ok(DirectiveParser {
            config: config.clone(),
            layout,
            block,
            tag_probe,
            prefix_probe,
        })
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Cheap pre-check: can `text` contain any directive at all?
    pub fn has_directives(&self, text: &str) -> bool {
        self.tag_probe.is_match(text) || self.prefix_probe.is_match(text)
    }

    pub fn parse_directives(&self, text: &str) -> Vec<Directive> {
        // Keyed by offset: a call inside a block is also "anywhere in the
        // text" and must only count once.
        let mut calls: BTreeMap<usize, RawCall<'_>> = BTreeMap::new();

        for block in self.block.captures_iter(text) {
            if let Some(inner) = block.get(1) {
                for call in scan_calls(inner.as_str(), &self.config.setter, inner.start()) {
                    calls.insert(call.offset, call);
                }
            }
        }

        for call in scan_calls(text, &self.config.setter, 0) {
            if self.is_prefixed(&call.path) {
                calls.entry(call.offset).or_insert(call);
            }
        }

        let mut directives: Vec<Directive> = Vec::new();
        let mut positions: FxHashMap<KeyPath, usize> = FxHashMap::default();
        for call in calls.into_values() {
            let Some(directive) = self.to_directive(&call) else {
                continue;
            };
            let existing = positions.get(&directive.path).copied();
            match existing {
                Some(i) => directives[i].value = directive.value,
                None => {
                    positions.insert(directive.path.clone(), directives.len());
                    directives.push(directive);
                }
            }
        }

        debug!(count = directives.len(), "parsed directives");
        directives
    }

    /// Entity names referenced by canonical entity paths, in first-seen order.
    pub fn affected_entity_names(&self, directives: &[Directive]) -> Vec<String> {
        let mut seen = FxHashSet::default();
        directives
            .iter()
            .filter_map(|d| self.layout.entity_path(&d.path))
            .filter(|p| seen.insert(p.name.to_string()))
            .map(|p| p.name.to_string())
            .collect()
    }

    fn is_prefixed(&self, raw_path: &str) -> bool {
        KeyPath::parse(raw_path)
            .map(|p| p.len() > self.layout.root().len() && self.layout.owns(&p))
            .unwrap_or(false)
    }

    fn to_directive(&self, call: &RawCall<'_>) -> Option<Directive> {
        let path = match KeyPath::parse(&call.path) {
            Ok(path) => self.canonicalize(path),
            Err(err) => {
                warn!(path = %call.path, error = %err, "dropping directive with invalid path");
                return None;
            }
        };
        let Some(value) = call.value_literal().and_then(parse_literal) else {
            warn!(path = %path, "dropping directive with empty value");
            return None;
        };
        Some(Directive::new(path, value))
    }

    /// Rewrite snake_case entity field names to their canonical spelling.
    fn canonicalize(&self, path: KeyPath) -> KeyPath {
        let Some(field) = self.layout.entity_path(&path).and_then(|p| p.field) else {
            return path;
        };
        let canonical = fields::canonical(field);
        if canonical == field {
            return path;
        }
        let field_index = self.layout.entities().len() + 1;
        let segments = path
            .segments()
            .iter()
            .enumerate()
            .map(|(i, s)| if i == field_index { canonical.to_string() } else { s.clone() });
        KeyPath::from_segments(segments).unwrap_or(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parser() -> DirectiveParser {
        DirectiveParser::new(&ParserConfig {
            prefix: "p".to_string(),
            block_tag: "UPDATE_BLOCK".to_string(),
            setter: "setter".to_string(),
        })
        .unwrap()
    }

    fn path(s: &str) -> KeyPath {
        KeyPath::parse(s).unwrap()
    }

    #[test]
    fn tagged_block() {
        let text = "She grew.\n<UPDATE_BLOCK>\nsetter('p.entity.Alice.currentScale', 12);\nsetter('p.scenario.current', 'city');\n</UPDATE_BLOCK>";
        let directives = parser().parse_directives(text);
        assert_eq!(
            directives,
            vec![
                Directive::new(path("p.entity.Alice.currentScale"), json!(12)),
                Directive::new(path("p.scenario.current"), json!("city")),
            ]
        );
    }

    #[test]
    fn standalone_requires_prefix() {
        let text = "setter('p.entity.Bob.currentScale', 0.5) and setter('other.x', 1)";
        let directives = parser().parse_directives(text);
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].path, path("p.entity.Bob.currentScale"));
    }

    #[test]
    fn bare_prefix_is_not_a_standalone_target() {
        assert!(parser().parse_directives("setter('p', 1)").is_empty());
    }

    #[test]
    fn tagged_block_accepts_foreign_paths() {
        let text = "<UPDATE_BLOCK>setter('world.weather', 'rain')</UPDATE_BLOCK>";
        let directives = parser().parse_directives(text);
        assert_eq!(directives, vec![Directive::new(path("world.weather"), json!("rain"))]);
    }

    #[test]
    fn later_standalone_overrides_tagged() {
        let text = "<UPDATE_BLOCK>setter('p.x',1)</UPDATE_BLOCK> then setter('p.x',2)";
        let directives = parser().parse_directives(text);
        assert_eq!(directives, vec![Directive::new(path("p.x"), json!(2))]);
    }

    #[test]
    fn later_tagged_overrides_earlier_standalone() {
        let text = "setter('p.x',2) <UPDATE_BLOCK>setter('p.x',1)</UPDATE_BLOCK>";
        let directives = parser().parse_directives(text);
        assert_eq!(directives, vec![Directive::new(path("p.x"), json!(1))]);
    }

    #[test]
    fn duplicates_keep_first_position_and_last_value() {
        let text = "setter('p.a', 1) setter('p.b', 2) setter('p.a', 3)";
        let directives = parser().parse_directives(text);
        assert_eq!(
            directives,
            vec![
                Directive::new(path("p.a"), json!(3)),
                Directive::new(path("p.b"), json!(2)),
            ]
        );
    }

    #[test]
    fn empty_values_and_bad_paths_are_dropped() {
        let text = "<UPDATE_BLOCK>setter('p.a', ) setter('p..b', 1) setter('p.c')  setter('p.d', 4)</UPDATE_BLOCK>";
        let directives = parser().parse_directives(text);
        assert_eq!(directives, vec![Directive::new(path("p.d"), json!(4))]);
    }

    #[test]
    fn unparsable_value_becomes_raw_string() {
        let directives = parser().parse_directives("setter('p.scenario.reason', giant stomp)");
        assert_eq!(directives[0].value, json!("giant stomp"));
    }

    #[test]
    fn snake_case_fields_are_canonicalized() {
        let directives = parser().parse_directives("setter('p.entity.A.current_scale', 3)");
        assert_eq!(directives[0].path, path("p.entity.A.currentScale"));
    }

    #[test]
    fn block_tag_is_case_insensitive_and_multiline() {
        let text = "<update_block>\n  setter('q.z', true)\n</UPDATE_BLOCK>";
        assert_eq!(parser().parse_directives(text).len(), 1);
    }

    #[test]
    fn has_directives_probe() {
        let parser = parser();
        assert!(parser.has_directives("x <UPDATE_BLOCK> y"));
        assert!(parser.has_directives("setter( 'p.entity.A.currentScale', 2)"));
        assert!(!parser.has_directives("setter('q.entity', 2)"));
        assert!(!parser.has_directives("plain prose with no variables"));
    }

    #[test]
    fn affected_names() {
        let parser = parser();
        let directives = parser.parse_directives(
            "setter('p.entity.A.currentScale', 2) setter('p.entity.B.baseScale', 1) \
             setter('p.entity.A.reason', 'x') setter('p.scenario.current', 'city')",
        );
        assert_eq!(parser.affected_entity_names(&directives), vec!["A", "B"]);
    }
}
