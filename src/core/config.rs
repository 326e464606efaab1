//! Engine configuration: defaults, RON loading and validation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::schema::path::{KeyPath, PathError};
use crate::schema::scenario::ScenarioRecord;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid prefix: {0}")]
    Prefix(#[from] PathError),
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Syntax the generator uses to embed directives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Root key of every engine-owned variable; may itself be dotted.
    pub prefix: String,
    /// Name of the tagged block, written as `<Tag> ... </Tag>`.
    pub block_tag: String,
    /// Call name of a directive, e.g. `_.set`.
    pub setter: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            prefix: "scale".to_string(),
            block_tag: "UpdateVariable".to_string(),
            setter: "_.set".to_string(),
        }
    }
}

/// Top-level engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub parser: ParserConfig,
    /// Maximum history entries kept per entity.
    pub history_cap: usize,
    /// Window that coalesces bursts of generic update events.
    pub debounce_ms: u64,
    /// Delay before re-reading the newest message after a chat switch.
    pub chat_switch_delay_ms: u64,
    pub damage_enabled: bool,
    pub interactions_enabled: bool,
    /// Gates the pre-generation prompt refresh.
    pub auto_inject: bool,
    /// People per km² when the scenario is unknown.
    pub default_density: f64,
    /// People per km² keyed by lower-case scenario id.
    pub scenario_densities: BTreeMap<String, f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parser: ParserConfig::default(),
            history_cap: 20,
            debounce_ms: 100,
            chat_switch_delay_ms: 300,
            damage_enabled: true,
            interactions_enabled: true,
            auto_inject: true,
            default_density: 1_000.0,
            scenario_densities: BTreeMap::from([
                ("city".to_string(), 10_000.0),
                ("town".to_string(), 1_500.0),
                ("village".to_string(), 300.0),
                ("rural".to_string(), 50.0),
                ("wilderness".to_string(), 1.0),
                ("indoor".to_string(), 20_000.0),
            ]),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a configuration from a RON string. Omitted fields keep their
    /// defaults.
    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        KeyPath::parse(&self.parser.prefix)?;
        if self.parser.setter.trim().is_empty() {
            return Err(ConfigError::Invalid("setter name is empty".to_string()));
        }
        let tag = self.parser.block_tag.trim();
        if tag.is_empty() || !tag.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            return Err(ConfigError::Invalid(format!(
                "block tag '{}' must be a non-empty identifier",
                self.parser.block_tag
            )));
        }
        if self.history_cap == 0 {
            return Err(ConfigError::Invalid("history_cap must be at least 1".to_string()));
        }
        if !(self.default_density.is_finite() && self.default_density >= 0.0) {
            return Err(ConfigError::Invalid("default_density must be non-negative".to_string()));
        }
        Ok(())
    }

    /// Population density used for damage estimates: the scenario's own
    /// override, else the density configured for its id, else the default.
    pub fn density_for(&self, scenario: Option<&ScenarioRecord>) -> f64 {
        let Some(scenario) = scenario else {
            return self.default_density;
        };
        if let Some(density) = scenario.density {
            return density;
        }
        scenario
            .current
            .as_deref()
            .and_then(|id| self.scenario_densities.get(&id.to_lowercase()))
            .copied()
            .unwrap_or(self.default_density)
    }
}
