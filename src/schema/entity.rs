use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names as they appear in the persisted store.
pub mod fields {
    pub const CURRENT_SCALE: &str = "currentScale";
    pub const BASE_SCALE: &str = "baseScale";
    pub const CUSTOM_OVERRIDES: &str = "customOverrides";
    pub const CALCULATION: &str = "calculation";
    pub const DAMAGE: &str = "damage";
    pub const HISTORY: &str = "history";
    pub const REASON: &str = "reason";

    /// Every field the engine understands on an entity record.
    pub const KNOWN: &[&str] = &[
        CURRENT_SCALE,
        BASE_SCALE,
        CUSTOM_OVERRIDES,
        CALCULATION,
        DAMAGE,
        HISTORY,
        REASON,
    ];

    /// Map snake_case spellings written by some generators onto the
    /// canonical camelCase names.
    pub fn canonical(name: &str) -> &str {
        match name {
            "current_scale" => CURRENT_SCALE,
            "base_scale" => BASE_SCALE,
            "custom_overrides" => CUSTOM_OVERRIDES,
            other => other,
        }
    }
}

/// Scale a record falls back to when no base scale was ever written.
pub const DEFAULT_BASE_SCALE: f64 = 1.0;

fn default_base_scale() -> f64 {
    DEFAULT_BASE_SCALE
}

/// One recorded scale change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Host-supplied timestamp in milliseconds.
    #[serde(default)]
    pub at: u64,
}

impl HistoryEntry {
    pub fn new(scale: f64, reason: Option<String>, at: u64) -> Self {
        Self { scale, reason, at }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A tracked character's size state. The entity name is the map key
/// it is stored under and is not repeated inside the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    #[serde(default, alias = "current_scale")]
    pub current_scale: Option<f64>,
    #[serde(default = "default_base_scale", alias = "base_scale")]
    pub base_scale: f64,
    #[serde(default, alias = "custom_overrides", skip_serializing_if = "Map::is_empty")]
    pub custom_overrides: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntry>,
}

impl Default for EntityRecord {
    fn default() -> Self {
        Self {
            current_scale: None,
            base_scale: DEFAULT_BASE_SCALE,
            custom_overrides: Map::new(),
            reason: None,
            calculation: None,
            damage: None,
            history: Vec::new(),
        }
    }
}

impl EntityRecord {
    pub fn with_scale(current_scale: f64) -> Self {
        Self {
            current_scale: Some(current_scale),
            ..Self::default()
        }
    }

    /// Read a record out of an untrusted store value.
    ///
    /// Scalars may arrive as numbers or numeric strings. Malformed fields
    /// are ignored rather than failing the whole record; a non-object input
    /// yields `None`.
    pub fn from_value(value: &Value) -> Option<EntityRecord> {
        let obj = value.as_object()?;

        let current_scale = lookup(obj, fields::CURRENT_SCALE, "current_scale").and_then(lenient_f64);
        let base_scale = lookup(obj, fields::BASE_SCALE, "base_scale")
            .and_then(lenient_f64)
            .filter(|b| b.is_finite() && *b > 0.0)
            .unwrap_or(DEFAULT_BASE_SCALE);
        let custom_overrides = lookup(obj, fields::CUSTOM_OVERRIDES, "custom_overrides")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let reason = obj
            .get(fields::REASON)
            .and_then(Value::as_str)
            .map(str::to_string);
        let history = obj
            .get(fields::HISTORY)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(history_entry).collect())
            .unwrap_or_default();

        Some(EntityRecord {
            current_scale,
            base_scale,
            custom_overrides,
            reason,
            calculation: obj.get(fields::CALCULATION).filter(|v| !v.is_null()).cloned(),
            damage: obj.get(fields::DAMAGE).filter(|v| !v.is_null()).cloned(),
            history,
        })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// A record is admitted to the cache only with a finite, positive scale.
    pub fn valid_scale(&self) -> Option<f64> {
        self.current_scale.filter(|s| s.is_finite() && *s > 0.0)
    }

    pub fn is_valid(&self) -> bool {
        self.valid_scale().is_some()
    }

    /// True when the entity is larger than its own base size.
    pub fn is_growing(&self) -> bool {
        self.valid_scale().is_some_and(|s| s > self.base_scale)
    }
}

fn lookup<'a>(obj: &'a Map<String, Value>, key: &str, alias: &str) -> Option<&'a Value> {
    obj.get(key).or_else(|| obj.get(alias))
}

/// Numbers pass through, numeric strings are parsed, everything else is `None`.
pub fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn history_entry(value: &Value) -> Option<HistoryEntry> {
    match value {
        Value::Object(obj) => Some(HistoryEntry {
            scale: obj.get("scale").and_then(lenient_f64)?,
            reason: obj.get("reason").and_then(Value::as_str).map(str::to_string),
            at: obj.get("at").and_then(Value::as_u64).unwrap_or(0),
        }),
        other => lenient_f64(other).map(|scale| HistoryEntry::new(scale, None, 0)),
    }
}
