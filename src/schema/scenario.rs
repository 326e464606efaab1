use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::lenient_f64;

/// Separator between the two names of an interaction key.
pub const PAIR_SEPARATOR: &str = "__";

/// Shared context affecting derived calculations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Population density override, people per km².
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density: Option<f64>,
}

impl ScenarioRecord {
    pub fn from_value(value: &Value) -> Option<ScenarioRecord> {
        let obj = value.as_object()?;
        let record = ScenarioRecord {
            current: obj
                .get("current")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            reason: obj.get("reason").and_then(Value::as_str).map(str::to_string),
            density: obj
                .get("density")
                .and_then(lenient_f64)
                .filter(|d| *d >= 0.0),
        };
        if record.is_empty() {
            None
        } else {
            Some(record)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.reason.is_none() && self.density.is_none()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Derived relationship between two tracked entities. `larger` is the
/// entity with the greater current scale; ties keep name order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub larger: String,
    pub smaller: String,
    pub ratio: f64,
    #[serde(default)]
    pub limits: Value,
}

impl InteractionRecord {
    /// Ordered pair key, e.g. `Alice__Bob`.
    pub fn key(&self) -> String {
        pair_key(&self.larger, &self.smaller)
    }

    pub fn from_value(value: &Value) -> Option<InteractionRecord> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub fn pair_key(first: &str, second: &str) -> String {
    format!("{first}{PAIR_SEPARATOR}{second}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scenario_from_value() {
        let record = ScenarioRecord::from_value(&json!({
            "current": "city",
            "reason": "downtown walk",
            "density": "50000",
        }))
        .unwrap();
        assert_eq!(record.current.as_deref(), Some("city"));
        assert_eq!(record.density, Some(50000.0));
    }

    #[test]
    fn empty_scenario_is_none() {
        assert!(ScenarioRecord::from_value(&json!({})).is_none());
        assert!(ScenarioRecord::from_value(&json!({ "current": "  " })).is_none());
        assert!(ScenarioRecord::from_value(&json!("city")).is_none());
    }

    #[test]
    fn negative_density_is_dropped() {
        let record = ScenarioRecord::from_value(&json!({ "current": "town", "density": -5 })).unwrap();
        assert_eq!(record.density, None);
    }

    #[test]
    fn interaction_key_and_round_trip() {
        let record = InteractionRecord {
            larger: "Alice".to_string(),
            smaller: "Bob".to_string(),
            ratio: 10.0,
            limits: json!({ "canHold": true }),
        };
        assert_eq!(record.key(), "Alice__Bob");
        assert_eq!(InteractionRecord::from_value(&record.to_value()), Some(record));
    }
}
