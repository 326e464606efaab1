//! Derived size math behind a trait, so hosts can plug in their own rules.

use serde_json::{json, Map, Value};

use crate::schema::entity::lenient_f64;

/// Rules for the derived fields the reconciler recomputes.
pub trait ScaleModel {
    /// Derived calculation blob for one entity.
    fn calculation(&self, current: f64, base: f64, overrides: &Map<String, Value>) -> Value;

    /// Damage estimate for a growing entity, given the population density
    /// (people per km²) of its surroundings. `overrides` are the same
    /// per-entity baselines passed to [`ScaleModel::calculation`].
    fn damage(&self, current: f64, base: f64, overrides: &Map<String, Value>, density: f64) -> Value;

    /// Limits for a pair, given both scales with `larger >= smaller`.
    fn interaction(&self, larger: f64, smaller: f64) -> Value;
}

/// Square-cube scaling from a human baseline.
///
/// Height grows linearly with scale and mass with its cube. Overrides may
/// set `baseHeightCm` and `baseMassKg` per entity.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaleModel {
    pub base_height_cm: f64,
    pub base_mass_kg: f64,
}

impl Default for StandardScaleModel {
    fn default() -> Self {
        Self {
            base_height_cm: 170.0,
            base_mass_kg: 60.0,
        }
    }
}

/// Foot length as a share of body height.
const FOOT_RATIO: f64 = 0.15;
/// Foot width as a share of foot length.
const FOOT_WIDTH_RATIO: f64 = 0.4;

impl StandardScaleModel {
    fn baseline(&self, overrides: &Map<String, Value>, key: &str, fallback: f64) -> f64 {
        overrides
            .get(key)
            .and_then(lenient_f64)
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(fallback)
    }
}

impl ScaleModel for StandardScaleModel {
    fn calculation(&self, current: f64, base: f64, overrides: &Map<String, Value>) -> Value {
        let height_cm = self.baseline(overrides, "baseHeightCm", self.base_height_cm) * current;
        let mass_kg = self.baseline(overrides, "baseMassKg", self.base_mass_kg) * current.powi(3);
        let relative = if base > 0.0 { current / base } else { current };
        json!({
            "scale": current,
            "relativeScale": relative,
            "heightCm": height_cm,
            "heightM": height_cm / 100.0,
            "massKg": mass_kg,
            "footLengthCm": height_cm * FOOT_RATIO,
        })
    }

    fn damage(&self, current: f64, base: f64, overrides: &Map<String, Value>, density: f64) -> Value {
        let height_m = self.baseline(overrides, "baseHeightCm", self.base_height_cm) * current / 100.0;
        let foot_length_m = height_m * FOOT_RATIO;
        let footprint_m2 = foot_length_m * foot_length_m * FOOT_WIDTH_RATIO;
        let people_per_step = footprint_m2 / 1_000_000.0 * density;
        let level = match current / base.max(f64::MIN_POSITIVE) {
            g if g >= 1_000.0 => "catastrophic",
            g if g >= 100.0 => "severe",
            g if g >= 10.0 => "moderate",
            _ => "minor",
        };
        json!({
            "footprintM2": footprint_m2,
            "peoplePerStep": people_per_step,
            "density": density,
            "level": level,
        })
    }

    fn interaction(&self, larger: f64, smaller: f64) -> Value {
        let ratio = larger / smaller;
        json!({
            "heightRatio": ratio,
            "massRatio": ratio.powi(3),
            "fitsInHand": ratio >= 10.0,
            "canBeCarried": ratio >= 5.0,
            "eyeLevelReachable": ratio < 2.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calculation_scales_height_and_mass() {
        let model = StandardScaleModel::default();
        let calc = model.calculation(2.0, 1.0, &Map::new());
        assert_eq!(calc["heightCm"], json!(340.0));
        assert_eq!(calc["massKg"], json!(480.0));
        assert_eq!(calc["relativeScale"], json!(2.0));
    }

    #[test]
    fn overrides_replace_baseline() {
        let model = StandardScaleModel::default();
        let mut overrides = Map::new();
        overrides.insert("baseHeightCm".into(), json!("150"));
        overrides.insert("baseMassKg".into(), json!(-4));
        let calc = model.calculation(1.0, 1.0, &overrides);
        assert_eq!(calc["heightCm"], json!(150.0));
        assert_eq!(calc["massKg"], json!(60.0));
    }

    #[test]
    fn damage_grows_with_density() {
        let model = StandardScaleModel::default();
        let rural = model.damage(100.0, 1.0, &Map::new(), 50.0);
        let city = model.damage(100.0, 1.0, &Map::new(), 10_000.0);
        assert!(city["peoplePerStep"].as_f64().unwrap() > rural["peoplePerStep"].as_f64().unwrap());
        assert_eq!(city["level"], json!("severe"));
    }

    #[test]
    fn damage_uses_the_same_height_as_calculation() {
        let model = StandardScaleModel::default();
        let mut overrides = Map::new();
        overrides.insert("baseHeightCm".into(), json!(100));
        let calc = model.calculation(10.0, 1.0, &overrides);
        let damage = model.damage(10.0, 1.0, &overrides, 1_000.0);
        let foot_m = calc["footLengthCm"].as_f64().unwrap() / 100.0;
        let expected = foot_m * foot_m * FOOT_WIDTH_RATIO;
        assert!((damage["footprintM2"].as_f64().unwrap() - expected).abs() < 1e-9);
        assert_eq!(calc["heightCm"], json!(1000.0));
    }

    #[test]
    fn interaction_limits() {
        let model = StandardScaleModel::default();
        let pair = model.interaction(12.0, 1.0);
        assert_eq!(pair["fitsInHand"], json!(true));
        assert_eq!(pair["massRatio"], json!(1728.0));
    }
}
