use std::collections::BTreeMap;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::material::{round_to, Dataset, Material};

pub const DEFAULT_DECAY: f64 = 0.1;
pub const MIN_NORMALIZED: f64 = 1.0;
pub const MAX_NORMALIZED: f64 = 10.0;
/// Normalized value used for every material when a factor has no spread.
pub const DEGENERATE_NORMALIZED: f64 = 5.5;

#[derive(Debug, Clone, PartialEq)]
pub struct FactorWeight {
    pub factor: String,
    pub base_weight: f64,
}

impl FactorWeight {
    pub fn new(factor: impl Into<String>, base_weight: f64) -> Self {
        Self {
            factor: factor.into(),
            base_weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SustainabilityConfig {
    pub factors: Vec<FactorWeight>,
    pub decay: f64,
}

impl Default for SustainabilityConfig {
    fn default() -> Self {
        Self {
            factors: vec![
                FactorWeight::new("carbon_footprint", 30.0),
                FactorWeight::new("recyclability", 25.0),
                FactorWeight::new("toxicity", 10.0),
                FactorWeight::new("energy_intensity", 15.0),
                FactorWeight::new("cost_effectiveness", 10.0),
                FactorWeight::new("supply_chain_resilience", 10.0),
            ],
            decay: DEFAULT_DECAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorBounds {
    pub min: f64,
    pub max: f64,
}

impl FactorBounds {
    fn include(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn normalize(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return DEGENERATE_NORMALIZED;
        }
        MIN_NORMALIZED + (MAX_NORMALIZED - MIN_NORMALIZED) * (value - self.min) / span
    }
}

/// Per-factor min/max over a population.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopulationStats {
    bounds: BTreeMap<String, FactorBounds>,
}

impl PopulationStats {
    /// Every material takes part in every factor's bounds; one without a
    /// numeric value for the factor counts as 0 there.
    pub fn from_materials<'a>(
        materials: impl IntoIterator<Item = &'a Material>,
        config: &SustainabilityConfig,
    ) -> Self {
        let mut bounds: BTreeMap<String, FactorBounds> = BTreeMap::new();
        for material in materials {
            for weight in &config.factors {
                let value = material.numeric(&weight.factor).unwrap_or(0.0);
                bounds
                    .entry(weight.factor.clone())
                    .and_modify(|b| b.include(value))
                    .or_insert(FactorBounds {
                        min: value,
                        max: value,
                    });
            }
        }
        Self { bounds }
    }

    #[must_use]
    pub fn with_bounds(mut self, factor: impl Into<String>, bounds: FactorBounds) -> Self {
        self.bounds.insert(factor.into(), bounds);
        self
    }

    pub fn bounds(&self, factor: &str) -> Option<FactorBounds> {
        self.bounds.get(factor).copied()
    }
}

pub fn adjusted_weight(base_weight: f64, normalized: f64, decay: f64) -> f64 {
    base_weight * (-decay * (MAX_NORMALIZED - normalized)).exp()
}

/// Score for one material, rounded to two decimals. `None` when the material
/// carries none of the configured factors.
pub fn score_material(
    material: &Material,
    stats: &PopulationStats,
    config: &SustainabilityConfig,
) -> Option<f64> {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for weight in &config.factors {
        let Some(value) = material.numeric(&weight.factor) else {
            continue;
        };
        let Some(bounds) = stats.bounds(&weight.factor) else {
            continue;
        };
        let normalized = bounds.normalize(value);
        let adjusted = adjusted_weight(weight.base_weight, normalized, config.decay);
        weighted_sum += adjusted * normalized;
        total_weight += adjusted;
    }

    if total_weight <= 0.0 {
        return None;
    }
    Some(round_to(weighted_sum / total_weight, 2))
}

/// Material name to score, in dataset order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SustainabilityScores {
    entries: Vec<(String, f64)>,
}

impl SustainabilityScores {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, score)| *score)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), *s))
    }
}

impl Serialize for SustainabilityScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, score) in &self.entries {
            map.serialize_entry(name, score)?;
        }
        map.end()
    }
}

/// Scores every material against the whole dataset's factor bounds. Raw factor
/// values are read as "higher is better".
pub fn compute_sustainability(
    dataset: &Dataset,
    config: &SustainabilityConfig,
) -> SustainabilityScores {
    let stats = PopulationStats::from_materials(dataset, config);
    let mut entries = Vec::with_capacity(dataset.len());
    for material in dataset {
        match score_material(material, &stats, config) {
            Some(score) => entries.push((material.name.clone(), score)),
            None => log::debug!(
                "material '{}' has no sustainability factors, omitted",
                material.name
            ),
        }
    }
    SustainabilityScores { entries }
}
