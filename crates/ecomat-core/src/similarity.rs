use std::collections::BTreeMap;

use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::material::{numeric_value, round_to, Dataset, Material};

pub const NO_MATERIAL_FOUND: &str = "No Material Found";
pub const DEFAULT_PROPERTY_THRESHOLD: f64 = 0.6;
pub const DEFAULT_OVERALL_FLOOR: f64 = 0.2;
pub const DEFAULT_TOP_N: usize = 3;

const KNOWN_PROPERTIES: [&str; 32] = [
    "tensile_strength",
    "impact_resistance",
    "corrosion_resistance",
    "recyclability",
    "sustainability_rating",
    "ductility",
    "carbon_footprint",
    "density",
    "thermal_conductivity",
    "hardness",
    "youngs_modulus",
    "crashworthiness",
    "formability",
    "thermal_expansion_coefficient",
    "fatigue_resistance",
    "oxidation_resistance",
    "chemical_stability",
    "uv_resistance",
    "scratch_resistance",
    "noise_reduction_capability",
    "fire_resistance",
    "cost_per_unit",
    "thermal_insulation",
    "durability",
    "fracture_toughness",
    "resistance_to_deformation",
    "moisture_resistance",
    "rolling_resistance",
    "heat_resistance",
    "elasticity",
    "puncture_resistance",
    "energy_absorption",
];

/// Per-property acceptance thresholds plus the global acceptance floor.
///
/// Properties without an entry in `thresholds` use `default_threshold`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityConfig {
    pub thresholds: BTreeMap<String, f64>,
    pub default_threshold: f64,
    pub overall_floor: f64,
    pub top_n: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            thresholds: KNOWN_PROPERTIES
                .iter()
                .map(|p| ((*p).to_string(), DEFAULT_PROPERTY_THRESHOLD))
                .collect(),
            default_threshold: DEFAULT_PROPERTY_THRESHOLD,
            overall_floor: DEFAULT_OVERALL_FLOOR,
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl SimilarityConfig {
    pub fn threshold_for(&self, property: &str) -> f64 {
        self.thresholds
            .get(property)
            .copied()
            .unwrap_or(self.default_threshold)
    }

    #[must_use]
    pub fn with_threshold(mut self, property: impl Into<String>, threshold: f64) -> Self {
        self.thresholds.insert(property.into(), threshold);
        self
    }
}

/// Numeric targets in caller order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyTargets {
    entries: Vec<(String, f64)>,
}

impl PropertyTargets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, property: impl Into<String>, target: f64) {
        let property = property.into();
        match self.entries.iter_mut().find(|(p, _)| *p == property) {
            Some((_, existing)) => *existing = target,
            None => self.entries.push((property, target)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(p, t)| (p.as_str(), *t))
    }

    /// Builds targets from a `{"property": number}` object; non-numeric
    /// targets are dropped.
    pub fn from_json(raw: &Map<String, Value>) -> Self {
        let mut out = Self::new();
        for (property, value) in raw {
            match numeric_value(value) {
                Some(target) => out.insert(property.as_str(), target),
                None => log::warn!("ignoring non-numeric target for '{property}': {value}"),
            }
        }
        out
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for PropertyTargets {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (property, target) in iter {
            out.insert(property, target);
        }
        out
    }
}

/// `1 - |d - u| / max(d, u, 1)`.
pub fn property_similarity(dataset_value: f64, user_value: f64) -> f64 {
    let scale = dataset_value.max(user_value).max(1.0);
    1.0 - (dataset_value - user_value).abs() / scale
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEvaluation {
    pub similarities: Vec<(String, f64)>,
    pub eligible: bool,
    pub overall: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityMatch {
    pub material: String,
    pub similarity_score: f64,
}

/// Ranked matches, or the "not found" sentinel.
///
/// `NotFound` serializes as `[{"material":"No Material Found","similarity_score":0}]`,
/// never as an empty list.
#[derive(Debug, Clone, PartialEq)]
pub enum SimilarityRanking {
    Matches(Vec<SimilarityMatch>),
    NotFound,
}

impl SimilarityRanking {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub fn matches(&self) -> &[SimilarityMatch] {
        match self {
            Self::Matches(found) => found,
            Self::NotFound => &[],
        }
    }
}

struct NotFoundEntry;

impl Serialize for NotFoundEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("material", NO_MATERIAL_FOUND)?;
        map.serialize_entry("similarity_score", &0_u8)?;
        map.end()
    }
}

impl Serialize for SimilarityRanking {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Matches(found) => found.serialize(serializer),
            Self::NotFound => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(&NotFoundEntry)?;
                seq.end()
            }
        }
    }
}

/// Ranks materials by mean similarity to numeric targets. A property the
/// material lacks has similarity 0, which a non-zero threshold turns into a veto.
pub struct SimilarityRanker {
    config: SimilarityConfig,
}

impl SimilarityRanker {
    pub fn new(config: SimilarityConfig) -> Self {
        Self { config }
    }

    /// Scores one material against every target and applies the threshold
    /// gate. `targets` must be non-empty for `overall` to be meaningful.
    pub fn evaluate(&self, material: &Material, targets: &PropertyTargets) -> CandidateEvaluation {
        let similarities: Vec<(String, f64)> = targets
            .iter()
            .map(|(property, target)| {
                let sim = material
                    .numeric(property)
                    .map_or(0.0, |value| property_similarity(value, target));
                (property.to_string(), sim)
            })
            .collect();

        let eligible = similarities
            .iter()
            .all(|(property, sim)| *sim >= self.config.threshold_for(property));

        let overall = if similarities.is_empty() {
            0.0
        } else {
            let sum: f64 = similarities.iter().map(|(_, sim)| sim).sum();
            sum / similarities.len() as f64
        };

        CandidateEvaluation {
            similarities,
            eligible,
            overall,
        }
    }

    pub fn rank(&self, dataset: &Dataset, targets: &PropertyTargets) -> SimilarityRanking {
        if targets.is_empty() {
            log::debug!("similarity ranking requested without targets");
            return SimilarityRanking::NotFound;
        }

        let mut eligible: Vec<(&str, f64)> = Vec::new();
        for material in dataset {
            let eval = self.evaluate(material, targets);
            if eval.eligible {
                eligible.push((material.name.as_str(), eval.overall));
            } else {
                log::debug!(
                    "material '{}' vetoed by threshold gate: {:?}",
                    material.name,
                    eval.similarities
                );
            }
        }

        eligible.sort_by(|a, b| b.1.total_cmp(&a.1));

        match eligible.first() {
            Some((_, best)) if *best >= self.config.overall_floor => {}
            _ => return SimilarityRanking::NotFound,
        }

        SimilarityRanking::Matches(
            eligible
                .into_iter()
                .take(self.config.top_n)
                .map(|(name, overall)| SimilarityMatch {
                    material: name.to_string(),
                    similarity_score: round_to(overall, 4),
                })
                .collect(),
        )
    }
}

impl Default for SimilarityRanker {
    fn default() -> Self {
        Self::new(SimilarityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn material(name: &str, attrs: Value) -> Material {
        match attrs {
            Value::Object(map) => Material::new(name, map),
            _ => Material::new(name, Map::new()),
        }
    }

    fn names(ranking: &SimilarityRanking) -> Vec<&str> {
        ranking
            .matches()
            .iter()
            .map(|m| m.material.as_str())
            .collect()
    }

    #[test]
    fn density_example_keeps_exact_match_and_drops_distant_one() {
        let dataset = Dataset::new(vec![
            material("Polymer", json!({"density": 1.4})),
            material("Steel", json!({"density": 5.0})),
        ]);
        let targets: PropertyTargets = vec![("density", 1.4)].into_iter().collect();
        let ranker = SimilarityRanker::default();

        let steel = ranker.evaluate(&dataset.materials()[1], &targets);
        assert!((steel.overall - 0.28).abs() < 1e-9);
        assert!(!steel.eligible);

        let ranking = ranker.rank(&dataset, &targets);
        assert_eq!(
            ranking,
            SimilarityRanking::Matches(vec![SimilarityMatch {
                material: "Polymer".to_string(),
                similarity_score: 1.0,
            }])
        );
    }

    #[test]
    fn floor_of_one_guards_small_values() {
        assert!((property_similarity(0.0, 0.0) - 1.0).abs() < 1e-12);
        assert!((property_similarity(0.2, 0.4) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn single_sub_threshold_property_vetoes_candidate() {
        let dataset = Dataset::new(vec![
            // Near-perfect on three properties, far off on one.
            material(
                "Lopsided",
                json!({"a": 100, "b": 100, "c": 100, "d": 10}),
            ),
            material("Balanced", json!({"a": 70, "b": 70, "c": 70, "d": 70})),
        ]);
        let targets: PropertyTargets = vec![("a", 100.0), ("b", 100.0), ("c", 100.0), ("d", 100.0)]
            .into_iter()
            .collect();
        let ranker = SimilarityRanker::default();

        let lopsided = ranker.evaluate(&dataset.materials()[0], &targets);
        let balanced = ranker.evaluate(&dataset.materials()[1], &targets);
        assert!(lopsided.overall > balanced.overall);
        assert!(!lopsided.eligible);

        assert_eq!(names(&ranker.rank(&dataset, &targets)), vec!["Balanced"]);
    }

    #[test]
    fn missing_property_scores_zero_and_vetoes() {
        let dataset = Dataset::new(vec![
            material("NoDensity", json!({"hardness": 50})),
            material("TextDensity", json!({"hardness": 50, "density": "low"})),
        ]);
        let targets: PropertyTargets = vec![("hardness", 50.0), ("density", 2.0)]
            .into_iter()
            .collect();
        let ranker = SimilarityRanker::default();

        let eval = ranker.evaluate(&dataset.materials()[0], &targets);
        assert_eq!(eval.similarities[1], ("density".to_string(), 0.0));
        assert!((eval.overall - 0.5).abs() < 1e-12);
        assert!(ranker.rank(&dataset, &targets).is_not_found());
    }

    #[test]
    fn zero_threshold_admits_missing_property_into_average() {
        let dataset = Dataset::new(vec![material("NoDensity", json!({"hardness": 50}))]);
        let targets: PropertyTargets = vec![("hardness", 50.0), ("density", 2.0)]
            .into_iter()
            .collect();
        let ranker = SimilarityRanker::new(SimilarityConfig::default().with_threshold("density", 0.0));

        let ranking = ranker.rank(&dataset, &targets);
        assert_eq!(ranking.matches().len(), 1);
        assert!((ranking.matches()[0].similarity_score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn returns_top_three_in_descending_order_with_stable_ties() {
        let dataset = Dataset::new(vec![
            material("A", json!({"x": 80})),
            material("B", json!({"x": 100})),
            material("C", json!({"x": 90})),
            material("D", json!({"x": 100})),
            material("E", json!({"x": 95})),
        ]);
        let targets: PropertyTargets = vec![("x", 100.0)].into_iter().collect();
        let ranking = SimilarityRanker::default().rank(&dataset, &targets);
        assert_eq!(names(&ranking), vec!["B", "D", "E"]);
        assert!((ranking.matches()[2].similarity_score - 0.95).abs() < 1e-12);
    }

    #[test]
    fn scores_are_rounded_to_four_decimals() {
        let dataset = Dataset::new(vec![material("A", json!({"x": 3}))]);
        let targets: PropertyTargets = vec![("x", 2.0)].into_iter().collect();
        let ranking = SimilarityRanker::default().rank(&dataset, &targets);
        // 1 - 1/3
        assert!((ranking.matches()[0].similarity_score - 0.6667).abs() < 1e-12);
    }

    #[test]
    fn overall_floor_turns_weak_results_into_sentinel() {
        let dataset = Dataset::new(vec![material("A", json!({"x": 50}))]);
        let targets: PropertyTargets = vec![("x", 100.0)].into_iter().collect();
        let config = SimilarityConfig {
            default_threshold: 0.0,
            thresholds: BTreeMap::new(),
            overall_floor: 0.6,
            top_n: DEFAULT_TOP_N,
        };
        assert!(SimilarityRanker::new(config).rank(&dataset, &targets).is_not_found());
    }

    #[test]
    fn empty_dataset_and_empty_targets_give_sentinel() {
        let ranker = SimilarityRanker::default();
        let targets: PropertyTargets = vec![("x", 1.0)].into_iter().collect();
        assert!(ranker.rank(&Dataset::default(), &targets).is_not_found());

        let dataset = Dataset::new(vec![material("A", json!({"x": 1}))]);
        assert!(ranker.rank(&dataset, &PropertyTargets::new()).is_not_found());
    }

    #[test]
    fn sentinel_serializes_exactly() {
        let out = serde_json::to_string(&SimilarityRanking::NotFound).expect("serialize");
        assert_eq!(
            out,
            r#"[{"material":"No Material Found","similarity_score":0}]"#
        );

        let found = SimilarityRanking::Matches(vec![SimilarityMatch {
            material: "A".to_string(),
            similarity_score: 0.75,
        }]);
        let out = serde_json::to_string(&found).expect("serialize");
        assert_eq!(out, r#"[{"material":"A","similarity_score":0.75}]"#);
    }

    #[test]
    fn from_json_drops_non_numeric_targets() {
        let raw = json!({"density": 1.4, "color": "red", "ductility": 55});
        let targets = PropertyTargets::from_json(raw.as_object().expect("object"));
        let props: Vec<&str> = targets.iter().map(|(p, _)| p).collect();
        assert_eq!(props, vec!["density", "ductility"]);
    }

    #[test]
    fn default_table_covers_known_properties() {
        let config = SimilarityConfig::default();
        assert_eq!(config.thresholds.len(), KNOWN_PROPERTIES.len());
        assert!((config.threshold_for("tensile_strength") - 0.6).abs() < 1e-12);
        assert!((config.threshold_for("unlisted_property") - 0.6).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn self_similarity_is_perfect(v in 1e-6_f64..1e9) {
            prop_assert!((property_similarity(v, v) - 1.0).abs() < 1e-12);
        }

        #[test]
        fn similarity_never_exceeds_one(d in 0.0_f64..1e6, u in 0.0_f64..1e6) {
            let sim = property_similarity(d, u);
            prop_assert!(sim <= 1.0 + 1e-12);
            prop_assert!(sim >= 0.0 - 1e-12);
        }
    }
}
