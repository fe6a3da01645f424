use serde_json::{Map, Value};
use thiserror::Error;

use crate::material::{numeric_value, Dataset, Material, COMPOSITION_KEY};

/// Score reported by [`find_best`] when the dataset is empty.
pub const NO_MATCH_SCORE: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyRange {
    pub min: f64,
    pub max: f64,
}

impl PropertyRange {
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeParseError {
    #[error("expected `min-max`, got {0:?}")]
    Malformed(String),

    #[error("invalid bound {bound:?} in range {text:?}")]
    InvalidBound { text: String, bound: String },

    #[error("range bounds must be finite: {0:?}")]
    NonFinite(String),

    #[error("range minimum exceeds maximum: {0:?}")]
    Inverted(String),
}

/// Parses `"min-max"`. The text must split on `-` into exactly two halves, so
/// negative bounds are not expressible.
pub fn parse_range(text: &str) -> Result<PropertyRange, RangeParseError> {
    let mut halves = text.split('-');
    let (Some(lo), Some(hi), None) = (halves.next(), halves.next(), halves.next()) else {
        return Err(RangeParseError::Malformed(text.to_string()));
    };

    let parse_bound = |bound: &str| {
        bound
            .trim()
            .parse::<f64>()
            .map_err(|_| RangeParseError::InvalidBound {
                text: text.to_string(),
                bound: bound.to_string(),
            })
    };
    let min = parse_bound(lo)?;
    let max = parse_bound(hi)?;

    if !min.is_finite() || !max.is_finite() {
        return Err(RangeParseError::NonFinite(text.to_string()));
    }
    if min > max {
        return Err(RangeParseError::Inverted(text.to_string()));
    }
    Ok(PropertyRange { min, max })
}

/// Requested ranges in caller order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeRequirements {
    entries: Vec<(String, PropertyRange)>,
}

impl RangeRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, property: impl Into<String>, range: PropertyRange) {
        let property = property.into();
        match self.entries.iter_mut().find(|(p, _)| *p == property) {
            Some((_, existing)) => *existing = range,
            None => self.entries.push((property, range)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, PropertyRange)> {
        self.entries.iter().map(|(p, r)| (p.as_str(), *r))
    }
}

impl<S: Into<String>> FromIterator<(S, PropertyRange)> for RangeRequirements {
    fn from_iter<I: IntoIterator<Item = (S, PropertyRange)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (property, range) in iter {
            out.insert(property, range);
        }
        out
    }
}

/// Builds requirements from a `{"property": "min-max"}` object, dropping every
/// entry that is not a parseable range string.
pub fn parse_requirements(raw: &Map<String, Value>) -> RangeRequirements {
    let mut out = RangeRequirements::new();
    for (property, value) in raw {
        let Some(text) = value.as_str() else {
            log::warn!("ignoring non-string range for property '{property}': {value}");
            continue;
        };
        match parse_range(text) {
            Ok(range) => out.insert(property.as_str(), range),
            Err(err) => log::warn!("ignoring range for property '{property}': {err}"),
        }
    }
    out
}

/// Number of requirements the material satisfies, one point per property
/// inside its closed interval. Absent or non-numeric properties are skipped
/// without penalty.
pub fn score(material: &Material, requirements: &RangeRequirements) -> u32 {
    let mut score = 0;
    for (property, range) in requirements.iter() {
        let Some(value) = material.numeric(property) else {
            log::debug!(
                "material '{}' has no numeric '{property}', skipping",
                material.name
            );
            continue;
        };
        if range.contains(value) {
            score += 1;
        } else {
            log::debug!(
                "material '{}' failed '{property}' with value {value}",
                material.name
            );
        }
    }
    score
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeMatch<'a> {
    pub material: Option<&'a Material>,
    pub score: i64,
}

impl RangeMatch<'_> {
    pub fn is_found(&self) -> bool {
        self.material.is_some()
    }
}

/// Highest-scoring material. Ties go to the material seen first.
pub fn find_best<'a>(dataset: &'a Dataset, requirements: &RangeRequirements) -> RangeMatch<'a> {
    let mut best = RangeMatch {
        material: None,
        score: NO_MATCH_SCORE,
    };

    for material in dataset {
        let candidate = i64::from(score(material, requirements));
        if candidate > best.score {
            best = RangeMatch {
                material: Some(material),
                score: candidate,
            };
        }
    }

    best
}

/// Formats the material's `composition` object as element -> `"<pct>%"`.
pub fn explain_composition(material: &Material) -> Map<String, Value> {
    let Some(composition) = material.get(COMPOSITION_KEY) else {
        return Map::new();
    };
    let Some(entries) = composition.as_object() else {
        log::warn!(
            "composition of material '{}' is not an object",
            material.name
        );
        return Map::new();
    };

    entries
        .iter()
        .filter_map(|(element, pct)| {
            if numeric_value(pct).is_none() {
                log::debug!(
                    "skipping non-numeric composition entry '{element}' of '{}'",
                    material.name
                );
                return None;
            }
            Some((element.clone(), Value::String(format!("{pct}%"))))
        })
        .collect()
}
