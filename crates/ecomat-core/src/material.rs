use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

pub const NAME_KEY: &str = "name";
pub const COMPOSITION_KEY: &str = "composition";
pub const RECOMMENDED_PARTS_KEY: &str = "recommended_parts";

/// A named material and its open-ended attribute mapping.
///
/// Attributes have no fixed schema. Scoring-relevant properties are JSON
/// numbers; anything else (strings, arrays, nested objects) is metadata that
/// the engines either read explicitly or ignore.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub attributes: Map<String, Value>,
}

impl Material {
    pub fn new(name: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            attributes,
        }
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.attributes.get(property)
    }

    /// Numeric value of `property`, or `None` when absent or not a number.
    pub fn numeric(&self, property: &str) -> Option<f64> {
        self.attributes.get(property).and_then(numeric_value)
    }

    pub fn recommended_parts(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .get(RECOMMENDED_PARTS_KEY)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }

    pub fn is_recommended_for(&self, part_name: &str) -> bool {
        self.recommended_parts().any(|p| p == part_name)
    }
}

impl Serialize for Material {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let carries_name = self.attributes.contains_key(NAME_KEY);
        let len = self.attributes.len() + usize::from(!carries_name);
        let mut map = serializer.serialize_map(Some(len))?;
        if !carries_name {
            map.serialize_entry(NAME_KEY, &self.name)?;
        }
        for (key, value) in &self.attributes {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Booleans are JSON scalars but never count as numeric properties.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Ordered, read-only collection of materials. Iteration order is load order,
/// which is what first-seen tie-breaking relies on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    materials: Vec<Material>,
}

impl Dataset {
    pub fn new(materials: Vec<Material>) -> Self {
        Self { materials }
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Material> {
        self.materials.iter()
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn get(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name == name)
    }
}

impl FromIterator<Material> for Dataset {
    fn from_iter<I: IntoIterator<Item = Material>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Material;
    type IntoIter = std::slice::Iter<'a, Material>;

    fn into_iter(self) -> Self::IntoIter {
        self.materials.iter()
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}
