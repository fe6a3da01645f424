use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use ecomat_core::{numeric_value, Dataset, Material, NAME_KEY};
use serde_json::{Map, Number, Value};
use thiserror::Error;

const MATERIALS_KEY: &str = "materials";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Reads a dataset file in any of the accepted shapes:
///
/// - `[{"name": "...", ...}, ...]`
/// - `{"materials": {"<name>": {...}, ...}}`
/// - `{"<name>": {...}, ...}`
pub fn load_dataset(path: impl AsRef<Path>) -> Result<Dataset, DatasetError> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let value: Value = serde_json::from_slice(&bytes)?;
    let dataset = dataset_from_value(value)?;
    log::info!(
        "loaded {} materials from {}",
        dataset.len(),
        path.display()
    );
    Ok(dataset)
}

pub fn dataset_from_value(value: Value) -> Result<Dataset, DatasetError> {
    let materials = match value {
        Value::Array(items) => from_list(items)?,
        Value::Object(mut root) => match root.remove(MATERIALS_KEY) {
            Some(Value::Object(inner)) => from_mapping(inner)?,
            Some(other) => {
                return Err(DatasetError::InvalidInput(format!(
                    "`materials` must be an object, got {}",
                    kind(&other)
                )));
            }
            None => from_mapping(root)?,
        },
        other => {
            return Err(DatasetError::InvalidInput(format!(
                "dataset must be an array or object, got {}",
                kind(&other)
            )));
        }
    };

    let mut seen = HashSet::new();
    for material in &materials {
        if !seen.insert(material.name.as_str()) {
            return Err(DatasetError::InvalidInput(format!(
                "duplicate material name: {}",
                material.name
            )));
        }
    }

    Ok(Dataset::new(materials))
}

fn from_list(items: Vec<Value>) -> Result<Vec<Material>, DatasetError> {
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            let attributes = match item {
                Value::Object(attributes) => attributes,
                other => {
                    return Err(DatasetError::InvalidInput(format!(
                        "entry {idx} must be an object, got {}",
                        kind(&other)
                    )));
                }
            };
            let name = attributes
                .get(NAME_KEY)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| {
                    DatasetError::InvalidInput(format!("entry {idx} has no usable `name`"))
                })?
                .to_string();
            Ok(Material::new(name, attributes))
        })
        .collect()
}

fn from_mapping(entries: Map<String, Value>) -> Result<Vec<Material>, DatasetError> {
    entries
        .into_iter()
        .map(|(name, item)| {
            if name.trim().is_empty() {
                return Err(DatasetError::InvalidInput(
                    "material name cannot be empty".to_string(),
                ));
            }
            match item {
                Value::Object(attributes) => Ok(Material::new(name, attributes)),
                other => Err(DatasetError::InvalidInput(format!(
                    "material '{name}' must be an object, got {}",
                    kind(&other)
                ))),
            }
        })
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Sorted union of every attribute key in the dataset.
pub fn available_properties(dataset: &Dataset) -> Vec<String> {
    dataset
        .iter()
        .flat_map(|m| m.attributes.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Copy of `dataset` with absent or null values in numeric columns replaced by
/// the column mean. A column is numeric when every present, non-null value in
/// it is a number.
pub fn impute_numeric_means(dataset: &Dataset) -> Dataset {
    let mut columns: BTreeMap<&str, (f64, u32)> = BTreeMap::new();
    let mut mixed: HashSet<&str> = HashSet::new();

    for material in dataset {
        for (key, value) in &material.attributes {
            if value.is_null() {
                continue;
            }
            match numeric_value(value) {
                Some(v) => {
                    let (sum, count) = columns.entry(key.as_str()).or_insert((0.0, 0));
                    *sum += v;
                    *count += 1;
                }
                None => {
                    mixed.insert(key.as_str());
                }
            }
        }
    }

    let means: Vec<(String, Value)> = columns
        .into_iter()
        .filter(|(key, _)| !mixed.contains(key))
        .filter_map(|(key, (sum, count))| {
            let mean = Number::from_f64(sum / f64::from(count))?;
            Some((key.to_string(), Value::Number(mean)))
        })
        .collect();

    dataset
        .iter()
        .map(|material| {
            let mut attributes = material.attributes.clone();
            for (key, mean) in &means {
                if attributes.get(key).is_none_or(Value::is_null) {
                    attributes.insert(key.clone(), mean.clone());
                }
            }
            Material::new(material.name.clone(), attributes)
        })
        .collect()
}
