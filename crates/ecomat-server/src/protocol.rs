use ecomat_core::{Material, SustainabilityScores};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Default, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartNameRequest {
    #[serde(default)]
    pub part_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SustainabilityRequest {
    #[serde(default)]
    pub materials: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct FindAlloyResponse<'a> {
    pub alloy: &'a Material,
    pub score: i64,
    pub composition_explanation: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct AvailablePropertiesResponse {
    pub available_properties: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SustainabilityResponse {
    pub scores: SustainabilityScores,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
