use std::cmp::Ordering;

use serde::Serialize;

use crate::material::Dataset;
use crate::sustainability::{compute_sustainability, SustainabilityConfig};

pub const DEFAULT_PART_TOP_N: usize = 3;
pub const SUSTAINABILITY_RATING_KEY: &str = "sustainability_rating";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartRecommendation {
    pub material: String,
    pub sustainability_rating: f64,
    pub sustainability_score: Option<f64>,
}

/// Materials recommended for `part_name`, best stored rating first.
///
/// Equal ratings fall back to the computed sustainability score (taken over
/// the whole dataset), then to dataset order.
pub fn recommend_for_part(
    dataset: &Dataset,
    part_name: &str,
    top_n: usize,
    config: &SustainabilityConfig,
) -> Vec<PartRecommendation> {
    let scores = compute_sustainability(dataset, config);

    let mut suitable: Vec<PartRecommendation> = dataset
        .iter()
        .filter(|m| m.is_recommended_for(part_name))
        .map(|m| PartRecommendation {
            material: m.name.clone(),
            sustainability_rating: m.numeric(SUSTAINABILITY_RATING_KEY).unwrap_or(0.0),
            sustainability_score: scores.get(&m.name),
        })
        .collect();

    if suitable.is_empty() {
        log::debug!("no materials recommended for part '{part_name}'");
        return suitable;
    }

    suitable.sort_by(|a, b| {
        b.sustainability_rating
            .total_cmp(&a.sustainability_rating)
            .then_with(|| cmp_score_desc(a.sustainability_score, b.sustainability_score))
    });
    suitable.truncate(top_n);
    suitable
}

fn cmp_score_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
