use tracing::warn;
use uuid::Uuid;

use crate::models::score::{DimensionScores, HireRecommendation};

pub const DIMENSION_MIN: f64 = 0.0;
pub const DIMENSION_MAX: f64 = 10.0;

const UNDERSTANDING_WEIGHT: f64 = 4.0;
const TECHNICAL_WEIGHT: f64 = 3.0;
const COMMUNICATION_WEIGHT: f64 = 2.0;
const ACCURACY_WEIGHT: f64 = 1.0;

/// Lower bounds (inclusive) of each recommendation band, highest first.
const BANDS: [(f64, HireRecommendation, f64); 4] = [
    (85.0, HireRecommendation::StrongYes, 0.95),
    (75.0, HireRecommendation::Yes, 0.80),
    (60.0, HireRecommendation::Maybe, 0.60),
    (40.0, HireRecommendation::No, 0.30),
];
const FLOOR: (HireRecommendation, f64) = (HireRecommendation::StrongNo, 0.10);

/// 0–100 score from the four weighted dimensions. Relevance is excluded.
pub fn weighted_score(d: &DimensionScores) -> f64 {
    let sum = d.understanding * UNDERSTANDING_WEIGHT
        + d.technical * TECHNICAL_WEIGHT
        + d.communication * COMMUNICATION_WEIGHT
        + d.accuracy * ACCURACY_WEIGHT;
    sum / 10.0 * 10.0
}

/// Clamps every dimension into [0, 10]. Out-of-range values are a grader defect
/// and are logged, never fatal.
pub fn clamp_dimensions(
    raw: DimensionScores,
    assessment_id: Uuid,
    question_index: u8,
) -> DimensionScores {
    let clamp = |name: &str, value: f64| -> f64 {
        let value = if value.is_nan() { DIMENSION_MIN } else { value };
        if !(DIMENSION_MIN..=DIMENSION_MAX).contains(&value) {
            warn!(
                "Grader defect: {name}={value} out of range for assessment {assessment_id} Q{question_index}; clamping"
            );
        }
        value.clamp(DIMENSION_MIN, DIMENSION_MAX)
    };

    DimensionScores {
        understanding: clamp("understanding", raw.understanding),
        technical: clamp("technical", raw.technical),
        accuracy: clamp("accuracy", raw.accuracy),
        communication: clamp("communication", raw.communication),
        relevance: clamp("relevance", raw.relevance),
    }
}

/// Band lookup against the overall score. Ties go to the higher band.
pub fn recommend(overall: f64) -> (HireRecommendation, f64) {
    BANDS
        .iter()
        .find(|(floor, _, _)| overall >= *floor)
        .map(|(_, rec, confidence)| (*rec, *confidence))
        .unwrap_or(FLOOR)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}
