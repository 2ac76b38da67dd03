use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::question::{Difficulty, QuestionType};

/// The five 0–10 grader dimensions for one answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub understanding: f64,
    pub technical: f64,
    pub accuracy: f64,
    pub communication: f64,
    /// Tracked for fraud heuristics only; not part of the weighted score.
    pub relevance: f64,
}

/// Per-answer evaluation. Written once by the scoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionScore {
    pub assessment_id: Uuid,
    pub question_index: u8,
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
    pub dimensions: DimensionScores,
    /// 0–100.
    pub weighted_score: f64,
    pub feedback: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub fraud_flag: bool,
    pub fraud_reason: Option<String>,
    /// False when every grader attempt failed and the score is a placeholder.
    pub graded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HireRecommendation {
    StrongYes,
    Yes,
    Maybe,
    No,
    StrongNo,
}

impl HireRecommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            HireRecommendation::StrongYes => "strong_yes",
            HireRecommendation::Yes => "yes",
            HireRecommendation::Maybe => "maybe",
            HireRecommendation::No => "no",
            HireRecommendation::StrongNo => "strong_no",
        }
    }
}

impl fmt::Display for HireRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the report's per-question breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionBreakdown {
    pub question_index: u8,
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
    pub weighted_score: f64,
    pub feedback: String,
    pub fraud_flag: bool,
}

/// The immutable final record for a completed assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalScore {
    pub assessment_id: Uuid,
    pub overall_score: f64,
    pub understanding_score: f64,
    pub reasoning_score: f64,
    pub communication_score: f64,
    pub logic_score: f64,
    pub hire_recommendation: HireRecommendation,
    pub confidence: f64,
    pub recommendations: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub fraud_detected: bool,
    pub fraud_signals: Vec<String>,
    pub total_questions: usize,
    pub answered_questions: usize,
    pub questions: Vec<QuestionBreakdown>,
    pub evaluated_at: DateTime<Utc>,
}
