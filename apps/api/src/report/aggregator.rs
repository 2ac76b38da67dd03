use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::assessment::{Assessment, AssessmentState, TransitionError};
use crate::models::score::{FinalScore, HireRecommendation, QuestionBreakdown, QuestionScore};
use crate::scoring::weights::{mean, recommend, round2};
use crate::scoring::ScoringOutcome;
use crate::store::{FinalizeCommit, Store, StoreError};

/// Strengths and weaknesses kept on the final record.
pub const MAX_HIGHLIGHTS: usize = 5;

#[derive(Debug, Error)]
pub enum ReportError {
    /// The evaluation no longer owns the assessment and no final score exists.
    #[error("Assessment {0} moved on before the report was committed")]
    Stale(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Case-insensitive exact-match dedup, first-seen order, capped.
fn dedup_highlights<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let trimmed = item.trim();
        if trimmed.is_empty() || !seen.insert(trimmed.to_lowercase()) {
            continue;
        }
        out.push(trimmed.to_string());
        if out.len() == MAX_HIGHLIGHTS {
            break;
        }
    }
    out
}

fn fit_phrase(recommendation: HireRecommendation) -> &'static str {
    match recommendation {
        HireRecommendation::StrongYes => "an excellent",
        HireRecommendation::Yes => "a good",
        HireRecommendation::Maybe => "a partial",
        HireRecommendation::No => "a weak",
        HireRecommendation::StrongNo => "a poor",
    }
}

fn rollup(scores: &[QuestionScore], dimension: impl Fn(&QuestionScore) -> f64) -> f64 {
    round2(mean(scores.iter().map(dimension)).unwrap_or(0.0) * 10.0)
}

/// Pure aggregation of one assessment's question scores.
pub fn build_final_score(
    assessment: &Assessment,
    outcome: &ScoringOutcome,
    evaluated_at: DateTime<Utc>,
) -> FinalScore {
    let mut scores = outcome.scores.clone();
    scores.sort_by_key(|s| s.question_index);

    let overall = round2(mean(scores.iter().map(|s| s.weighted_score)).unwrap_or(0.0));
    let (hire_recommendation, confidence) = recommend(overall);

    let fraud_signals: Vec<String> = scores
        .iter()
        .filter_map(|s| {
            s.fraud_reason
                .as_ref()
                .map(|reason| format!("Q{}: {reason}", s.question_index))
        })
        .collect();

    FinalScore {
        assessment_id: assessment.id,
        overall_score: overall,
        understanding_score: rollup(&scores, |s| s.dimensions.understanding),
        reasoning_score: rollup(&scores, |s| s.dimensions.technical),
        communication_score: rollup(&scores, |s| s.dimensions.communication),
        logic_score: rollup(&scores, |s| s.dimensions.accuracy),
        hire_recommendation,
        confidence,
        recommendations: format!(
            "{} scored {overall:.1}/100 across {} answered questions and demonstrates {} fit for the {} role.",
            assessment.candidate_name,
            scores.len(),
            fit_phrase(hire_recommendation),
            assessment.role_type
        ),
        strengths: dedup_highlights(scores.iter().flat_map(|s| s.strengths.iter())),
        weaknesses: dedup_highlights(scores.iter().flat_map(|s| s.weaknesses.iter())),
        fraud_detected: !fraud_signals.is_empty(),
        fraud_signals,
        total_questions: outcome.total_questions,
        answered_questions: scores.len(),
        questions: scores
            .iter()
            .map(|s| QuestionBreakdown {
                question_index: s.question_index,
                question_type: s.question_type,
                difficulty: s.difficulty,
                weighted_score: s.weighted_score,
                feedback: s.feedback.clone(),
                fraud_flag: s.fraud_flag,
            })
            .collect(),
        evaluated_at,
    }
}

pub struct ReportAggregator {
    store: Arc<dyn Store>,
}

impl ReportAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Commits the final score together with `evaluating -> completed`.
    /// A second call returns the record written by the first.
    pub async fn finalize(
        &self,
        evaluating: &Assessment,
        outcome: &ScoringOutcome,
    ) -> Result<FinalScore, ReportError> {
        if let Some(existing) = self.store.get_final_score(evaluating.id).await? {
            debug!("Final score for {} already exists", evaluating.id);
            return Ok(existing);
        }

        let completed = evaluating.transitioned(AssessmentState::Completed)?;
        let final_score = build_final_score(evaluating, outcome, Utc::now());

        match self
            .store
            .commit_final_score(
                evaluating.processing_token,
                &completed,
                &outcome.scores,
                &final_score,
            )
            .await?
        {
            FinalizeCommit::Committed(score) => {
                info!(
                    "Assessment {} completed: overall {:.2}, recommendation {}",
                    evaluating.id, score.overall_score, score.hire_recommendation
                );
                Ok(score)
            }
            FinalizeCommit::Existing(score) => Ok(score),
            FinalizeCommit::Stale => match self.store.get_final_score(evaluating.id).await? {
                Some(score) => Ok(score),
                None => Err(ReportError::Stale(evaluating.id)),
            },
        }
    }
}
