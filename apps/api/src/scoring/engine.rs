use std::sync::Arc;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backoff;
use crate::config::ScoringConfig;
use crate::models::answer::Answer;
use crate::models::assessment::Assessment;
use crate::models::question::{Question, QuestionSet, QuestionSource};
use crate::models::score::{DimensionScores, QuestionScore};
use crate::retrieval::{ContextProvider, ContextQuery};
use crate::scoring::fraud;
use crate::scoring::grader::{GradeRequest, Grader, GraderVerdict};
use crate::scoring::weights::{clamp_dimensions, round2, weighted_score};
use crate::store::{Store, StoreError};

pub const UNAVAILABLE_FEEDBACK: &str = "evaluation unavailable";

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Assessment {0} has no bound question set")]
    MissingQuestionSet(Uuid),

    #[error("Assessment {0} has no answers to score")]
    NoAnswers(Uuid),

    #[error("Every grader call failed for assessment {0}")]
    AllFailed(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Question scores for every answered question, in index order.
#[derive(Debug, Clone)]
pub struct ScoringOutcome {
    pub scores: Vec<QuestionScore>,
    pub total_questions: usize,
}

pub struct ScoringEngine {
    store: Arc<dyn Store>,
    grader: Arc<dyn Grader>,
    context: Arc<dyn ContextProvider>,
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(
        store: Arc<dyn Store>,
        grader: Arc<dyn Grader>,
        context: Arc<dyn ContextProvider>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            store,
            grader,
            context,
            config,
        }
    }

    /// Grades every answered question of `assessment`. Unanswered questions produce
    /// no score. Nothing is persisted here.
    pub async fn evaluate(&self, assessment: &Assessment) -> Result<ScoringOutcome, ScoringError> {
        let set_ref = assessment
            .question_set
            .ok_or(ScoringError::MissingQuestionSet(assessment.id))?;
        let set = self
            .store
            .get_question_set(set_ref)
            .await?
            .ok_or(ScoringError::MissingQuestionSet(assessment.id))?;

        let answers = self.store.list_answers(assessment.id).await?;
        let pairs: Vec<(&Question, &Answer)> = answers
            .iter()
            .filter_map(|answer| match set.question(answer.question_index) {
                Some(question) => Some((question, answer)),
                None => {
                    warn!(
                        "Assessment {} has an answer for unknown Q{}; skipping",
                        assessment.id, answer.question_index
                    );
                    None
                }
            })
            .collect();
        if pairs.is_empty() {
            return Err(ScoringError::NoAnswers(assessment.id));
        }

        info!(
            "Scoring {} of {} questions for assessment {}",
            pairs.len(),
            set.questions.len(),
            assessment.id
        );

        let scores: Vec<QuestionScore> = stream::iter(pairs)
            .map(|(question, answer)| self.score_answer(assessment, &set, question, answer))
            .buffered(self.config.grading_concurrency.max(1))
            .boxed()
            .collect()
            .await;

        if scores.iter().all(|s| !s.graded) {
            return Err(ScoringError::AllFailed(assessment.id));
        }

        Ok(ScoringOutcome {
            scores,
            total_questions: set.questions.len(),
        })
    }

    async fn score_answer(
        &self,
        assessment: &Assessment,
        set: &QuestionSet,
        question: &Question,
        answer: &Answer,
    ) -> QuestionScore {
        let context = self.context_for(assessment, set, question).await;
        let request = GradeRequest {
            question_text: &question.text,
            question_type: question.question_type,
            answer_text: &answer.text,
            context: &context,
            expected_keywords: &question.expected_keywords,
        };

        match self.grade_with_retry(assessment.id, question.index, request).await {
            Some(verdict) => graded_score(assessment.id, question, answer, verdict),
            None => unavailable_score(assessment.id, question),
        }
    }

    /// Fails open: retrieval problems yield the project summary or nothing.
    async fn context_for(
        &self,
        assessment: &Assessment,
        set: &QuestionSet,
        question: &Question,
    ) -> Vec<String> {
        let snippets = match self
            .context
            .get_context(ContextQuery {
                assessment_id: assessment.id,
                source: assessment.question_source,
                question,
            })
            .await
        {
            Ok(snippets) => snippets,
            Err(e) => {
                warn!(
                    "Context lookup failed for assessment {} Q{}: {e}",
                    assessment.id, question.index
                );
                Vec::new()
            }
        };

        if snippets.is_empty()
            && assessment.question_source == QuestionSource::Repository
            && !set.source_summary.trim().is_empty()
        {
            return vec![set.source_summary.clone()];
        }
        snippets
    }

    async fn grade_with_retry(
        &self,
        assessment_id: Uuid,
        question_index: u8,
        request: GradeRequest<'_>,
    ) -> Option<GraderVerdict> {
        let attempts = self.config.grader_max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.grader.grade(request).await {
                Ok(verdict) => return Some(verdict),
                Err(e) => {
                    warn!(
                        "Grader attempt {attempt}/{attempts} failed for assessment {assessment_id} Q{question_index}: {e}"
                    );
                    if attempt < attempts {
                        let delay = backoff::exponential(self.config.grader_backoff, attempt);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        warn!("Grader exhausted for assessment {assessment_id} Q{question_index}");
        None
    }
}

fn graded_score(
    assessment_id: Uuid,
    question: &Question,
    answer: &Answer,
    verdict: GraderVerdict,
) -> QuestionScore {
    let dimensions = clamp_dimensions(
        DimensionScores {
            understanding: verdict.understanding,
            technical: verdict.technical,
            accuracy: verdict.accuracy,
            communication: verdict.communication,
            relevance: verdict.relevance,
        },
        assessment_id,
        question.index,
    );
    let fraud_reason = fraud::detect(question, &answer.text, verdict.inconsistency);
    if let Some(reason) = &fraud_reason {
        debug!("Fraud signal on assessment {assessment_id} Q{}: {reason}", question.index);
    }

    QuestionScore {
        assessment_id,
        question_index: question.index,
        question_type: question.question_type,
        difficulty: question.difficulty,
        dimensions,
        weighted_score: round2(weighted_score(&dimensions)),
        feedback: verdict.feedback,
        strengths: verdict.strengths,
        weaknesses: verdict.weaknesses,
        fraud_flag: fraud_reason.is_some(),
        fraud_reason,
        graded: true,
    }
}

fn unavailable_score(assessment_id: Uuid, question: &Question) -> QuestionScore {
    QuestionScore {
        assessment_id,
        question_index: question.index,
        question_type: question.question_type,
        difficulty: question.difficulty,
        dimensions: DimensionScores::default(),
        weighted_score: 0.0,
        feedback: UNAVAILABLE_FEEDBACK.to_string(),
        strengths: Vec::new(),
        weaknesses: Vec::new(),
        fraud_flag: false,
        fraud_reason: None,
        graded: false,
    }
}
