use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::question::{QuestionSetRef, QuestionSource};
use crate::models::repository::RepositoryRef;
use crate::roles::RoleType;

/// Lifecycle of an assessment. `Completed` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentState {
    Pending,
    Analyzing,
    QuestionsReady,
    Answering,
    Evaluating,
    Completed,
    Error,
}

impl AssessmentState {
    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentState::Pending => "pending",
            AssessmentState::Analyzing => "analyzing",
            AssessmentState::QuestionsReady => "questions_ready",
            AssessmentState::Answering => "answering",
            AssessmentState::Evaluating => "evaluating",
            AssessmentState::Completed => "completed",
            AssessmentState::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "pending" => AssessmentState::Pending,
            "analyzing" => AssessmentState::Analyzing,
            "questions_ready" => AssessmentState::QuestionsReady,
            "answering" => AssessmentState::Answering,
            "evaluating" => AssessmentState::Evaluating,
            "completed" => AssessmentState::Completed,
            "error" => AssessmentState::Error,
            _ => return None,
        })
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AssessmentState::Completed | AssessmentState::Error)
    }

    /// The transition table. `Pending` branches on the question source:
    /// only repository assessments pass through `Analyzing`.
    pub fn allows(self, next: AssessmentState, source: QuestionSource) -> bool {
        use AssessmentState::*;

        if next == Error {
            return !self.is_terminal();
        }

        matches!(
            (self, next, source),
            (Pending, Analyzing, QuestionSource::Repository)
                | (Pending, QuestionsReady, QuestionSource::JobDescription)
                | (Analyzing, QuestionsReady, _)
                | (QuestionsReady, Answering, _)
                | (Answering, Evaluating, _)
                | (Evaluating, Completed, _)
        )
    }
}

impl fmt::Display for AssessmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("Invalid transition {from} -> {to} for {source_mode} assessment")]
pub struct TransitionError {
    pub from: AssessmentState,
    pub to: AssessmentState,
    pub source_mode: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: Uuid,
    pub job_posting_id: Uuid,
    pub candidate_name: String,
    pub candidate_email: String,
    pub role_type: RoleType,
    pub question_source: QuestionSource,
    pub repository: Option<RepositoryRef>,
    pub state: AssessmentState,
    pub error_reason: Option<String>,
    /// Opaque compare-and-set token. Rotated on every transition.
    pub processing_token: Uuid,
    /// Bound once, when questions become ready. Never follows later regenerations.
    pub question_set: Option<QuestionSetRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to create an assessment. Validated by the orchestrator.
#[derive(Debug, Clone)]
pub struct NewAssessment {
    pub job_posting_id: Uuid,
    pub candidate_name: String,
    pub candidate_email: String,
    pub role_type: RoleType,
    pub question_source: QuestionSource,
    pub repository: Option<RepositoryRef>,
}

impl Assessment {
    pub fn new(input: NewAssessment) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_posting_id: input.job_posting_id,
            candidate_name: input.candidate_name,
            candidate_email: input.candidate_email,
            role_type: input.role_type,
            question_source: input.question_source,
            repository: input.repository,
            state: AssessmentState::Pending,
            error_reason: None,
            processing_token: Uuid::new_v4(),
            question_set: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the successor record for `next` with a fresh token.
    /// The receiver is untouched; persisting the result is a compare-and-set
    /// against `self.processing_token`.
    pub fn transitioned(&self, next: AssessmentState) -> Result<Self, TransitionError> {
        if !self.state.allows(next, self.question_source) {
            return Err(TransitionError {
                from: self.state,
                to: next,
                source_mode: self.question_source.as_str(),
            });
        }

        let mut successor = self.clone();
        successor.state = next;
        successor.processing_token = Uuid::new_v4();
        successor.updated_at = Utc::now();
        Ok(successor)
    }

    /// Same state under a fresh token, for re-queueing work a restart orphaned.
    /// Jobs carrying the old token become stale.
    pub fn restarted(&self) -> Self {
        let mut successor = self.clone();
        successor.processing_token = Uuid::new_v4();
        successor.updated_at = Utc::now();
        successor
    }

    pub fn with_question_set(mut self, set: QuestionSetRef) -> Self {
        self.question_set = Some(set);
        self
    }

    pub fn with_error_reason(mut self, reason: impl Into<String>) -> Self {
        self.error_reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_assessment(source: QuestionSource) -> Assessment {
        Assessment::new(NewAssessment {
            job_posting_id: Uuid::new_v4(),
            candidate_name: "Ada".to_string(),
            candidate_email: "ada@example.com".to_string(),
            role_type: RoleType::Backend,
            question_source: source,
            repository: None,
        })
    }

    #[test]
    fn test_new_assessment_starts_pending() {
        let a = new_assessment(QuestionSource::JobDescription);
        assert_eq!(a.state, AssessmentState::Pending);
        assert!(a.question_set.is_none());
        assert!(a.error_reason.is_none());
    }

    #[test]
    fn test_restarted_keeps_state_and_rotates_token() {
        let a = new_assessment(QuestionSource::JobDescription);
        let restarted = a.restarted();
        assert_eq!(restarted.state, a.state);
        assert_eq!(restarted.id, a.id);
        assert_ne!(restarted.processing_token, a.processing_token);
    }

    #[test]
    fn test_job_description_skips_analysis() {
        let a = new_assessment(QuestionSource::JobDescription);
        assert!(a.transitioned(AssessmentState::Analyzing).is_err());
        assert!(a.transitioned(AssessmentState::QuestionsReady).is_ok());
    }

    #[test]
    fn test_repository_requires_analysis() {
        let a = new_assessment(QuestionSource::Repository);
        assert!(a.transitioned(AssessmentState::QuestionsReady).is_err());
        let analyzing = a.transitioned(AssessmentState::Analyzing).unwrap();
        assert!(analyzing.transitioned(AssessmentState::QuestionsReady).is_ok());
    }

    #[test]
    fn test_transition_rotates_token_and_leaves_original_untouched() {
        let a = new_assessment(QuestionSource::JobDescription);
        let next = a.transitioned(AssessmentState::QuestionsReady).unwrap();
        assert_ne!(a.processing_token, next.processing_token);
        assert_eq!(a.state, AssessmentState::Pending);
        assert_eq!(next.state, AssessmentState::QuestionsReady);
    }

    #[test]
    fn test_error_reachable_from_every_non_terminal_state() {
        use AssessmentState::*;
        for state in [Pending, Analyzing, QuestionsReady, Answering, Evaluating] {
            assert!(state.allows(Error, QuestionSource::Repository), "{state}");
        }
        assert!(!Completed.allows(Error, QuestionSource::Repository));
        assert!(!Error.allows(Error, QuestionSource::Repository));
    }

    #[test]
    fn test_no_skipping_answering() {
        let a = new_assessment(QuestionSource::JobDescription)
            .transitioned(AssessmentState::QuestionsReady)
            .unwrap();
        let err = a.transitioned(AssessmentState::Evaluating).unwrap_err();
        assert_eq!(err.from, AssessmentState::QuestionsReady);
        assert_eq!(err.to, AssessmentState::Evaluating);
    }

    #[test]
    fn test_terminal_states_have_no_successors() {
        use AssessmentState::*;
        for next in [Pending, Analyzing, QuestionsReady, Answering, Evaluating, Completed] {
            assert!(!Completed.allows(next, QuestionSource::JobDescription));
        }
    }

    #[test]
    fn test_state_str_round_trip() {
        use AssessmentState::*;
        for s in [Pending, Analyzing, QuestionsReady, Answering, Evaluating, Completed, Error] {
            assert_eq!(AssessmentState::parse(s.as_str()), Some(s));
        }
    }
}
