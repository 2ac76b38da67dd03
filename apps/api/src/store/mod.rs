//! Storage contract for the assessment lifecycle.
//!
//! Everything the orchestrator, resolver, scoring engine, and report aggregator need
//! from persistence: durable reads/writes and per-entity compare-and-set. Multi-record
//! commits (private set + transition, final score + transition) are atomic.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::answer::Answer;
use crate::models::assessment::{Assessment, AssessmentState};
use crate::models::job_posting::JobPosting;
use crate::models::question::{QuestionSet, QuestionSetRef};
use crate::models::score::{FinalScore, QuestionScore};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Value out of range for column: {0}")]
    OutOfRange(String),
}

/// Result of trying to repoint a job posting's current question set.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    Published(QuestionSetRef),
    /// The pointer moved since it was read; nothing was written.
    Conflict { current: Option<QuestionSetRef> },
}

/// Result of committing a final score together with the `completed` transition.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeCommit {
    Committed(FinalScore),
    /// A final score already exists; it is returned untouched.
    Existing(FinalScore),
    /// The token moved (e.g. the sweep errored the assessment); nothing was written.
    Stale,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_job_posting(&self, posting: &JobPosting) -> Result<(), StoreError>;

    async fn get_job_posting(&self, id: Uuid) -> Result<Option<JobPosting>, StoreError>;

    /// Appends `set` and swaps the posting's current pointer to it, but only if the
    /// pointer still equals `expected_current`. A `description` is written in the same
    /// atomic step; on conflict the posting is left untouched.
    async fn publish_job_question_set(
        &self,
        job_posting_id: Uuid,
        expected_current: Option<QuestionSetRef>,
        set: &QuestionSet,
        description: Option<&str>,
    ) -> Result<PublishOutcome, StoreError>;

    async fn get_question_set(
        &self,
        set: QuestionSetRef,
    ) -> Result<Option<QuestionSet>, StoreError>;

    async fn insert_assessment(&self, assessment: &Assessment) -> Result<(), StoreError>;

    async fn get_assessment(&self, id: Uuid) -> Result<Option<Assessment>, StoreError>;

    /// Replaces the assessment with `next` iff its stored token equals `expected_token`.
    /// `private_set` is persisted in the same atomic step. Returns false on a stale token.
    async fn compare_and_set(
        &self,
        expected_token: Uuid,
        next: &Assessment,
        private_set: Option<&QuestionSet>,
    ) -> Result<bool, StoreError>;

    /// Assessments in one of `states` whose last transition is older than `updated_before`.
    async fn list_stalled(
        &self,
        states: &[AssessmentState],
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Assessment>, StoreError>;

    /// Upserts every answer iff the assessment is `answering` with `expected_token`.
    /// All or nothing: returns false and writes nothing on a stale token.
    async fn put_answers(
        &self,
        assessment_id: Uuid,
        expected_token: Uuid,
        answers: &[Answer],
    ) -> Result<bool, StoreError>;

    /// Answers ordered by question index.
    async fn list_answers(&self, assessment_id: Uuid) -> Result<Vec<Answer>, StoreError>;

    /// Write-once: persists question scores, the final score, and the `completed`
    /// transition together.
    async fn commit_final_score(
        &self,
        expected_token: Uuid,
        next: &Assessment,
        scores: &[QuestionScore],
        final_score: &FinalScore,
    ) -> Result<FinalizeCommit, StoreError>;

    async fn get_final_score(&self, assessment_id: Uuid)
        -> Result<Option<FinalScore>, StoreError>;

    /// Question scores ordered by question index.
    async fn list_question_scores(
        &self,
        assessment_id: Uuid,
    ) -> Result<Vec<QuestionScore>, StoreError>;
}
