use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backoff;
use crate::config::OrchestrationConfig;
use crate::models::assessment::Assessment;
use crate::models::job_posting::JobPosting;
use crate::models::question::{
    Question, QuestionSet, QuestionSetRef, QuestionSource, SetOrigin, SetOwner,
};
use crate::questions::fallback::fallback_questions;
use crate::questions::generator::{GenerationError, Generator, SourceMaterial};
use crate::questions::number_questions;
use crate::questions::validation::validate_distribution;
use crate::models::repository::RepositoryRef;
use crate::retrieval::{ContextProvider, RepositoryError, RepositorySummary};
use crate::roles::RoleType;
use crate::store::{PublishOutcome, Store, StoreError};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Repository-mode assessment {0} has no repository reference")]
    MissingRepository(Uuid),

    #[error("Job posting {0} not found")]
    PostingNotFound(Uuid),

    #[error("Question set {0:?} is referenced but missing")]
    MissingSet(QuestionSetRef),

    #[error("Question set for posting {0} was regenerated concurrently")]
    Conflict(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A set bound to an assessment. Private sets are not yet persisted: the caller
/// commits them together with the `analyzing -> questions_ready` transition.
#[derive(Debug, Clone)]
pub struct ResolvedSet {
    pub set: QuestionSet,
    pub private: bool,
}

/// Attaches question sets to assessments and owns the shared-set lifecycle of job postings.
pub struct QuestionSourceResolver {
    store: Arc<dyn Store>,
    generator: Arc<dyn Generator>,
    context: Arc<dyn ContextProvider>,
    generation_attempts: u32,
    index_attempts: u32,
    index_backoff: Duration,
}

impl QuestionSourceResolver {
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<dyn Generator>,
        context: Arc<dyn ContextProvider>,
        generation_attempts: u32,
    ) -> Self {
        let defaults = OrchestrationConfig::default();
        Self {
            store,
            generator,
            context,
            generation_attempts: generation_attempts.max(1),
            index_attempts: defaults.index_attempts,
            index_backoff: defaults.index_backoff,
        }
    }

    /// How often an `Unavailable` repository analysis is tried before giving up.
    pub fn with_index_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.index_attempts = attempts.max(1);
        self.index_backoff = backoff;
        self
    }

    /// Binds a question set for `assessment`.
    ///
    /// Job-description mode reads the posting's current pointer at bind time and
    /// returns that shared set, publishing version 1 first if the posting has none.
    /// Repository mode indexes the repository and builds a private set.
    pub async fn resolve(&self, assessment: &Assessment) -> Result<ResolvedSet, ResolveError> {
        match assessment.question_source {
            QuestionSource::JobDescription => {
                let posting = self
                    .store
                    .get_job_posting(assessment.job_posting_id)
                    .await?
                    .ok_or(ResolveError::PostingNotFound(assessment.job_posting_id))?;
                let set_ref = match posting.current_set {
                    Some(current) => current,
                    None => self.publish_initial(&posting).await?,
                };
                let set = self.load(set_ref).await?;
                Ok(ResolvedSet {
                    set,
                    private: false,
                })
            }
            QuestionSource::Repository => {
                let repository = assessment
                    .repository
                    .as_ref()
                    .ok_or(ResolveError::MissingRepository(assessment.id))?;
                let summary = self.index_with_retry(assessment.id, repository).await?;
                let set = self
                    .build_set(
                        assessment.role_type,
                        SourceMaterial::Repository(&summary),
                        SetOwner::Assessment(assessment.id),
                        Uuid::new_v4(),
                        1,
                    )
                    .await;
                Ok(ResolvedSet { set, private: true })
            }
        }
    }

    /// Ensures `posting` has a shared set. A lost race adopts the winner's set.
    pub async fn publish_initial(
        &self,
        posting: &JobPosting,
    ) -> Result<QuestionSetRef, ResolveError> {
        if let Some(current) = posting.current_set {
            return Ok(current);
        }

        let set = self
            .build_set(
                posting.role_type,
                SourceMaterial::JobDescription {
                    title: &posting.title,
                    description: &posting.description,
                },
                SetOwner::JobPosting(posting.id),
                Uuid::new_v4(),
                1,
            )
            .await;

        match self
            .store
            .publish_job_question_set(posting.id, None, &set, None)
            .await?
        {
            PublishOutcome::Published(set_ref) => {
                info!(
                    "Published question set v{} ({}) for posting {}",
                    set_ref.version,
                    set.origin.as_str(),
                    posting.id
                );
                Ok(set_ref)
            }
            PublishOutcome::Conflict {
                current: Some(winner),
            } => {
                info!(
                    "Posting {} already has set v{}; adopting it",
                    posting.id, winner.version
                );
                Ok(winner)
            }
            PublishOutcome::Conflict { current: None } => Err(ResolveError::Conflict(posting.id)),
        }
    }

    /// Publishes the next set version built from `description`, replacing the
    /// posting's description in the same atomic step. On a lost race neither the
    /// description nor the pointer changes. Assessments already bound keep their old set.
    pub async fn regenerate(
        &self,
        posting_id: Uuid,
        description: &str,
    ) -> Result<QuestionSetRef, ResolveError> {
        let posting = self
            .store
            .get_job_posting(posting_id)
            .await?
            .ok_or(ResolveError::PostingNotFound(posting_id))?;

        let (lineage, version) = match posting.current_set {
            Some(current) => (current.id, current.version + 1),
            None => (Uuid::new_v4(), 1),
        };
        let set = self
            .build_set(
                posting.role_type,
                SourceMaterial::JobDescription {
                    title: &posting.title,
                    description,
                },
                SetOwner::JobPosting(posting.id),
                lineage,
                version,
            )
            .await;

        match self
            .store
            .publish_job_question_set(posting.id, posting.current_set, &set, Some(description))
            .await?
        {
            PublishOutcome::Published(set_ref) => {
                info!(
                    "Regenerated question set for posting {}: now v{}",
                    posting.id, set_ref.version
                );
                Ok(set_ref)
            }
            PublishOutcome::Conflict { .. } => {
                warn!("Regeneration for posting {} lost the pointer race", posting.id);
                Err(ResolveError::Conflict(posting.id))
            }
        }
    }

    /// Retries `Unavailable` with exponential backoff. Other repository errors are final.
    async fn index_with_retry(
        &self,
        assessment_id: Uuid,
        repository: &RepositoryRef,
    ) -> Result<RepositorySummary, RepositoryError> {
        let mut attempt = 1;
        loop {
            match self.context.index_repository(assessment_id, repository).await {
                Err(RepositoryError::Unavailable(reason)) if attempt < self.index_attempts => {
                    let delay = backoff::exponential(self.index_backoff, attempt);
                    warn!(
                        "Repository analysis attempt {attempt}/{} for {repository} unavailable ({reason}); retrying in {}ms",
                        self.index_attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn load(&self, set_ref: QuestionSetRef) -> Result<QuestionSet, ResolveError> {
        self.store
            .get_question_set(set_ref)
            .await?
            .ok_or(ResolveError::MissingSet(set_ref))
    }

    /// Generates and validates a set, falling back to the static template. Never fails.
    async fn build_set(
        &self,
        role: RoleType,
        material: SourceMaterial<'_>,
        owner: SetOwner,
        id: Uuid,
        version: i32,
    ) -> QuestionSet {
        let (origin, questions) = match self.generate_validated(role, material).await {
            Some(questions) => (SetOrigin::Generated, questions),
            None => (SetOrigin::Fallback, fallback_questions(role)),
        };

        QuestionSet {
            id,
            version,
            owner,
            role_type: role,
            origin,
            source_summary: material.summary(),
            questions,
            created_at: Utc::now(),
        }
    }

    async fn generate_validated(
        &self,
        role: RoleType,
        material: SourceMaterial<'_>,
    ) -> Option<Vec<Question>> {
        for attempt in 1..=self.generation_attempts {
            let result = match self.generator.generate(role, material).await {
                Ok(questions) => validate_distribution(&questions)
                    .map(|()| questions)
                    .map_err(GenerationError::from),
                Err(e) => Err(e),
            };
            match result {
                Ok(questions) => return Some(number_questions(questions)),
                Err(e) => warn!(
                    "Question generation attempt {attempt}/{} for {role} failed: {e}",
                    self.generation_attempts
                ),
            }
        }
        warn!("Falling back to the static question template for {role}");
        None
    }
}
