use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::OrchestrationConfig;
use crate::errors::AppError;
use crate::models::answer::AnswerInput;
use crate::models::assessment::{Assessment, AssessmentState, NewAssessment};
use crate::models::job_posting::JobPosting;
use crate::models::question::{CandidateQuestion, QuestionSetRef, QuestionSource, QUESTIONS_PER_SET};
use crate::models::repository::RepositoryRef;
use crate::models::score::FinalScore;
use crate::orchestrator::jobs::{JobQueue, Stage, StageJob};
use crate::questions::QuestionSourceResolver;
use crate::report::{ReportAggregator, ReportError};
use crate::roles::RoleType;
use crate::scoring::{ScoringEngine, ScoringError};
use crate::store::Store;

/// Attempts at an answer write before giving up on a moving token.
const ANSWER_WRITE_ATTEMPTS: usize = 3;

/// Largest `time_taken_secs` the answers table can hold.
const MAX_TIME_TAKEN_SECS: u32 = i32::MAX as u32;

// ──────────────────────────────────────────────
// Requests and views
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NewJobPosting {
    pub title: String,
    pub role_type: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegenerateRequest {
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub job_posting_id: Uuid,
    pub candidate_name: String,
    pub candidate_email: String,
    pub question_source: String,
    #[serde(default)]
    pub repository_url: Option<String>,
    /// Defaults to the posting's role.
    #[serde(default)]
    pub role_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitAck {
    pub assessment_id: Uuid,
    pub state: AssessmentState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusView {
    pub assessment_id: Uuid,
    pub state: AssessmentState,
    pub error_reason: Option<String>,
    pub question_source: QuestionSource,
    pub question_set: Option<QuestionSetRef>,
    pub total_questions: usize,
    pub answered_questions: usize,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerAck {
    pub assessment_id: Uuid,
    pub accepted: usize,
    pub answered_questions: usize,
    pub state: AssessmentState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizeAck {
    pub assessment_id: Uuid,
    pub state: AssessmentState,
    /// False when evaluation was already underway or done.
    pub queued: bool,
}

fn require_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn parse_role(value: &str) -> Result<RoleType, AppError> {
    value
        .parse::<RoleType>()
        .map_err(|e| AppError::Validation(e.to_string()))
}

// ──────────────────────────────────────────────
// Orchestrator
// ──────────────────────────────────────────────

/// Owns every assessment state transition. Each transition is a compare-and-set
/// on the processing token; a caller holding a stale token does nothing.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    resolver: QuestionSourceResolver,
    scoring: ScoringEngine,
    reports: ReportAggregator,
    queue: JobQueue,
    config: OrchestrationConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        resolver: QuestionSourceResolver,
        scoring: ScoringEngine,
        queue: JobQueue,
        config: OrchestrationConfig,
    ) -> Self {
        Self {
            reports: ReportAggregator::new(Arc::clone(&store)),
            store,
            resolver,
            scoring,
            queue,
            config,
        }
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    // ── Job postings ───────────────────────────

    /// Registers a posting and publishes its first shared question set.
    pub async fn publish_job_posting(&self, req: NewJobPosting) -> Result<JobPosting, AppError> {
        require_text("title", &req.title)?;
        require_text("description", &req.description)?;
        let role = parse_role(&req.role_type)?;

        let posting = JobPosting::new(req.title.trim().to_string(), role, req.description);
        self.store.insert_job_posting(&posting).await?;
        self.resolver.publish_initial(&posting).await?;
        info!("Published job posting {} ({role})", posting.id);

        self.get_job_posting(posting.id).await
    }

    pub async fn regenerate_job_questions(
        &self,
        posting_id: Uuid,
        req: RegenerateRequest,
    ) -> Result<JobPosting, AppError> {
        require_text("description", &req.description)?;
        self.resolver.regenerate(posting_id, &req.description).await?;
        self.get_job_posting(posting_id).await
    }

    pub async fn get_job_posting(&self, posting_id: Uuid) -> Result<JobPosting, AppError> {
        self.store
            .get_job_posting(posting_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job posting {posting_id} not found")))
    }

    // ── Candidate operations ───────────────────

    /// Creates an assessment. Job-description submissions bind the shared set
    /// immediately; repository submissions enter `analyzing` and queue analysis.
    pub async fn submit(&self, req: SubmitRequest) -> Result<SubmitAck, AppError> {
        require_text("candidate_name", &req.candidate_name)?;
        if !req.candidate_email.contains('@') {
            return Err(AppError::Validation(
                "candidate_email must be a valid email address".to_string(),
            ));
        }
        let source = QuestionSource::parse(req.question_source.trim()).ok_or_else(|| {
            AppError::Validation(format!(
                "question_source must be 'job_description' or 'repository', got '{}'",
                req.question_source
            ))
        })?;
        let repository = match (source, req.repository_url.as_deref()) {
            (QuestionSource::Repository, Some(url)) => Some(
                url.parse::<RepositoryRef>()
                    .map_err(|e| AppError::Validation(e.to_string()))?,
            ),
            (QuestionSource::Repository, None) => {
                return Err(AppError::Validation(
                    "repository_url is required for repository assessments".to_string(),
                ))
            }
            (QuestionSource::JobDescription, _) => None,
        };

        let posting = self.get_job_posting(req.job_posting_id).await?;
        let role = match req.role_type.as_deref() {
            Some(role) => parse_role(role)?,
            None => posting.role_type,
        };

        let pending = Assessment::new(NewAssessment {
            job_posting_id: posting.id,
            candidate_name: req.candidate_name.trim().to_string(),
            candidate_email: req.candidate_email.trim().to_string(),
            role_type: role,
            question_source: source,
            repository,
        });
        self.store.insert_assessment(&pending).await?;
        info!(
            "Assessment {} created for posting {} ({})",
            pending.id,
            posting.id,
            source.as_str()
        );

        let state = match source {
            QuestionSource::JobDescription => self.bind_shared_set(&pending).await?,
            QuestionSource::Repository => self.start_analysis(&pending).await?,
        };

        Ok(SubmitAck {
            assessment_id: pending.id,
            state,
        })
    }

    /// Binds whatever set the posting points at now, not when the request was read.
    async fn bind_shared_set(&self, pending: &Assessment) -> Result<AssessmentState, AppError> {
        let resolved = match self.resolver.resolve(pending).await {
            Ok(resolved) => resolved,
            Err(e) => {
                self.fail(pending, &format!("question set unavailable: {e}"))
                    .await;
                return Err(e.into());
            }
        };

        let ready = pending
            .transitioned(AssessmentState::QuestionsReady)
            .map_err(anyhow::Error::from)?
            .with_question_set(resolved.set.set_ref());
        if self
            .store
            .compare_and_set(pending.processing_token, &ready, None)
            .await?
        {
            debug!(
                "Assessment {} bound to shared set v{}",
                pending.id, resolved.set.version
            );
            Ok(AssessmentState::QuestionsReady)
        } else {
            Ok(self.current_state(pending.id).await?)
        }
    }

    async fn start_analysis(&self, pending: &Assessment) -> Result<AssessmentState, AppError> {
        let analyzing = pending
            .transitioned(AssessmentState::Analyzing)
            .map_err(anyhow::Error::from)?;
        if !self
            .store
            .compare_and_set(pending.processing_token, &analyzing, None)
            .await?
        {
            return self.current_state(pending.id).await;
        }

        self.queue
            .enqueue(StageJob {
                assessment_id: analyzing.id,
                token: analyzing.processing_token,
                stage: Stage::Analyze,
            })
            .await
            .map_err(anyhow::Error::from)?;
        Ok(AssessmentState::Analyzing)
    }

    /// Last committed state. Never waits on in-flight work.
    pub async fn get_status(&self, assessment_id: Uuid) -> Result<StatusView, AppError> {
        let assessment = self.load(assessment_id).await?;
        let total_questions = match assessment.question_set {
            Some(set_ref) => self
                .store
                .get_question_set(set_ref)
                .await?
                .map(|set| set.questions.len())
                .unwrap_or(QUESTIONS_PER_SET),
            None => 0,
        };
        let answered_questions = self.store.list_answers(assessment_id).await?.len();

        Ok(StatusView {
            assessment_id,
            state: assessment.state,
            error_reason: assessment.error_reason,
            question_source: assessment.question_source,
            question_set: assessment.question_set,
            total_questions,
            answered_questions,
            updated_at: assessment.updated_at,
        })
    }

    /// The bound questions without expected keywords or evaluation criteria.
    pub async fn get_questions(
        &self,
        assessment_id: Uuid,
    ) -> Result<Vec<CandidateQuestion>, AppError> {
        let assessment = self.load(assessment_id).await?;
        let Some(set_ref) = assessment.question_set else {
            return Err(AppError::Conflict(format!(
                "Questions are not ready; assessment is {}",
                assessment.state
            )));
        };
        let set = self.store.get_question_set(set_ref).await?.ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "assessment {assessment_id} references missing set {set_ref:?}"
            ))
        })?;
        Ok(set.questions.iter().map(CandidateQuestion::from).collect())
    }

    /// Stores answers, entering `answering` on the first write. A resubmission
    /// for the same question replaces the earlier answer.
    pub async fn submit_answers(
        &self,
        assessment_id: Uuid,
        inputs: Vec<AnswerInput>,
    ) -> Result<AnswerAck, AppError> {
        if inputs.is_empty() {
            return Err(AppError::Validation("at least one answer is required".into()));
        }
        for input in &inputs {
            if !(1..=QUESTIONS_PER_SET as u8).contains(&input.question_index) {
                return Err(AppError::Validation(format!(
                    "question_index must be between 1 and {QUESTIONS_PER_SET}, got {}",
                    input.question_index
                )));
            }
            if input.text.trim().is_empty() {
                return Err(AppError::Validation(format!(
                    "answer for question {} is empty",
                    input.question_index
                )));
            }
            if input.time_taken_secs > MAX_TIME_TAKEN_SECS {
                return Err(AppError::Validation(format!(
                    "time_taken_secs for question {} must be at most {MAX_TIME_TAKEN_SECS}",
                    input.question_index
                )));
            }
        }

        let submitted_at = Utc::now();
        let answers: Vec<_> = inputs
            .into_iter()
            .map(|input| input.into_answer(submitted_at))
            .collect();

        for _ in 0..ANSWER_WRITE_ATTEMPTS {
            let current = self.load(assessment_id).await?;
            match current.state {
                AssessmentState::QuestionsReady => {
                    let answering = current
                        .transitioned(AssessmentState::Answering)
                        .map_err(anyhow::Error::from)?;
                    if self
                        .store
                        .compare_and_set(current.processing_token, &answering, None)
                        .await?
                    {
                        debug!("Assessment {assessment_id} is now answering");
                    }
                }
                AssessmentState::Answering => {
                    if self
                        .store
                        .put_answers(assessment_id, current.processing_token, &answers)
                        .await?
                    {
                        let answered_questions =
                            self.store.list_answers(assessment_id).await?.len();
                        return Ok(AnswerAck {
                            assessment_id,
                            accepted: answers.len(),
                            answered_questions,
                            state: AssessmentState::Answering,
                        });
                    }
                }
                other => {
                    return Err(AppError::Conflict(format!(
                        "Answers are not accepted while the assessment is {other}"
                    )))
                }
            }
        }

        Err(AppError::Conflict(format!(
            "Assessment {assessment_id} changed while answers were being saved; retry"
        )))
    }

    /// Ends answering and queues evaluation. Duplicate calls are no-ops.
    pub async fn finalize(&self, assessment_id: Uuid) -> Result<FinalizeAck, AppError> {
        let current = self.load(assessment_id).await?;
        match current.state {
            AssessmentState::Answering => {}
            AssessmentState::QuestionsReady => {
                return Err(AppError::Validation(
                    "cannot finalize an assessment with no answers".to_string(),
                ))
            }
            AssessmentState::Evaluating | AssessmentState::Completed => {
                return Ok(FinalizeAck {
                    assessment_id,
                    state: current.state,
                    queued: false,
                })
            }
            AssessmentState::Error => {
                return Err(AppError::Conflict(format!(
                    "Assessment failed: {}",
                    current.error_reason.as_deref().unwrap_or("unknown error")
                )))
            }
            AssessmentState::Pending | AssessmentState::Analyzing => {
                return Err(AppError::Conflict(format!(
                    "Questions are not ready; assessment is {}",
                    current.state
                )))
            }
        }

        if self.store.list_answers(assessment_id).await?.is_empty() {
            return Err(AppError::Validation(
                "cannot finalize an assessment with no answers".to_string(),
            ));
        }

        let evaluating = current
            .transitioned(AssessmentState::Evaluating)
            .map_err(anyhow::Error::from)?;
        if !self
            .store
            .compare_and_set(current.processing_token, &evaluating, None)
            .await?
        {
            debug!("Duplicate finalize for {assessment_id}: stale token, no-op");
            return Ok(FinalizeAck {
                assessment_id,
                state: self.current_state(assessment_id).await?,
                queued: false,
            });
        }

        self.queue
            .enqueue(StageJob {
                assessment_id,
                token: evaluating.processing_token,
                stage: Stage::Evaluate,
            })
            .await
            .map_err(anyhow::Error::from)?;
        info!("Assessment {assessment_id} queued for evaluation");

        Ok(FinalizeAck {
            assessment_id,
            state: AssessmentState::Evaluating,
            queued: true,
        })
    }

    /// The write-once final score of a completed assessment.
    pub async fn get_report(&self, assessment_id: Uuid) -> Result<FinalScore, AppError> {
        let assessment = self.load(assessment_id).await?;
        if assessment.state != AssessmentState::Completed {
            return Err(AppError::Conflict(format!(
                "Report is not available; assessment is {}",
                assessment.state
            )));
        }
        self.store
            .get_final_score(assessment_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!(
                    "completed assessment {assessment_id} has no final score"
                ))
            })
    }

    // ── Background stages ──────────────────────

    /// Entry point for workers. Stale jobs are dropped silently.
    pub async fn run_stage(&self, job: StageJob) {
        let assessment = match self.store.get_assessment(job.assessment_id).await {
            Ok(Some(a)) => a,
            Ok(None) => {
                warn!("Stage job for unknown assessment {}", job.assessment_id);
                return;
            }
            Err(e) => {
                error!("Could not load assessment {}: {e}", job.assessment_id);
                return;
            }
        };

        let expected_state = match job.stage {
            Stage::Analyze => AssessmentState::Analyzing,
            Stage::Evaluate => AssessmentState::Evaluating,
        };
        if assessment.processing_token != job.token || assessment.state != expected_state {
            debug!(
                "Stale {:?} job for {} (state {}); no-op",
                job.stage, assessment.id, assessment.state
            );
            return;
        }

        match job.stage {
            Stage::Analyze => self.analyze(&assessment).await,
            Stage::Evaluate => self.evaluate(&assessment).await,
        }
    }

    async fn analyze(&self, analyzing: &Assessment) {
        let resolved = match self.resolver.resolve(analyzing).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Analysis failed for {}: {e}", analyzing.id);
                self.fail(analyzing, &e.to_string()).await;
                return;
            }
        };

        let ready = match analyzing.transitioned(AssessmentState::QuestionsReady) {
            Ok(next) => next.with_question_set(resolved.set.set_ref()),
            Err(e) => {
                error!("{e}");
                return;
            }
        };
        let private_set = resolved.private.then_some(&resolved.set);
        match self
            .store
            .compare_and_set(analyzing.processing_token, &ready, private_set)
            .await
        {
            Ok(true) => info!(
                "Assessment {} questions ready ({} set)",
                analyzing.id,
                resolved.set.origin.as_str()
            ),
            Ok(false) => debug!("Analysis result for {} is stale; discarded", analyzing.id),
            Err(e) => self.fail(analyzing, &format!("storage error: {e}")).await,
        }
    }

    async fn evaluate(&self, evaluating: &Assessment) {
        let outcome = match self.scoring.evaluate(evaluating).await {
            Ok(outcome) => outcome,
            Err(ScoringError::AllFailed(_)) => {
                self.fail(evaluating, "scoring failed: every grader call was exhausted")
                    .await;
                return;
            }
            Err(e) => {
                self.fail(evaluating, &format!("scoring failed: {e}")).await;
                return;
            }
        };

        match self.reports.finalize(evaluating, &outcome).await {
            Ok(_) => {}
            Err(ReportError::Stale(id)) => {
                debug!("Evaluation result for {id} is stale; discarded")
            }
            Err(e) => self.fail(evaluating, &format!("report failed: {e}")).await,
        }
    }

    /// Moves `current` to `error` if its token is still current.
    async fn fail(&self, current: &Assessment, reason: &str) {
        let errored = match current.transitioned(AssessmentState::Error) {
            Ok(next) => next.with_error_reason(reason),
            Err(e) => {
                debug!("Not erroring {}: {e}", current.id);
                return;
            }
        };
        match self
            .store
            .compare_and_set(current.processing_token, &errored, None)
            .await
        {
            Ok(true) => warn!("Assessment {} -> error: {reason}", current.id),
            Ok(false) => debug!("Error transition for {} is stale; no-op", current.id),
            Err(e) => error!("Could not record error for {}: {e}", current.id),
        }
    }

    /// Re-queues work a restart orphaned. Every assessment in a processing state as of
    /// `booted_at` gets a fresh token and a new stage job; jobs queued before the
    /// restart turn stale. Returns how many were re-queued.
    pub async fn resume_in_flight(&self, booted_at: DateTime<Utc>) -> Result<usize, AppError> {
        let in_flight = self
            .store
            .list_stalled(
                &[AssessmentState::Analyzing, AssessmentState::Evaluating],
                booted_at,
            )
            .await?;

        let mut resumed = 0;
        for assessment in in_flight {
            let stage = match assessment.state {
                AssessmentState::Analyzing => Stage::Analyze,
                _ => Stage::Evaluate,
            };
            let restarted = assessment.restarted();
            if !self
                .store
                .compare_and_set(assessment.processing_token, &restarted, None)
                .await?
            {
                debug!("Assessment {} moved during resume; skipped", assessment.id);
                continue;
            }
            self.queue
                .enqueue(StageJob {
                    assessment_id: restarted.id,
                    token: restarted.processing_token,
                    stage,
                })
                .await
                .map_err(anyhow::Error::from)?;
            info!("Resumed {:?} for assessment {}", stage, restarted.id);
            resumed += 1;
        }
        Ok(resumed)
    }

    /// Errors every assessment stuck in a processing state since before
    /// `now - stage_timeout`. Returns how many were moved.
    pub async fn sweep_stalled(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let timeout = chrono::Duration::from_std(self.config.stage_timeout)
            .map_err(anyhow::Error::from)?;
        let stalled = self
            .store
            .list_stalled(
                &[AssessmentState::Analyzing, AssessmentState::Evaluating],
                now - timeout,
            )
            .await?;

        let mut swept = 0;
        for assessment in stalled {
            let reason = format!(
                "{} exceeded {}s without completing",
                assessment.state,
                self.config.stage_timeout.as_secs()
            );
            self.fail(&assessment, &reason).await;
            if self.current_state(assessment.id).await? == AssessmentState::Error {
                swept += 1;
            }
        }
        Ok(swept)
    }

    async fn load(&self, assessment_id: Uuid) -> Result<Assessment, AppError> {
        self.store
            .get_assessment(assessment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Assessment {assessment_id} not found")))
    }

    async fn current_state(&self, assessment_id: Uuid) -> Result<AssessmentState, AppError> {
        Ok(self.load(assessment_id).await?.state)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::ScoringConfig;
    use crate::orchestrator::jobs::JobReceiver;
    use crate::retrieval::RepositoryError;
    use crate::store::{MemoryStore, PublishOutcome};
    use crate::test_support::{verdict, FakeContext, FakeGenerator, FakeGrader, InterleavingStore};

    struct Harness {
        orchestrator: Orchestrator,
        receiver: JobReceiver,
        store: Arc<MemoryStore>,
        grader: Arc<FakeGrader>,
    }

    /// `store` serves the orchestrator; `inspect` is the same data, for assertions.
    fn build(store: Arc<dyn Store>, inspect: Arc<MemoryStore>, context: FakeContext) -> Harness {
        let context = Arc::new(context);
        let grader = Arc::new(FakeGrader::always(verdict(8.0, 6.0, 7.0, 5.0)));
        let resolver = QuestionSourceResolver::new(
            store.clone(),
            Arc::new(FakeGenerator::valid()),
            context.clone(),
            2,
        )
        .with_index_retry(3, Duration::from_millis(1));
        let scoring = ScoringEngine::new(
            store.clone(),
            grader.clone(),
            context,
            ScoringConfig {
                grader_max_attempts: 2,
                grader_backoff: Duration::from_millis(1),
                grading_concurrency: 3,
            },
        );
        let (queue, receiver) = JobQueue::new(16);
        let orchestrator = Orchestrator::new(
            store,
            resolver,
            scoring,
            queue,
            OrchestrationConfig::default(),
        );
        Harness {
            orchestrator,
            receiver,
            store: inspect,
            grader,
        }
    }

    fn harness_with(context: FakeContext) -> Harness {
        let store = Arc::new(MemoryStore::new());
        build(store.clone(), store, context)
    }

    fn interleaved() -> (Harness, Arc<InterleavingStore>) {
        let store = Arc::new(InterleavingStore::new(Arc::new(MemoryStore::new())));
        let h = build(store.clone(), store.inner(), FakeContext::default());
        (h, store)
    }

    fn harness() -> Harness {
        harness_with(FakeContext::default())
    }

    impl Harness {
        /// A fresh process over the same durable data: new queue, nothing in flight.
        fn restarted(&self) -> Harness {
            build(self.store.clone(), self.store.clone(), FakeContext::default())
        }

        async fn posting(&self) -> JobPosting {
            self.orchestrator
                .publish_job_posting(NewJobPosting {
                    title: "Frontend Engineer".into(),
                    role_type: "frontend".into(),
                    description: "React, TypeScript and accessible UI.".into(),
                })
                .await
                .unwrap()
        }

        async fn submit_jd(&self, posting: &JobPosting) -> Uuid {
            self.orchestrator
                .submit(SubmitRequest {
                    job_posting_id: posting.id,
                    candidate_name: "Kim".into(),
                    candidate_email: "kim@example.com".into(),
                    question_source: "job_description".into(),
                    repository_url: None,
                    role_type: None,
                })
                .await
                .unwrap()
                .assessment_id
        }

        async fn answer(&self, id: Uuid, indices: impl IntoIterator<Item = u8>) {
            let inputs = indices
                .into_iter()
                .map(|question_index| AnswerInput {
                    question_index,
                    text: "I kept state in a reducer and memoised selectors to avoid re-renders."
                        .into(),
                    time_taken_secs: 90,
                })
                .collect();
            self.orchestrator.submit_answers(id, inputs).await.unwrap();
        }

        async fn drain(&self) {
            while let Ok(Some(job)) =
                tokio::time::timeout(Duration::from_millis(20), self.receiver.recv()).await
            {
                self.orchestrator.run_stage(job).await;
            }
        }
    }

    #[tokio::test]
    async fn test_job_description_end_to_end() {
        let h = harness();
        let posting = h.posting().await;
        let id = h.submit_jd(&posting).await;

        let status = h.orchestrator.get_status(id).await.unwrap();
        assert_eq!(status.state, AssessmentState::QuestionsReady);
        assert_eq!(status.question_set, posting.current_set);
        assert_eq!(status.total_questions, 10);

        let questions = h.orchestrator.get_questions(id).await.unwrap();
        assert_eq!(questions.len(), 10);

        h.answer(id, 1..=7).await;
        let ack = h.orchestrator.finalize(id).await.unwrap();
        assert!(ack.queued);
        assert_eq!(ack.state, AssessmentState::Evaluating);
        h.drain().await;

        let report = h.orchestrator.get_report(id).await.unwrap();
        assert_eq!(report.answered_questions, 7);
        assert_eq!(report.total_questions, 10);
        assert_eq!(report.overall_score, 69.0);
        assert_eq!(h.grader.calls(), 7);
        assert_eq!(h.store.list_question_scores(id).await.unwrap().len(), 7);

        // Reads of a completed report are identical
        assert_eq!(h.orchestrator.get_report(id).await.unwrap(), report);
        let status = h.orchestrator.get_status(id).await.unwrap();
        assert_eq!(status.state, AssessmentState::Completed);
    }

    #[tokio::test]
    async fn test_invalid_repository_errors_without_creating_a_set() {
        let h = harness_with(FakeContext::failing_index(RepositoryError::NotFound(
            "octo/ghost".into(),
        )));
        let posting = h.posting().await;
        let sets_before = h.store.question_set_count();

        let ack = h
            .orchestrator
            .submit(SubmitRequest {
                job_posting_id: posting.id,
                candidate_name: "Kim".into(),
                candidate_email: "kim@example.com".into(),
                question_source: "repository".into(),
                repository_url: Some("https://github.com/octo/ghost".into()),
                role_type: None,
            })
            .await
            .unwrap();
        assert_eq!(ack.state, AssessmentState::Analyzing);
        h.drain().await;

        let status = h.orchestrator.get_status(ack.assessment_id).await.unwrap();
        assert_eq!(status.state, AssessmentState::Error);
        assert!(status.error_reason.unwrap().contains("not found"));
        assert!(status.question_set.is_none());
        assert_eq!(h.store.question_set_count(), sets_before);
    }

    #[tokio::test]
    async fn test_repository_assessment_gets_private_set() {
        let h = harness();
        let posting = h.posting().await;
        let ack = h
            .orchestrator
            .submit(SubmitRequest {
                job_posting_id: posting.id,
                candidate_name: "Kim".into(),
                candidate_email: "kim@example.com".into(),
                question_source: "repository".into(),
                repository_url: Some("github.com/octo/widgets.git".into()),
                role_type: Some("Backend".into()),
            })
            .await
            .unwrap();
        h.drain().await;

        let status = h.orchestrator.get_status(ack.assessment_id).await.unwrap();
        assert_eq!(status.state, AssessmentState::QuestionsReady);
        assert_ne!(status.question_set, posting.current_set);
        let set = h
            .store
            .get_question_set(status.question_set.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(set.source_summary.contains("octo/widgets"));
    }

    #[tokio::test]
    async fn test_concurrent_finalize_queues_once() {
        let h = harness();
        let posting = h.posting().await;
        let id = h.submit_jd(&posting).await;
        h.answer(id, [1, 2]).await;

        let (a, b) = tokio::join!(h.orchestrator.finalize(id), h.orchestrator.finalize(id));
        let queued = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|ack| ack.queued)
            .count();
        assert_eq!(queued, 1);

        let job = h.receiver.recv().await.unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(20), h.receiver.recv())
                .await
                .is_err(),
            "second evaluation job was queued"
        );

        // Replaying the same job after completion does nothing
        h.orchestrator.run_stage(job).await;
        h.orchestrator.run_stage(job).await;
        assert_eq!(h.grader.calls(), 2);
        let again = h.orchestrator.finalize(id).await.unwrap();
        assert_eq!(again.state, AssessmentState::Completed);
        assert!(!again.queued);
    }

    #[tokio::test]
    async fn test_sweep_errors_stalled_evaluation_and_late_result_is_dropped() {
        let h = harness();
        let posting = h.posting().await;
        let id = h.submit_jd(&posting).await;
        h.answer(id, [1]).await;
        h.orchestrator.finalize(id).await.unwrap();
        let job = h.receiver.recv().await.unwrap();

        let later = Utc::now() + chrono::Duration::seconds(901);
        assert_eq!(h.orchestrator.sweep_stalled(later).await.unwrap(), 1);
        assert_eq!(h.orchestrator.sweep_stalled(later).await.unwrap(), 0);

        h.orchestrator.run_stage(job).await;
        let status = h.orchestrator.get_status(id).await.unwrap();
        assert_eq!(status.state, AssessmentState::Error);
        assert!(status.error_reason.unwrap().contains("evaluating exceeded 900s"));
        assert!(h.store.get_final_score(id).await.unwrap().is_none());
        assert_eq!(h.grader.calls(), 0);
    }

    #[tokio::test]
    async fn test_sweep_ignores_recent_work() {
        let h = harness();
        let posting = h.posting().await;
        let id = h.submit_jd(&posting).await;
        h.answer(id, [1]).await;
        h.orchestrator.finalize(id).await.unwrap();

        assert_eq!(h.orchestrator.sweep_stalled(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_regeneration_does_not_move_bound_assessments() {
        let h = harness();
        let posting = h.posting().await;
        let before = h.submit_jd(&posting).await;

        let regenerated = h
            .orchestrator
            .regenerate_job_questions(
                posting.id,
                RegenerateRequest {
                    description: "React Native and offline sync.".into(),
                },
            )
            .await
            .unwrap();
        let after = h.submit_jd(&regenerated).await;

        let old = h.orchestrator.get_status(before).await.unwrap().question_set;
        let new = h.orchestrator.get_status(after).await.unwrap().question_set;
        assert_eq!(old, posting.current_set);
        assert_eq!(new, regenerated.current_set);
        assert_eq!(new.unwrap().version, old.unwrap().version + 1);
    }

    #[tokio::test]
    async fn test_submission_input_errors() {
        let h = harness();
        let posting = h.posting().await;
        let base = SubmitRequest {
            job_posting_id: posting.id,
            candidate_name: "Kim".into(),
            candidate_email: "kim@example.com".into(),
            question_source: "repository".into(),
            repository_url: Some("https://gitlab.com/octo/widgets".into()),
            role_type: None,
        };

        let bad_repo = h.orchestrator.submit(base.clone()).await.unwrap_err();
        assert!(matches!(bad_repo, AppError::Validation(_)));

        let missing_repo = SubmitRequest {
            repository_url: None,
            ..base.clone()
        };
        assert!(matches!(
            h.orchestrator.submit(missing_repo).await.unwrap_err(),
            AppError::Validation(_)
        ));

        let bad_role = SubmitRequest {
            question_source: "job_description".into(),
            role_type: Some("Designer".into()),
            ..base.clone()
        };
        assert!(matches!(
            h.orchestrator.submit(bad_role).await.unwrap_err(),
            AppError::Validation(_)
        ));

        let unknown_posting = SubmitRequest {
            job_posting_id: Uuid::new_v4(),
            question_source: "job_description".into(),
            ..base
        };
        assert!(matches!(
            h.orchestrator.submit(unknown_posting).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_answer_and_finalize_guards() {
        let h = harness();
        let posting = h.posting().await;
        let id = h.submit_jd(&posting).await;

        assert!(matches!(
            h.orchestrator.finalize(id).await.unwrap_err(),
            AppError::Validation(_)
        ));
        let out_of_range = h
            .orchestrator
            .submit_answers(
                id,
                vec![AnswerInput {
                    question_index: 11,
                    text: "An answer to a question that does not exist.".into(),
                    time_taken_secs: 5,
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(out_of_range, AppError::Validation(_)));
        assert!(matches!(
            h.orchestrator.get_report(id).await.unwrap_err(),
            AppError::Conflict(_)
        ));

        h.answer(id, [3]).await;
        h.answer(id, [3, 4]).await;
        let status = h.orchestrator.get_status(id).await.unwrap();
        assert_eq!(status.state, AssessmentState::Answering);
        assert_eq!(status.answered_questions, 2);

        h.orchestrator.finalize(id).await.unwrap();
        let late = h
            .orchestrator
            .submit_answers(
                id,
                vec![AnswerInput {
                    question_index: 5,
                    text: "Too late, evaluation has already started.".into(),
                    time_taken_secs: 5,
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(late, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_restart_resumes_in_flight_work() {
        let before = harness();
        let posting = before.posting().await;
        let evaluating = before.submit_jd(&posting).await;
        before.answer(evaluating, [1, 2]).await;
        before.orchestrator.finalize(evaluating).await.unwrap();
        let analyzing = before
            .orchestrator
            .submit(SubmitRequest {
                job_posting_id: posting.id,
                candidate_name: "Kim".into(),
                candidate_email: "kim@example.com".into(),
                question_source: "repository".into(),
                repository_url: Some("https://github.com/octo/widgets".into()),
                role_type: None,
            })
            .await
            .unwrap()
            .assessment_id;
        let orphaned = before.receiver.recv().await.unwrap();

        // The process dies with both jobs still queued
        let after = before.restarted();
        let booted_at = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(after.orchestrator.resume_in_flight(booted_at).await.unwrap(), 2);
        after.drain().await;

        let report = after.orchestrator.get_report(evaluating).await.unwrap();
        assert_eq!(report.answered_questions, 2);
        let status = after.orchestrator.get_status(analyzing).await.unwrap();
        assert_eq!(status.state, AssessmentState::QuestionsReady);
        assert_eq!(after.grader.calls(), 2);

        // A job from before the restart no longer matches any token
        after.orchestrator.run_stage(orphaned).await;
        assert_eq!(after.grader.calls(), 2);
        assert_eq!(after.orchestrator.resume_in_flight(booted_at).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_repository_analysis_survives_transient_outage() {
        let h = harness_with(FakeContext::flaky_index(2));
        let posting = h.posting().await;
        let ack = h
            .orchestrator
            .submit(SubmitRequest {
                job_posting_id: posting.id,
                candidate_name: "Kim".into(),
                candidate_email: "kim@example.com".into(),
                question_source: "repository".into(),
                repository_url: Some("https://github.com/octo/widgets".into()),
                role_type: None,
            })
            .await
            .unwrap();
        h.drain().await;

        let status = h.orchestrator.get_status(ack.assessment_id).await.unwrap();
        assert_eq!(status.state, AssessmentState::QuestionsReady);
        assert!(status.error_reason.is_none());
    }

    #[tokio::test]
    async fn test_answer_batch_is_dropped_when_finalize_lands_first() {
        let (h, store) = interleaved();
        let posting = h.posting().await;
        let id = h.submit_jd(&posting).await;
        h.answer(id, [1]).await;

        store.before_put_answers(move |inner| async move {
            let current = inner.get_assessment(id).await.unwrap().unwrap();
            let evaluating = current.transitioned(AssessmentState::Evaluating).unwrap();
            assert!(inner
                .compare_and_set(current.processing_token, &evaluating, None)
                .await
                .unwrap());
        });
        let inputs = (2..=4)
            .map(|question_index| AnswerInput {
                question_index,
                text: "Written while evaluation was starting.".into(),
                time_taken_secs: 40,
            })
            .collect();
        let err = h.orchestrator.submit_answers(id, inputs).await.unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        let answers = h.store.list_answers(id).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].question_index, 1);
    }

    #[tokio::test]
    async fn test_submission_binds_set_regenerated_mid_request() {
        let (h, store) = interleaved();
        let posting = h.posting().await;
        let v1 = posting.current_set.unwrap();

        let posting_id = posting.id;
        store.before_insert_assessment(move |inner| async move {
            let mut next = inner.get_question_set(v1).await.unwrap().unwrap();
            next.version = 2;
            let outcome = inner
                .publish_job_question_set(posting_id, Some(v1), &next, Some("Svelte now."))
                .await
                .unwrap();
            assert!(matches!(outcome, PublishOutcome::Published(_)));
        });
        let id = h.submit_jd(&posting).await;

        let bound = h.orchestrator.get_status(id).await.unwrap().question_set.unwrap();
        assert_eq!(bound.id, v1.id);
        assert_eq!(bound.version, 2);
    }

    #[tokio::test]
    async fn test_time_taken_beyond_column_range_is_rejected() {
        let h = harness();
        let posting = h.posting().await;
        let id = h.submit_jd(&posting).await;

        let err = h
            .orchestrator
            .submit_answers(
                id,
                vec![AnswerInput {
                    question_index: 1,
                    text: "An answer with an impossible timer.".into(),
                    time_taken_secs: u32::MAX,
                }],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(msg) if msg.contains("time_taken_secs")));
        assert!(h.store.list_answers(id).await.unwrap().is_empty());
    }
}
