//! Hand-written fakes for the external seams, shared by unit tests.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::llm_client::LlmError;
use crate::models::answer::Answer;
use crate::models::assessment::{Assessment, AssessmentState, NewAssessment};
use crate::models::job_posting::JobPosting;
use crate::models::question::{
    Question, QuestionSet, QuestionSetRef, QuestionSource, SetOrigin, SetOwner,
};
use crate::models::score::{FinalScore, QuestionScore};
use crate::models::repository::RepositoryRef;
use crate::questions::fallback::fallback_questions;
use crate::questions::{GenerationError, Generator, SourceMaterial};
use crate::retrieval::{
    ContextError, ContextProvider, ContextQuery, RepositoryError, RepositorySummary,
};
use crate::roles::RoleType;
use crate::scoring::{GradeRequest, Grader, GraderError, GraderVerdict};
use crate::store::{FinalizeCommit, MemoryStore, PublishOutcome, Store, StoreError};

// ──────────────────────────────────────────────
// Generator
// ──────────────────────────────────────────────

enum GeneratorMode {
    Valid,
    WrongShape,
    Failing,
}

pub struct FakeGenerator {
    mode: GeneratorMode,
    calls: AtomicUsize,
}

impl FakeGenerator {
    fn with_mode(mode: GeneratorMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    /// Well-formed sets whose text is distinguishable from the fallback template.
    pub fn valid() -> Self {
        Self::with_mode(GeneratorMode::Valid)
    }

    /// Nine questions: always fails validation.
    pub fn wrong_shape() -> Self {
        Self::with_mode(GeneratorMode::WrongShape)
    }

    pub fn failing() -> Self {
        Self::with_mode(GeneratorMode::Failing)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(
        &self,
        role: RoleType,
        material: SourceMaterial<'_>,
    ) -> Result<Vec<Question>, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut questions: Vec<Question> = fallback_questions(role)
            .into_iter()
            .map(|mut q| {
                q.index = 0;
                q.text = format!("Generated: {}", q.text);
                q
            })
            .collect();
        if let SourceMaterial::Repository(summary) = material {
            for q in questions.iter_mut() {
                q.context = format!("{} {}", summary.name, q.context);
            }
        }

        match self.mode {
            GeneratorMode::Valid => Ok(questions),
            GeneratorMode::WrongShape => {
                questions.pop();
                Ok(questions)
            }
            GeneratorMode::Failing => Err(GenerationError::Llm(LlmError::EmptyContent)),
        }
    }
}

// ──────────────────────────────────────────────
// Context provider
// ──────────────────────────────────────────────

#[derive(Default)]
pub struct FakeContext {
    index_error: Option<RepositoryError>,
    /// Leading `index_repository` calls that fail with `Unavailable`.
    unavailable_calls: usize,
    context_fails: bool,
    index_calls: AtomicUsize,
}

impl FakeContext {
    pub fn failing_index(error: RepositoryError) -> Self {
        Self {
            index_error: Some(error),
            ..Self::default()
        }
    }

    pub fn flaky_index(unavailable_calls: usize) -> Self {
        Self {
            unavailable_calls,
            ..Self::default()
        }
    }

    pub fn index_calls(&self) -> usize {
        self.index_calls.load(Ordering::SeqCst)
    }

    pub fn failing_context() -> Self {
        Self {
            context_fails: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ContextProvider for FakeContext {
    async fn index_repository(
        &self,
        _assessment_id: Uuid,
        repository: &RepositoryRef,
    ) -> Result<RepositorySummary, RepositoryError> {
        let call = self.index_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.unavailable_calls {
            return Err(RepositoryError::Unavailable(format!(
                "{repository}: context service restarting"
            )));
        }
        if let Some(error) = &self.index_error {
            return Err(error.clone());
        }
        Ok(RepositorySummary {
            name: repository.to_string(),
            tech_stack: vec!["Rust".into(), "Axum".into()],
            total_files: 24,
            readme_excerpt: Some("A small service.".into()),
            artifacts: vec![],
        })
    }

    async fn get_context(&self, query: ContextQuery<'_>) -> Result<Vec<String>, ContextError> {
        if self.context_fails {
            return Err(ContextError::Status(503));
        }
        Ok(vec![query.question.context.clone()])
    }
}

// ──────────────────────────────────────────────
// Grader
// ──────────────────────────────────────────────

pub struct FakeGrader {
    verdict: GraderVerdict,
    /// Answers containing this marker always fail.
    fail_marker: Option<String>,
    calls: AtomicUsize,
}

impl FakeGrader {
    pub fn always(verdict: GraderVerdict) -> Self {
        Self {
            verdict,
            fail_marker: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(marker: &str, verdict: GraderVerdict) -> Self {
        Self {
            verdict,
            fail_marker: Some(marker.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Grader for FakeGrader {
    async fn grade(&self, request: GradeRequest<'_>) -> Result<GraderVerdict, GraderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_marker {
            Some(marker) if request.answer_text.contains(marker.as_str()) => {
                Err(GraderError::Invalid("timed out".into()))
            }
            _ => Ok(self.verdict.clone()),
        }
    }
}

/// A verdict with the four weighted dimensions set.
pub fn verdict(understanding: f64, technical: f64, communication: f64, accuracy: f64) -> GraderVerdict {
    GraderVerdict {
        understanding,
        technical,
        accuracy,
        communication,
        relevance: 8.0,
        feedback: "Solid answer".into(),
        strengths: vec!["Clear structure".into()],
        weaknesses: vec!["Light on detail".into()],
        inconsistency: false,
    }
}

// ──────────────────────────────────────────────
// Store
// ──────────────────────────────────────────────

type StoreHook = Box<dyn FnOnce(Arc<MemoryStore>) -> BoxFuture<'static, ()> + Send>;

/// A `MemoryStore` that runs a one-shot hook before selected writes, so a test
/// can land a competing writer at an exact point in an operation.
pub struct InterleavingStore {
    inner: Arc<MemoryStore>,
    before_insert_assessment: Mutex<Option<StoreHook>>,
    before_publish: Mutex<Option<StoreHook>>,
    before_put_answers: Mutex<Option<StoreHook>>,
}

fn boxed<F, Fut>(hook: F) -> StoreHook
where
    F: FnOnce(Arc<MemoryStore>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move |store| Box::pin(hook(store)))
}

impl InterleavingStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            before_insert_assessment: Mutex::new(None),
            before_publish: Mutex::new(None),
            before_put_answers: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.inner)
    }

    pub fn before_insert_assessment<F, Fut>(&self, hook: F)
    where
        F: FnOnce(Arc<MemoryStore>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.before_insert_assessment.lock() = Some(boxed(hook));
    }

    pub fn before_publish<F, Fut>(&self, hook: F)
    where
        F: FnOnce(Arc<MemoryStore>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.before_publish.lock() = Some(boxed(hook));
    }

    pub fn before_put_answers<F, Fut>(&self, hook: F)
    where
        F: FnOnce(Arc<MemoryStore>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.before_put_answers.lock() = Some(boxed(hook));
    }

    async fn fire(&self, slot: &Mutex<Option<StoreHook>>) {
        let hook = slot.lock().take();
        if let Some(hook) = hook {
            hook(self.inner()).await;
        }
    }
}

#[async_trait]
impl Store for InterleavingStore {
    async fn insert_job_posting(&self, posting: &JobPosting) -> Result<(), StoreError> {
        self.inner.insert_job_posting(posting).await
    }

    async fn get_job_posting(&self, id: Uuid) -> Result<Option<JobPosting>, StoreError> {
        self.inner.get_job_posting(id).await
    }

    async fn publish_job_question_set(
        &self,
        job_posting_id: Uuid,
        expected_current: Option<QuestionSetRef>,
        set: &QuestionSet,
        description: Option<&str>,
    ) -> Result<PublishOutcome, StoreError> {
        self.fire(&self.before_publish).await;
        self.inner
            .publish_job_question_set(job_posting_id, expected_current, set, description)
            .await
    }

    async fn get_question_set(
        &self,
        set: QuestionSetRef,
    ) -> Result<Option<QuestionSet>, StoreError> {
        self.inner.get_question_set(set).await
    }

    async fn insert_assessment(&self, assessment: &Assessment) -> Result<(), StoreError> {
        self.fire(&self.before_insert_assessment).await;
        self.inner.insert_assessment(assessment).await
    }

    async fn get_assessment(&self, id: Uuid) -> Result<Option<Assessment>, StoreError> {
        self.inner.get_assessment(id).await
    }

    async fn compare_and_set(
        &self,
        expected_token: Uuid,
        next: &Assessment,
        private_set: Option<&QuestionSet>,
    ) -> Result<bool, StoreError> {
        self.inner
            .compare_and_set(expected_token, next, private_set)
            .await
    }

    async fn list_stalled(
        &self,
        states: &[AssessmentState],
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Assessment>, StoreError> {
        self.inner.list_stalled(states, updated_before).await
    }

    async fn put_answers(
        &self,
        assessment_id: Uuid,
        expected_token: Uuid,
        answers: &[Answer],
    ) -> Result<bool, StoreError> {
        self.fire(&self.before_put_answers).await;
        self.inner
            .put_answers(assessment_id, expected_token, answers)
            .await
    }

    async fn list_answers(&self, assessment_id: Uuid) -> Result<Vec<Answer>, StoreError> {
        self.inner.list_answers(assessment_id).await
    }

    async fn commit_final_score(
        &self,
        expected_token: Uuid,
        next: &Assessment,
        scores: &[QuestionScore],
        final_score: &FinalScore,
    ) -> Result<FinalizeCommit, StoreError> {
        self.inner
            .commit_final_score(expected_token, next, scores, final_score)
            .await
    }

    async fn get_final_score(
        &self,
        assessment_id: Uuid,
    ) -> Result<Option<FinalScore>, StoreError> {
        self.inner.get_final_score(assessment_id).await
    }

    async fn list_question_scores(
        &self,
        assessment_id: Uuid,
    ) -> Result<Vec<QuestionScore>, StoreError> {
        self.inner.list_question_scores(assessment_id).await
    }
}

// ──────────────────────────────────────────────
// Fixtures
// ──────────────────────────────────────────────

/// A job-description assessment already in `answering`, bound to a published fallback set.
pub async fn answering_assessment(store: &Arc<MemoryStore>) -> Assessment {
    let posting = JobPosting::new(
        "Backend Engineer".into(),
        RoleType::Backend,
        "Build APIs.".into(),
    );
    store.insert_job_posting(&posting).await.unwrap();

    let set = QuestionSet {
        id: Uuid::new_v4(),
        version: 1,
        owner: SetOwner::JobPosting(posting.id),
        role_type: RoleType::Backend,
        origin: SetOrigin::Fallback,
        source_summary: "Backend Engineer\n\nBuild APIs.".into(),
        questions: fallback_questions(RoleType::Backend),
        created_at: Utc::now(),
    };
    let outcome = store
        .publish_job_question_set(posting.id, None, &set, None)
        .await
        .unwrap();
    assert_eq!(outcome, PublishOutcome::Published(set.set_ref()));

    let pending = Assessment::new(NewAssessment {
        job_posting_id: posting.id,
        candidate_name: "Sam".into(),
        candidate_email: "sam@example.com".into(),
        role_type: RoleType::Backend,
        question_source: QuestionSource::JobDescription,
        repository: None,
    });
    store.insert_assessment(&pending).await.unwrap();

    let ready = pending
        .transitioned(AssessmentState::QuestionsReady)
        .unwrap()
        .with_question_set(set.set_ref());
    assert!(store
        .compare_and_set(pending.processing_token, &ready, None)
        .await
        .unwrap());
    let answering = ready.transitioned(AssessmentState::Answering).unwrap();
    assert!(store
        .compare_and_set(ready.processing_token, &answering, None)
        .await
        .unwrap());
    answering
}
