use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{FinalizeCommit, PublishOutcome, Store, StoreError};
use crate::models::answer::Answer;
use crate::models::assessment::{Assessment, AssessmentState};
use crate::models::job_posting::JobPosting;
use crate::models::question::{QuestionSet, QuestionSetRef};
use crate::models::score::{FinalScore, QuestionScore};

/// In-process store. One mutex guards everything, so every trait method is atomic.
/// Used for tests and for running without a database.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    postings: HashMap<Uuid, JobPosting>,
    sets: HashMap<QuestionSetRef, QuestionSet>,
    assessments: HashMap<Uuid, Assessment>,
    answers: HashMap<Uuid, BTreeMap<u8, Answer>>,
    question_scores: HashMap<Uuid, Vec<QuestionScore>>,
    final_scores: HashMap<Uuid, FinalScore>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of question sets ever written, shared and private.
    #[cfg(test)]
    pub fn question_set_count(&self) -> usize {
        self.inner.lock().sets.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_job_posting(&self, posting: &JobPosting) -> Result<(), StoreError> {
        self.inner
            .lock()
            .postings
            .insert(posting.id, posting.clone());
        Ok(())
    }

    async fn get_job_posting(&self, id: Uuid) -> Result<Option<JobPosting>, StoreError> {
        Ok(self.inner.lock().postings.get(&id).cloned())
    }

    async fn publish_job_question_set(
        &self,
        job_posting_id: Uuid,
        expected_current: Option<QuestionSetRef>,
        set: &QuestionSet,
        description: Option<&str>,
    ) -> Result<PublishOutcome, StoreError> {
        let mut inner = self.inner.lock();
        let current = match inner.postings.get(&job_posting_id) {
            Some(posting) => posting.current_set,
            None => {
                return Err(StoreError::Corrupt(format!(
                    "job posting {job_posting_id} does not exist"
                )))
            }
        };
        if current != expected_current {
            return Ok(PublishOutcome::Conflict { current });
        }

        let set_ref = set.set_ref();
        inner.sets.insert(set_ref, set.clone());
        if let Some(posting) = inner.postings.get_mut(&job_posting_id) {
            posting.current_set = Some(set_ref);
            if let Some(description) = description {
                posting.description = description.to_string();
            }
            posting.updated_at = Utc::now();
        }
        Ok(PublishOutcome::Published(set_ref))
    }

    async fn get_question_set(
        &self,
        set: QuestionSetRef,
    ) -> Result<Option<QuestionSet>, StoreError> {
        Ok(self.inner.lock().sets.get(&set).cloned())
    }

    async fn insert_assessment(&self, assessment: &Assessment) -> Result<(), StoreError> {
        self.inner
            .lock()
            .assessments
            .insert(assessment.id, assessment.clone());
        Ok(())
    }

    async fn get_assessment(&self, id: Uuid) -> Result<Option<Assessment>, StoreError> {
        Ok(self.inner.lock().assessments.get(&id).cloned())
    }

    async fn compare_and_set(
        &self,
        expected_token: Uuid,
        next: &Assessment,
        private_set: Option<&QuestionSet>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let matches = inner
            .assessments
            .get(&next.id)
            .is_some_and(|current| current.processing_token == expected_token);
        if !matches {
            return Ok(false);
        }

        if let Some(set) = private_set {
            inner.sets.insert(set.set_ref(), set.clone());
        }
        inner.assessments.insert(next.id, next.clone());
        Ok(true)
    }

    async fn list_stalled(
        &self,
        states: &[AssessmentState],
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Assessment>, StoreError> {
        Ok(self
            .inner
            .lock()
            .assessments
            .values()
            .filter(|a| states.contains(&a.state) && a.updated_at < updated_before)
            .cloned()
            .collect())
    }

    async fn put_answers(
        &self,
        assessment_id: Uuid,
        expected_token: Uuid,
        answers: &[Answer],
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let accepting = inner.assessments.get(&assessment_id).is_some_and(|a| {
            a.processing_token == expected_token && a.state == AssessmentState::Answering
        });
        if !accepting {
            return Ok(false);
        }

        let stored = inner.answers.entry(assessment_id).or_default();
        for answer in answers {
            stored.insert(answer.question_index, answer.clone());
        }
        Ok(true)
    }

    async fn list_answers(&self, assessment_id: Uuid) -> Result<Vec<Answer>, StoreError> {
        Ok(self
            .inner
            .lock()
            .answers
            .get(&assessment_id)
            .map(|by_index| by_index.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn commit_final_score(
        &self,
        expected_token: Uuid,
        next: &Assessment,
        scores: &[QuestionScore],
        final_score: &FinalScore,
    ) -> Result<FinalizeCommit, StoreError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.final_scores.get(&next.id) {
            return Ok(FinalizeCommit::Existing(existing.clone()));
        }

        let matches = inner
            .assessments
            .get(&next.id)
            .is_some_and(|current| current.processing_token == expected_token);
        if !matches {
            return Ok(FinalizeCommit::Stale);
        }

        let mut ordered = scores.to_vec();
        ordered.sort_by_key(|s| s.question_index);
        inner.question_scores.insert(next.id, ordered);
        inner.final_scores.insert(next.id, final_score.clone());
        inner.assessments.insert(next.id, next.clone());
        Ok(FinalizeCommit::Committed(final_score.clone()))
    }

    async fn get_final_score(
        &self,
        assessment_id: Uuid,
    ) -> Result<Option<FinalScore>, StoreError> {
        Ok(self.inner.lock().final_scores.get(&assessment_id).cloned())
    }

    async fn list_question_scores(
        &self,
        assessment_id: Uuid,
    ) -> Result<Vec<QuestionScore>, StoreError> {
        Ok(self
            .inner
            .lock()
            .question_scores
            .get(&assessment_id)
            .cloned()
            .unwrap_or_default())
    }
}
