use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use super::{FinalizeCommit, PublishOutcome, Store, StoreError};
use crate::models::answer::Answer;
use crate::models::assessment::{Assessment, AssessmentState};
use crate::models::job_posting::JobPosting;
use crate::models::question::{
    Question, QuestionSet, QuestionSetRef, QuestionSource, SetOrigin, SetOwner,
};
use crate::models::repository::RepositoryRef;
use crate::models::score::{FinalScore, QuestionScore};
use crate::roles::RoleType;

/// PostgreSQL-backed store. Multi-record writes run inside one transaction;
/// compare-and-set is an `UPDATE ... WHERE processing_token = $n` checked by row count.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Rows
// ──────────────────────────────────────────────

#[derive(Debug, FromRow)]
struct JobPostingRow {
    id: Uuid,
    title: String,
    role_type: String,
    description: String,
    current_set_id: Option<Uuid>,
    current_set_version: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct QuestionSetRow {
    id: Uuid,
    version: i32,
    owner_kind: String,
    owner_id: Uuid,
    role_type: String,
    origin: String,
    source_summary: String,
    questions: serde_json::Value,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct AssessmentRow {
    id: Uuid,
    job_posting_id: Uuid,
    candidate_name: String,
    candidate_email: String,
    role_type: String,
    question_source: String,
    repository: Option<String>,
    state: String,
    error_reason: Option<String>,
    processing_token: Uuid,
    question_set_id: Option<Uuid>,
    question_set_version: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct AnswerRow {
    question_index: i16,
    text: String,
    time_taken_secs: i32,
    submitted_at: DateTime<Utc>,
}

fn corrupt(what: &str, value: &str) -> StoreError {
    StoreError::Corrupt(format!("unrecognised {what} '{value}'"))
}

fn parse_role(value: &str) -> Result<RoleType, StoreError> {
    value.parse().map_err(|_| corrupt("role_type", value))
}

/// Stored as the canonical URL so the column decodes with `RepositoryRef::from_str`.
fn repository_column(repository: &RepositoryRef) -> String {
    repository.url()
}

fn seconds_column(secs: u32) -> Result<i32, StoreError> {
    i32::try_from(secs).map_err(|_| StoreError::OutOfRange(format!("time_taken_secs {secs}")))
}

fn set_ref(id: Option<Uuid>, version: Option<i32>) -> Option<QuestionSetRef> {
    match (id, version) {
        (Some(id), Some(version)) => Some(QuestionSetRef { id, version }),
        _ => None,
    }
}

impl TryFrom<JobPostingRow> for JobPosting {
    type Error = StoreError;

    fn try_from(row: JobPostingRow) -> Result<Self, Self::Error> {
        Ok(JobPosting {
            id: row.id,
            title: row.title,
            role_type: parse_role(&row.role_type)?,
            description: row.description,
            current_set: set_ref(row.current_set_id, row.current_set_version),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<QuestionSetRow> for QuestionSet {
    type Error = StoreError;

    fn try_from(row: QuestionSetRow) -> Result<Self, Self::Error> {
        let owner = match row.owner_kind.as_str() {
            "job_posting" => SetOwner::JobPosting(row.owner_id),
            "assessment" => SetOwner::Assessment(row.owner_id),
            other => return Err(corrupt("owner_kind", other)),
        };
        let questions: Vec<Question> = serde_json::from_value(row.questions)?;
        Ok(QuestionSet {
            id: row.id,
            version: row.version,
            owner,
            role_type: parse_role(&row.role_type)?,
            origin: SetOrigin::parse(&row.origin).ok_or_else(|| corrupt("origin", &row.origin))?,
            source_summary: row.source_summary,
            questions,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<AssessmentRow> for Assessment {
    type Error = StoreError;

    fn try_from(row: AssessmentRow) -> Result<Self, Self::Error> {
        let repository = row
            .repository
            .as_deref()
            .map(|r| r.parse::<RepositoryRef>().map_err(|_| corrupt("repository", r)))
            .transpose()?;
        Ok(Assessment {
            id: row.id,
            job_posting_id: row.job_posting_id,
            candidate_name: row.candidate_name,
            candidate_email: row.candidate_email,
            role_type: parse_role(&row.role_type)?,
            question_source: QuestionSource::parse(&row.question_source)
                .ok_or_else(|| corrupt("question_source", &row.question_source))?,
            repository,
            state: AssessmentState::parse(&row.state).ok_or_else(|| corrupt("state", &row.state))?,
            error_reason: row.error_reason,
            processing_token: row.processing_token,
            question_set: set_ref(row.question_set_id, row.question_set_version),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<AnswerRow> for Answer {
    fn from(row: AnswerRow) -> Self {
        Answer {
            question_index: row.question_index as u8,
            text: row.text,
            time_taken_secs: row.time_taken_secs.max(0) as u32,
            submitted_at: row.submitted_at,
        }
    }
}

// ──────────────────────────────────────────────
// Shared statements
// ──────────────────────────────────────────────

async fn insert_question_set(
    tx: &mut Transaction<'_, Postgres>,
    set: &QuestionSet,
) -> Result<(), StoreError> {
    let (owner_kind, owner_id) = match set.owner {
        SetOwner::JobPosting(id) => ("job_posting", id),
        SetOwner::Assessment(id) => ("assessment", id),
    };
    sqlx::query(
        r#"
        INSERT INTO question_sets
            (id, version, owner_kind, owner_id, role_type, origin, source_summary, questions, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(set.id)
    .bind(set.version)
    .bind(owner_kind)
    .bind(owner_id)
    .bind(set.role_type.as_str())
    .bind(set.origin.as_str())
    .bind(&set.source_summary)
    .bind(serde_json::to_value(&set.questions)?)
    .bind(set.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Conditional write of every mutable assessment column. Returns whether the token matched.
async fn update_assessment_if_token(
    tx: &mut Transaction<'_, Postgres>,
    expected_token: Uuid,
    next: &Assessment,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE assessments
        SET state = $3,
            error_reason = $4,
            processing_token = $5,
            question_set_id = $6,
            question_set_version = $7,
            updated_at = $8
        WHERE id = $1 AND processing_token = $2
        "#,
    )
    .bind(next.id)
    .bind(expected_token)
    .bind(next.state.as_str())
    .bind(&next.error_reason)
    .bind(next.processing_token)
    .bind(next.question_set.map(|s| s.id))
    .bind(next.question_set.map(|s| s.version))
    .bind(next.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
}

#[async_trait]
impl Store for PgStore {
    async fn insert_job_posting(&self, posting: &JobPosting) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO job_postings
                (id, title, role_type, description, current_set_id, current_set_version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(posting.id)
        .bind(&posting.title)
        .bind(posting.role_type.as_str())
        .bind(&posting.description)
        .bind(posting.current_set.map(|s| s.id))
        .bind(posting.current_set.map(|s| s.version))
        .bind(posting.created_at)
        .bind(posting.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job_posting(&self, id: Uuid) -> Result<Option<JobPosting>, StoreError> {
        sqlx::query_as::<_, JobPostingRow>("SELECT * FROM job_postings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(JobPosting::try_from)
            .transpose()
    }

    async fn publish_job_question_set(
        &self,
        job_posting_id: Uuid,
        expected_current: Option<QuestionSetRef>,
        set: &QuestionSet,
        description: Option<&str>,
    ) -> Result<PublishOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let pointer: Option<(Option<Uuid>, Option<i32>)> = sqlx::query_as(
            "SELECT current_set_id, current_set_version FROM job_postings WHERE id = $1 FOR UPDATE",
        )
        .bind(job_posting_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((current_id, current_version)) = pointer else {
            return Err(StoreError::Corrupt(format!(
                "job posting {job_posting_id} does not exist"
            )));
        };

        let current = set_ref(current_id, current_version);
        if current != expected_current {
            debug!("Publish for posting {job_posting_id} lost the pointer race");
            return Ok(PublishOutcome::Conflict { current });
        }

        insert_question_set(&mut tx, set).await?;
        sqlx::query(
            r#"
            UPDATE job_postings
            SET current_set_id = $2,
                current_set_version = $3,
                description = COALESCE($4, description),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_posting_id)
        .bind(set.id)
        .bind(set.version)
        .bind(description)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(PublishOutcome::Published(set.set_ref()))
    }

    async fn get_question_set(
        &self,
        set: QuestionSetRef,
    ) -> Result<Option<QuestionSet>, StoreError> {
        sqlx::query_as::<_, QuestionSetRow>(
            "SELECT * FROM question_sets WHERE id = $1 AND version = $2",
        )
        .bind(set.id)
        .bind(set.version)
        .fetch_optional(&self.pool)
        .await?
        .map(QuestionSet::try_from)
        .transpose()
    }

    async fn insert_assessment(&self, assessment: &Assessment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO assessments
                (id, job_posting_id, candidate_name, candidate_email, role_type, question_source,
                 repository, state, error_reason, processing_token, question_set_id,
                 question_set_version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(assessment.id)
        .bind(assessment.job_posting_id)
        .bind(&assessment.candidate_name)
        .bind(&assessment.candidate_email)
        .bind(assessment.role_type.as_str())
        .bind(assessment.question_source.as_str())
        .bind(assessment.repository.as_ref().map(repository_column))
        .bind(assessment.state.as_str())
        .bind(&assessment.error_reason)
        .bind(assessment.processing_token)
        .bind(assessment.question_set.map(|s| s.id))
        .bind(assessment.question_set.map(|s| s.version))
        .bind(assessment.created_at)
        .bind(assessment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_assessment(&self, id: Uuid) -> Result<Option<Assessment>, StoreError> {
        sqlx::query_as::<_, AssessmentRow>("SELECT * FROM assessments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Assessment::try_from)
            .transpose()
    }

    async fn compare_and_set(
        &self,
        expected_token: Uuid,
        next: &Assessment,
        private_set: Option<&QuestionSet>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        if !update_assessment_if_token(&mut tx, expected_token, next).await? {
            return Ok(false);
        }
        if let Some(set) = private_set {
            insert_question_set(&mut tx, set).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn list_stalled(
        &self,
        states: &[AssessmentState],
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Assessment>, StoreError> {
        let states: Vec<&str> = states.iter().map(|s| s.as_str()).collect();
        sqlx::query_as::<_, AssessmentRow>(
            "SELECT * FROM assessments WHERE state = ANY($1) AND updated_at < $2",
        )
        .bind(&states)
        .bind(updated_before)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Assessment::try_from)
        .collect()
    }

    async fn put_answers(
        &self,
        assessment_id: Uuid,
        expected_token: Uuid,
        answers: &[Answer],
    ) -> Result<bool, StoreError> {
        let seconds = answers
            .iter()
            .map(|a| seconds_column(a.time_taken_secs))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.pool.begin().await?;

        // Row lock keeps a concurrent transition from slipping in before the upsert.
        let accepting: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM assessments
            WHERE id = $1 AND processing_token = $2 AND state = $3
            FOR UPDATE
            "#,
        )
        .bind(assessment_id)
        .bind(expected_token)
        .bind(AssessmentState::Answering.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        if accepting.is_none() {
            return Ok(false);
        }

        for (answer, secs) in answers.iter().zip(seconds) {
            sqlx::query(
                r#"
                INSERT INTO answers (assessment_id, question_index, text, time_taken_secs, submitted_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (assessment_id, question_index)
                DO UPDATE SET text = EXCLUDED.text,
                              time_taken_secs = EXCLUDED.time_taken_secs,
                              submitted_at = EXCLUDED.submitted_at
                "#,
            )
            .bind(assessment_id)
            .bind(i16::from(answer.question_index))
            .bind(&answer.text)
            .bind(secs)
            .bind(answer.submitted_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn list_answers(&self, assessment_id: Uuid) -> Result<Vec<Answer>, StoreError> {
        Ok(sqlx::query_as::<_, AnswerRow>(
            r#"
            SELECT question_index, text, time_taken_secs, submitted_at
            FROM answers
            WHERE assessment_id = $1
            ORDER BY question_index ASC
            "#,
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Answer::from)
        .collect())
    }

    async fn commit_final_score(
        &self,
        expected_token: Uuid,
        next: &Assessment,
        scores: &[QuestionScore],
        final_score: &FinalScore,
    ) -> Result<FinalizeCommit, StoreError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<String> =
            sqlx::query_scalar("SELECT body FROM final_scores WHERE assessment_id = $1")
                .bind(next.id)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(body) = existing {
            return Ok(FinalizeCommit::Existing(serde_json::from_str(&body)?));
        }

        if !update_assessment_if_token(&mut tx, expected_token, next).await? {
            return Ok(FinalizeCommit::Stale);
        }

        for score in scores {
            sqlx::query(
                "INSERT INTO question_scores (assessment_id, question_index, body) VALUES ($1, $2, $3)",
            )
            .bind(next.id)
            .bind(score.question_index as i16)
            .bind(serde_json::to_string(score)?)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("INSERT INTO final_scores (assessment_id, body) VALUES ($1, $2)")
            .bind(next.id)
            .bind(serde_json::to_string(final_score)?)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Final score committed for assessment {}", next.id);
        Ok(FinalizeCommit::Committed(final_score.clone()))
    }

    async fn get_final_score(
        &self,
        assessment_id: Uuid,
    ) -> Result<Option<FinalScore>, StoreError> {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM final_scores WHERE assessment_id = $1")
                .bind(assessment_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
    }

    async fn list_question_scores(
        &self,
        assessment_id: Uuid,
    ) -> Result<Vec<QuestionScore>, StoreError> {
        let bodies: Vec<String> = sqlx::query_scalar(
            "SELECT body FROM question_scores WHERE assessment_id = $1 ORDER BY question_index ASC",
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(StoreError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_ref_requires_both_columns() {
        let id = Uuid::new_v4();
        assert_eq!(set_ref(Some(id), Some(2)), Some(QuestionSetRef { id, version: 2 }));
        assert_eq!(set_ref(Some(id), None), None);
        assert_eq!(set_ref(None, Some(1)), None);
    }

    fn repository_row(repository: Option<String>, state: &str) -> AssessmentRow {
        let now = Utc::now();
        AssessmentRow {
            id: Uuid::new_v4(),
            job_posting_id: Uuid::new_v4(),
            candidate_name: "Ada".into(),
            candidate_email: "ada@example.com".into(),
            role_type: RoleType::Backend.as_str().into(),
            question_source: QuestionSource::Repository.as_str().into(),
            repository,
            state: state.into(),
            error_reason: None,
            processing_token: Uuid::new_v4(),
            question_set_id: None,
            question_set_version: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_assessment_row_with_unknown_state_is_corrupt() {
        let repo: RepositoryRef = "https://github.com/rust-lang/rust".parse().unwrap();
        let row = repository_row(Some(repository_column(&repo)), "paused");
        let err = Assessment::try_from(row).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(msg) if msg.contains("paused")));
    }

    #[test]
    fn test_repository_column_decodes_back() {
        let repo: RepositoryRef = "github.com/tokio-rs/axum.git".parse().unwrap();
        let row = repository_row(
            Some(repository_column(&repo)),
            AssessmentState::Analyzing.as_str(),
        );
        let assessment = Assessment::try_from(row).unwrap();
        assert_eq!(assessment.repository, Some(repo));
        assert_eq!(assessment.state, AssessmentState::Analyzing);
    }

    #[test]
    fn test_seconds_column_rejects_values_past_i32() {
        assert_eq!(seconds_column(90).unwrap(), 90);
        assert_eq!(seconds_column(i32::MAX as u32).unwrap(), i32::MAX);
        let err = seconds_column(u32::MAX).unwrap_err();
        assert!(matches!(err, StoreError::OutOfRange(msg) if msg.contains("time_taken_secs")));
    }

    #[test]
    fn test_question_set_row_decodes_owner() {
        let owner_id = Uuid::new_v4();
        let row = QuestionSetRow {
            id: Uuid::new_v4(),
            version: 3,
            owner_kind: "assessment".into(),
            owner_id,
            role_type: "ML".into(),
            origin: "generated".into(),
            source_summary: "repo".into(),
            questions: serde_json::json!([]),
            created_at: Utc::now(),
        };
        let set = QuestionSet::try_from(row).unwrap();
        assert_eq!(set.owner, SetOwner::Assessment(owner_id));
        assert_eq!(set.role_type, RoleType::Ml);
        assert_eq!(set.origin, SetOrigin::Generated);
    }
}
