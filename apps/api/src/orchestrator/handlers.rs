use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::answer::AnswerInput;
use crate::models::job_posting::JobPosting;
use crate::models::question::CandidateQuestion;
use crate::models::score::FinalScore;
use crate::orchestrator::service::{
    AnswerAck, FinalizeAck, NewJobPosting, RegenerateRequest, StatusView, SubmitAck,
    SubmitRequest,
};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AnswersRequest {
    pub answers: Vec<AnswerInput>,
}

/// POST /api/v1/job-postings
pub async fn handle_publish_job_posting(
    State(state): State<AppState>,
    Json(req): Json<NewJobPosting>,
) -> Result<(StatusCode, Json<JobPosting>), AppError> {
    let posting = state.orchestrator.publish_job_posting(req).await?;
    Ok((StatusCode::CREATED, Json(posting)))
}

/// GET /api/v1/job-postings/:id
pub async fn handle_get_job_posting(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobPosting>, AppError> {
    Ok(Json(state.orchestrator.get_job_posting(id).await?))
}

/// POST /api/v1/job-postings/:id/regenerate
pub async fn handle_regenerate_questions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RegenerateRequest>,
) -> Result<Json<JobPosting>, AppError> {
    Ok(Json(state.orchestrator.regenerate_job_questions(id, req).await?))
}

/// POST /api/v1/assessments
pub async fn handle_submit(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitAck>), AppError> {
    let ack = state.orchestrator.submit(req).await?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

/// GET /api/v1/assessments/:id/status
pub async fn handle_get_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusView>, AppError> {
    Ok(Json(state.orchestrator.get_status(id).await?))
}

/// GET /api/v1/assessments/:id/questions
pub async fn handle_get_questions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CandidateQuestion>>, AppError> {
    Ok(Json(state.orchestrator.get_questions(id).await?))
}

/// POST /api/v1/assessments/:id/answers
pub async fn handle_submit_answers(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AnswersRequest>,
) -> Result<Json<AnswerAck>, AppError> {
    Ok(Json(state.orchestrator.submit_answers(id, req.answers).await?))
}

/// POST /api/v1/assessments/:id/finalize
pub async fn handle_finalize(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<FinalizeAck>), AppError> {
    let ack = state.orchestrator.finalize(id).await?;
    let status = if ack.queued {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ack)))
}

/// GET /api/v1/assessments/:id/report
pub async fn handle_get_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FinalScore>, AppError> {
    Ok(Json(state.orchestrator.get_report(id).await?))
}
