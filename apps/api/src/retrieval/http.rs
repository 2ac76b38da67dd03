use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    ContextError, ContextProvider, ContextQuery, RepositoryError, RepositorySummary, CONTEXT_TOP_K,
};
use crate::models::question::QuestionSource;
use crate::models::repository::RepositoryRef;

const INDEX_TIMEOUT: Duration = Duration::from_secs(600);
const CONTEXT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct IndexRequest<'a> {
    assessment_id: Uuid,
    repository_url: &'a str,
}

#[derive(Debug, Serialize)]
struct ContextRequest<'a> {
    assessment_id: Uuid,
    query: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct ContextResponse {
    #[serde(default)]
    snippets: Vec<String>,
}

/// Talks to the repository analysis / retrieval service over HTTP.
#[derive(Clone)]
pub struct HttpContextProvider {
    client: Client,
    base_url: String,
}

impl HttpContextProvider {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

fn repository_error(status: StatusCode, repository: &RepositoryRef, body: String) -> RepositoryError {
    let name = repository.to_string();
    match status {
        StatusCode::NOT_FOUND => RepositoryError::NotFound(name),
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => RepositoryError::Private(name),
        StatusCode::UNPROCESSABLE_ENTITY => RepositoryError::Empty(name),
        other => RepositoryError::Unavailable(format!("{name}: status {other}: {body}")),
    }
}

#[async_trait]
impl ContextProvider for HttpContextProvider {
    async fn index_repository(
        &self,
        assessment_id: Uuid,
        repository: &RepositoryRef,
    ) -> Result<RepositorySummary, RepositoryError> {
        let url = repository.url();
        let response = self
            .client
            .post(format!("{}/v1/repositories/index", self.base_url))
            .timeout(INDEX_TIMEOUT)
            .json(&IndexRequest {
                assessment_id,
                repository_url: &url,
            })
            .send()
            .await
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Repository indexing for {repository} returned {status}");
            return Err(repository_error(status, repository, body));
        }

        let summary: RepositorySummary = response
            .json()
            .await
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;
        if summary.total_files == 0 {
            return Err(RepositoryError::Empty(repository.to_string()));
        }

        debug!(
            "Indexed {repository}: {} files, {} artifacts",
            summary.total_files,
            summary.artifacts.len()
        );
        Ok(summary)
    }

    async fn get_context(&self, query: ContextQuery<'_>) -> Result<Vec<String>, ContextError> {
        // Job-description questions carry their requirement text; nothing is indexed.
        if query.source == QuestionSource::JobDescription {
            let requirement = query.question.context.trim();
            return Ok(if requirement.is_empty() {
                Vec::new()
            } else {
                vec![requirement.to_string()]
            });
        }

        let text = format!("{} {}", query.question.text, query.question.context);
        let response = self
            .client
            .post(format!("{}/v1/context", self.base_url))
            .timeout(CONTEXT_TIMEOUT)
            .json(&ContextRequest {
                assessment_id: query.assessment_id,
                query: text.trim(),
                top_k: CONTEXT_TOP_K,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ContextError::Status(response.status().as_u16()));
        }

        let body: ContextResponse = response.json().await?;
        Ok(body.snippets)
    }
}
