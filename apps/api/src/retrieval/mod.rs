//! Context provider seam: repository analysis and per-question context retrieval.
//!
//! Cloning, parsing and vector search live in a separate collaborator service; this
//! module only defines the contract and an HTTP adapter for it.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::question::{Question, QuestionSource};
use crate::models::repository::RepositoryRef;

pub use http::HttpContextProvider;

/// Snippets returned per question when retrieving from an indexed repository.
pub const CONTEXT_TOP_K: usize = 5;

/// Repository analysis failures. `Unavailable` is retried with backoff; the rest,
/// and an `Unavailable` that outlasts its retries, move the assessment to `error`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("Repository not found: {0}")]
    NotFound(String),

    #[error("Repository is private and no credentials are configured: {0}")]
    Private(String),

    #[error("Repository has no analysable source files: {0}")]
    Empty(String),

    /// The context service could not be reached or failed transiently.
    #[error("Repository analysis unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Context request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Context service returned status {0}")]
    Status(u16),
}

/// A code unit extracted by the analysis collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeArtifact {
    pub path: String,
    /// function, class, module, config ...
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub excerpt: String,
}

/// Project summary produced by repository analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub name: String,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub total_files: usize,
    #[serde(default)]
    pub readme_excerpt: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<CodeArtifact>,
}

impl RepositorySummary {
    /// Flat text form stored as the private question set's source summary.
    pub fn describe(&self) -> String {
        let mut out = format!(
            "Repository: {}\nTech stack: {}\nFiles analysed: {}\n",
            self.name,
            if self.tech_stack.is_empty() {
                "unknown".to_string()
            } else {
                self.tech_stack.join(", ")
            },
            self.total_files
        );
        if let Some(readme) = self.readme_excerpt.as_deref().filter(|r| !r.trim().is_empty()) {
            out.push_str("README:\n");
            out.push_str(readme.trim());
            out.push('\n');
        }
        out
    }
}

/// Which assessment and question a context lookup is for.
#[derive(Debug, Clone, Copy)]
pub struct ContextQuery<'a> {
    pub assessment_id: Uuid,
    pub source: QuestionSource,
    pub question: &'a Question,
}

#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Clones and indexes the repository for `assessment_id`.
    async fn index_repository(
        &self,
        assessment_id: Uuid,
        repository: &RepositoryRef,
    ) -> Result<RepositorySummary, RepositoryError>;

    /// Supporting text for grading one answer. May be empty.
    async fn get_context(&self, query: ContextQuery<'_>) -> Result<Vec<String>, ContextError>;
}
