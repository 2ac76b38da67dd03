use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::llm_client::prompts::{GROUNDING_INSTRUCTION, JSON_ONLY_INSTRUCTION};
use crate::llm_client::{LlmClient, LlmError};
use crate::models::question::Question;
use crate::questions::prompts::{
    JOB_DESCRIPTION_SOURCE, QUESTION_GENERATION_SYSTEM, QUESTION_GENERATION_TEMPLATE,
    REPOSITORY_SOURCE,
};
use crate::questions::validation::DistributionError;
use crate::retrieval::RepositorySummary;
use crate::roles::RoleType;

const GENERATION_TEMPERATURE: f32 = 0.7;
/// Artifacts quoted in a repository prompt.
const MAX_PROMPT_ARTIFACTS: usize = 20;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generator call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Generated set has the wrong shape: {0}")]
    Distribution(#[from] DistributionError),
}

/// What a question set is generated from.
#[derive(Debug, Clone, Copy)]
pub enum SourceMaterial<'a> {
    JobDescription { title: &'a str, description: &'a str },
    Repository(&'a RepositorySummary),
}

impl SourceMaterial<'_> {
    pub fn summary(&self) -> String {
        match self {
            SourceMaterial::JobDescription { title, description } => {
                format!("{title}\n\n{description}")
            }
            SourceMaterial::Repository(summary) => summary.describe(),
        }
    }
}

/// Produces raw questions. The output is untrusted: callers validate it.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        role: RoleType,
        material: SourceMaterial<'_>,
    ) -> Result<Vec<Question>, GenerationError>;
}

#[derive(Debug, Deserialize)]
struct GeneratedQuestions {
    questions: Vec<Question>,
}

pub struct LlmGenerator {
    llm: LlmClient,
}

impl LlmGenerator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

fn build_prompt(role: RoleType, material: SourceMaterial<'_>) -> String {
    let profile = role.profile();
    let (source_kind, source) = match material {
        SourceMaterial::JobDescription { .. } => (JOB_DESCRIPTION_SOURCE, material.summary()),
        SourceMaterial::Repository(summary) => {
            let mut source = summary.describe();
            for artifact in summary.artifacts.iter().take(MAX_PROMPT_ARTIFACTS) {
                source.push_str(&format!(
                    "\n[{}] {} {}\n{}\n",
                    artifact.path, artifact.kind, artifact.name, artifact.excerpt
                ));
            }
            (REPOSITORY_SOURCE, source)
        }
    };

    QUESTION_GENERATION_TEMPLATE
        .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
        .replace("{role}", role.as_str())
        .replace("{role_description}", profile.description)
        .replace("{skills}", &profile.required_skill_names().join(", "))
        .replace("{source_kind}", source_kind)
        .replace("{source}", &source)
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(
        &self,
        role: RoleType,
        material: SourceMaterial<'_>,
    ) -> Result<Vec<Question>, GenerationError> {
        let prompt = build_prompt(role, material);
        let system = format!("{QUESTION_GENERATION_SYSTEM} {JSON_ONLY_INSTRUCTION}");
        let generated: GeneratedQuestions = self
            .llm
            .call_json(&prompt, &system, GENERATION_TEMPERATURE)
            .await?;
        debug!(
            "Generator returned {} questions for {role}",
            generated.questions.len()
        );
        Ok(generated.questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::CodeArtifact;

    #[test]
    fn test_job_description_prompt_has_no_placeholders() {
        let prompt = build_prompt(
            RoleType::Backend,
            SourceMaterial::JobDescription {
                title: "Platform Engineer",
                description: "Build resilient REST services in Rust.",
            },
        );
        assert!(prompt.contains("Platform Engineer"));
        assert!(prompt.contains("RESTful API Design"));
        assert!(prompt.contains("exactly 2 \"why\""));
        for placeholder in ["{role}", "{skills}", "{source}", "{grounding_instruction}"] {
            assert!(!prompt.contains(placeholder), "{placeholder} left in prompt");
        }
    }

    #[test]
    fn test_repository_prompt_quotes_artifacts() {
        let summary = RepositorySummary {
            name: "octo/widgets".into(),
            tech_stack: vec!["TypeScript".into()],
            total_files: 12,
            readme_excerpt: None,
            artifacts: vec![CodeArtifact {
                path: "src/store.ts".into(),
                kind: "function".into(),
                name: "createStore".into(),
                excerpt: "export function createStore() {}".into(),
            }],
        };
        let prompt = build_prompt(RoleType::Frontend, SourceMaterial::Repository(&summary));
        assert!(prompt.contains("[src/store.ts] function createStore"));
        assert!(prompt.contains(REPOSITORY_SOURCE));
    }

    #[test]
    fn test_generated_payload_deserializes() {
        let json = r#"{"questions": [
            {"text": "Why Axum?", "question_type": "why", "difficulty": "easy"}
        ]}"#;
        let parsed: GeneratedQuestions = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.questions.len(), 1);
        assert_eq!(parsed.questions[0].index, 0);
    }
}
