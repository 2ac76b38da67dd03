use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm_client::prompts::JSON_ONLY_INSTRUCTION;
use crate::llm_client::{LlmClient, LlmError};
use crate::models::question::QuestionType;
use crate::scoring::prompts::{GRADING_PROMPT_TEMPLATE, GRADING_SYSTEM, MAX_CONTEXT_CHARS};

const GRADING_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Error)]
pub enum GraderError {
    #[error("Grader call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Grader returned an unusable verdict: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy)]
pub struct GradeRequest<'a> {
    pub question_text: &'a str,
    pub question_type: QuestionType,
    pub answer_text: &'a str,
    pub context: &'a [String],
    pub expected_keywords: &'a [String],
}

/// Raw grader output. Dimension values are not trusted to be in range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraderVerdict {
    pub understanding: f64,
    pub technical: f64,
    pub accuracy: f64,
    pub communication: f64,
    pub relevance: f64,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub inconsistency: bool,
}

#[async_trait]
pub trait Grader: Send + Sync {
    async fn grade(&self, request: GradeRequest<'_>) -> Result<GraderVerdict, GraderError>;
}

pub struct LlmGrader {
    llm: LlmClient,
}

impl LlmGrader {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

fn build_prompt(request: &GradeRequest<'_>) -> String {
    let mut context = request.context.join("\n---\n");
    if context.trim().is_empty() {
        context = "(none available)".to_string();
    } else if context.len() > MAX_CONTEXT_CHARS {
        let cut = (0..=MAX_CONTEXT_CHARS)
            .rev()
            .find(|i| context.is_char_boundary(*i))
            .unwrap_or(0);
        context.truncate(cut);
    }

    GRADING_PROMPT_TEMPLATE
        .replace("{question_type}", request.question_type.as_str())
        .replace("{question}", request.question_text)
        .replace("{keywords}", &request.expected_keywords.join(", "))
        .replace("{answer}", request.answer_text)
        .replace("{context}", &context)
}

#[async_trait]
impl Grader for LlmGrader {
    async fn grade(&self, request: GradeRequest<'_>) -> Result<GraderVerdict, GraderError> {
        let prompt = build_prompt(&request);
        let system = format!("{GRADING_SYSTEM} {JSON_ONLY_INSTRUCTION}");
        let verdict: GraderVerdict = self
            .llm
            .call_json(&prompt, &system, GRADING_TEMPERATURE)
            .await?;

        let dimensions = [
            verdict.understanding,
            verdict.technical,
            verdict.accuracy,
            verdict.communication,
            verdict.relevance,
        ];
        if dimensions.iter().any(|v| !v.is_finite()) {
            return Err(GraderError::Invalid("non-numeric dimension".to_string()));
        }
        Ok(verdict)
    }
}
