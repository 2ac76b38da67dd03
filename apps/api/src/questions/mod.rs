//! Question sourcing: LLM generation, distribution validation, the static fallback
//! template, and binding a set to an assessment.

pub mod fallback;
pub mod generator;
pub mod prompts;
pub mod resolver;
pub mod validation;

use crate::models::question::Question;

pub use generator::{GenerationError, Generator, LlmGenerator, SourceMaterial};
pub use resolver::{QuestionSourceResolver, ResolveError};

/// Assigns 1-based indices in order. Generators never choose indices.
pub fn number_questions(mut questions: Vec<Question>) -> Vec<Question> {
    for (position, question) in questions.iter_mut().enumerate() {
        question.index = (position + 1) as u8;
    }
    questions
}
