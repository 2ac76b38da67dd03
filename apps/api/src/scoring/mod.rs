//! Scoring Engine: grades every answered question and rolls the results up.
//!
//! Per-question grading fans out concurrently; each grader call retries with
//! exponential backoff and degrades to an "evaluation unavailable" placeholder
//! when exhausted. Only a total failure fails the assessment.

pub mod engine;
pub mod fraud;
pub mod grader;
pub mod prompts;
pub mod weights;

pub use engine::{ScoringEngine, ScoringError, ScoringOutcome};
pub use grader::{GradeRequest, Grader, GraderError, GraderVerdict, LlmGrader};
