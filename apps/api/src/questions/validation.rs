use thiserror::Error;

use crate::models::question::{Difficulty, Question, QuestionType, QUESTIONS_PER_SET};

/// Required count of each question type in a set.
pub fn expected_type_count(question_type: QuestionType) -> usize {
    match question_type {
        QuestionType::Why => 2,
        QuestionType::What => 3,
        QuestionType::How => 3,
        QuestionType::Where => 2,
    }
}

/// Required count of each difficulty in a set.
pub fn expected_difficulty_count(difficulty: Difficulty) -> usize {
    match difficulty {
        Difficulty::Easy => 3,
        Difficulty::Medium => 5,
        Difficulty::Hard => 2,
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DistributionError {
    #[error("expected {expected} questions, got {actual}")]
    Count { expected: usize, actual: usize },

    #[error("expected {expected} '{question_type}' questions, got {actual}")]
    TypeMix {
        question_type: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("expected {expected} '{difficulty}' questions, got {actual}")]
    DifficultyMix {
        difficulty: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("question {position} has no text")]
    BlankText { position: usize },
}

/// Checks a generated set against the 10-question, 2/3/3/2 type, 3/5/2 difficulty shape.
pub fn validate_distribution(questions: &[Question]) -> Result<(), DistributionError> {
    if questions.len() != QUESTIONS_PER_SET {
        return Err(DistributionError::Count {
            expected: QUESTIONS_PER_SET,
            actual: questions.len(),
        });
    }

    if let Some(position) = questions.iter().position(|q| q.text.trim().is_empty()) {
        return Err(DistributionError::BlankText {
            position: position + 1,
        });
    }

    for question_type in QuestionType::ALL {
        let actual = questions
            .iter()
            .filter(|q| q.question_type == question_type)
            .count();
        let expected = expected_type_count(question_type);
        if actual != expected {
            return Err(DistributionError::TypeMix {
                question_type: question_type.as_str(),
                expected,
                actual,
            });
        }
    }

    for difficulty in Difficulty::ALL {
        let actual = questions
            .iter()
            .filter(|q| q.difficulty == difficulty)
            .count();
        let expected = expected_difficulty_count(difficulty);
        if actual != expected {
            return Err(DistributionError::DifficultyMix {
                difficulty: difficulty.as_str(),
                expected,
                actual,
            });
        }
    }

    Ok(())
}
