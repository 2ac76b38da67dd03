//! Per-answer fraud heuristics. Any hit flags the answer; all hits are joined
//! into one human-readable reason.

use std::collections::HashSet;

use crate::models::question::Question;

/// Phrases that mark a generic or copy-paste answer. Matched as substrings.
pub const GENERIC_PATTERNS: [&str; 6] = [
    "i don't know",
    "not sure",
    "can't remember",
    "didn't implement",
    "copied from",
    "found online",
];

pub const MIN_ANSWER_CHARS: usize = 20;
/// Below this share of expected keywords, a code-grounded answer is suspicious.
pub const MIN_KEYWORD_OVERLAP: f64 = 0.1;

/// Share of `expected` keywords present in `answer`. `None` when there is nothing to compare.
pub fn keyword_overlap(answer: &str, expected: &[String]) -> Option<f64> {
    let expected: Vec<String> = expected
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if expected.is_empty() {
        return None;
    }

    let lowered = answer.to_lowercase();
    let tokens: HashSet<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    let hits = expected
        .iter()
        .filter(|k| tokens.contains(k.as_str()) || lowered.contains(k.as_str()))
        .count();
    Some(hits as f64 / expected.len() as f64)
}

/// Runs every heuristic for one answer. Returns the combined reason when any fires.
pub fn detect(question: &Question, answer: &str, grader_inconsistency: bool) -> Option<String> {
    let trimmed = answer.trim();
    let lowered = trimmed.to_lowercase();
    let mut reasons = Vec::new();

    if let Some(pattern) = GENERIC_PATTERNS.iter().find(|p| lowered.contains(*p)) {
        reasons.push(format!("Generic response detected: '{pattern}'"));
    }

    if trimmed.chars().count() < MIN_ANSWER_CHARS {
        reasons.push(format!("Answer too short (< {MIN_ANSWER_CHARS} characters)"));
    }

    if question.question_type.is_code_grounded() {
        if let Some(overlap) = keyword_overlap(trimmed, &question.expected_keywords) {
            if overlap < MIN_KEYWORD_OVERLAP {
                reasons.push(format!(
                    "Near-zero overlap with expected keywords ({:.0}%)",
                    overlap * 100.0
                ));
            }
        }
    }

    if grader_inconsistency {
        reasons.push("Grader flagged the answer as inconsistent with the context".to_string());
    }

    (!reasons.is_empty()).then(|| reasons.join("; "))
}
