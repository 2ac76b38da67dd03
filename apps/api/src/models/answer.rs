use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored answer. One per question per assessment; a resubmission replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_index: u8,
    pub text: String,
    pub time_taken_secs: u32,
    pub submitted_at: DateTime<Utc>,
}

/// Answer as submitted by the candidate.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerInput {
    pub question_index: u8,
    pub text: String,
    #[serde(default)]
    pub time_taken_secs: u32,
}

impl AnswerInput {
    pub fn into_answer(self, submitted_at: DateTime<Utc>) -> Answer {
        Answer {
            question_index: self.question_index,
            text: self.text,
            time_taken_secs: self.time_taken_secs,
            submitted_at,
        }
    }
}
