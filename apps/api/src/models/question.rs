use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::roles::RoleType;

/// Every question set holds exactly this many questions.
pub const QUESTIONS_PER_SET: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Why,
    What,
    How,
    Where,
}

impl QuestionType {
    pub const ALL: [QuestionType; 4] = [Self::Why, Self::What, Self::How, Self::Where];

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Why => "why",
            QuestionType::What => "what",
            QuestionType::How => "how",
            QuestionType::Where => "where",
        }
    }

    /// `how` and `what` questions are answered from the code itself, so the
    /// keyword-overlap fraud check only applies to them.
    pub fn is_code_grounded(self) -> bool {
        matches!(self, QuestionType::How | QuestionType::What)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Self::Easy, Self::Medium, Self::Hard];

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// Where an assessment's questions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionSource {
    JobDescription,
    Repository,
}

impl QuestionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionSource::JobDescription => "job_description",
            QuestionSource::Repository => "repository",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "job_description" => Some(QuestionSource::JobDescription),
            "repository" => Some(QuestionSource::Repository),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// 1-based position within the set. Assigned after validation, never by the generator.
    #[serde(default)]
    pub index: u8,
    pub text: String,
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
    /// Supporting context: a file/area reference for repository sets, requirement text for JD sets.
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub expected_keywords: Vec<String>,
    #[serde(default)]
    pub evaluation_criteria: Vec<String>,
}

/// Versioned pointer to an immutable question set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestionSetRef {
    pub id: Uuid,
    pub version: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SetOwner {
    /// Shared by every assessment for the posting.
    JobPosting(Uuid),
    /// Private to a single repository-mode assessment.
    Assessment(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOrigin {
    Generated,
    Fallback,
}

impl SetOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            SetOrigin::Generated => "generated",
            SetOrigin::Fallback => "fallback",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "generated" => Some(SetOrigin::Generated),
            "fallback" => Some(SetOrigin::Fallback),
            _ => None,
        }
    }
}

/// An immutable, versioned set of questions. Never edited after creation;
/// regeneration always produces a new set with a higher version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub id: Uuid,
    pub version: i32,
    pub owner: SetOwner,
    pub role_type: RoleType,
    pub origin: SetOrigin,
    /// Material the set was generated from (JD text or repository summary).
    pub source_summary: String,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
}

impl QuestionSet {
    pub fn set_ref(&self) -> QuestionSetRef {
        QuestionSetRef {
            id: self.id,
            version: self.version,
        }
    }

    pub fn question(&self, index: u8) -> Option<&Question> {
        self.questions.iter().find(|q| q.index == index)
    }
}

/// What a candidate sees: no expected keywords, no evaluation criteria.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateQuestion {
    pub index: u8,
    pub text: String,
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
    pub context: String,
}

impl From<&Question> for CandidateQuestion {
    fn from(q: &Question) -> Self {
        Self {
            index: q.index,
            text: q.text.clone(),
            question_type: q.question_type,
            difficulty: q.difficulty,
            context: q.context.clone(),
        }
    }
}
