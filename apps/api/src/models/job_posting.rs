use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::question::QuestionSetRef;
use crate::roles::RoleType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: Uuid,
    pub title: String,
    pub role_type: RoleType,
    pub description: String,
    /// The "current" shared question set. Swapped atomically on regeneration.
    pub current_set: Option<QuestionSetRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobPosting {
    pub fn new(title: String, role_type: RoleType, description: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title,
            role_type,
            description,
            current_set: None,
            created_at: now,
            updated_at: now,
        }
    }
}
