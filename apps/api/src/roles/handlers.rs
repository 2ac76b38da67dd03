use axum::{
    extract::{Path, Query},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::roles::{skill_match, RoleProfile, RoleType};

#[derive(Serialize)]
pub struct RoleSummary {
    pub role_type: RoleType,
    pub description: &'static str,
    pub required_skills: Vec<&'static str>,
}

#[derive(Deserialize)]
pub struct SkillsQuery {
    /// Comma-separated skills detected for a candidate.
    #[serde(default)]
    pub detected: Option<String>,
}

#[derive(Serialize)]
pub struct RoleSkillsResponse {
    #[serde(flatten)]
    pub profile: RoleProfile,
    /// Present only when `detected` was supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
}

/// GET /api/v1/roles
pub async fn handle_list_roles() -> Json<Vec<RoleSummary>> {
    Json(
        RoleType::ALL
            .iter()
            .map(|role| {
                let profile = role.profile();
                RoleSummary {
                    role_type: *role,
                    description: profile.description,
                    required_skills: profile.required_skill_names(),
                }
            })
            .collect(),
    )
}

/// GET /api/v1/roles/:role/skills
pub async fn handle_role_skills(
    Path(role): Path<String>,
    Query(params): Query<SkillsQuery>,
) -> Result<Json<RoleSkillsResponse>, AppError> {
    let role: RoleType = role
        .parse()
        .map_err(|e: crate::roles::UnknownRole| AppError::NotFound(e.to_string()))?;

    let match_score = params.detected.map(|raw| {
        let detected: Vec<String> = raw.split(',').map(str::to_string).collect();
        (skill_match(role, &detected) * 100.0).round() / 100.0
    });

    Ok(Json(RoleSkillsResponse {
        profile: role.profile(),
        match_score,
    }))
}
