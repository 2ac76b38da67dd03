//! Role profiles: the skill model behind every role a posting can hire for.
//!
//! Profiles are static. They parameterise the fallback question template and the
//! generation prompt, and back the `/roles` endpoints.

pub mod handlers;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleType {
    Frontend,
    Backend,
    #[serde(rename = "ML")]
    Ml,
    DevOps,
    FullStack,
}

#[derive(Debug, Error, PartialEq)]
#[error("Unknown role type: {0}. Available: Frontend, Backend, ML, DevOps, FullStack")]
pub struct UnknownRole(pub String);

impl RoleType {
    pub const ALL: [RoleType; 5] = [
        RoleType::Frontend,
        RoleType::Backend,
        RoleType::Ml,
        RoleType::DevOps,
        RoleType::FullStack,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RoleType::Frontend => "Frontend",
            RoleType::Backend => "Backend",
            RoleType::Ml => "ML",
            RoleType::DevOps => "DevOps",
            RoleType::FullStack => "FullStack",
        }
    }

    pub fn profile(self) -> RoleProfile {
        RoleProfile::for_role(self)
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleType {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "frontend" => Ok(RoleType::Frontend),
            "backend" => Ok(RoleType::Backend),
            "ml" | "machinelearning" => Ok(RoleType::Ml),
            "devops" => Ok(RoleType::DevOps),
            "fullstack" => Ok(RoleType::FullStack),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillCategory {
    Technical,
    Tool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Skill {
    pub name: &'static str,
    /// 0.0 – 1.0
    pub weight: f64,
    pub required: bool,
    pub category: SkillCategory,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleProfile {
    pub role_type: RoleType,
    pub description: &'static str,
    pub required_skills: Vec<Skill>,
    pub optional_skills: Vec<Skill>,
}

const fn req(name: &'static str, weight: f64, category: SkillCategory) -> Skill {
    Skill {
        name,
        weight,
        required: true,
        category,
    }
}

const fn opt(name: &'static str, weight: f64, category: SkillCategory) -> Skill {
    Skill {
        name,
        weight,
        required: false,
        category,
    }
}

impl RoleProfile {
    pub fn for_role(role: RoleType) -> Self {
        use SkillCategory::{Technical as T, Tool};

        let (description, required_skills, optional_skills) = match role {
            RoleType::Frontend => (
                "Frontend Development - UI/UX and client-side development",
                vec![
                    req("React", 0.25, T),
                    req("JavaScript/TypeScript", 0.20, T),
                    req("HTML/CSS", 0.15, T),
                    req("State Management", 0.15, T),
                    req("API Integration", 0.15, T),
                    req("Responsive Design", 0.10, T),
                ],
                vec![
                    opt("Next.js", 0.08, T),
                    opt("Testing (Jest/Vitest)", 0.07, T),
                    opt("UI Frameworks (Tailwind/MUI)", 0.06, Tool),
                    opt("Performance Optimization", 0.05, T),
                ],
            ),
            RoleType::Backend => (
                "Backend Development - server-side logic and APIs",
                vec![
                    req("Web Frameworks", 0.20, T),
                    req("RESTful API Design", 0.18, T),
                    req("Database (SQL/NoSQL)", 0.18, T),
                    req("Authentication & Authorization", 0.15, T),
                    req("Server-side Languages", 0.15, T),
                    req("Error Handling", 0.10, T),
                ],
                vec![
                    opt("Microservices", 0.08, T),
                    opt("Caching (Redis)", 0.07, T),
                    opt("Message Queues", 0.06, T),
                    opt("API Documentation", 0.05, T),
                ],
            ),
            RoleType::Ml => (
                "Machine Learning - ML models and data science",
                vec![
                    req("Model Training", 0.25, T),
                    req("Model Evaluation", 0.20, T),
                    req("Data Preprocessing", 0.18, T),
                    req("Python ML Libraries", 0.15, Tool),
                    req("Feature Engineering", 0.12, T),
                    req("Model Optimization", 0.10, T),
                ],
                vec![
                    opt("Deep Learning (PyTorch/TensorFlow)", 0.10, T),
                    opt("MLOps", 0.08, T),
                    opt("Computer Vision/NLP", 0.08, T),
                    opt("Model Deployment", 0.07, T),
                ],
            ),
            RoleType::DevOps => (
                "DevOps - CI/CD, infrastructure, and automation",
                vec![
                    req("CI/CD Pipelines", 0.25, T),
                    req("Docker/Containerization", 0.20, Tool),
                    req("Cloud Platform (AWS/Azure/GCP)", 0.18, Tool),
                    req("Infrastructure as Code", 0.15, T),
                    req("Scripting (Bash/Python)", 0.12, T),
                    req("Monitoring & Logging", 0.10, T),
                ],
                vec![
                    opt("Kubernetes", 0.10, Tool),
                    opt("Terraform/Ansible", 0.08, Tool),
                    opt("Security Best Practices", 0.07, T),
                    opt("Performance Tuning", 0.06, T),
                ],
            ),
            RoleType::FullStack => (
                "Full Stack Development - frontend and backend",
                vec![
                    req("Frontend Framework", 0.18, T),
                    req("Backend Framework", 0.18, T),
                    req("API Development", 0.15, T),
                    req("Database", 0.15, T),
                    req("JavaScript/TypeScript", 0.12, T),
                    req("Authentication", 0.12, T),
                    req("State Management", 0.10, T),
                ],
                vec![
                    opt("DevOps Basics", 0.08, T),
                    opt("Testing", 0.07, T),
                    opt("Microservices", 0.06, T),
                ],
            ),
        };

        Self {
            role_type: role,
            description,
            required_skills,
            optional_skills,
        }
    }

    pub fn required_skill_names(&self) -> Vec<&'static str> {
        self.required_skills.iter().map(|s| s.name).collect()
    }

    pub fn all_skills(&self) -> impl Iterator<Item = &Skill> {
        self.required_skills.iter().chain(self.optional_skills.iter())
    }
}

/// Weighted share (0–100) of the role's skills covered by `detected`.
///
/// A skill counts as covered when a detected name and the skill name contain one
/// another, case-insensitively.
pub fn skill_match(role: RoleType, detected: &[String]) -> f64 {
    let profile = role.profile();
    let detected: Vec<String> = detected
        .iter()
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect();

    let mut total = 0.0;
    let mut matched = 0.0;
    for skill in profile.all_skills() {
        total += skill.weight;
        let name = skill.name.to_lowercase();
        if detected
            .iter()
            .any(|d| name.contains(d.as_str()) || d.contains(name.as_str()))
        {
            matched += skill.weight;
        }
    }

    if total > 0.0 {
        matched / total * 100.0
    } else {
        0.0
    }
}
