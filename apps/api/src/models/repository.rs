use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const GITHUB_PREFIXES: &[&str] = &["https://github.com/", "http://github.com/", "github.com/"];

/// A candidate's public GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum RepositoryRefError {
    #[error("repository reference is empty")]
    Empty,
    #[error("repository reference must be a github.com URL: {0}")]
    NotGithub(String),
    #[error("repository reference must look like github.com/<owner>/<repo>: {0}")]
    Malformed(String),
}

impl RepositoryRef {
    pub fn url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepositoryRef {
    type Err = RepositoryRefError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RepositoryRefError::Empty);
        }

        let path = GITHUB_PREFIXES
            .iter()
            .find_map(|prefix| raw.strip_prefix(prefix))
            .ok_or_else(|| RepositoryRefError::NotGithub(raw.to_string()))?;

        let path = path.trim_end_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);

        let mut parts = path.split('/');
        let (owner, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) => (owner, name),
            _ => return Err(RepositoryRefError::Malformed(raw.to_string())),
        };

        let valid = |s: &str| {
            !s.is_empty()
                && s
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid(owner) || !valid(name) {
            return Err(RepositoryRefError::Malformed(raw.to_string()));
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}
