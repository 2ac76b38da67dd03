use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    /// When unset the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub llm_api_key: String,
    pub llm_api_url: String,
    pub llm_model: String,
    pub context_service_url: String,
    pub port: u16,
    pub rust_log: String,
    pub orchestration: OrchestrationConfig,
    pub scoring: ScoringConfig,
}

/// Worker pool, queue, and timeout tunables for the assessment lifecycle.
#[derive(Debug, Clone)]
pub struct OrchestrationConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    /// Wall-clock bound for `analyzing` / `evaluating` before the sweep errors the assessment.
    pub stage_timeout: Duration,
    pub sweep_interval: Duration,
    /// Generator attempts before falling back to the static template.
    pub generation_attempts: u32,
    /// Repository analysis attempts while the context service is unavailable.
    pub index_attempts: u32,
    /// Base delay between those attempts; doubles per retry.
    pub index_backoff: Duration,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 256,
            stage_timeout: Duration::from_secs(900),
            sweep_interval: Duration::from_secs(60),
            generation_attempts: 2,
            index_attempts: 3,
            index_backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub grader_max_attempts: u32,
    /// Base delay; doubles per retry.
    pub grader_backoff: Duration,
    /// Max in-flight grader calls for one assessment.
    pub grading_concurrency: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            grader_max_attempts: 3,
            grader_backoff: Duration::from_millis(500),
            grading_concurrency: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let orchestration_defaults = OrchestrationConfig::default();
        let scoring_defaults = ScoringConfig::default();

        Ok(Config {
            database_url: std::env::var("DATABASE_URL").ok(),
            llm_api_key: require_env("LLM_API_KEY")?,
            llm_api_url: std::env::var("LLM_API_URL")
                .unwrap_or_else(|_| llm_client::DEFAULT_API_URL.to_string()),
            llm_model: std::env::var("LLM_MODEL")
                .unwrap_or_else(|_| llm_client::DEFAULT_MODEL.to_string()),
            context_service_url: std::env::var("CONTEXT_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8100".to_string()),
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            orchestration: OrchestrationConfig {
                worker_count: env_or("WORKER_COUNT", orchestration_defaults.worker_count)?,
                queue_capacity: env_or("QUEUE_CAPACITY", orchestration_defaults.queue_capacity)?,
                stage_timeout: Duration::from_secs(env_or(
                    "STAGE_TIMEOUT_SECS",
                    orchestration_defaults.stage_timeout.as_secs(),
                )?),
                sweep_interval: Duration::from_secs(env_or(
                    "SWEEP_INTERVAL_SECS",
                    orchestration_defaults.sweep_interval.as_secs(),
                )?),
                generation_attempts: env_or(
                    "GENERATION_ATTEMPTS",
                    orchestration_defaults.generation_attempts,
                )?,
                index_attempts: env_or("INDEX_ATTEMPTS", orchestration_defaults.index_attempts)?,
                index_backoff: Duration::from_millis(env_or(
                    "INDEX_BACKOFF_MS",
                    orchestration_defaults.index_backoff.as_millis() as u64,
                )?),
            },
            scoring: ScoringConfig {
                grader_max_attempts: env_or(
                    "GRADER_MAX_ATTEMPTS",
                    scoring_defaults.grader_max_attempts,
                )?,
                grader_backoff: Duration::from_millis(env_or(
                    "GRADER_BACKOFF_MS",
                    scoring_defaults.grader_backoff.as_millis() as u64,
                )?),
                grading_concurrency: env_or(
                    "GRADING_CONCURRENCY",
                    scoring_defaults.grading_concurrency,
                )?,
            },
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid value, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
