mod backoff;
mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod orchestrator;
mod questions;
mod report;
mod retrieval;
mod roles;
mod routes;
mod scoring;
mod state;
mod store;

#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_store;
use crate::llm_client::LlmClient;
use crate::orchestrator::{spawn_sweeper, spawn_workers, JobQueue, Orchestrator};
use crate::questions::{LlmGenerator, QuestionSourceResolver};
use crate::retrieval::HttpContextProvider;
use crate::routes::build_router;
use crate::scoring::{LlmGrader, ScoringEngine};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting assessment API v{}", env!("CARGO_PKG_VERSION"));

    let store = create_store(config.database_url.as_deref()).await?;

    let llm = LlmClient::new(
        config.llm_api_key.clone(),
        config.llm_api_url.clone(),
        config.llm_model.clone(),
    )?;
    info!("LLM client initialized (model: {})", config.llm_model);

    let context = Arc::new(HttpContextProvider::new(config.context_service_url.clone())?);
    info!("Context service: {}", config.context_service_url);

    let resolver = QuestionSourceResolver::new(
        Arc::clone(&store),
        Arc::new(LlmGenerator::new(llm.clone())),
        context.clone(),
        config.orchestration.generation_attempts,
    )
    .with_index_retry(
        config.orchestration.index_attempts,
        config.orchestration.index_backoff,
    );
    let scoring = ScoringEngine::new(
        Arc::clone(&store),
        Arc::new(LlmGrader::new(llm)),
        context,
        config.scoring.clone(),
    );

    let (queue, receiver) = JobQueue::new(config.orchestration.queue_capacity);
    let orchestrator = Arc::new(Orchestrator::new(
        store,
        resolver,
        scoring,
        queue,
        config.orchestration.clone(),
    ));

    let workers = spawn_workers(
        Arc::clone(&orchestrator),
        receiver,
        config.orchestration.worker_count,
    );
    info!("{} stage workers started", workers.len());
    let resumed = orchestrator.resume_in_flight(Utc::now()).await?;
    if resumed > 0 {
        info!("Re-queued {resumed} in-flight assessments from before the restart");
    }
    spawn_sweeper(Arc::clone(&orchestrator));

    let state = AppState {
        orchestrator,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
