use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::store::{MemoryStore, PgStore, Store};

/// Connects to PostgreSQL and applies migrations, or falls back to the
/// in-memory store when no database is configured.
pub async fn create_store(database_url: Option<&str>) -> Result<Arc<dyn Store>> {
    let Some(database_url) = database_url else {
        warn!("DATABASE_URL not set; using the in-memory store (state is lost on restart)");
        return Ok(Arc::new(MemoryStore::new()));
    };

    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    info!("PostgreSQL connection pool established");

    let store = PgStore::new(pool);
    store.migrate().await?;
    info!("Migrations applied");

    Ok(Arc::new(store))
}
