use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

use crate::config;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

static POOL: OnceCell<PgPool> = OnceCell::const_new();

/// Connection pool for the ticket database, created lazily from
/// `DATABASE_URL` with the limits from config.
pub async fn pool() -> Result<PgPool, DatabaseError> {
    let pool = POOL
        .get_or_try_init(|| async {
            let url = std::env::var("DATABASE_URL")
                .map_err(|_| DatabaseError::ConfigMissing("DATABASE_URL"))?;
            let cfg = &config::config().database;
            let pool = PgPoolOptions::new()
                .max_connections(cfg.max_connections)
                .acquire_timeout(Duration::from_secs(cfg.connect_timeout_secs))
                .connect(&url)
                .await?;
            info!(max_connections = cfg.max_connections, "database pool created");
            Ok::<_, DatabaseError>(pool)
        })
        .await?;
    Ok(pool.clone())
}

/// True when a database is configured for this process.
pub fn is_configured() -> bool {
    std::env::var("DATABASE_URL").is_ok()
}
