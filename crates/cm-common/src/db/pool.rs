use deadpool_postgres::{
    Config, CreatePoolError, ManagerConfig, Pool, PoolError, RecyclingMethod, Runtime,
};
use std::str::FromStr;
use thiserror::Error;
use tokio_postgres::NoTls;
use tracing::info;

pub type PgPool = Pool;

#[derive(Debug, Error)]
pub enum DbPoolError {
    #[error("invalid database url: {0}")]
    InvalidConfig(String),
    #[error("failed to create database pool: {0}")]
    PoolCreation(#[from] CreatePoolError),
    #[error("database connectivity check failed: {0}")]
    Connectivity(String),
}

impl From<PoolError> for DbPoolError {
    fn from(err: PoolError) -> Self {
        DbPoolError::Connectivity(err.to_string())
    }
}

pub fn create_pool_from_url(db_url: &str) -> Result<PgPool, DbPoolError> {
    let _ = tokio_postgres::Config::from_str(db_url)
        .map_err(|e| DbPoolError::InvalidConfig(e.to_string()))?;

    let mut cfg = Config::new();
    cfg.url = Some(db_url.to_string());

    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(DbPoolError::PoolCreation)
}

/// Like [`create_pool_from_url`], but fails fast when the database does not
/// answer `SELECT 1`.
pub async fn create_pool_from_url_checked(db_url: &str) -> Result<PgPool, DbPoolError> {
    let pool = create_pool_from_url(db_url)?;
    ping(&pool).await?;
    info!(max_size = pool.status().max_size, "database pool ready");
    Ok(pool)
}

pub async fn ping(pool: &PgPool) -> Result<(), DbPoolError> {
    let client = pool.get().await?;
    client
        .simple_query("SELECT 1")
        .await
        .map_err(|e| DbPoolError::Connectivity(e.to_string()))?;
    Ok(())
}
