//! Redis connection pool

use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Failed to create redis pool: {0}")]
    Create(#[from] deadpool_redis::CreatePoolError),

    #[error("Redis is unreachable: {0}")]
    Unreachable(String),
}

/// Build a pool and check that the server answers a PING.
pub async fn create_pool(url: &str, max_connections: usize) -> Result<Pool, PoolError> {
    let mut config = Config::from_url(url);
    config.pool = Some(PoolConfig::new(max_connections.max(1)));
    let pool = config.create_pool(Some(Runtime::Tokio1))?;

    let mut conn = pool
        .get()
        .await
        .map_err(|e| PoolError::Unreachable(e.to_string()))?;
    deadpool_redis::redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
        .map_err(|e| PoolError::Unreachable(e.to_string()))?;

    Ok(pool)
}
