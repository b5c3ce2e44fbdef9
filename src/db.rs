use std::{future::Future, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use tracing::{info, warn};

const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Failure of a row-level store call, independent of the backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unique constraint violated")]
    Conflict,
    #[error("store unavailable")]
    Unavailable,
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Conflict,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable
            }
            other => StoreError::Database(other),
        }
    }
}

/// Runs a store call under a deadline; an elapsed deadline counts as the
/// store being unavailable.
pub async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => {
            warn!(timeout_ms = limit.as_millis() as u64, "store call timed out");
            Err(StoreError::Unavailable)
        }
    }
}

/// Connects to Postgres, waiting for the database to come up.
pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let mut attempt = 1;
    loop {
        match PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
        {
            Ok(pool) => {
                info!("connected to database");
                return Ok(pool);
            }
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                warn!(error = %e, attempt, max = CONNECT_ATTEMPTS, "waiting for database");
                attempt += 1;
                tokio::time::sleep(CONNECT_BACKOFF).await;
            }
            Err(e) => return Err(e).context("connect to database"),
        }
    }
}
