//! SQLite connection management.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

use crate::domain::errors::{DomainError, DomainResult};

/// Open (creating if needed) a pooled SQLite database with WAL mode.
pub async fn create_pool(path: impl AsRef<Path>) -> DomainResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!(
        "sqlite://{}",
        path.as_ref().display()
    ))
    .map_err(|e| DomainError::DatabaseError(e.to_string()))?
    .create_if_missing(true)
    .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// In-memory pool for tests.
pub async fn create_test_pool() -> DomainResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}
