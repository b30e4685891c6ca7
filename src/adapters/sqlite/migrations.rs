//! Schema bootstrap for the SQLite adapters.

use sqlx::SqlitePool;

use crate::domain::errors::DomainResult;

/// Create the execution-event and task tables if absent.
pub async fn run_migrations(pool: &SqlitePool) -> DomainResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS execution_events (
            event_id TEXT PRIMARY KEY,
            run_id TEXT NOT NULL,
            task_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            occurred_at TEXT NOT NULL,
            task_sequence INTEGER NOT NULL,
            run_sequence INTEGER NOT NULL,
            trace_id TEXT,
            span_id TEXT,
            UNIQUE(task_id, task_sequence),
            UNIQUE(run_id, run_sequence)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_events_task ON execution_events(task_id, task_sequence)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_events_run ON execution_events(run_id, run_sequence)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            task_id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            planning_output TEXT,
            build_output TEXT,
            review_output TEXT,
            summary TEXT,
            error TEXT,
            parent_task_id TEXT,
            child_task_ids TEXT NOT NULL,
            run_id TEXT,
            artifacts TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
