//! SQLite implementation of the TaskSink trait.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::OnceCell;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::TaskSnapshot;
use crate::domain::ports::TaskSink;

use super::migrations::run_migrations;

/// Write-through task snapshot sink backed by SQLite.
pub struct SqliteTaskSink {
    pool: SqlitePool,
    bootstrapped: OnceCell<()>,
}

impl SqliteTaskSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            bootstrapped: OnceCell::new(),
        }
    }

    async fn ensure_schema(&self) -> DomainResult<()> {
        self.bootstrapped
            .get_or_try_init(|| async {
                run_migrations(&self.pool).await?;
                Ok::<(), DomainError>(())
            })
            .await?;
        Ok(())
    }

    /// Read a snapshot back, primarily for tests and the CLI status view.
    pub async fn load(&self, task_id: &str) -> DomainResult<Option<TaskSnapshot>> {
        self.ensure_schema().await?;

        #[derive(sqlx::FromRow)]
        struct Row {
            task_id: String,
            title: String,
            description: String,
            status: String,
            created_at: String,
            updated_at: String,
            planning_output: Option<String>,
            build_output: Option<String>,
            review_output: Option<String>,
            summary: Option<String>,
            error: Option<String>,
            parent_task_id: Option<String>,
            child_task_ids: String,
            run_id: Option<String>,
            artifacts: String,
        }

        let row: Option<Row> = sqlx::query_as(
            "SELECT task_id, title, description, status, created_at, updated_at, \
             planning_output, build_output, review_output, summary, error, \
             parent_task_id, child_task_ids, run_id, artifacts \
             FROM tasks WHERE task_id = ?",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status = crate::domain::models::TaskStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::SerializationError(format!("Unknown task status: {}", row.status))
        })?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?
            .with_timezone(&chrono::Utc);
        let updated_at = chrono::DateTime::parse_from_rfc3339(&row.updated_at)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?
            .with_timezone(&chrono::Utc);

        Ok(Some(TaskSnapshot {
            task_id: row.task_id,
            title: row.title,
            description: row.description,
            status,
            created_at,
            updated_at,
            planning_output: row.planning_output,
            build_output: row.build_output,
            review_output: row.review_output,
            summary: row.summary,
            error: row.error,
            parent_task_id: row.parent_task_id,
            child_task_ids: serde_json::from_str(&row.child_task_ids)?,
            run_id: row.run_id,
            artifacts: serde_json::from_str(&row.artifacts)?,
        }))
    }
}

#[async_trait]
impl TaskSink for SqliteTaskSink {
    async fn upsert(&self, snapshot: &TaskSnapshot) -> DomainResult<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            INSERT INTO tasks
                (task_id, title, description, status, created_at, updated_at,
                 planning_output, build_output, review_output, summary, error,
                 parent_task_id, child_task_ids, run_id, artifacts)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(task_id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                status = excluded.status,
                updated_at = excluded.updated_at,
                planning_output = excluded.planning_output,
                build_output = excluded.build_output,
                review_output = excluded.review_output,
                summary = excluded.summary,
                error = excluded.error,
                parent_task_id = excluded.parent_task_id,
                child_task_ids = excluded.child_task_ids,
                run_id = excluded.run_id,
                artifacts = excluded.artifacts
            "#,
        )
        .bind(&snapshot.task_id)
        .bind(&snapshot.title)
        .bind(&snapshot.description)
        .bind(snapshot.status.as_str())
        .bind(snapshot.created_at.to_rfc3339())
        .bind(snapshot.updated_at.to_rfc3339())
        .bind(&snapshot.planning_output)
        .bind(&snapshot.build_output)
        .bind(&snapshot.review_output)
        .bind(&snapshot.summary)
        .bind(&snapshot.error)
        .bind(&snapshot.parent_task_id)
        .bind(serde_json::to_string(&snapshot.child_task_ids)?)
        .bind(&snapshot.run_id)
        .bind(serde_json::to_string(&snapshot.artifacts)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
