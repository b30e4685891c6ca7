//! SQLite implementation of the EventRepository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::OnceCell;
use tracing::warn;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{EventKind, TaskExecutionEvent};
use crate::domain::ports::{clamp_limit, EventRepository};

use super::migrations::run_migrations;

/// SQLite-backed execution-event repository. Bootstraps its schema exactly
/// once, on first append.
pub struct SqliteEventRepository {
    pool: SqlitePool,
    bootstrapped: OnceCell<()>,
}

impl SqliteEventRepository {
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

    fn row_to_event(row: &EventRow) -> Option<TaskExecutionEvent> {
        let event_id = Uuid::parse_str(&row.event_id).ok()?;
        let event_type = EventKind::from_str(&row.event_type)?;
        let occurred_at = DateTime::parse_from_rfc3339(&row.occurred_at)
            .ok()?
            .with_timezone(&Utc);
        Some(TaskExecutionEvent {
            event_id,
            run_id: row.run_id.clone(),
            task_id: row.task_id.clone(),
            event_type,
            payload: row.payload.clone(),
            occurred_at,
            task_sequence: row.task_sequence as u64,
            run_sequence: row.run_sequence as u64,
            trace_id: row.trace_id.clone(),
            span_id: row.span_id.clone(),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    event_id: String,
    run_id: String,
    task_id: String,
    event_type: String,
    payload: String,
    occurred_at: String,
    task_sequence: i64,
    run_sequence: i64,
    trace_id: Option<String>,
    span_id: Option<String>,
}

#[async_trait]
impl EventRepository for SqliteEventRepository {
    async fn append(&self, event: &TaskExecutionEvent) -> DomainResult<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            INSERT INTO execution_events
                (event_id, run_id, task_id, event_type, payload, occurred_at,
                 task_sequence, run_sequence, trace_id, span_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.event_id.to_string())
        .bind(&event.run_id)
        .bind(&event.task_id)
        .bind(event.event_type.as_str())
        .bind(&event.payload)
        .bind(event.occurred_at.to_rfc3339())
        .bind(event.task_sequence as i64)
        .bind(event.run_sequence as i64)
        .bind(&event.trace_id)
        .bind(&event.span_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_by_task(
        &self,
        task_id: &str,
        after_sequence: u64,
        limit: u32,
    ) -> Vec<TaskExecutionEvent> {
        if self.ensure_schema().await.is_err() {
            return Vec::new();
        }
        let limit = clamp_limit(limit);

        let rows: Result<Vec<EventRow>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT event_id, run_id, task_id, event_type, payload, occurred_at,
                   task_sequence, run_sequence, trace_id, span_id
            FROM execution_events
            WHERE task_id = ? AND task_sequence > ?
            ORDER BY task_sequence ASC
            LIMIT ?
            "#,
        )
        .bind(task_id)
        .bind(after_sequence as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(rows) => rows.iter().filter_map(Self::row_to_event).collect(),
            Err(e) => {
                warn!(task_id, error = %e, "Event query failed; returning empty page");
                Vec::new()
            }
        }
    }

    async fn list_by_run(
        &self,
        run_id: &str,
        after_sequence: u64,
        limit: u32,
    ) -> Vec<TaskExecutionEvent> {
        if self.ensure_schema().await.is_err() {
            return Vec::new();
        }
        let limit = clamp_limit(limit);

        let rows: Result<Vec<EventRow>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT event_id, run_id, task_id, event_type, payload, occurred_at,
                   task_sequence, run_sequence, trace_id, span_id
            FROM execution_events
            WHERE run_id = ? AND run_sequence > ?
            ORDER BY run_sequence ASC
            LIMIT ?
            "#,
        )
        .bind(run_id)
        .bind(after_sequence as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(rows) => rows.iter().filter_map(Self::row_to_event).collect(),
            Err(e) => {
                warn!(run_id, error = %e, "Event query failed; returning empty page");
                Vec::new()
            }
        }
    }
}
