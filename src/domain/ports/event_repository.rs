//! Event repository port - durable append-only execution-event log.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::domain::errors::DomainResult;
use crate::domain::models::TaskExecutionEvent;

/// Largest page a single read may return.
pub const MAX_PAGE_LIMIT: u32 = 1000;

/// Clamp a requested page limit into [1, MAX_PAGE_LIMIT].
pub fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_PAGE_LIMIT)
}

/// Durable append-only log of execution events, indexed by task and by run.
///
/// Reads are cursor-paginated and infallible by contract: repository faults
/// surface as empty lists (and a log line), never as errors, so that
/// observability faults cannot wedge coordination.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Append one event. The first append may bootstrap storage schema.
    async fn append(&self, event: &TaskExecutionEvent) -> DomainResult<()>;

    /// Events for a task with `task_sequence > after_sequence`, ascending,
    /// at most `limit` (clamped to [1, 1000]).
    async fn list_by_task(
        &self,
        task_id: &str,
        after_sequence: u64,
        limit: u32,
    ) -> Vec<TaskExecutionEvent>;

    /// Events for a run with `run_sequence > after_sequence`, ascending,
    /// at most `limit` (clamped to [1, 1000]).
    async fn list_by_run(
        &self,
        run_id: &str,
        after_sequence: u64,
        limit: u32,
    ) -> Vec<TaskExecutionEvent>;
}

/// In-memory event repository for tests and recorder-less wiring.
#[derive(Default)]
pub struct InMemoryEventRepository {
    events: Mutex<Vec<TaskExecutionEvent>>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<TaskExecutionEvent> {
        self.events.lock().expect("event store poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("event store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn append(&self, event: &TaskExecutionEvent) -> DomainResult<()> {
        self.events
            .lock()
            .expect("event store poisoned")
            .push(event.clone());
        Ok(())
    }

    async fn list_by_task(
        &self,
        task_id: &str,
        after_sequence: u64,
        limit: u32,
    ) -> Vec<TaskExecutionEvent> {
        let limit = clamp_limit(limit) as usize;
        let mut events: Vec<TaskExecutionEvent> = self
            .events
            .lock()
            .expect("event store poisoned")
            .iter()
            .filter(|e| e.task_id == task_id && e.task_sequence > after_sequence)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.task_sequence);
        events.truncate(limit);
        events
    }

    async fn list_by_run(
        &self,
        run_id: &str,
        after_sequence: u64,
        limit: u32,
    ) -> Vec<TaskExecutionEvent> {
        let limit = clamp_limit(limit) as usize;
        let mut events: Vec<TaskExecutionEvent> = self
            .events
            .lock()
            .expect("event store poisoned")
            .iter()
            .filter(|e| e.run_id == run_id && e.run_sequence > after_sequence)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.run_sequence);
        events.truncate(limit);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::EventKind;
    use chrono::Utc;
    use uuid::Uuid;

    fn make_event(task_id: &str, task_seq: u64, run_seq: u64) -> TaskExecutionEvent {
        TaskExecutionEvent {
            event_id: Uuid::new_v4(),
            run_id: format!("legacy-{task_id}"),
            task_id: task_id.to_string(),
            event_type: EventKind::RoleCompleted,
            payload: String::new(),
            occurred_at: Utc::now(),
            task_sequence: task_seq,
            run_sequence: run_seq,
            trace_id: None,
            span_id: None,
        }
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(200), 200);
        assert_eq!(clamp_limit(5000), 1000);
    }

    #[tokio::test]
    async fn test_in_memory_cursor_pagination() {
        let repo = InMemoryEventRepository::new();
        for i in 1..=10 {
            repo.append(&make_event("t1", i, i)).await.unwrap();
        }
        let page = repo.list_by_task("t1", 4, 3).await;
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].task_sequence, 5);
        assert_eq!(page[2].task_sequence, 7);
    }

    #[tokio::test]
    async fn test_in_memory_run_index() {
        let repo = InMemoryEventRepository::new();
        repo.append(&make_event("t1", 1, 1)).await.unwrap();
        repo.append(&make_event("t2", 1, 1)).await.unwrap();
        let events = repo.list_by_run("legacy-t1", 0, 100).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].task_id, "t1");
    }
}
