//! Authoritative task snapshot registry.
//!
//! Serves concurrent readers behind a read-write lock; every mutation is
//! written through to the configured sink. Sink failures are logged and never
//! propagate into coordination.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{TaskSnapshot, TaskStatus, TaskSubmission};
use crate::domain::ports::TaskSink;

/// Registry of task snapshots. All other components hold read-only copies.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, TaskSnapshot>>,
    sink: Arc<dyn TaskSink>,
}

impl TaskRegistry {
    pub fn new(sink: Arc<dyn TaskSink>) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            sink,
        }
    }

    async fn persist(&self, snapshot: &TaskSnapshot) {
        if let Err(e) = self.sink.upsert(snapshot).await {
            warn!(task_id = %snapshot.task_id, error = %e, "Task sink write failed");
        }
    }

    /// Register a task from a submission. Idempotent by task id: a repeated
    /// submission leaves the existing snapshot untouched and returns false.
    pub async fn register(&self, submission: &TaskSubmission) -> DomainResult<bool> {
        submission
            .validate()
            .map_err(DomainError::ValidationFailed)?;

        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&submission.task_id) {
            return Ok(false);
        }
        let snapshot = TaskSnapshot::from_submission(submission);
        tasks.insert(snapshot.task_id.clone(), snapshot.clone());
        drop(tasks);

        self.persist(&snapshot).await;
        Ok(true)
    }

    /// Register a child task parented to an existing task.
    pub async fn register_child(
        &self,
        submission: &TaskSubmission,
        parent_id: &str,
    ) -> DomainResult<bool> {
        submission
            .validate()
            .map_err(DomainError::ValidationFailed)?;

        let mut tasks = self.tasks.write().await;
        if !tasks.contains_key(parent_id) {
            return Err(DomainError::TaskNotFound(parent_id.to_string()));
        }
        if tasks.contains_key(&submission.task_id) {
            return Ok(false);
        }
        let snapshot = TaskSnapshot::from_submission(submission).with_parent(parent_id);
        tasks.insert(snapshot.task_id.clone(), snapshot.clone());
        drop(tasks);

        self.persist(&snapshot).await;
        Ok(true)
    }

    pub async fn get(&self, task_id: &str) -> Option<TaskSnapshot> {
        let tasks = self.tasks.read().await;
        tasks.get(task_id).cloned()
    }

    pub async fn contains(&self, task_id: &str) -> bool {
        let tasks = self.tasks.read().await;
        tasks.contains_key(task_id)
    }

    /// Apply a closure to a snapshot and write it through.
    pub async fn update<F>(&self, task_id: &str, mutate: F) -> DomainResult<TaskSnapshot>
    where
        F: FnOnce(&mut TaskSnapshot) -> Result<(), String>,
    {
        let mut tasks = self.tasks.write().await;
        let snapshot = tasks
            .get_mut(task_id)
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))?;
        mutate(snapshot).map_err(DomainError::ValidationFailed)?;
        snapshot.updated_at = chrono::Utc::now();
        let updated = snapshot.clone();
        drop(tasks);

        self.persist(&updated).await;
        Ok(updated)
    }

    /// Transition a task's status, enforcing the pipeline DAG.
    pub async fn transition(&self, task_id: &str, status: TaskStatus) -> DomainResult<TaskSnapshot> {
        self.update(task_id, |snapshot| snapshot.transition_to(status))
            .await
    }

    /// Block a task with a non-empty error.
    pub async fn block(&self, task_id: &str, error: impl Into<String>) -> DomainResult<TaskSnapshot> {
        let error = error.into();
        self.update(task_id, move |snapshot| snapshot.block(error))
            .await
    }

    /// Record a parent/child edge. Returns true when the edge is new.
    pub async fn add_child(&self, parent_id: &str, child_id: &str) -> DomainResult<bool> {
        let mut tasks = self.tasks.write().await;
        let parent = tasks
            .get_mut(parent_id)
            .ok_or_else(|| DomainError::TaskNotFound(parent_id.to_string()))?;
        let added = parent.add_child(child_id);
        let updated = parent.clone();
        drop(tasks);

        if added {
            self.persist(&updated).await;
        }
        Ok(added)
    }

    pub async fn all(&self) -> Vec<TaskSnapshot> {
        let tasks = self.tasks.read().await;
        tasks.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        let tasks = self.tasks.read().await;
        tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::NullTaskSink;

    fn registry() -> TaskRegistry {
        TaskRegistry::new(Arc::new(NullTaskSink))
    }

    #[tokio::test]
    async fn test_register_idempotent() {
        let registry = registry();
        let submission = TaskSubmission::new("t1", "Title", "Desc");
        assert!(registry.register(&submission).await.unwrap());
        assert!(!registry.register(&submission).await.unwrap());
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_register_rejects_empty_title() {
        let registry = registry();
        let submission = TaskSubmission::new("t1", "  ", "Desc");
        assert!(registry.register(&submission).await.is_err());
    }

    #[tokio::test]
    async fn test_transition_enforced() {
        let registry = registry();
        registry
            .register(&TaskSubmission::new("t1", "Title", "Desc"))
            .await
            .unwrap();

        registry.transition("t1", TaskStatus::Planning).await.unwrap();
        let err = registry.transition("t1", TaskStatus::Done).await;
        assert!(err.is_err());
        let snapshot = registry.get("t1").await.unwrap();
        assert_eq!(snapshot.status, TaskStatus::Planning);
    }

    #[tokio::test]
    async fn test_block_sets_error() {
        let registry = registry();
        registry
            .register(&TaskSubmission::new("t1", "Title", "Desc"))
            .await
            .unwrap();
        registry.block("t1", "adapter dead").await.unwrap();
        let snapshot = registry.get("t1").await.unwrap();
        assert_eq!(snapshot.status, TaskStatus::Blocked);
        assert_eq!(snapshot.error.as_deref(), Some("adapter dead"));
    }

    #[tokio::test]
    async fn test_child_registration_and_edges() {
        let registry = registry();
        registry
            .register(&TaskSubmission::new("p", "Parent", "Desc"))
            .await
            .unwrap();
        let child = TaskSubmission::new("c", "Child", "Desc");
        assert!(registry.register_child(&child, "p").await.unwrap());
        assert!(!registry.register_child(&child, "p").await.unwrap());

        assert!(registry.add_child("p", "c").await.unwrap());
        assert!(!registry.add_child("p", "c").await.unwrap());

        let child = registry.get("c").await.unwrap();
        assert_eq!(child.parent_task_id.as_deref(), Some("p"));
        let parent = registry.get("p").await.unwrap();
        assert_eq!(parent.child_task_ids, vec!["c"]);
    }

    #[tokio::test]
    async fn test_missing_task_errors() {
        let registry = registry();
        assert!(matches!(
            registry.transition("ghost", TaskStatus::Planning).await,
            Err(DomainError::TaskNotFound(_))
        ));
    }
}
