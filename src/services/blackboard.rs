//! Shared blackboard for cross-component facts.
//!
//! Facts are partitioned into per-task namespaces plus a global namespace.
//! Each namespace is guarded by its own mutex; changes are broadcast to
//! subscribers.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

/// Namespace identifier. The global namespace is shared by every component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BoardScope {
    Global,
    Task(String),
}

impl BoardScope {
    pub fn task(id: impl Into<String>) -> Self {
        Self::Task(id.into())
    }

    fn key(&self) -> String {
        match self {
            Self::Global => "global".to_string(),
            Self::Task(id) => format!("task:{id}"),
        }
    }
}

/// A change notification emitted on every write.
#[derive(Debug, Clone)]
pub struct BlackboardChange {
    pub scope: BoardScope,
    pub key: String,
    /// None when the key was removed.
    pub value: Option<String>,
}

type Namespace = Arc<Mutex<HashMap<String, String>>>;

/// In-process key/value fact store with change notifications.
pub struct BlackboardStore {
    namespaces: RwLock<HashMap<String, Namespace>>,
    changes: broadcast::Sender<BlackboardChange>,
}

impl Default for BlackboardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlackboardStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            namespaces: RwLock::new(HashMap::new()),
            changes,
        }
    }

    async fn namespace(&self, scope: &BoardScope) -> Namespace {
        let key = scope.key();
        {
            let namespaces = self.namespaces.read().await;
            if let Some(ns) = namespaces.get(&key) {
                return ns.clone();
            }
        }
        let mut namespaces = self.namespaces.write().await;
        namespaces
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(HashMap::new())))
            .clone()
    }

    /// Set a fact, broadcasting the change.
    pub async fn set(&self, scope: BoardScope, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        let ns = self.namespace(&scope).await;
        ns.lock().await.insert(key.clone(), value.clone());
        let _ = self.changes.send(BlackboardChange {
            scope,
            key,
            value: Some(value),
        });
    }

    pub async fn get(&self, scope: &BoardScope, key: &str) -> Option<String> {
        let ns = self.namespace(scope).await;
        let guard = ns.lock().await;
        guard.get(key).cloned()
    }

    /// Remove a fact. Returns the previous value.
    pub async fn remove(&self, scope: &BoardScope, key: &str) -> Option<String> {
        let ns = self.namespace(scope).await;
        let removed = ns.lock().await.remove(key);
        if removed.is_some() {
            let _ = self.changes.send(BlackboardChange {
                scope: scope.clone(),
                key: key.to_string(),
                value: None,
            });
        }
        removed
    }

    /// Compact digest of a namespace for prompt assembly, keys sorted.
    pub async fn digest(&self, scope: &BoardScope, max_entries: usize) -> String {
        let ns = self.namespace(scope).await;
        let guard = ns.lock().await;
        let mut entries: Vec<(&String, &String)> = guard.iter().collect();
        entries.sort_by_key(|(k, _)| (*k).clone());
        entries
            .into_iter()
            .take(max_entries)
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BlackboardChange> {
        self.changes.subscribe()
    }
}

/// Well-known global blackboard keys.
pub mod keys {
    pub fn task_available(task_id: &str) -> String {
        format!("task.available:{task_id}")
    }

    pub fn task_claimed(task_id: &str) -> String {
        format!("task.claimed:{task_id}")
    }

    pub fn task_complete(task_id: &str) -> String {
        format!("task.complete:{task_id}")
    }

    pub fn artifact_produced(artifact_id: &str) -> String {
        format!("artifact.produced:{artifact_id}")
    }

    pub fn help_needed(agent_id: &str) -> String {
        format!("help.needed:{agent_id}")
    }

    pub fn agent_joined(agent_id: &str) -> String {
        format!("agent_joined:{agent_id}")
    }

    pub fn agent_left(agent_id: &str) -> String {
        format!("agent_left:{agent_id}")
    }

    pub fn adapter_circuit(adapter_id: &str) -> String {
        format!("adapter.circuit:{adapter_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_global_and_task_namespaces_isolated() {
        let board = BlackboardStore::new();
        board.set(BoardScope::Global, "k", "global").await;
        board.set(BoardScope::task("t1"), "k", "task").await;

        assert_eq!(
            board.get(&BoardScope::Global, "k").await.as_deref(),
            Some("global")
        );
        assert_eq!(
            board.get(&BoardScope::task("t1"), "k").await.as_deref(),
            Some("task")
        );
        assert_eq!(board.get(&BoardScope::task("t2"), "k").await, None);
    }

    #[tokio::test]
    async fn test_change_notifications() {
        let board = BlackboardStore::new();
        let mut rx = board.subscribe();

        board.set(BoardScope::Global, "adapter.circuit:x", "open").await;
        let change = rx.recv().await.unwrap();
        assert_eq!(change.key, "adapter.circuit:x");
        assert_eq!(change.value.as_deref(), Some("open"));

        board.remove(&BoardScope::Global, "adapter.circuit:x").await;
        let change = rx.recv().await.unwrap();
        assert!(change.value.is_none());
    }

    #[tokio::test]
    async fn test_digest_sorted_and_bounded() {
        let board = BlackboardStore::new();
        let scope = BoardScope::task("t1");
        board.set(scope.clone(), "b", "2").await;
        board.set(scope.clone(), "a", "1").await;
        board.set(scope.clone(), "c", "3").await;

        let digest = board.digest(&scope, 2).await;
        assert_eq!(digest, "a=1; b=2");
    }

    #[test]
    fn test_well_known_keys() {
        assert_eq!(keys::adapter_circuit("claude-cli"), "adapter.circuit:claude-cli");
        assert_eq!(keys::task_complete("t1"), "task.complete:t1");
    }
}
