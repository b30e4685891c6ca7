//! Worker and reviewer pools.
//!
//! A pool is a set of single-consumer workers, each reading role requests
//! from its own bounded mailbox and invoking the role engine. Dispatch picks
//! the worker with the smallest mailbox.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::errors::DomainError;
use crate::domain::models::ExecuteRoleTask;
use crate::services::RoleEngine;
use tokio_util::sync::CancellationToken;

use super::task_coordinator::CoordinatorMsg;

/// A role invocation handed to a pool worker. The result is delivered back
/// to the requesting coordinator's mailbox.
pub struct RoleRequest {
    pub task: ExecuteRoleTask,
    pub cancel: CancellationToken,
    pub reply: mpsc::Sender<CoordinatorMsg>,
}

#[derive(Clone)]
struct WorkerHandle {
    tx: mpsc::Sender<RoleRequest>,
    queued: Arc<AtomicUsize>,
}

/// A bounded pool of role executors.
#[derive(Clone)]
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
}

impl WorkerPool {
    /// Spawn `size` workers sharing one role engine.
    pub fn spawn(name: &str, size: usize, engine: Arc<RoleEngine>) -> Self {
        let mut workers = Vec::with_capacity(size.max(1));
        for index in 0..size.max(1) {
            let (tx, mut rx) = mpsc::channel::<RoleRequest>(64);
            let queued = Arc::new(AtomicUsize::new(0));
            let worker_queued = queued.clone();
            let worker_engine = engine.clone();
            let worker_name = format!("{name}-{index}");

            tokio::spawn(async move {
                while let Some(request) = rx.recv().await {
                    let RoleRequest {
                        task,
                        cancel,
                        reply,
                    } = request;
                    let role = task.role;
                    debug!(worker = %worker_name, role = %role, task_id = %task.task_id, "Executing role");
                    let result = worker_engine.execute(&task, &cancel).await;
                    worker_queued.fetch_sub(1, Ordering::SeqCst);

                    let msg = match result {
                        Ok(result) => CoordinatorMsg::RoleCompleted(result),
                        // The coordinator initiated the cancellation; no reply expected.
                        Err(DomainError::Cancelled) => continue,
                        Err(e) => CoordinatorMsg::RoleFailed {
                            role,
                            error: e.to_string(),
                            adapter_id: None,
                        },
                    };
                    let _ = reply.send(msg).await;
                }
            });

            workers.push(WorkerHandle { tx, queued });
        }
        Self { workers }
    }

    /// Dispatch to the worker with the smallest mailbox.
    pub async fn dispatch(&self, request: RoleRequest) -> bool {
        let Some(handle) = self
            .workers
            .iter()
            .min_by_key(|w| w.queued.load(Ordering::SeqCst))
        else {
            return false;
        };
        handle.queued.fetch_add(1, Ordering::SeqCst);
        if handle.tx.send(request).await.is_err() {
            handle.queued.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }
}
