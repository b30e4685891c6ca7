//! Run coordinator.
//!
//! Tracks the tasks of one run and advances the run span's status. Owned and
//! driven by the dispatcher, so its state needs no extra locking.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

use crate::domain::models::{EventKind, RunStatus};

use super::SwarmServices;

/// Per-run lifecycle driver.
pub struct RunCoordinator {
    run_id: String,
    pending: BTreeSet<String>,
    executing: bool,
    failed: bool,
    completed: bool,
}

impl RunCoordinator {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            pending: BTreeSet::new(),
            executing: false,
            failed: false,
            completed: false,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    async fn record(&self, services: &Arc<SwarmServices>, task_id: &str, kind: EventKind) {
        services
            .recorder
            .record(task_id, Some(&self.run_id), kind, String::new())
            .await;
    }

    /// A run-scoped task was registered. The first registration accepts the
    /// run; the first task moves it to executing.
    pub async fn on_task_registered(&mut self, services: &Arc<SwarmServices>, task_id: &str) {
        self.pending.insert(task_id.to_string());

        if services.runs.register(&self.run_id).await {
            self.record(services, task_id, EventKind::RunAccepted).await;
        }
        if !self.executing && !self.failed {
            self.executing = true;
            if let Err(e) = services.runs.advance(&self.run_id, RunStatus::Executing).await {
                warn!(run_id = %self.run_id, error = %e, "Run advance failed");
            }
            self.record(services, task_id, EventKind::RunExecuting).await;
        }
    }

    /// A run-scoped task reached a terminal state. The first failure fails
    /// the run; once no tasks remain pending, the run completes.
    pub async fn on_task_finished(
        &mut self,
        services: &Arc<SwarmServices>,
        task_id: &str,
        success: bool,
    ) {
        self.pending.remove(task_id);

        if !success && !self.failed {
            self.failed = true;
            if let Err(e) = services.runs.fail(&self.run_id).await {
                warn!(run_id = %self.run_id, error = %e, "Run fail transition failed");
            }
            self.record(services, task_id, EventKind::RunFailed).await;
            return;
        }

        if self.pending.is_empty() && !self.failed && !self.completed {
            self.completed = true;
            for (status, kind) in [
                (RunStatus::Merging, EventKind::RunMerging),
                (RunStatus::ReadyForPr, EventKind::RunReadyForPr),
                (RunStatus::Done, EventKind::RunDone),
            ] {
                if let Err(e) = services.runs.advance(&self.run_id, status).await {
                    warn!(run_id = %self.run_id, error = %e, "Run advance failed");
                }
                self.record(services, task_id, kind).await;
            }
        }
    }

    /// True once the run reached a terminal state with no pending tasks.
    pub fn is_finished(&self) -> bool {
        (self.completed || self.failed) && self.pending.is_empty()
    }
}
