//! Run span registry.

use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{RunSpan, RunStatus};

/// Registry of run spans, one per run id.
#[derive(Default)]
pub struct RunRegistry {
    runs: RwLock<HashMap<String, RunSpan>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run if unseen. Returns true when newly created.
    pub async fn register(&self, run_id: &str) -> bool {
        let mut runs = self.runs.write().await;
        if runs.contains_key(run_id) {
            return false;
        }
        runs.insert(run_id.to_string(), RunSpan::new(run_id));
        true
    }

    pub async fn get(&self, run_id: &str) -> Option<RunSpan> {
        let runs = self.runs.read().await;
        runs.get(run_id).cloned()
    }

    /// Advance a run's status monotonically.
    pub async fn advance(&self, run_id: &str, to: RunStatus) -> DomainResult<RunSpan> {
        let mut runs = self.runs.write().await;
        let span = runs
            .get_mut(run_id)
            .ok_or_else(|| DomainError::RunNotFound(run_id.to_string()))?;
        span.advance(to).map_err(DomainError::ValidationFailed)?;
        Ok(span.clone())
    }

    /// Mark a run failed. Terminal from any state.
    pub async fn fail(&self, run_id: &str) -> DomainResult<RunSpan> {
        let mut runs = self.runs.write().await;
        let span = runs
            .get_mut(run_id)
            .ok_or_else(|| DomainError::RunNotFound(run_id.to_string()))?;
        span.fail();
        Ok(span.clone())
    }
}
