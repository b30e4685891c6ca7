//! Execution-event recorder.
//!
//! Fills in event ids and timestamps, and allocates the per-task and per-run
//! monotonic sequences under a per-scope mutex. The repository is optional:
//! lifecycle code paths run identically with no durable sink configured.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::domain::models::{EventKind, TaskExecutionEvent};
use crate::domain::ports::EventRepository;

/// Recorder for the durable, strictly ordered execution-event log.
pub struct EventRecorder {
    repository: Option<Arc<dyn EventRepository>>,
    task_sequences: Mutex<HashMap<String, u64>>,
    run_sequences: Mutex<HashMap<String, u64>>,
}

impl EventRecorder {
    pub fn new(repository: Option<Arc<dyn EventRepository>>) -> Self {
        Self {
            repository,
            task_sequences: Mutex::new(HashMap::new()),
            run_sequences: Mutex::new(HashMap::new()),
        }
    }

    /// Recorder without a durable sink. Sequences are still allocated so
    /// ordering invariants hold for in-process observers.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Record one event. `run_id` of None synthesises the deterministic
    /// legacy run id. Repository failures are logged and swallowed:
    /// observability faults never wedge coordination.
    pub async fn record(
        &self,
        task_id: &str,
        run_id: Option<&str>,
        kind: EventKind,
        payload: impl Into<String>,
    ) -> TaskExecutionEvent {
        let run_id = match run_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("legacy-{task_id}"),
        };

        let task_sequence = {
            let mut sequences = self.task_sequences.lock().await;
            let next = sequences.entry(task_id.to_string()).or_insert(0);
            *next += 1;
            *next
        };
        let run_sequence = {
            let mut sequences = self.run_sequences.lock().await;
            let next = sequences.entry(run_id.clone()).or_insert(0);
            *next += 1;
            *next
        };

        let event = TaskExecutionEvent {
            event_id: Uuid::new_v4(),
            run_id,
            task_id: task_id.to_string(),
            event_type: kind,
            payload: payload.into(),
            occurred_at: Utc::now(),
            task_sequence,
            run_sequence,
            trace_id: None,
            span_id: None,
        };

        if let Some(ref repository) = self.repository {
            if let Err(e) = repository.append(&event).await {
                warn!(task_id = %event.task_id, error = %e, "Failed to persist execution event");
            }
        }

        event
    }

    pub fn repository(&self) -> Option<Arc<dyn EventRepository>> {
        self.repository.clone()
    }
}
