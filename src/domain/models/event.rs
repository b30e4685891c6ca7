//! Execution event domain model.
//!
//! Every observable step of coordination is recorded as a flat, strictly
//! ordered event stream, indexed by task and by run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of an execution event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskSubmitted,
    CoordinationStarted,
    RoleDispatched,
    RoleStarted,
    RoleSucceeded,
    RoleFailed,
    RoleCompleted,
    TaskDone,
    TaskFailed,
    TaskIntervention,
    TaskEscalated,
    GraphLinkCreated,
    GraphChildCompleted,
    GraphChildFailed,
    TelemetryQuality,
    TelemetryRetry,
    TelemetryConsensus,
    TelemetryCircuit,
    DiagnosticContext,
    DiagnosticAdapter,
    RunAccepted,
    RunDecomposing,
    RunExecuting,
    RunMerging,
    RunReadyForPr,
    RunDone,
    RunFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskSubmitted => "task.submitted",
            Self::CoordinationStarted => "coordination.started",
            Self::RoleDispatched => "role.dispatched",
            Self::RoleStarted => "role.started",
            Self::RoleSucceeded => "role.succeeded",
            Self::RoleFailed => "role.failed",
            Self::RoleCompleted => "role.completed",
            Self::TaskDone => "task.done",
            Self::TaskFailed => "task.failed",
            Self::TaskIntervention => "task.intervention",
            Self::TaskEscalated => "task.escalated",
            Self::GraphLinkCreated => "graph.link_created",
            Self::GraphChildCompleted => "graph.child_completed",
            Self::GraphChildFailed => "graph.child_failed",
            Self::TelemetryQuality => "telemetry.quality",
            Self::TelemetryRetry => "telemetry.retry",
            Self::TelemetryConsensus => "telemetry.consensus",
            Self::TelemetryCircuit => "telemetry.circuit",
            Self::DiagnosticContext => "diagnostic.context",
            Self::DiagnosticAdapter => "diagnostic.adapter",
            Self::RunAccepted => "run.accepted",
            Self::RunDecomposing => "run.decomposing",
            Self::RunExecuting => "run.executing",
            Self::RunMerging => "run.merging",
            Self::RunReadyForPr => "run.ready_for_pr",
            Self::RunDone => "run.done",
            Self::RunFailed => "run.failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "task.submitted" => Some(Self::TaskSubmitted),
            "coordination.started" => Some(Self::CoordinationStarted),
            "role.dispatched" => Some(Self::RoleDispatched),
            "role.started" => Some(Self::RoleStarted),
            "role.succeeded" => Some(Self::RoleSucceeded),
            "role.failed" => Some(Self::RoleFailed),
            "role.completed" => Some(Self::RoleCompleted),
            "task.done" => Some(Self::TaskDone),
            "task.failed" => Some(Self::TaskFailed),
            "task.intervention" => Some(Self::TaskIntervention),
            "task.escalated" => Some(Self::TaskEscalated),
            "graph.link_created" => Some(Self::GraphLinkCreated),
            "graph.child_completed" => Some(Self::GraphChildCompleted),
            "graph.child_failed" => Some(Self::GraphChildFailed),
            "telemetry.quality" => Some(Self::TelemetryQuality),
            "telemetry.retry" => Some(Self::TelemetryRetry),
            "telemetry.consensus" => Some(Self::TelemetryConsensus),
            "telemetry.circuit" => Some(Self::TelemetryCircuit),
            "diagnostic.context" => Some(Self::DiagnosticContext),
            "diagnostic.adapter" => Some(Self::DiagnosticAdapter),
            "run.accepted" => Some(Self::RunAccepted),
            "run.decomposing" => Some(Self::RunDecomposing),
            "run.executing" => Some(Self::RunExecuting),
            "run.merging" => Some(Self::RunMerging),
            "run.ready_for_pr" => Some(Self::RunReadyForPr),
            "run.done" => Some(Self::RunDone),
            "run.failed" => Some(Self::RunFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single durable execution event.
///
/// `task_sequence` and `run_sequence` are strictly increasing and gap-free
/// within their scope, starting at 1; both are assigned by the recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecutionEvent {
    pub event_id: Uuid,
    /// Never empty: explicit run id or `legacy-<taskId>` synthesis.
    pub run_id: String,
    pub task_id: String,
    pub event_type: EventKind,
    /// Opaque payload, typically a compact JSON object.
    pub payload: String,
    pub occurred_at: DateTime<Utc>,
    pub task_sequence: u64,
    pub run_sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}
