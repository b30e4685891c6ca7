//! Task snapshot domain model.
//!
//! A task is one unit of software-engineering work carried through the
//! Plan -> Build -> Review pipeline by a coordinator. Snapshots live in the
//! task registry; everything else holds read-only copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a task in the coordination pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is registered but no role has run yet
    Queued,
    /// Planner role is producing an implementation plan
    Planning,
    /// Builder role is producing the implementation
    Building,
    /// Reviewer role is judging the build output
    Reviewing,
    /// Task finished successfully
    Done,
    /// Task is terminally blocked (escalation, cancellation, sub-task failure)
    Blocked,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Planning => "planning",
            Self::Building => "building",
            Self::Reviewing => "reviewing",
            Self::Done => "done",
            Self::Blocked => "blocked",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "planning" => Some(Self::Planning),
            "building" => Some(Self::Building),
            "reviewing" => Some(Self::Reviewing),
            "done" => Some(Self::Done),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Blocked)
    }

    /// Valid transitions from this status.
    ///
    /// Forward edges only, except the rework cycle back into Queued.
    /// Done and Blocked are absorbing.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Queued => &[Self::Planning, Self::Building, Self::Reviewing, Self::Blocked],
            Self::Planning => &[Self::Building, Self::Queued, Self::Blocked],
            Self::Building => &[Self::Reviewing, Self::Queued, Self::Blocked],
            Self::Reviewing => &[Self::Done, Self::Queued, Self::Blocked],
            Self::Done => &[],
            Self::Blocked => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Type of artifact produced by a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    File,
    Code,
    Document,
    Data,
    Other,
}

/// Reference to an artifact produced during task execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// URI (e.g., workspace://task-id/path/to/file)
    pub uri: String,
    pub kind: ArtifactKind,
    pub checksum: Option<String>,
}

/// Inbound task submission, before the registry owns a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub task_id: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl TaskSubmission {
    pub fn new(
        task_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            title: title.into(),
            description: description.into(),
            run_id: None,
        }
    }

    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.task_id.trim().is_empty() {
            return Err("Task id cannot be empty".to_string());
        }
        if self.title.trim().is_empty() {
            return Err("Task title cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Authoritative snapshot of a task, owned by the task registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planning_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,
    /// Child ids in insertion order, deduplicated.
    #[serde(default)]
    pub child_task_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
}

impl TaskSnapshot {
    pub fn new(
        task_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            title: title.into(),
            description: description.into(),
            status: TaskStatus::default(),
            created_at: now,
            updated_at: now,
            planning_output: None,
            build_output: None,
            review_output: None,
            summary: None,
            error: None,
            parent_task_id: None,
            child_task_ids: Vec::new(),
            run_id: None,
            artifacts: Vec::new(),
        }
    }

    pub fn from_submission(submission: &TaskSubmission) -> Self {
        let mut snapshot = Self::new(
            submission.task_id.clone(),
            submission.title.clone(),
            submission.description.clone(),
        );
        snapshot.run_id = submission.run_id.clone();
        snapshot
    }

    /// Set parent task. Immutable once set.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        if self.parent_task_id.is_none() {
            self.parent_task_id = Some(parent_id.into());
        }
        self
    }

    /// Assign the run id. Returns an error if a different run is already set.
    pub fn set_run_id(&mut self, run_id: impl Into<String>) -> Result<(), String> {
        let run_id = run_id.into();
        match &self.run_id {
            Some(existing) if *existing != run_id => {
                Err(format!("Run id already set to {existing}"))
            }
            _ => {
                self.run_id = Some(run_id);
                Ok(())
            }
        }
    }

    /// The run id every emitted event carries: explicit, or a deterministic
    /// legacy synthesis for run-less tasks.
    pub fn effective_run_id(&self) -> String {
        self.run_id
            .clone()
            .unwrap_or_else(|| format!("legacy-{}", self.task_id))
    }

    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status, enforcing the pipeline DAG.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }
        if new_status == TaskStatus::Blocked && self.error.as_deref().unwrap_or("").is_empty() {
            return Err("Blocked status requires a non-empty error".to_string());
        }
        self.status = new_status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Block the task with an error. Valid from any non-terminal state.
    pub fn block(&mut self, error: impl Into<String>) -> Result<(), String> {
        let error = error.into();
        if error.trim().is_empty() {
            return Err("Blocked status requires a non-empty error".to_string());
        }
        self.error = Some(error);
        self.transition_to(TaskStatus::Blocked)
    }

    /// Append a child id, preserving insertion order. Returns true if new.
    pub fn add_child(&mut self, child_id: impl Into<String>) -> bool {
        let child_id = child_id.into();
        if self.child_task_ids.contains(&child_id) {
            return false;
        }
        self.child_task_ids.push(child_id);
        self.updated_at = Utc::now();
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_from_submission() {
        let submission =
            TaskSubmission::new("t1", "Smoke", "Verify the pipeline").with_run("r1");
        let snapshot = TaskSnapshot::from_submission(&submission);
        assert_eq!(snapshot.task_id, "t1");
        assert_eq!(snapshot.status, TaskStatus::Queued);
        assert_eq!(snapshot.run_id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut t = TaskSnapshot::new("t1", "Title", "Desc");
        t.transition_to(TaskStatus::Planning).unwrap();
        t.transition_to(TaskStatus::Building).unwrap();
        t.transition_to(TaskStatus::Reviewing).unwrap();
        t.transition_to(TaskStatus::Done).unwrap();
        assert!(t.is_terminal());
    }

    #[test]
    fn test_rework_cycle_through_queued() {
        let mut t = TaskSnapshot::new("t1", "Title", "Desc");
        t.transition_to(TaskStatus::Planning).unwrap();
        t.transition_to(TaskStatus::Building).unwrap();
        t.transition_to(TaskStatus::Reviewing).unwrap();
        // Rework loops back through Queued, never directly backwards
        t.transition_to(TaskStatus::Queued).unwrap();
        t.transition_to(TaskStatus::Building).unwrap();
        assert_eq!(t.status, TaskStatus::Building);
    }

    #[test]
    fn test_reverse_transitions_rejected() {
        let mut t = TaskSnapshot::new("t1", "Title", "Desc");
        t.transition_to(TaskStatus::Planning).unwrap();
        t.transition_to(TaskStatus::Building).unwrap();
        assert!(t.transition_to(TaskStatus::Planning).is_err());
        t.transition_to(TaskStatus::Reviewing).unwrap();
        assert!(t.transition_to(TaskStatus::Building).is_err());
    }

    #[test]
    fn test_terminal_states_absorbing() {
        let mut t = TaskSnapshot::new("t1", "Title", "Desc");
        t.block("boom").unwrap();
        assert!(t.transition_to(TaskStatus::Queued).is_err());
        assert!(t.transition_to(TaskStatus::Done).is_err());
    }

    #[test]
    fn test_blocked_requires_error() {
        let mut t = TaskSnapshot::new("t1", "Title", "Desc");
        assert!(t.transition_to(TaskStatus::Blocked).is_err());
        assert!(t.block("   ").is_err());
        t.block("sub-task t2 failed: adapter down").unwrap();
        assert_eq!(t.status, TaskStatus::Blocked);
    }

    #[test]
    fn test_run_id_immutable_once_set() {
        let mut t = TaskSnapshot::new("t1", "Title", "Desc");
        t.set_run_id("r1").unwrap();
        assert!(t.set_run_id("r2").is_err());
        // Re-setting the same value is fine
        t.set_run_id("r1").unwrap();
    }

    #[test]
    fn test_effective_run_id_legacy_synthesis() {
        let t = TaskSnapshot::new("t1", "Title", "Desc");
        assert_eq!(t.effective_run_id(), "legacy-t1");
        let mut t2 = TaskSnapshot::new("t2", "Title", "Desc");
        t2.set_run_id("r1").unwrap();
        assert_eq!(t2.effective_run_id(), "r1");
    }

    #[test]
    fn test_add_child_dedupes_and_keeps_order() {
        let mut t = TaskSnapshot::new("t1", "Title", "Desc");
        assert!(t.add_child("c2"));
        assert!(t.add_child("c1"));
        assert!(!t.add_child("c2"));
        assert_eq!(t.child_task_ids, vec!["c2", "c1"]);
    }

    #[test]
    fn test_snapshot_serde_round_trip() {
        let mut t = TaskSnapshot::new("t1", "Title", "Desc");
        t.set_run_id("r1").unwrap();
        t.add_child("c1");
        t.planning_output = Some("plan".to_string());
        t.artifacts.push(ArtifactRef {
            uri: "workspace://t1/main.rs".to_string(),
            kind: ArtifactKind::Code,
            checksum: None,
        });
        let json = serde_json::to_string(&t).unwrap();
        let back: TaskSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }
}
