//! Run span domain model.
//!
//! A run groups tasks that share a design document and may land on the same
//! feature branch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a run span. Progresses monotonically except Failed, which is
/// terminal from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Accepted,
    Decomposing,
    Executing,
    Merging,
    ReadyForPr,
    Done,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Decomposing => "decomposing",
            Self::Executing => "executing",
            Self::Merging => "merging",
            Self::ReadyForPr => "ready_for_pr",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Position in the monotonic progression.
    fn rank(&self) -> u8 {
        match self {
            Self::Accepted => 0,
            Self::Decomposing => 1,
            Self::Executing => 2,
            Self::Merging => 3,
            Self::ReadyForPr => 4,
            Self::Done => 5,
            Self::Failed => 6,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Per-run lifecycle state. Owns the parent span that groups its tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpan {
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    pub base_branch: String,
    pub branch_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_branch: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
}

impl RunSpan {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            title: None,
            document: None,
            base_branch: "main".to_string(),
            branch_prefix: "feat".to_string(),
            feature_branch: None,
            started_at: Utc::now(),
            completed_at: None,
            status: RunStatus::Accepted,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    /// Advance the span status. Skipping stages forward is allowed; moving
    /// backwards is not. Failed must go through [`fail`](Self::fail).
    pub fn advance(&mut self, to: RunStatus) -> Result<(), String> {
        if to == RunStatus::Failed {
            return Err("use fail() to mark a run failed".to_string());
        }
        if self.status == RunStatus::Failed {
            return Err("run already failed".to_string());
        }
        if to.rank() <= self.status.rank() {
            return Err(format!(
                "Cannot move run from {} back to {}",
                self.status.as_str(),
                to.as_str()
            ));
        }
        self.status = to;
        if to.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Mark the run failed. Valid from any state; terminal.
    pub fn fail(&mut self) {
        self.status = RunStatus::Failed;
        self.completed_at = Some(Utc::now());
    }
}
