//! Human intervention commands and results.

use serde::{Deserialize, Serialize};

/// Recognised intervention actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionAction {
    PauseTask,
    ResumeTask,
    ApproveReview,
    RejectReview,
    RequestRework,
    SetSubtaskDepth,
    CancelTask,
}

impl InterventionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PauseTask => "pause_task",
            Self::ResumeTask => "resume_task",
            Self::ApproveReview => "approve_review",
            Self::RejectReview => "reject_review",
            Self::RequestRework => "request_rework",
            Self::SetSubtaskDepth => "set_subtask_depth",
            Self::CancelTask => "cancel_task",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pause_task" => Some(Self::PauseTask),
            "resume_task" => Some(Self::ResumeTask),
            "approve_review" => Some(Self::ApproveReview),
            "reject_review" => Some(Self::RejectReview),
            "request_rework" => Some(Self::RequestRework),
            "set_subtask_depth" => Some(Self::SetSubtaskDepth),
            "cancel_task" => Some(Self::CancelTask),
            _ => None,
        }
    }
}

/// Why an intervention was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionReasonCode {
    InvalidState,
    PayloadInvalid,
    TaskMismatch,
    UnsupportedAction,
    TaskNotFound,
}

impl InterventionReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidState => "invalid_state",
            Self::PayloadInvalid => "payload_invalid",
            Self::TaskMismatch => "task_mismatch",
            Self::UnsupportedAction => "unsupported_action",
            Self::TaskNotFound => "task_not_found",
        }
    }
}

/// An intervention command targeting one task. The action is kept as a raw
/// string so unknown actions can be reported as unsupported rather than
/// failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInterventionCommand {
    pub task_id: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl TaskInterventionCommand {
    pub fn new(task_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            action: action.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// Synchronous result of an intervention command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInterventionResult {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<InterventionReasonCode>,
}

impl TaskInterventionResult {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason_code: None,
        }
    }

    pub fn rejected(code: InterventionReasonCode) -> Self {
        Self {
            accepted: false,
            reason_code: Some(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse() {
        assert_eq!(
            InterventionAction::from_str("pause_task"),
            Some(InterventionAction::PauseTask)
        );
        assert_eq!(InterventionAction::from_str("reboot"), None);
    }

    #[test]
    fn test_result_constructors() {
        assert!(TaskInterventionResult::accepted().accepted);
        let rejected =
            TaskInterventionResult::rejected(InterventionReasonCode::PayloadInvalid);
        assert!(!rejected.accepted);
        assert_eq!(
            rejected.reason_code,
            Some(InterventionReasonCode::PayloadInvalid)
        );
    }
}
