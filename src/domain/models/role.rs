//! Role invocation request/result models.

use serde::{Deserialize, Serialize};

use super::agent::SwarmRole;

/// Token accounting for a single role invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A role invocation request, assembled by a coordinator and executed by the
/// role engine on a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRoleTask {
    pub task_id: String,
    pub role: SwarmRole,
    pub title: String,
    pub description: String,
    /// Implementation plan carried from the preceding role (Builder, Reviewer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// Historical-learning advice injected into the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_advice: Option<String>,
    /// Retrieved code-context chunks.
    #[serde(default)]
    pub code_context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_context: Option<String>,
    /// Serialized GOAP analysis (Orchestrator only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goap_analysis: Option<String>,
    /// Compact blackboard digest (Orchestrator only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blackboard_digest: Option<String>,
}

impl ExecuteRoleTask {
    pub fn new(
        task_id: impl Into<String>,
        role: SwarmRole,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            role,
            title: title.into(),
            description: description.into(),
            plan: None,
            strategy_advice: None,
            code_context: Vec::new(),
            project_context: None,
            goap_analysis: None,
            blackboard_digest: None,
        }
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }
}

/// Result of one role invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleResult {
    pub task_id: String,
    pub role: SwarmRole,
    pub output: String,
    pub adapter_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub latency_ms: u64,
    #[serde(default)]
    pub usage: TokenUsage,
    /// Self-reported confidence in [0, 1].
    pub confidence: f64,
}

/// A role failure as reported to the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleFailureReport {
    pub task_id: String,
    pub role: SwarmRole,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_id: Option<String>,
    /// How many times this role has already failed for this task.
    pub attempt: u32,
}

/// A low-confidence or otherwise suspect result forwarded to the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConcern {
    pub task_id: String,
    pub role: SwarmRole,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub adapter_id: String,
}
