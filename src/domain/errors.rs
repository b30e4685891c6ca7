//! Domain errors for the swarm coordination core.

use thiserror::Error;

/// Domain-level errors that can occur in the swarm system.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Adapter failed: {0}")]
    AdapterFailed(String),

    #[error("Budget exhausted for agent: {0}")]
    BudgetExhausted(String),

    #[error("No model provider registered")]
    ProviderMissing,

    #[error("Sub-task depth {depth} exceeds maximum {max}")]
    DepthExceeded { depth: u32, max: u32 },

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for DomainError {
    fn from(err: reqwest::Error) -> Self {
        DomainError::ExecutionFailed(err.to_string())
    }
}
