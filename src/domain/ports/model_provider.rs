//! Model provider port - interface for HTTP code-generation backends.

use async_trait::async_trait;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::TokenUsage;

/// A `provider/model` pair resolved from the role-to-model mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub provider: String,
    pub model: String,
}

impl ModelSpec {
    /// Parse `"anthropic/claude-sonnet-4"` style identifiers.
    pub fn parse(spec: &str) -> DomainResult<Self> {
        match spec.split_once('/') {
            Some((provider, model)) if !provider.is_empty() && !model.is_empty() => Ok(Self {
                provider: provider.to_string(),
                model: model.to_string(),
            }),
            _ => Err(DomainError::ValidationFailed(format!(
                "Invalid model spec: {spec}"
            ))),
        }
    }
}

/// Invocation options forwarded to a provider.
#[derive(Debug, Clone, Copy)]
pub struct ModelOptions {
    pub max_tokens: u32,
    pub reasoning: bool,
    pub reasoning_budget_tokens: Option<u32>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            reasoning: false,
            reasoning_budget_tokens: None,
        }
    }
}

/// Response from a provider call.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub output: String,
    pub model_id: String,
    pub usage: TokenUsage,
    pub latency_ms: u64,
}

/// Trait for model provider implementations (Anthropic-style, OpenAI-compatible).
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider id matched against the model-spec prefix.
    fn id(&self) -> &str;

    /// Check whether the provider is reachable and configured.
    async fn probe(&self) -> bool;

    /// Execute a prompt against the given model.
    async fn execute(
        &self,
        spec: &ModelSpec,
        prompt: &str,
        options: ModelOptions,
    ) -> DomainResult<ModelResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_spec_parse() {
        let spec = ModelSpec::parse("anthropic/claude-sonnet-4").unwrap();
        assert_eq!(spec.provider, "anthropic");
        assert_eq!(spec.model, "claude-sonnet-4");
        assert!(ModelSpec::parse("no-slash").is_err());
        assert!(ModelSpec::parse("/model").is_err());
        assert!(ModelSpec::parse("provider/").is_err());
    }
}
