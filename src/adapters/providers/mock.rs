//! Mock model provider for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::errors::DomainResult;
use crate::domain::models::TokenUsage;
use crate::domain::ports::{ModelOptions, ModelProvider, ModelResponse, ModelSpec};

/// A provider that returns a canned response and counts calls.
pub struct MockModelProvider {
    id: String,
    response: String,
    calls: AtomicU64,
}

impl MockModelProvider {
    pub fn new(id: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            response: response.into(),
            calls: AtomicU64::new(0),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelProvider for MockModelProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn probe(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        spec: &ModelSpec,
        _prompt: &str,
        _options: ModelOptions,
    ) -> DomainResult<ModelResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ModelResponse {
            output: self.response.clone(),
            model_id: spec.model.clone(),
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 10,
                cache_read_tokens: 0,
                cache_write_tokens: 0,
            },
            latency_ms: 1,
        })
    }
}
