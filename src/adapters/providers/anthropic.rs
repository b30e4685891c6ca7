//! Anthropic-style model provider.
//!
//! Posts to the Messages API with `x-api-key` and `anthropic-version`
//! headers; extracts the text blocks of the response.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::TokenUsage;
use crate::domain::ports::{ModelOptions, ModelProvider, ModelResponse, ModelSpec};

/// Configuration for the Anthropic provider.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key (read from ANTHROPIC_API_KEY env if not set).
    pub api_key: Option<String>,
    pub base_url: String,
    pub api_version: String,
    pub timeout_secs: u64,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.anthropic.com".to_string(),
            api_version: "2023-06-01".to_string(),
            timeout_secs: 300,
        }
    }
}

impl AnthropicConfig {
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct ThinkingSpec {
    #[serde(rename = "type")]
    thinking_type: &'static str,
    budget_tokens: u32,
}

#[derive(Debug, Serialize)]
struct MessageBody {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<MessageBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingSpec>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: Usage,
}

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: Client,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn id(&self) -> &str {
        "anthropic"
    }

    async fn probe(&self) -> bool {
        let Some(api_key) = self.config.get_api_key() else {
            return false;
        };
        let url = format!("{}/v1/models", self.config.base_url);
        matches!(
            self.client
                .get(&url)
                .header("x-api-key", api_key)
                .header("anthropic-version", &self.config.api_version)
                .send()
                .await,
            Ok(response) if response.status().is_success()
        )
    }

    async fn execute(
        &self,
        spec: &ModelSpec,
        prompt: &str,
        options: ModelOptions,
    ) -> DomainResult<ModelResponse> {
        let api_key = self
            .config
            .get_api_key()
            .ok_or_else(|| DomainError::ValidationFailed("Anthropic API key not set".to_string()))?;

        let thinking = if options.reasoning {
            Some(ThinkingSpec {
                thinking_type: "enabled",
                budget_tokens: options.reasoning_budget_tokens.unwrap_or(4096),
            })
        } else {
            None
        };

        let request = MessagesRequest {
            model: spec.model.clone(),
            max_tokens: options.max_tokens,
            messages: vec![MessageBody {
                role: "user",
                content: prompt.to_string(),
            }],
            thinking,
        };

        let url = format!("{}/v1/messages", self.config.base_url);
        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.config.api_version)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::AdapterFailed(format!(
                "Anthropic API returned {status}: {body}"
            )));
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            DomainError::SerializationError(format!("Invalid Anthropic response: {e}"))
        })?;

        let output = parsed
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ModelResponse {
            output,
            model_id: parsed.model,
            usage: TokenUsage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
                cache_read_tokens: parsed.usage.cache_read_input_tokens,
                cache_write_tokens: parsed.usage.cache_creation_input_tokens,
            },
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}
