//! OpenAI-compatible model provider.
//!
//! Posts to a chat/completions endpoint; reads the first choice's message
//! content and cached-token usage details when present.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::TokenUsage;
use crate::domain::ports::{ModelOptions, ModelProvider, ModelResponse, ModelSpec};

/// Configuration for an OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// Provider id matched against the model-spec prefix, e.g. "openai".
    pub provider_id: String,
    /// API key (read from OPENAI_API_KEY env if not set).
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            provider_id: "openai".to_string(),
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_secs: 300,
        }
    }
}

impl OpenAiCompatConfig {
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
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
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Default, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: String,
    usage: Option<ChatUsage>,
}

/// OpenAI-compatible chat/completions provider.
pub struct OpenAiCompatProvider {
    config: OpenAiCompatConfig,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(config: OpenAiCompatConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    async fn probe(&self) -> bool {
        let Some(api_key) = self.config.get_api_key() else {
            return false;
        };
        let url = format!("{}/models", self.config.base_url);
        matches!(
            self.client.get(&url).bearer_auth(api_key).send().await,
            Ok(response) if response.status().is_success()
        )
    }

    async fn execute(
        &self,
        spec: &ModelSpec,
        prompt: &str,
        options: ModelOptions,
    ) -> DomainResult<ModelResponse> {
        let api_key = self.config.get_api_key().ok_or_else(|| {
            DomainError::ValidationFailed(format!("{} API key not set", self.config.provider_id))
        })?;

        let request = ChatRequest {
            model: spec.model.clone(),
            max_tokens: options.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::AdapterFailed(format!(
                "{} API returned {status}: {body}",
                self.config.provider_id
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            DomainError::SerializationError(format!("Invalid chat response: {e}"))
        })?;

        let output = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        let usage = parsed.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            cache_read_tokens: u.prompt_tokens_details.unwrap_or_default().cached_tokens,
            cache_write_tokens: 0,
        });

        Ok(ModelResponse {
            output,
            model_id: if parsed.model.is_empty() {
                spec.model.clone()
            } else {
                parsed.model
            },
            usage,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_reads_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(
                r#"{
                    "choices": [{"message": {"content": "answer"}}],
                    "model": "gpt-test",
                    "usage": {
                        "prompt_tokens": 9,
                        "completion_tokens": 4,
                        "prompt_tokens_details": {"cached_tokens": 3}
                    }
                }"#,
            )
            .create_async()
            .await;

        let provider = OpenAiCompatProvider::new(
            OpenAiCompatConfig::default()
                .with_api_key("test-key")
                .with_base_url(server.url()),
        );
        let spec = ModelSpec {
            provider: "openai".to_string(),
            model: "gpt-test".to_string(),
        };
        let response = provider
            .execute(&spec, "hello", ModelOptions::default())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.output, "answer");
        assert_eq!(response.usage.input_tokens, 9);
        assert_eq!(response.usage.cache_read_tokens, 3);
    }
}
