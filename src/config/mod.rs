//! Runtime configuration for the swarm core.
//!
//! Configuration merges programmatic defaults, a project YAML file, and
//! `SWARM_`-prefixed environment variables. Validation is fatal at load time;
//! once accepted, the core assumes configuration is valid.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid worker_pool_size: {0}. Must be at least 1")]
    InvalidWorkerPool(usize),

    #[error("Invalid reviewer_pool_size: {0}. Must be at least 1")]
    InvalidReviewerPool(usize),

    #[error("Invalid max_subtask_depth: {0}. Must be between 0 and {1}")]
    InvalidSubtaskDepth(u32, u32),

    #[error("Unknown sandbox mode: {0}. Must be one of: host, os-sandboxed, docker, apple-container")]
    UnknownSandboxMode(String),

    #[error("Sandbox mode {0} requires a wrapper command specification")]
    MissingSandboxWrapper(String),

    #[error("Unknown execution mode: {0}. Must be one of: api-direct, subscription-cli, hybrid")]
    UnknownExecutionMode(String),

    #[error("Unknown CLI adapter in adapter order: {0}")]
    UnknownCliAdapter(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Hard cap on sub-task recursion depth; configured depth stays in single digits.
pub const MAX_ALLOWED_SUBTASK_DEPTH: u32 = 9;

/// How the role engine resolves execution backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Resolve role-to-model mapping and call a model provider.
    ApiDirect,
    /// Walk the configured CLI adapter order.
    SubscriptionCli,
    /// Api-direct first, CLI fallback on missing provider.
    Hybrid,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::SubscriptionCli
    }
}

/// Wrapper command specification for container sandbox modes.
/// Args are templated with `{{command}}` and `{{args_joined}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxWrapperSpec {
    pub command: String,
    pub args: Vec<String>,
}

/// Sandbox configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxSettings {
    /// One of: host, os-sandboxed, docker, apple-container.
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapper: Option<SandboxWrapperSpec>,
    /// Hosts reachable from inside the sandbox. Empty list disables the
    /// container network entirely.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
    /// Host directory mounted read-write as the workspace.
    pub workspace_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
    pub stop_timeout_seconds: u64,
    /// When true, containers get a host-gateway mapping for agent-to-agent
    /// networking.
    #[serde(default)]
    pub agent_networking: bool,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            mode: "host".to_string(),
            wrapper: None,
            allowed_hosts: Vec::new(),
            workspace_dir: ".".to_string(),
            cpu_limit: None,
            memory_limit: None,
            stop_timeout_seconds: 10,
            agent_networking: false,
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Worker pool size for non-review roles.
    pub worker_pool_size: usize,
    /// Reviewer pool size.
    pub reviewer_pool_size: usize,
    /// Maximum sub-task recursion depth.
    pub max_subtask_depth: u32,
    /// Retry budget per task and role.
    pub max_retries_per_task: u32,
    /// Failures before an adapter circuit opens.
    pub adapter_circuit_threshold: u32,
    /// Seconds an open circuit excludes its adapter from selection.
    pub circuit_cooldown_seconds: u64,
    /// Ordered CLI adapter identifiers for subscription fallback.
    pub cli_adapter_order: Vec<String>,
    /// Role engine execution mode.
    pub execution_mode: ExecutionMode,
    /// Role name -> `provider/model` mapping for api-direct execution.
    pub role_models: HashMap<String, String>,
    /// Global cap on concurrently running CLI adapter processes.
    pub max_cli_concurrency: usize,
    /// Heartbeat interval; agents silent for 3x this are pruned.
    pub agent_heartbeat_interval_seconds: u64,
    /// Byte budget for skill bodies included in prompts.
    pub skill_byte_budget: usize,
    /// Max tokens requested from model providers.
    pub model_max_tokens: u32,
    /// Enable extended reasoning on providers that support it.
    pub model_reasoning: bool,
    /// Token budget for extended reasoning, when enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_reasoning_budget: Option<u32>,
    /// Capacity of the observer-visible ring buffer.
    pub ui_buffer_capacity: usize,
    /// Contract-net bid collection window in milliseconds.
    pub contract_net_window_ms: u64,
    /// CLI adapter probe timeout in milliseconds.
    pub probe_timeout_ms: u64,
    /// Sandbox configuration.
    pub sandbox: SandboxSettings,
    /// SQLite database path for the durable event log; empty disables it.
    pub database_path: String,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 2,
            reviewer_pool_size: 1,
            max_subtask_depth: 3,
            max_retries_per_task: 3,
            adapter_circuit_threshold: 3,
            circuit_cooldown_seconds: 60,
            cli_adapter_order: vec!["local-echo".to_string()],
            execution_mode: ExecutionMode::default(),
            role_models: HashMap::new(),
            max_cli_concurrency: 2,
            agent_heartbeat_interval_seconds: 30,
            skill_byte_budget: 4000,
            model_max_tokens: 8192,
            model_reasoning: false,
            model_reasoning_budget: None,
            ui_buffer_capacity: 512,
            contract_net_window_ms: 1000,
            probe_timeout_ms: 2000,
            sandbox: SandboxSettings::default(),
            database_path: String::new(),
        }
    }
}

impl SwarmConfig {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest): programmatic defaults,
    /// `.swarm/config.yaml`, `.swarm/local.yaml`, `SWARM_*` environment.
    pub fn load() -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(".swarm/config.yaml"))
            .merge(Yaml::file(".swarm/local.yaml"))
            .merge(Env::prefixed("SWARM_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading. Fatal at startup only.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_pool_size == 0 {
            return Err(ConfigError::InvalidWorkerPool(self.worker_pool_size));
        }
        if self.reviewer_pool_size == 0 {
            return Err(ConfigError::InvalidReviewerPool(self.reviewer_pool_size));
        }
        if self.max_subtask_depth > MAX_ALLOWED_SUBTASK_DEPTH {
            return Err(ConfigError::InvalidSubtaskDepth(
                self.max_subtask_depth,
                MAX_ALLOWED_SUBTASK_DEPTH,
            ));
        }

        match self.sandbox.mode.as_str() {
            "host" | "os-sandboxed" => {}
            "docker" | "apple-container" => {
                if self.sandbox.wrapper.is_none() {
                    return Err(ConfigError::MissingSandboxWrapper(
                        self.sandbox.mode.clone(),
                    ));
                }
            }
            other => return Err(ConfigError::UnknownSandboxMode(other.to_string())),
        }

        if self.max_cli_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_cli_concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
