//! Role engine: executes a single role invocation.
//!
//! Selects a model provider or CLI adapter per the configured execution mode,
//! builds the prompt from role + context + skills, normalises the response,
//! and reports token usage and latency.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::adapters::cli::CliRunner;
use crate::config::{ExecutionMode, SwarmConfig};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CliAdapterDescriptor, ExecuteRoleTask, RoleResult, SwarmRole, TokenUsage};
use crate::domain::ports::{ModelOptions, ModelProvider, ModelSpec};
use crate::services::blackboard::{keys, BlackboardStore, BoardScope};
use crate::services::prompt::{
    build_orchestrator_prompt, build_role_prompt, normalize_output, Skill,
};

/// Executes role invocations against model providers and CLI adapters.
pub struct RoleEngine {
    config: Arc<SwarmConfig>,
    providers: HashMap<String, Arc<dyn ModelProvider>>,
    adapters: Vec<CliAdapterDescriptor>,
    runner: CliRunner,
    blackboard: Arc<BlackboardStore>,
    skills: Vec<Skill>,
    cli_permits: Arc<Semaphore>,
}

impl RoleEngine {
    pub fn new(
        config: Arc<SwarmConfig>,
        providers: Vec<Arc<dyn ModelProvider>>,
        adapters: Vec<CliAdapterDescriptor>,
        blackboard: Arc<BlackboardStore>,
        skills: Vec<Skill>,
    ) -> Self {
        let runner = CliRunner::new(config.sandbox.clone());
        let cli_permits = Arc::new(Semaphore::new(config.max_cli_concurrency));
        let providers = providers
            .into_iter()
            .map(|p| (p.id().to_string(), p))
            .collect();
        Self {
            config,
            providers,
            adapters,
            runner,
            blackboard,
            skills,
            cli_permits,
        }
    }

    /// Any execution backend is configured: CLI order non-empty or a
    /// role-model mapping exists.
    pub fn adapter_available(&self) -> bool {
        match self.config.execution_mode {
            ExecutionMode::ApiDirect => !self.config.role_models.is_empty(),
            ExecutionMode::SubscriptionCli => !self.config.cli_adapter_order.is_empty(),
            ExecutionMode::Hybrid => {
                !self.config.role_models.is_empty() || !self.config.cli_adapter_order.is_empty()
            }
        }
    }

    fn render_prompt(&self, task: &ExecuteRoleTask) -> String {
        if task.role == SwarmRole::Orchestrator {
            build_orchestrator_prompt(task)
        } else {
            build_role_prompt(task, &self.skills, self.config.skill_byte_budget)
        }
    }

    /// Execute a role invocation. Cancellation is honoured between and
    /// during adapter calls.
    pub async fn execute(
        &self,
        task: &ExecuteRoleTask,
        cancel: &CancellationToken,
    ) -> DomainResult<RoleResult> {
        let prompt = self.render_prompt(task);
        match self.config.execution_mode {
            ExecutionMode::ApiDirect => self.execute_api(task, &prompt, cancel).await,
            ExecutionMode::SubscriptionCli => self.execute_cli(task, &prompt, cancel).await,
            ExecutionMode::Hybrid => match self.execute_api(task, &prompt, cancel).await {
                Err(DomainError::ProviderMissing) => self.execute_cli(task, &prompt, cancel).await,
                other => other,
            },
        }
    }

    async fn execute_api(
        &self,
        task: &ExecuteRoleTask,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> DomainResult<RoleResult> {
        let mapping = self
            .config
            .role_models
            .get(task.role.as_str())
            .ok_or(DomainError::ProviderMissing)?;
        let spec = ModelSpec::parse(mapping)?;
        let provider = self
            .providers
            .get(&spec.provider)
            .ok_or(DomainError::ProviderMissing)?;

        let options = ModelOptions {
            max_tokens: self.config.model_max_tokens,
            reasoning: self.config.model_reasoning,
            reasoning_budget_tokens: self.config.model_reasoning_budget,
        };

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(DomainError::Cancelled),
            result = provider.execute(&spec, prompt, options) => result?,
        };

        Ok(RoleResult {
            task_id: task.task_id.clone(),
            role: task.role,
            output: normalize_output(&response.output),
            adapter_id: spec.provider.clone(),
            model: Some(response.model_id),
            reasoning: None,
            latency_ms: response.latency_ms,
            usage: response.usage,
            confidence: 1.0,
        })
    }

    async fn circuit_open(&self, adapter_id: &str) -> bool {
        self.blackboard
            .get(&BoardScope::Global, &keys::adapter_circuit(adapter_id))
            .await
            .as_deref()
            == Some("open")
    }

    /// Walk the configured adapter order: probe, execute, inspect output.
    /// An adapter fails on non-zero exit, a rejection fragment, or an
    /// authorization-failure fragment; the walk then moves on.
    async fn execute_cli(
        &self,
        task: &ExecuteRoleTask,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> DomainResult<RoleResult> {
        let probe_timeout = Duration::from_millis(self.config.probe_timeout_ms);

        for adapter_id in &self.config.cli_adapter_order {
            if cancel.is_cancelled() {
                return Err(DomainError::Cancelled);
            }
            let Some(adapter) = self
                .adapters
                .iter()
                .find(|a| &a.id == adapter_id)
                .or_else(|| {
                    warn!(adapter = %adapter_id, "Adapter order names an unknown adapter");
                    None
                })
            else {
                continue;
            };

            if self.circuit_open(&adapter.id).await {
                debug!(adapter = %adapter.id, "Skipping adapter: circuit open");
                continue;
            }

            if !self.runner.probe(adapter, probe_timeout).await {
                debug!(adapter = %adapter.id, "Adapter probe failed, trying next");
                continue;
            }

            let permit = self
                .cli_permits
                .acquire()
                .await
                .map_err(|_| DomainError::ExecutionFailed("CLI permit pool closed".to_string()))?;
            let started = Instant::now();
            let execution = self.runner.execute(adapter, prompt, cancel).await;
            drop(permit);

            match execution {
                Ok(result) => {
                    if !result.exit_ok || adapter.output_rejected(&result.stdout) {
                        debug!(adapter = %adapter.id, exit_ok = result.exit_ok, "Adapter rejected invocation");
                        continue;
                    }
                    return Ok(RoleResult {
                        task_id: task.task_id.clone(),
                        role: task.role,
                        output: normalize_output(&result.stdout),
                        adapter_id: adapter.id.clone(),
                        model: None,
                        reasoning: None,
                        latency_ms: started.elapsed().as_millis() as u64,
                        usage: TokenUsage::default(),
                        confidence: 1.0,
                    });
                }
                Err(DomainError::Cancelled) => return Err(DomainError::Cancelled),
                Err(e) => {
                    debug!(adapter = %adapter.id, error = %e, "Adapter execution failed, trying next");
                    continue;
                }
            }
        }

        Err(DomainError::AdapterFailed(
            "No CLI adapter succeeded".to_string(),
        ))
    }
}
