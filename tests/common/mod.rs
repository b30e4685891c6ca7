//! Shared helpers for integration tests.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use swarm_assistant::application::{bootstrap, DispatcherHandle, SwarmServices};
use swarm_assistant::domain::errors::DomainResult;
use swarm_assistant::domain::models::{TaskStatus, TokenUsage};
use swarm_assistant::domain::ports::{
    EventRepository, InMemoryEventRepository, ModelOptions, ModelProvider, ModelResponse,
    ModelSpec, NullTaskSink,
};
use swarm_assistant::SwarmConfig;

pub struct TestSwarm {
    pub dispatcher: DispatcherHandle,
    pub services: Arc<SwarmServices>,
    pub events: Arc<InMemoryEventRepository>,
}

/// Bootstrap the mesh with an in-memory event log and no task persistence.
pub fn start(config: SwarmConfig, providers: Vec<Arc<dyn ModelProvider>>) -> TestSwarm {
    let events = Arc::new(InMemoryEventRepository::new());
    let repository: Arc<dyn EventRepository> = events.clone();
    let (dispatcher, services) = bootstrap(
        config,
        Some(repository),
        Arc::new(NullTaskSink),
        providers,
        Vec::new(),
    )
    .expect("bootstrap failed");
    TestSwarm {
        dispatcher,
        services,
        events,
    }
}

/// Config that maps every pipeline role to the mock api provider.
pub fn api_direct_config() -> SwarmConfig {
    let mut config = SwarmConfig {
        execution_mode: swarm_assistant::config::ExecutionMode::ApiDirect,
        ..Default::default()
    };
    for role in ["orchestrator", "planner", "builder", "reviewer"] {
        config
            .role_models
            .insert(role.to_string(), "scripted/scripted-model".to_string());
    }
    config
}

/// Poll the registry until the task reaches a terminal status.
pub async fn wait_terminal(swarm: &TestSwarm, task_id: &str, timeout: Duration) -> TaskStatus {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(task) = swarm.services.tasks.get(task_id).await {
            if task.is_terminal() {
                return task.status;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {task_id} did not reach a terminal status in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// A provider whose response depends on the role addressed by the prompt,
/// with an optional per-call delay.
pub struct ScriptedProvider {
    pub reviewer_response: String,
    pub planner_response: String,
    pub default_response: String,
    pub delay: Duration,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self {
            reviewer_response: "APPROVE: looks good".to_string(),
            planner_response: "1. implement\n2. test".to_string(),
            default_response: "done".to_string(),
            delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn probe(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        spec: &ModelSpec,
        prompt: &str,
        _options: ModelOptions,
    ) -> DomainResult<ModelResponse> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let output = if prompt.starts_with("You are the reviewer") {
            self.reviewer_response.clone()
        } else if prompt.starts_with("You are the planner") {
            self.planner_response.clone()
        } else {
            self.default_response.clone()
        };
        Ok(ModelResponse {
            output,
            model_id: spec.model.clone(),
            usage: TokenUsage::default(),
            latency_ms: 1,
        })
    }
}
