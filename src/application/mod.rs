//! Application layer: the actor mesh and its wiring.

pub mod dispatcher;
pub mod run_coordinator;
pub mod task_coordinator;
pub mod worker;

pub use dispatcher::{Dispatcher, DispatcherHandle, DispatcherMsg, PeerMessageAck};
pub use run_coordinator::RunCoordinator;
pub use task_coordinator::{CoordinatorHandle, CoordinatorMsg, TaskCoordinator};
pub use worker::{RoleRequest, WorkerPool};

use std::sync::Arc;
use std::time::Duration;

use crate::adapters::cli::builtin_adapters;
use crate::config::SwarmConfig;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{EventRepository, ModelProvider, TaskSink};
use crate::services::{
    BlackboardStore, CapabilityRegistry, ConsensusService, EventRecorder, GoapPlanner, RoleEngine,
    RunRegistry, Skill, Supervisor, SupervisorHandle, TaskRegistry, UiEventStream,
};

/// Process-scoped services shared by coordinators, workers, and the
/// dispatcher. Constructed once at boot and passed by explicit reference.
pub struct SwarmServices {
    pub config: Arc<SwarmConfig>,
    pub tasks: Arc<TaskRegistry>,
    pub runs: Arc<RunRegistry>,
    pub capabilities: Arc<CapabilityRegistry>,
    pub blackboard: Arc<BlackboardStore>,
    pub recorder: Arc<EventRecorder>,
    pub ui: Arc<UiEventStream>,
    pub consensus: Arc<ConsensusService>,
    pub supervisor: SupervisorHandle,
    pub workers: WorkerPool,
    pub reviewers: WorkerPool,
    pub planner: GoapPlanner,
    /// Whether any execution backend is configured.
    pub adapter_available: bool,
}

/// Wire the service mesh from configuration and adapters, returning the
/// dispatcher handle and the shared services.
///
/// Configuration faults (an adapter order naming an unknown adapter) are
/// fatal here; once bootstrapped, the core assumes configuration is valid.
pub fn bootstrap(
    config: SwarmConfig,
    event_repository: Option<Arc<dyn EventRepository>>,
    task_sink: Arc<dyn TaskSink>,
    providers: Vec<Arc<dyn ModelProvider>>,
    skills: Vec<Skill>,
) -> DomainResult<(DispatcherHandle, Arc<SwarmServices>)> {
    let adapters = builtin_adapters();
    for adapter_id in &config.cli_adapter_order {
        if !adapters.iter().any(|a| &a.id == adapter_id) {
            return Err(DomainError::ValidationFailed(format!(
                "Unknown CLI adapter in adapter order: {adapter_id}"
            )));
        }
    }

    let config = Arc::new(config);
    let blackboard = Arc::new(BlackboardStore::new());
    let ui = Arc::new(UiEventStream::new(config.ui_buffer_capacity));
    let recorder = Arc::new(EventRecorder::new(event_repository));
    let consensus = Arc::new(ConsensusService::new(recorder.clone(), ui.clone()));
    let supervisor = Supervisor::spawn(
        config.max_retries_per_task,
        config.adapter_circuit_threshold,
        config.circuit_cooldown_seconds,
        blackboard.clone(),
        recorder.clone(),
        ui.clone(),
    );
    let capabilities = Arc::new(CapabilityRegistry::new(
        blackboard.clone(),
        ui.clone(),
        Duration::from_secs(config.agent_heartbeat_interval_seconds),
    ));
    let tasks = Arc::new(TaskRegistry::new(task_sink));
    let runs = Arc::new(RunRegistry::new());

    let engine = Arc::new(RoleEngine::new(
        config.clone(),
        providers,
        adapters,
        blackboard.clone(),
        skills,
    ));
    let adapter_available = engine.adapter_available();
    let workers = WorkerPool::spawn("worker", config.worker_pool_size, engine.clone());
    let reviewers = WorkerPool::spawn("reviewer", config.reviewer_pool_size, engine);

    let services = Arc::new(SwarmServices {
        config,
        tasks,
        runs,
        capabilities,
        blackboard,
        recorder,
        ui,
        consensus,
        supervisor,
        workers,
        reviewers,
        planner: GoapPlanner::new(),
        adapter_available,
    });

    // Background heartbeat sweep: agents silent for 3x the interval are
    // deregistered.
    let prune_registry = services.capabilities.clone();
    let prune_interval = Duration::from_secs(services.config.agent_heartbeat_interval_seconds.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(prune_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            prune_registry.prune_stale().await;
        }
    });

    let dispatcher = Dispatcher::spawn(services.clone());
    Ok((dispatcher, services))
}
