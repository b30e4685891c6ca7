//! Task coordinator actor.
//!
//! One coordinator owns the lifecycle of one task: it asks the orchestrator
//! role for the next high-level action (falling back to the GOAP planner),
//! dispatches roles to the pools, maintains the per-task world state and
//! blackboard, spawns sub-tasks, applies human interventions, and emits the
//! ordered lifecycle event stream.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MAX_ALLOWED_SUBTASK_DEPTH;
use crate::domain::models::{
    find_action, ActionName, EventKind, ExecuteRoleTask, InterventionAction,
    InterventionReasonCode, QualityConcern, RoleFailureReport, RoleResult, SwarmRole,
    TaskInterventionCommand, TaskInterventionResult, TaskStatus, TaskSubmission, WorldKey,
    WorldState,
};
use crate::services::blackboard::{keys, BoardScope};
use crate::services::prompt::{parse_action, parse_subtasks, review_approved};
use crate::services::SupervisorDirective;

use super::dispatcher::DispatcherMsg;
use super::worker::RoleRequest;
use super::SwarmServices;

/// Confidence below which a role result raises a quality concern.
const QUALITY_CONCERN_THRESHOLD: f64 = 0.5;

/// Messages handled by a task coordinator.
pub enum CoordinatorMsg {
    /// Start coordination; sent once by the dispatcher after registration.
    Begin,
    RoleCompleted(RoleResult),
    RoleFailed {
        role: SwarmRole,
        error: String,
        adapter_id: Option<String>,
    },
    ChildCompleted {
        child_id: String,
    },
    ChildFailed {
        child_id: String,
        error: String,
    },
    Intervene {
        command: TaskInterventionCommand,
        reply: oneshot::Sender<TaskInterventionResult>,
    },
    /// External cancellation (parent failure, operator shutdown).
    Cancel {
        reason: String,
    },
}

/// Cloneable handle to a coordinator's mailbox.
#[derive(Clone)]
pub struct CoordinatorHandle {
    pub task_id: String,
    tx: mpsc::Sender<CoordinatorMsg>,
}

impl CoordinatorHandle {
    pub async fn send(&self, msg: CoordinatorMsg) -> bool {
        self.tx.send(msg).await.is_ok()
    }

    pub async fn intervene(&self, command: TaskInterventionCommand) -> TaskInterventionResult {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(CoordinatorMsg::Intervene { command, reply })
            .await
            .is_err()
        {
            return TaskInterventionResult::rejected(InterventionReasonCode::InvalidState);
        }
        rx.await
            .unwrap_or_else(|_| TaskInterventionResult::rejected(InterventionReasonCode::InvalidState))
    }
}

/// A decision deferred while the task is paused.
enum PendingStep {
    /// Ask the orchestrator for the next action.
    AskOrchestrator,
    /// Run the action decision directly (orchestrator already consulted).
    Decide(Option<ActionName>),
}

pub struct TaskCoordinator {
    task_id: String,
    run_id: Option<String>,
    depth: u32,
    services: Arc<SwarmServices>,
    dispatcher: mpsc::Sender<DispatcherMsg>,
    self_tx: mpsc::Sender<CoordinatorMsg>,
    world: WorldState,
    goal: WorldState,
    paused: bool,
    pending: Option<PendingStep>,
    awaiting_role: Option<SwarmRole>,
    in_flight: Option<CancellationToken>,
    role_attempts: HashMap<SwarmRole, u32>,
    rework_attempts: u32,
    pending_children: BTreeSet<String>,
    spawned_children: u32,
    subtask_depth_limit: u32,
    finished: bool,
}

impl TaskCoordinator {
    /// Spawn a coordinator actor for a registered task.
    pub fn spawn(
        task_id: impl Into<String>,
        run_id: Option<String>,
        depth: u32,
        services: Arc<SwarmServices>,
        dispatcher: mpsc::Sender<DispatcherMsg>,
    ) -> CoordinatorHandle {
        let task_id = task_id.into();
        let (tx, mut rx) = mpsc::channel::<CoordinatorMsg>(64);

        let mut coordinator = TaskCoordinator {
            task_id: task_id.clone(),
            run_id,
            depth,
            subtask_depth_limit: services.config.max_subtask_depth,
            services,
            dispatcher,
            self_tx: tx.clone(),
            world: WorldState::new(),
            goal: WorldState::new().with(WorldKey::TaskCompleted, true),
            paused: false,
            pending: None,
            awaiting_role: None,
            in_flight: None,
            role_attempts: HashMap::new(),
            rework_attempts: 0,
            pending_children: BTreeSet::new(),
            spawned_children: 0,
            finished: false,
        };

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                coordinator.handle(msg).await;
                if coordinator.finished {
                    break;
                }
            }
        });

        CoordinatorHandle { task_id, tx }
    }

    fn run_id_ref(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    async fn record(&self, kind: EventKind, payload: String) {
        self.services
            .recorder
            .record(&self.task_id, self.run_id_ref(), kind, payload)
            .await;
        self.services
            .ui
            .publish(kind.as_str(), format!("task={}", self.task_id));
    }

    async fn handle(&mut self, msg: CoordinatorMsg) {
        match msg {
            CoordinatorMsg::Begin => self.begin().await,
            CoordinatorMsg::RoleCompleted(result) => self.on_role_completed(result).await,
            CoordinatorMsg::RoleFailed {
                role,
                error,
                adapter_id,
            } => self.on_role_failed(role, error, adapter_id).await,
            CoordinatorMsg::ChildCompleted { child_id } => self.on_child_completed(child_id).await,
            CoordinatorMsg::ChildFailed { child_id, error } => {
                self.on_child_failed(child_id, error).await;
            }
            CoordinatorMsg::Intervene { command, reply } => {
                let result = self.on_intervene(command).await;
                let _ = reply.send(result);
            }
            CoordinatorMsg::Cancel { reason } => {
                if !self.finished {
                    self.fail_plain(reason).await;
                }
            }
        }
    }

    async fn begin(&mut self) {
        info!(task_id = %self.task_id, depth = self.depth, "Coordination started");
        self.services.supervisor.task_started(&self.task_id).await;

        let title = self
            .services
            .tasks
            .get(&self.task_id)
            .await
            .map(|t| t.title)
            .unwrap_or_default();
        self.record(
            EventKind::TaskSubmitted,
            serde_json::json!({ "title": title }).to_string(),
        )
        .await;
        self.record(EventKind::CoordinationStarted, String::new()).await;

        self.services
            .blackboard
            .set(BoardScope::Global, keys::task_claimed(&self.task_id), "1")
            .await;

        self.world = WorldState::new()
            .with(WorldKey::TaskExists, true)
            .with(WorldKey::AdapterAvailable, self.services.adapter_available);

        self.ask_orchestrator().await;
    }

    /// Ask the orchestrator role for the next action (or defer while paused).
    async fn ask_orchestrator(&mut self) {
        if self.paused {
            self.pending = Some(PendingStep::AskOrchestrator);
            return;
        }
        self.dispatch_role(SwarmRole::Orchestrator).await;
    }

    async fn dispatch_role(&mut self, role: SwarmRole) {
        let snapshot = match self.services.tasks.get(&self.task_id).await {
            Some(snapshot) => snapshot,
            None => {
                self.fail_plain("task snapshot vanished from registry".to_string())
                    .await;
                return;
            }
        };

        let mut task = ExecuteRoleTask::new(
            &self.task_id,
            role,
            snapshot.title.clone(),
            snapshot.description.clone(),
        );
        if matches!(role, SwarmRole::Builder | SwarmRole::Reviewer) {
            task.plan = snapshot.planning_output.clone();
        }
        if role == SwarmRole::Reviewer {
            // The reviewer judges the build output alongside the plan
            task.code_context = snapshot.build_output.clone().into_iter().collect();
        }
        if role == SwarmRole::Orchestrator {
            let outcome = self.services.planner.plan(&self.world, &self.goal);
            let recommended: Vec<&str> = outcome
                .recommended_plan
                .iter()
                .map(|a| a.name.as_str())
                .collect();
            task.goap_analysis = Some(format!(
                "state: {}\nsatisfied: {}\ndead_end: {}\nrecommended: [{}]",
                self.world.describe(),
                outcome.satisfied,
                outcome.dead_end,
                recommended.join(", ")
            ));
            task.blackboard_digest = Some(
                self.services
                    .blackboard
                    .digest(&BoardScope::task(&self.task_id), 12)
                    .await,
            );
        }

        let cancel = CancellationToken::new();
        self.in_flight = Some(cancel.clone());
        self.awaiting_role = Some(role);

        self.record(
            EventKind::RoleDispatched,
            serde_json::json!({ "role": role.as_str() }).to_string(),
        )
        .await;
        self.record(
            EventKind::RoleStarted,
            serde_json::json!({ "role": role.as_str() }).to_string(),
        )
        .await;

        let pool = if role.is_review() {
            &self.services.reviewers
        } else {
            &self.services.workers
        };
        let dispatched = pool
            .dispatch(RoleRequest {
                task,
                cancel,
                reply: self.self_tx.clone(),
            })
            .await;
        if !dispatched {
            self.awaiting_role = None;
            self.in_flight = None;
            self.escalate(format!("worker pool rejected role {role}")).await;
        }
    }

    async fn on_role_completed(&mut self, result: RoleResult) {
        if self.finished {
            return;
        }
        if self.awaiting_role != Some(result.role) {
            debug!(task_id = %self.task_id, role = %result.role, "Ignoring stale role result");
            return;
        }
        self.awaiting_role = None;
        self.in_flight = None;

        self.record(
            EventKind::RoleSucceeded,
            serde_json::json!({ "role": result.role.as_str(), "adapter": result.adapter_id })
                .to_string(),
        )
        .await;
        self.record(
            EventKind::RoleCompleted,
            serde_json::json!({ "role": result.role.as_str(), "adapter": result.adapter_id })
                .to_string(),
        )
        .await;

        self.services
            .supervisor
            .adapter_succeeded(&result.adapter_id)
            .await;
        if result.confidence < QUALITY_CONCERN_THRESHOLD {
            self.services
                .supervisor
                .quality_concern(QualityConcern {
                    task_id: self.task_id.clone(),
                    role: result.role,
                    confidence: result.confidence,
                    error: None,
                    adapter_id: result.adapter_id.clone(),
                })
                .await;
        }

        match result.role {
            SwarmRole::Orchestrator => {
                let parsed = parse_action(&result.output);
                if parsed.is_none() {
                    debug!(task_id = %self.task_id, "Orchestrator output unparseable, planner fallback");
                }
                self.decide(parsed).await;
            }
            SwarmRole::Planner => self.on_planner_output(result).await,
            SwarmRole::Builder => {
                let update = self
                    .services
                    .tasks
                    .update(&self.task_id, |snapshot| {
                        snapshot.build_output = Some(result.output.clone());
                        Ok(())
                    })
                    .await;
                if let Err(e) = update {
                    warn!(task_id = %self.task_id, error = %e, "Failed to store build output");
                }
                // A fresh build invalidates any earlier review verdict
                self.world = self
                    .world
                    .with(WorldKey::BuildExists, true)
                    .with(WorldKey::ReviewCompleted, false)
                    .with(WorldKey::ReviewApproved, false)
                    .with(WorldKey::ReviewRejected, false);
                self.ask_orchestrator().await;
            }
            SwarmRole::Reviewer => {
                let approved = review_approved(&result.output);
                let update = self
                    .services
                    .tasks
                    .update(&self.task_id, |snapshot| {
                        snapshot.review_output = Some(result.output.clone());
                        Ok(())
                    })
                    .await;
                if let Err(e) = update {
                    warn!(task_id = %self.task_id, error = %e, "Failed to store review output");
                }
                self.apply_review_verdict(approved).await;
                self.ask_orchestrator().await;
            }
            other => {
                self.services
                    .blackboard
                    .set(
                        BoardScope::task(&self.task_id),
                        format!("{}.output", other.as_str()),
                        result.output.clone(),
                    )
                    .await;
                self.ask_orchestrator().await;
            }
        }
    }

    async fn on_planner_output(&mut self, result: RoleResult) {
        let update = self
            .services
            .tasks
            .update(&self.task_id, |snapshot| {
                snapshot.planning_output = Some(result.output.clone());
                Ok(())
            })
            .await;
        if let Err(e) = update {
            warn!(task_id = %self.task_id, error = %e, "Failed to store planning output");
        }
        self.services
            .blackboard
            .set(
                BoardScope::task(&self.task_id),
                "planner.output",
                result.output.clone(),
            )
            .await;
        self.world = self.world.with(WorldKey::PlanExists, true);

        let subtasks = parse_subtasks(&result.output);
        if !subtasks.is_empty() {
            if self.depth >= self.subtask_depth_limit {
                // Over-deep decomposition is rejected up-front; the parent
                // carries on with its own pipeline instead.
                warn!(
                    task_id = %self.task_id,
                    depth = self.depth,
                    limit = self.subtask_depth_limit,
                    "Sub-task decomposition rejected: depth bound reached"
                );
                self.record(
                    EventKind::DiagnosticContext,
                    serde_json::json!({
                        "reason": "subtask_depth_exceeded",
                        "depth": self.depth,
                        "limit": self.subtask_depth_limit,
                    })
                    .to_string(),
                )
                .await;
            } else {
                for (title, description) in subtasks {
                    self.spawned_children += 1;
                    let child_id = format!("{}-sub{}", self.task_id, self.spawned_children);
                    let mut submission = TaskSubmission::new(&child_id, title, description);
                    submission.run_id = self.run_id.clone();
                    self.pending_children.insert(child_id.clone());
                    let _ = self
                        .dispatcher
                        .send(DispatcherMsg::SpawnSubTask {
                            parent_id: self.task_id.clone(),
                            submission,
                            depth: self.depth + 1,
                        })
                        .await;
                }
                self.world = self
                    .world
                    .with(WorldKey::SubTasksSpawned, true)
                    .with(WorldKey::SubTasksCompleted, false);
            }
        }

        if self.pending_children.is_empty() {
            self.ask_orchestrator().await;
        }
        // Otherwise: AwaitingSubTasks. Child completions resume the loop.
    }

    async fn on_role_failed(&mut self, role: SwarmRole, error: String, adapter_id: Option<String>) {
        if self.finished {
            return;
        }
        if self.awaiting_role != Some(role) {
            debug!(task_id = %self.task_id, role = %role, "Ignoring stale role failure");
            return;
        }
        self.awaiting_role = None;
        self.in_flight = None;

        self.record(
            EventKind::RoleFailed,
            serde_json::json!({ "role": role.as_str(), "error": error }).to_string(),
        )
        .await;

        // Orchestrator failure is not fatal: the planner's first recommended
        // action substitutes for the orchestrator's choice.
        if role == SwarmRole::Orchestrator {
            self.decide(None).await;
            return;
        }

        let attempt = self.role_attempts.get(&role).copied().unwrap_or(0);
        let directive = self
            .services
            .supervisor
            .report_role_failure(RoleFailureReport {
                task_id: self.task_id.clone(),
                role,
                error: error.clone(),
                adapter_id,
                attempt,
            })
            .await;
        self.role_attempts.insert(role, attempt + 1);

        match directive {
            SupervisorDirective::Retry { reason } => {
                info!(task_id = %self.task_id, role = %role, reason = %reason, "Retrying role");
                self.dispatch_role(role).await;
            }
            SupervisorDirective::Escalate => {
                self.escalate(format!("role {role} failed after retries: {error}"))
                    .await;
            }
        }
    }

    async fn apply_review_verdict(&mut self, approved: bool) {
        self.world = self.world.with(WorldKey::ReviewCompleted, true);
        if approved {
            self.world = self
                .world
                .with(WorldKey::ReviewApproved, true)
                .with(WorldKey::ReviewRejected, false);
        } else {
            self.world = self
                .world
                .with(WorldKey::ReviewApproved, false)
                .with(WorldKey::ReviewRejected, true);
            if self.rework_attempts >= self.services.config.max_retries_per_task {
                self.world = self.world.with(WorldKey::RetryLimitReached, true);
            }
        }
    }

    /// Choose and perform the next action: the orchestrator's parsed choice
    /// when its preconditions hold, otherwise the planner's recommendation.
    async fn decide(&mut self, parsed: Option<ActionName>) {
        if self.finished {
            return;
        }
        if self.paused {
            self.pending = Some(PendingStep::Decide(parsed));
            return;
        }

        let outcome = self.services.planner.plan(&self.world, &self.goal);
        if outcome.satisfied {
            self.complete().await;
            return;
        }

        if let Some(name) = parsed {
            if let Some(action) = find_action(name) {
                if action.applicable(&self.world) {
                    self.perform(name).await;
                    return;
                }
                debug!(
                    task_id = %self.task_id,
                    action = %name,
                    "Orchestrator action preconditions unsatisfied, planner fallback"
                );
            }
        }

        if outcome.dead_end {
            // A standing rejection at the retry limit dead-ends the planner
            // by construction; that is exactly the Escalate condition.
            let escalate_applicable = find_action(ActionName::Escalate)
                .is_some_and(|a| a.applicable(&self.world));
            if escalate_applicable {
                self.perform(ActionName::Escalate).await;
            } else {
                self.escalate("planner found no path to completion".to_string())
                    .await;
            }
            return;
        }

        let next = outcome
            .first_action()
            .map(|a| a.name)
            .unwrap_or(ActionName::Escalate);
        self.perform(next).await;
    }

    async fn perform(&mut self, action: ActionName) {
        match action {
            ActionName::Plan => {
                self.transition_status(TaskStatus::Planning).await;
                self.dispatch_role(SwarmRole::Planner).await;
            }
            ActionName::Build => {
                self.transition_status(TaskStatus::Building).await;
                self.dispatch_role(SwarmRole::Builder).await;
            }
            ActionName::Review => {
                self.transition_status(TaskStatus::Reviewing).await;
                self.dispatch_role(SwarmRole::Reviewer).await;
            }
            ActionName::Rework => {
                self.rework_attempts += 1;
                self.record(
                    EventKind::TelemetryRetry,
                    serde_json::json!({
                        "kind": "rework",
                        "attempt": self.rework_attempts,
                    })
                    .to_string(),
                )
                .await;
                if let Some(rework) = find_action(ActionName::Rework) {
                    self.world = rework.apply(&self.world);
                }
                // Rework loops the pipeline back through Queued
                self.transition_status(TaskStatus::Queued).await;
                self.ask_orchestrator().await;
            }
            ActionName::Escalate => {
                self.escalate("review rejected and retry limit reached".to_string())
                    .await;
            }
            ActionName::Finalize => self.complete().await,
            ActionName::WaitForSubTasks => {
                if self.pending_children.is_empty() {
                    self.world = self.world.with(WorldKey::SubTasksCompleted, true);
                    self.ask_orchestrator().await;
                }
                // Otherwise the coordinator stays suspended until children report.
            }
        }
    }

    async fn transition_status(&self, status: TaskStatus) {
        let current = self.services.tasks.get(&self.task_id).await.map(|t| t.status);
        if current == Some(status) {
            return;
        }
        if let Err(e) = self.services.tasks.transition(&self.task_id, status).await {
            warn!(task_id = %self.task_id, status = status.as_str(), error = %e, "Status transition failed");
        }
    }

    async fn complete(&mut self) {
        self.world = self.world.with(WorldKey::TaskCompleted, true);
        self.record(EventKind::TaskDone, String::new()).await;
        self.services
            .blackboard
            .set(BoardScope::Global, keys::task_complete(&self.task_id), "1")
            .await;

        let update = self
            .services
            .tasks
            .update(&self.task_id, |snapshot| {
                snapshot.summary = Some("completed".to_string());
                if snapshot.status != TaskStatus::Done {
                    snapshot.transition_to(TaskStatus::Done)?;
                }
                Ok(())
            })
            .await;
        if let Err(e) = update {
            warn!(task_id = %self.task_id, error = %e, "Failed to finalize snapshot");
        }

        self.services.supervisor.task_completed(&self.task_id).await;
        info!(task_id = %self.task_id, "Task done");
        self.notify_finished(true, None).await;
    }

    async fn escalate(&mut self, reason: String) {
        self.cancel_in_flight();
        self.services
            .supervisor
            .escalation_raised(&self.task_id, &reason)
            .await;
        self.record(
            EventKind::TaskEscalated,
            serde_json::json!({ "reason": reason }).to_string(),
        )
        .await;
        self.fail_plain(reason).await;
    }

    async fn fail_plain(&mut self, reason: String) {
        self.cancel_in_flight();
        self.world = self.world.with(WorldKey::TaskBlocked, true);

        self.record(
            EventKind::TaskFailed,
            serde_json::json!({ "error": reason }).to_string(),
        )
        .await;
        if let Err(e) = self.services.tasks.block(&self.task_id, reason.clone()).await {
            warn!(task_id = %self.task_id, error = %e, "Failed to block snapshot");
        }
        self.services.supervisor.task_failed(&self.task_id).await;

        if !self.pending_children.is_empty() {
            let _ = self
                .dispatcher
                .send(DispatcherMsg::CancelChildren {
                    parent_id: self.task_id.clone(),
                    reason: format!("parent task {} failed", self.task_id),
                })
                .await;
        }

        warn!(task_id = %self.task_id, reason = %reason, "Task blocked");
        self.notify_finished(false, Some(reason)).await;
    }

    fn cancel_in_flight(&mut self) {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
        self.awaiting_role = None;
    }

    async fn notify_finished(&mut self, success: bool, error: Option<String>) {
        self.finished = true;
        let _ = self
            .dispatcher
            .send(DispatcherMsg::CoordinatorFinished {
                task_id: self.task_id.clone(),
                success,
                error,
            })
            .await;
    }

    async fn on_child_completed(&mut self, child_id: String) {
        self.pending_children.remove(&child_id);
        self.record(
            EventKind::GraphChildCompleted,
            serde_json::json!({ "child": child_id }).to_string(),
        )
        .await;
        if self.pending_children.is_empty() && self.world.get(WorldKey::SubTasksSpawned) {
            self.world = self.world.with(WorldKey::SubTasksCompleted, true);
            if self.awaiting_role.is_none() {
                self.ask_orchestrator().await;
            }
        }
    }

    async fn on_child_failed(&mut self, child_id: String, error: String) {
        self.pending_children.remove(&child_id);
        self.record(
            EventKind::GraphChildFailed,
            serde_json::json!({ "child": child_id, "error": error }).to_string(),
        )
        .await;
        self.escalate(format!("sub-task {child_id} failed: {error}"))
            .await;
    }

    async fn on_intervene(&mut self, command: TaskInterventionCommand) -> TaskInterventionResult {
        if command.task_id != self.task_id {
            return TaskInterventionResult::rejected(InterventionReasonCode::TaskMismatch);
        }
        let Some(action) = InterventionAction::from_str(&command.action) else {
            return TaskInterventionResult::rejected(InterventionReasonCode::UnsupportedAction);
        };

        let status = self
            .services
            .tasks
            .get(&self.task_id)
            .await
            .map(|t| t.status)
            .unwrap_or(TaskStatus::Queued);
        if status.is_terminal() {
            return TaskInterventionResult::rejected(InterventionReasonCode::InvalidState);
        }

        match action {
            InterventionAction::PauseTask => {
                if self.paused {
                    return TaskInterventionResult::rejected(InterventionReasonCode::InvalidState);
                }
                self.paused = true;
                self.accept_intervention(action, command.payload.as_deref()).await;
                TaskInterventionResult::accepted()
            }
            InterventionAction::ResumeTask => {
                if !self.paused {
                    return TaskInterventionResult::rejected(InterventionReasonCode::InvalidState);
                }
                self.paused = false;
                self.accept_intervention(action, command.payload.as_deref()).await;
                if let Some(pending) = self.pending.take() {
                    match pending {
                        PendingStep::AskOrchestrator => self.ask_orchestrator().await,
                        PendingStep::Decide(parsed) => self.decide(parsed).await,
                    }
                }
                TaskInterventionResult::accepted()
            }
            InterventionAction::ApproveReview => {
                if status != TaskStatus::Reviewing {
                    return TaskInterventionResult::rejected(InterventionReasonCode::InvalidState);
                }
                self.cancel_in_flight();
                self.apply_review_verdict(true).await;
                self.accept_intervention(action, command.payload.as_deref()).await;
                self.ask_orchestrator().await;
                TaskInterventionResult::accepted()
            }
            InterventionAction::RejectReview => {
                let Some(reason) = command.payload.as_deref().filter(|p| !p.trim().is_empty())
                else {
                    return TaskInterventionResult::rejected(InterventionReasonCode::PayloadInvalid);
                };
                if status != TaskStatus::Reviewing {
                    return TaskInterventionResult::rejected(InterventionReasonCode::InvalidState);
                }
                self.cancel_in_flight();
                self.services
                    .blackboard
                    .set(BoardScope::task(&self.task_id), "review.reject_reason", reason)
                    .await;
                self.apply_review_verdict(false).await;
                self.accept_intervention(action, Some(reason)).await;
                self.ask_orchestrator().await;
                TaskInterventionResult::accepted()
            }
            InterventionAction::RequestRework => {
                let Some(feedback) = command.payload.as_deref().filter(|p| !p.trim().is_empty())
                else {
                    return TaskInterventionResult::rejected(InterventionReasonCode::PayloadInvalid);
                };
                if status != TaskStatus::Reviewing {
                    return TaskInterventionResult::rejected(InterventionReasonCode::InvalidState);
                }
                self.cancel_in_flight();
                self.services
                    .blackboard
                    .set(BoardScope::task(&self.task_id), "rework.feedback", feedback)
                    .await;
                self.apply_review_verdict(false).await;
                self.accept_intervention(action, Some(feedback)).await;
                self.ask_orchestrator().await;
                TaskInterventionResult::accepted()
            }
            InterventionAction::SetSubtaskDepth => {
                let parsed = command
                    .payload
                    .as_deref()
                    .and_then(|p| p.trim().parse::<i64>().ok());
                let Some(depth) = parsed else {
                    return TaskInterventionResult::rejected(InterventionReasonCode::PayloadInvalid);
                };
                if depth < 0 || depth > i64::from(MAX_ALLOWED_SUBTASK_DEPTH) {
                    return TaskInterventionResult::rejected(InterventionReasonCode::PayloadInvalid);
                }
                self.subtask_depth_limit = depth as u32;
                self.accept_intervention(action, command.payload.as_deref()).await;
                TaskInterventionResult::accepted()
            }
            InterventionAction::CancelTask => {
                self.accept_intervention(action, command.payload.as_deref()).await;
                self.fail_plain("task cancelled by operator".to_string()).await;
                TaskInterventionResult::accepted()
            }
        }
    }

    /// Emit the single `task.intervention` event for an accepted command.
    async fn accept_intervention(&self, action: InterventionAction, payload: Option<&str>) {
        self.record(
            EventKind::TaskIntervention,
            serde_json::json!({
                "actionId": action.as_str(),
                "decidedBy": "human",
                "payload": payload,
            })
            .to_string(),
        )
        .await;
    }
}
