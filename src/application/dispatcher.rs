//! Root dispatcher actor.
//!
//! Registers tasks, instantiates coordinators, routes run-scoped tasks to
//! their run coordinator, dedupes sub-task spawns, forwards interventions,
//! and resolves peer messages through the capability registry.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    EventKind, InterventionReasonCode, TaskInterventionCommand, TaskInterventionResult,
    TaskSubmission,
};
use crate::services::blackboard::{keys, BoardScope};
use crate::services::AgentMessage;

use super::run_coordinator::RunCoordinator;
use super::task_coordinator::{CoordinatorHandle, CoordinatorMsg, TaskCoordinator};
use super::SwarmServices;

/// Acknowledgement for a forwarded peer message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerMessageAck {
    pub accepted: bool,
    pub reason: Option<String>,
}

/// Messages handled by the dispatcher actor.
pub enum DispatcherMsg {
    Submit {
        submission: TaskSubmission,
        reply: Option<oneshot::Sender<DomainResult<bool>>>,
    },
    SpawnSubTask {
        parent_id: String,
        submission: TaskSubmission,
        depth: u32,
    },
    Intervene {
        command: TaskInterventionCommand,
        reply: oneshot::Sender<TaskInterventionResult>,
    },
    ForwardPeer {
        agent_id: String,
        payload: String,
        reply: oneshot::Sender<PeerMessageAck>,
    },
    CoordinatorFinished {
        task_id: String,
        success: bool,
        error: Option<String>,
    },
    CancelChildren {
        parent_id: String,
        reason: String,
    },
}

struct CoordEntry {
    handle: CoordinatorHandle,
    parent: Option<String>,
    children: BTreeSet<String>,
}

/// Cloneable handle to the dispatcher actor.
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<DispatcherMsg>,
}

impl DispatcherHandle {
    /// Submit a task. Returns true when newly registered, false on a
    /// duplicate task id.
    pub async fn submit_task(&self, submission: TaskSubmission) -> DomainResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(DispatcherMsg::Submit {
                submission,
                reply: Some(reply),
            })
            .await
            .map_err(|_| DomainError::ExecutionFailed("dispatcher stopped".to_string()))?;
        rx.await
            .map_err(|_| DomainError::ExecutionFailed("dispatcher dropped reply".to_string()))?
    }

    /// Forward a human intervention to the owning coordinator.
    pub async fn intervene(&self, command: TaskInterventionCommand) -> TaskInterventionResult {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(DispatcherMsg::Intervene { command, reply })
            .await
            .is_err()
        {
            return TaskInterventionResult::rejected(InterventionReasonCode::TaskNotFound);
        }
        rx.await
            .unwrap_or_else(|_| TaskInterventionResult::rejected(InterventionReasonCode::TaskNotFound))
    }

    /// Resolve and forward a peer message through the capability registry.
    pub async fn forward_peer(&self, agent_id: &str, payload: &str) -> PeerMessageAck {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(DispatcherMsg::ForwardPeer {
                agent_id: agent_id.to_string(),
                payload: payload.to_string(),
                reply,
            })
            .await
            .is_err()
        {
            return PeerMessageAck {
                accepted: false,
                reason: Some("dispatcher stopped".to_string()),
            };
        }
        rx.await.unwrap_or(PeerMessageAck {
            accepted: false,
            reason: Some("dispatcher stopped".to_string()),
        })
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<DispatcherMsg> {
        self.tx.clone()
    }
}

/// The dispatcher actor state.
pub struct Dispatcher {
    services: Arc<SwarmServices>,
    self_tx: mpsc::Sender<DispatcherMsg>,
    coordinators: HashMap<String, CoordEntry>,
    run_coordinators: HashMap<String, RunCoordinator>,
    spawned_pairs: HashSet<(String, String)>,
}

impl Dispatcher {
    /// Spawn the dispatcher actor.
    pub fn spawn(services: Arc<SwarmServices>) -> DispatcherHandle {
        let (tx, mut rx) = mpsc::channel::<DispatcherMsg>(256);
        let mut dispatcher = Dispatcher {
            services,
            self_tx: tx.clone(),
            coordinators: HashMap::new(),
            run_coordinators: HashMap::new(),
            spawned_pairs: HashSet::new(),
        };

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                dispatcher.handle(msg).await;
            }
        });

        DispatcherHandle { tx }
    }

    async fn handle(&mut self, msg: DispatcherMsg) {
        match msg {
            DispatcherMsg::Submit { submission, reply } => {
                let result = self.submit(submission).await;
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            DispatcherMsg::SpawnSubTask {
                parent_id,
                submission,
                depth,
            } => self.spawn_subtask(parent_id, submission, depth).await,
            DispatcherMsg::Intervene { command, reply } => {
                self.intervene(command, reply).await;
            }
            DispatcherMsg::ForwardPeer {
                agent_id,
                payload,
                reply,
            } => {
                let _ = reply.send(self.forward_peer(&agent_id, payload).await);
            }
            DispatcherMsg::CoordinatorFinished {
                task_id,
                success,
                error,
            } => self.coordinator_finished(task_id, success, error).await,
            DispatcherMsg::CancelChildren { parent_id, reason } => {
                self.cancel_children(&parent_id, reason).await;
            }
        }
    }

    fn spawn_coordinator(
        &mut self,
        task_id: &str,
        run_id: Option<String>,
        depth: u32,
        parent: Option<String>,
    ) -> CoordinatorHandle {
        let handle = TaskCoordinator::spawn(
            task_id,
            run_id,
            depth,
            self.services.clone(),
            self.self_tx.clone(),
        );
        self.coordinators.insert(
            task_id.to_string(),
            CoordEntry {
                handle: handle.clone(),
                parent,
                children: BTreeSet::new(),
            },
        );
        handle
    }

    async fn submit(&mut self, submission: TaskSubmission) -> DomainResult<bool> {
        let registered = self.services.tasks.register(&submission).await?;
        if !registered {
            debug!(task_id = %submission.task_id, "Duplicate submission ignored");
            return Ok(false);
        }
        info!(task_id = %submission.task_id, run_id = ?submission.run_id, "Task registered");

        self.services
            .blackboard
            .set(
                BoardScope::Global,
                keys::task_available(&submission.task_id),
                "1",
            )
            .await;

        if let Some(ref run_id) = submission.run_id {
            let rc = self
                .run_coordinators
                .entry(run_id.clone())
                .or_insert_with(|| RunCoordinator::new(run_id.clone()));
            rc.on_task_registered(&self.services, &submission.task_id).await;
        }

        let handle = self.spawn_coordinator(
            &submission.task_id,
            submission.run_id.clone(),
            0,
            None,
        );
        handle.send(CoordinatorMsg::Begin).await;
        Ok(true)
    }

    async fn spawn_subtask(&mut self, parent_id: String, submission: TaskSubmission, depth: u32) {
        let pair = (parent_id.clone(), submission.task_id.clone());
        if self.spawned_pairs.contains(&pair) {
            debug!(parent = %parent_id, child = %submission.task_id, "Duplicate sub-task spawn ignored");
            return;
        }
        // Depth is bounded by the owning coordinator before the spawn is
        // sent; its per-task limit (adjustable via set_subtask_depth) is
        // authoritative. A second gate here against the static config would
        // silently strand the parent in AwaitingSubTasks whenever the
        // per-task limit was raised above the default.

        let registered = match self
            .services
            .tasks
            .register_child(&submission, &parent_id)
            .await
        {
            Ok(registered) => registered,
            Err(e) => {
                warn!(parent = %parent_id, child = %submission.task_id, error = %e, "Sub-task registration failed");
                return;
            }
        };
        self.spawned_pairs.insert(pair);
        if !registered {
            return;
        }

        let edge_added = self
            .services
            .tasks
            .add_child(&parent_id, &submission.task_id)
            .await
            .unwrap_or(false);
        if edge_added {
            // Exactly once per (parent, child) pair
            self.services
                .recorder
                .record(
                    &submission.task_id,
                    submission.run_id.as_deref(),
                    EventKind::GraphLinkCreated,
                    serde_json::json!({ "parent": parent_id, "child": submission.task_id })
                        .to_string(),
                )
                .await;
        }

        if let Some(ref run_id) = submission.run_id {
            let rc = self
                .run_coordinators
                .entry(run_id.clone())
                .or_insert_with(|| RunCoordinator::new(run_id.clone()));
            rc.on_task_registered(&self.services, &submission.task_id).await;
        }

        let handle = self.spawn_coordinator(
            &submission.task_id,
            submission.run_id.clone(),
            depth,
            Some(parent_id.clone()),
        );
        if let Some(parent_entry) = self.coordinators.get_mut(&parent_id) {
            parent_entry.children.insert(submission.task_id.clone());
        }
        handle.send(CoordinatorMsg::Begin).await;
    }

    async fn intervene(
        &mut self,
        command: TaskInterventionCommand,
        reply: oneshot::Sender<TaskInterventionResult>,
    ) {
        match self.coordinators.get(&command.task_id) {
            Some(entry) => {
                // The coordinator answers the caller directly. If its mailbox
                // just closed, the dropped reply surfaces as a rejection.
                let _ = entry
                    .handle
                    .send(CoordinatorMsg::Intervene { command, reply })
                    .await;
            }
            None => {
                let code = if self.services.tasks.contains(&command.task_id).await {
                    InterventionReasonCode::InvalidState
                } else {
                    InterventionReasonCode::TaskNotFound
                };
                let _ = reply.send(TaskInterventionResult::rejected(code));
            }
        }
    }

    async fn forward_peer(&self, agent_id: &str, payload: String) -> PeerMessageAck {
        match self.services.capabilities.resolve_peer(agent_id).await {
            Some(peer) => {
                if peer
                    .sender
                    .send(AgentMessage::Peer { payload })
                    .await
                    .is_ok()
                {
                    PeerMessageAck {
                        accepted: true,
                        reason: None,
                    }
                } else {
                    PeerMessageAck {
                        accepted: false,
                        reason: Some("agent_unreachable".to_string()),
                    }
                }
            }
            None => PeerMessageAck {
                accepted: false,
                reason: Some("agent_not_found".to_string()),
            },
        }
    }

    async fn coordinator_finished(&mut self, task_id: String, success: bool, error: Option<String>) {
        let Some(entry) = self.coordinators.remove(&task_id) else {
            return;
        };

        // Notify the parent coordinator, if it is still alive
        if let Some(ref parent_id) = entry.parent {
            if let Some(parent_entry) = self.coordinators.get_mut(parent_id) {
                parent_entry.children.remove(&task_id);
                let msg = if success {
                    CoordinatorMsg::ChildCompleted {
                        child_id: task_id.clone(),
                    }
                } else {
                    CoordinatorMsg::ChildFailed {
                        child_id: task_id.clone(),
                        error: error.clone().unwrap_or_else(|| "unknown error".to_string()),
                    }
                };
                parent_entry.handle.send(msg).await;
            }
        }

        // Advance the run span, if the task was run-scoped
        let run_id = self
            .services
            .tasks
            .get(&task_id)
            .await
            .and_then(|t| t.run_id);
        if let Some(run_id) = run_id {
            if let Some(rc) = self.run_coordinators.get_mut(&run_id) {
                rc.on_task_finished(&self.services, &task_id, success).await;
            }
        }
    }

    async fn cancel_children(&mut self, parent_id: &str, reason: String) {
        let children: Vec<String> = self
            .coordinators
            .get(parent_id)
            .map(|entry| entry.children.iter().cloned().collect())
            .unwrap_or_default();
        for child_id in children {
            if let Some(child_entry) = self.coordinators.get(&child_id) {
                child_entry
                    .handle
                    .send(CoordinatorMsg::Cancel {
                        reason: reason.clone(),
                    })
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::bootstrap;
    use crate::domain::models::{AgentCapabilityAdvertisement, SwarmRole};
    use crate::domain::ports::{EventRepository, InMemoryEventRepository, NullTaskSink};
    use crate::config::SwarmConfig;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn boot() -> (DispatcherHandle, Arc<super::super::SwarmServices>, Arc<InMemoryEventRepository>) {
        let events = Arc::new(InMemoryEventRepository::new());
        let repository: Arc<dyn EventRepository> = events.clone();
        let (dispatcher, services) = bootstrap(
            SwarmConfig::default(),
            Some(repository),
            Arc::new(NullTaskSink),
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
        (dispatcher, services, events)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    #[tokio::test]
    async fn test_duplicate_spawn_subtask_ignored() {
        let (dispatcher, services, events) = boot();

        dispatcher
            .submit_task(TaskSubmission::new("p", "Parent", "desc"))
            .await
            .unwrap();
        settle().await;

        let child = TaskSubmission::new("p-sub1", "Child", "desc");
        for _ in 0..2 {
            dispatcher
                .sender()
                .send(DispatcherMsg::SpawnSubTask {
                    parent_id: "p".to_string(),
                    submission: child.clone(),
                    depth: 1,
                })
                .await
                .unwrap();
        }
        settle().await;

        // Exactly one child registered, one edge, one graph.link_created
        let parent = services.tasks.get("p").await.unwrap();
        assert_eq!(parent.child_task_ids, vec!["p-sub1"]);
        let links = events
            .all()
            .into_iter()
            .filter(|e| e.event_type == EventKind::GraphLinkCreated)
            .count();
        assert_eq!(links, 1);
    }

    #[tokio::test]
    async fn test_forward_peer_resolution() {
        let (dispatcher, services, _events) = boot();

        let ack = dispatcher.forward_peer("nobody", "hello").await;
        assert!(!ack.accepted);
        assert_eq!(ack.reason.as_deref(), Some("agent_not_found"));

        let (tx, mut rx) = mpsc::channel(4);
        services
            .capabilities
            .advertise(
                AgentCapabilityAdvertisement::new("peer-1", "http://peer-1")
                    .with_capability(SwarmRole::Builder),
                tx,
            )
            .await;

        let ack = dispatcher.forward_peer("peer-1", "hello").await;
        assert!(ack.accepted);
        match rx.try_recv() {
            Ok(AgentMessage::Peer { payload }) => assert_eq!(payload, "hello"),
            other => panic!("expected peer payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_intervene_unknown_task_reports_not_found() {
        let (dispatcher, _services, _events) = boot();
        let result = dispatcher
            .intervene(TaskInterventionCommand::new("ghost", "pause_task"))
            .await;
        assert_eq!(
            result.reason_code,
            Some(InterventionReasonCode::TaskNotFound)
        );
    }
}
