//! Supervisor actor.
//!
//! Aggregates lifecycle counters, decides retry/no-retry on role failures,
//! and maintains per-adapter circuit breakers. The circuit state is mirrored
//! into the global blackboard so selection paths can consult it without
//! asking the supervisor.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::domain::models::{EventKind, QualityConcern, RoleFailureReport};
use crate::services::blackboard::{keys, BlackboardStore, BoardScope};
use crate::services::event_recorder::EventRecorder;
use crate::services::ui_stream::UiEventStream;

/// Failure messages matching these fragments are test-only simulations and
/// are never retried.
const SIMULATED_FAILURE_PATTERNS: &[&str] = &["simulated failure", "injected fault"];

/// Confidence below which a quality concern counts toward the adapter circuit.
const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Supervisor's verdict on a role failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorDirective {
    /// Re-dispatch the role; reason is "retry #n".
    Retry { reason: String },
    /// Retry budget exhausted or failure non-retriable.
    Escalate,
}

/// Aggregated lifecycle counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SupervisorSnapshot {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub escalations: u64,
    pub open_circuits: Vec<String>,
}

/// Messages handled by the supervisor actor.
pub enum SupervisorMsg {
    TaskStarted { task_id: String },
    TaskCompleted { task_id: String },
    TaskFailed { task_id: String },
    EscalationRaised { task_id: String, reason: String },
    RoleFailure {
        report: RoleFailureReport,
        reply: oneshot::Sender<SupervisorDirective>,
    },
    AdapterSucceeded { adapter_id: String },
    QualityConcern(QualityConcern),
    GetSnapshot { reply: oneshot::Sender<SupervisorSnapshot> },
}

/// Cloneable handle to the supervisor actor.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<SupervisorMsg>,
}

impl SupervisorHandle {
    pub async fn task_started(&self, task_id: &str) {
        let _ = self
            .tx
            .send(SupervisorMsg::TaskStarted {
                task_id: task_id.to_string(),
            })
            .await;
    }

    pub async fn task_completed(&self, task_id: &str) {
        let _ = self
            .tx
            .send(SupervisorMsg::TaskCompleted {
                task_id: task_id.to_string(),
            })
            .await;
    }

    pub async fn task_failed(&self, task_id: &str) {
        let _ = self
            .tx
            .send(SupervisorMsg::TaskFailed {
                task_id: task_id.to_string(),
            })
            .await;
    }

    pub async fn escalation_raised(&self, task_id: &str, reason: &str) {
        let _ = self
            .tx
            .send(SupervisorMsg::EscalationRaised {
                task_id: task_id.to_string(),
                reason: reason.to_string(),
            })
            .await;
    }

    /// Report a role failure and await the retry directive.
    pub async fn report_role_failure(&self, report: RoleFailureReport) -> SupervisorDirective {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(SupervisorMsg::RoleFailure { report, reply })
            .await
            .is_err()
        {
            return SupervisorDirective::Escalate;
        }
        rx.await.unwrap_or(SupervisorDirective::Escalate)
    }

    pub async fn adapter_succeeded(&self, adapter_id: &str) {
        let _ = self
            .tx
            .send(SupervisorMsg::AdapterSucceeded {
                adapter_id: adapter_id.to_string(),
            })
            .await;
    }

    pub async fn quality_concern(&self, concern: QualityConcern) {
        let _ = self.tx.send(SupervisorMsg::QualityConcern(concern)).await;
    }

    pub async fn snapshot(&self) -> SupervisorSnapshot {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(SupervisorMsg::GetSnapshot { reply })
            .await
            .is_err()
        {
            return SupervisorSnapshot::default();
        }
        rx.await.unwrap_or_default()
    }
}

struct CircuitEntry {
    failures: u32,
    opened_at: Option<DateTime<Utc>>,
}

/// The supervisor actor state and loop.
pub struct Supervisor {
    max_retries: u32,
    circuit_threshold: u32,
    circuit_cooldown_seconds: u64,
    counters: SupervisorSnapshot,
    circuits: HashMap<String, CircuitEntry>,
    blackboard: Arc<BlackboardStore>,
    recorder: Arc<EventRecorder>,
    ui: Arc<UiEventStream>,
}

impl Supervisor {
    /// Spawn the supervisor actor and return its handle.
    pub fn spawn(
        max_retries: u32,
        circuit_threshold: u32,
        circuit_cooldown_seconds: u64,
        blackboard: Arc<BlackboardStore>,
        recorder: Arc<EventRecorder>,
        ui: Arc<UiEventStream>,
    ) -> SupervisorHandle {
        let (tx, mut rx) = mpsc::channel::<SupervisorMsg>(256);
        let mut supervisor = Self {
            max_retries,
            circuit_threshold,
            circuit_cooldown_seconds,
            counters: SupervisorSnapshot::default(),
            circuits: HashMap::new(),
            blackboard,
            recorder,
            ui,
        };

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                supervisor.handle(msg).await;
            }
        });

        SupervisorHandle { tx }
    }

    async fn handle(&mut self, msg: SupervisorMsg) {
        match msg {
            SupervisorMsg::TaskStarted { .. } => self.counters.started += 1,
            SupervisorMsg::TaskCompleted { .. } => self.counters.completed += 1,
            SupervisorMsg::TaskFailed { .. } => self.counters.failed += 1,
            SupervisorMsg::EscalationRaised { task_id, reason } => {
                self.counters.escalations += 1;
                warn!(task_id = %task_id, reason = %reason, "Escalation raised");
            }
            SupervisorMsg::RoleFailure { report, reply } => {
                let directive = self.decide(&report).await;
                let _ = reply.send(directive);
            }
            SupervisorMsg::AdapterSucceeded { adapter_id } => {
                self.close_circuit(&adapter_id).await;
            }
            SupervisorMsg::QualityConcern(concern) => {
                self.handle_quality_concern(concern).await;
            }
            SupervisorMsg::GetSnapshot { reply } => {
                let mut snapshot = self.counters.clone();
                snapshot.open_circuits = self
                    .circuits
                    .iter()
                    .filter(|(_, c)| c.opened_at.is_some())
                    .map(|(id, _)| id.clone())
                    .collect();
                snapshot.open_circuits.sort();
                let _ = reply.send(snapshot);
            }
        }
    }

    fn is_simulated(error: &str) -> bool {
        let lowered = error.to_lowercase();
        SIMULATED_FAILURE_PATTERNS
            .iter()
            .any(|p| lowered.contains(p))
    }

    async fn decide(&mut self, report: &RoleFailureReport) -> SupervisorDirective {
        if let Some(ref adapter_id) = report.adapter_id {
            self.record_adapter_failure(adapter_id, &report.task_id, &report.error)
                .await;
        }

        if Self::is_simulated(&report.error) {
            return SupervisorDirective::Escalate;
        }

        if report.attempt < self.max_retries {
            let retry_number = report.attempt + 1;
            let reason = format!("retry #{retry_number}");
            self.recorder
                .record(
                    &report.task_id,
                    None,
                    EventKind::TelemetryRetry,
                    serde_json::json!({
                        "role": report.role.as_str(),
                        "reason": reason,
                        "error": report.error,
                    })
                    .to_string(),
                )
                .await;
            SupervisorDirective::Retry { reason }
        } else {
            SupervisorDirective::Escalate
        }
    }

    async fn record_adapter_failure(&mut self, adapter_id: &str, task_id: &str, error: &str) {
        let cooldown = self.circuit_cooldown_seconds;
        let entry = self
            .circuits
            .entry(adapter_id.to_string())
            .or_insert(CircuitEntry {
                failures: 0,
                opened_at: None,
            });

        // An expired cooldown gives the adapter a fresh window.
        if let Some(opened_at) = entry.opened_at {
            if Utc::now() > opened_at + ChronoDuration::seconds(cooldown as i64) {
                entry.opened_at = None;
                entry.failures = 0;
            }
        }

        entry.failures += 1;
        let failures = entry.failures;
        let newly_open = entry.opened_at.is_none() && failures >= self.circuit_threshold;
        if newly_open {
            entry.opened_at = Some(Utc::now());
        }

        if newly_open {
            warn!(adapter_id = %adapter_id, failures, "Adapter circuit opened");
            self.blackboard
                .set(BoardScope::Global, keys::adapter_circuit(adapter_id), "open")
                .await;
            self.ui.publish(
                "adapter.circuit_open",
                format!("adapter={adapter_id} failures={failures}"),
            );
            self.recorder
                .record(
                    task_id,
                    None,
                    EventKind::TelemetryCircuit,
                    serde_json::json!({
                        "adapter": adapter_id,
                        "state": "open",
                        "failures": failures,
                        "error": error,
                    })
                    .to_string(),
                )
                .await;
        }
    }

    async fn close_circuit(&mut self, adapter_id: &str) {
        let Some(entry) = self.circuits.get_mut(adapter_id) else {
            return;
        };
        let was_open = entry.opened_at.is_some();
        entry.failures = 0;
        entry.opened_at = None;
        if was_open {
            info!(adapter_id = %adapter_id, "Adapter circuit closed after success");
            self.blackboard
                .remove(&BoardScope::Global, &keys::adapter_circuit(adapter_id))
                .await;
            self.ui
                .publish("adapter.circuit_closed", format!("adapter={adapter_id}"));
        }
    }

    async fn handle_quality_concern(&mut self, concern: QualityConcern) {
        self.blackboard
            .set(
                BoardScope::task(&concern.task_id),
                format!("quality.concern:{}", concern.role.as_str()),
                format!("{:.2}", concern.confidence),
            )
            .await;
        self.recorder
            .record(
                &concern.task_id,
                None,
                EventKind::TelemetryQuality,
                serde_json::json!({
                    "role": concern.role.as_str(),
                    "confidence": concern.confidence,
                    "adapter": concern.adapter_id,
                    "error": concern.error,
                })
                .to_string(),
            )
            .await;

        // Repeated low-confidence results feed the adapter's circuit counter.
        if concern.confidence < LOW_CONFIDENCE_THRESHOLD {
            let error = concern
                .error
                .unwrap_or_else(|| "low-confidence result".to_string());
            self.record_adapter_failure(&concern.adapter_id, &concern.task_id, &error)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::SwarmRole;

    fn spawn_supervisor(board: Arc<BlackboardStore>) -> SupervisorHandle {
        Supervisor::spawn(
            3,
            3,
            60,
            board,
            Arc::new(EventRecorder::disabled()),
            Arc::new(UiEventStream::new(16)),
        )
    }

    fn report(attempt: u32, error: &str, adapter: Option<&str>) -> RoleFailureReport {
        RoleFailureReport {
            task_id: "t1".to_string(),
            role: SwarmRole::Builder,
            error: error.to_string(),
            adapter_id: adapter.map(String::from),
            attempt,
        }
    }

    #[tokio::test]
    async fn test_counters() {
        let handle = spawn_supervisor(Arc::new(BlackboardStore::new()));
        handle.task_started("t1").await;
        handle.task_started("t2").await;
        handle.task_completed("t1").await;
        handle.task_failed("t2").await;
        handle.escalation_raised("t2", "planner dead-end").await;

        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.started, 2);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.escalations, 1);
    }

    #[tokio::test]
    async fn test_retry_numbering_then_escalate() {
        let handle = spawn_supervisor(Arc::new(BlackboardStore::new()));

        let d = handle.report_role_failure(report(0, "timeout", None)).await;
        assert_eq!(
            d,
            SupervisorDirective::Retry {
                reason: "retry #1".to_string()
            }
        );
        let d = handle.report_role_failure(report(2, "timeout", None)).await;
        assert_eq!(
            d,
            SupervisorDirective::Retry {
                reason: "retry #3".to_string()
            }
        );
        let d = handle.report_role_failure(report(3, "timeout", None)).await;
        assert_eq!(d, SupervisorDirective::Escalate);
    }

    #[tokio::test]
    async fn test_simulated_failures_never_retry() {
        let handle = spawn_supervisor(Arc::new(BlackboardStore::new()));
        let d = handle
            .report_role_failure(report(0, "Simulated failure in test", None))
            .await;
        assert_eq!(d, SupervisorDirective::Escalate);
    }

    #[tokio::test]
    async fn test_circuit_opens_at_threshold_and_closes_on_success() {
        let board = Arc::new(BlackboardStore::new());
        let handle = spawn_supervisor(board.clone());

        for _ in 0..3 {
            handle
                .report_role_failure(report(0, "exit 1", Some("flaky-cli")))
                .await;
        }

        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.open_circuits, vec!["flaky-cli".to_string()]);
        assert_eq!(
            board
                .get(&BoardScope::Global, &keys::adapter_circuit("flaky-cli"))
                .await
                .as_deref(),
            Some("open")
        );

        handle.adapter_succeeded("flaky-cli").await;
        let snapshot = handle.snapshot().await;
        assert!(snapshot.open_circuits.is_empty());
        assert!(board
            .get(&BoardScope::Global, &keys::adapter_circuit("flaky-cli"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_low_confidence_concerns_feed_circuit() {
        let board = Arc::new(BlackboardStore::new());
        let handle = spawn_supervisor(board.clone());

        for _ in 0..3 {
            handle
                .quality_concern(QualityConcern {
                    task_id: "t1".to_string(),
                    role: SwarmRole::Builder,
                    confidence: 0.1,
                    error: None,
                    adapter_id: "wobbly-cli".to_string(),
                })
                .await;
        }

        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.open_circuits, vec!["wobbly-cli".to_string()]);
    }
}
