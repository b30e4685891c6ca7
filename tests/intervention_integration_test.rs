//! Human intervention tests: pause/resume, payload validation, cancellation,
//! and dispatcher-level routing of intervention commands.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{api_direct_config, start, wait_terminal, ScriptedProvider};
use swarm_assistant::domain::models::{
    EventKind, InterventionReasonCode, TaskInterventionCommand, TaskStatus, TaskSubmission,
};
use swarm_assistant::domain::ports::EventRepository;

fn slow_provider() -> Arc<ScriptedProvider> {
    Arc::new(ScriptedProvider {
        delay: Duration::from_millis(150),
        ..Default::default()
    })
}

#[tokio::test]
async fn pause_then_resume_completes_with_two_intervention_events() {
    let swarm = start(api_direct_config(), vec![slow_provider()]);

    swarm
        .dispatcher
        .submit_task(TaskSubmission::new("t1", "Pausable", "Slow pipeline"))
        .await
        .unwrap();

    // Let the first role start, then pause
    tokio::time::sleep(Duration::from_millis(50)).await;
    let result = swarm
        .dispatcher
        .intervene(TaskInterventionCommand::new("t1", "pause_task"))
        .await;
    assert!(result.accepted);

    // While paused the task must not reach a terminal status
    tokio::time::sleep(Duration::from_millis(600)).await;
    let paused = swarm.services.tasks.get("t1").await.unwrap();
    assert!(!paused.is_terminal(), "paused task must not finish");

    let result = swarm
        .dispatcher
        .intervene(TaskInterventionCommand::new("t1", "resume_task"))
        .await;
    assert!(result.accepted);

    assert_eq!(
        wait_terminal(&swarm, "t1", Duration::from_secs(10)).await,
        TaskStatus::Done
    );

    let events = swarm.events.list_by_task("t1", 0, 1000).await;
    let interventions: Vec<String> = events
        .iter()
        .filter(|e| e.event_type == EventKind::TaskIntervention)
        .map(|e| {
            serde_json::from_str::<serde_json::Value>(&e.payload).unwrap()["actionId"]
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect();
    assert_eq!(interventions, vec!["pause_task", "resume_task"]);

    // Every accepted intervention was decided by a human
    for event in events
        .iter()
        .filter(|e| e.event_type == EventKind::TaskIntervention)
    {
        let payload: serde_json::Value = serde_json::from_str(&event.payload).unwrap();
        assert_eq!(payload["decidedBy"], "human");
    }
}

#[tokio::test]
async fn intervention_validation_rejections() {
    let swarm = start(api_direct_config(), vec![slow_provider()]);

    swarm
        .dispatcher
        .submit_task(TaskSubmission::new("t1", "Target", "Slow pipeline"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Unknown task id
    let result = swarm
        .dispatcher
        .intervene(TaskInterventionCommand::new("ghost", "pause_task"))
        .await;
    assert_eq!(
        result.reason_code,
        Some(InterventionReasonCode::TaskNotFound)
    );

    // Unknown action
    let result = swarm
        .dispatcher
        .intervene(TaskInterventionCommand::new("t1", "reboot_universe"))
        .await;
    assert_eq!(
        result.reason_code,
        Some(InterventionReasonCode::UnsupportedAction)
    );

    // Resume without a pause
    let result = swarm
        .dispatcher
        .intervene(TaskInterventionCommand::new("t1", "resume_task"))
        .await;
    assert_eq!(
        result.reason_code,
        Some(InterventionReasonCode::InvalidState)
    );

    // Negative depth
    let result = swarm
        .dispatcher
        .intervene(TaskInterventionCommand::new("t1", "set_subtask_depth").with_payload("-1"))
        .await;
    assert_eq!(
        result.reason_code,
        Some(InterventionReasonCode::PayloadInvalid)
    );

    // Depth above the hard cap
    let result = swarm
        .dispatcher
        .intervene(TaskInterventionCommand::new("t1", "set_subtask_depth").with_payload("10"))
        .await;
    assert_eq!(
        result.reason_code,
        Some(InterventionReasonCode::PayloadInvalid)
    );

    // Depth equal to the cap is accepted
    let result = swarm
        .dispatcher
        .intervene(TaskInterventionCommand::new("t1", "set_subtask_depth").with_payload("9"))
        .await;
    assert!(result.accepted);

    // Non-numeric payload
    let result = swarm
        .dispatcher
        .intervene(TaskInterventionCommand::new("t1", "set_subtask_depth").with_payload("deep"))
        .await;
    assert_eq!(
        result.reason_code,
        Some(InterventionReasonCode::PayloadInvalid)
    );

    // Review interventions outside the Reviewing state
    let result = swarm
        .dispatcher
        .intervene(TaskInterventionCommand::new("t1", "approve_review"))
        .await;
    assert_eq!(
        result.reason_code,
        Some(InterventionReasonCode::InvalidState)
    );

    wait_terminal(&swarm, "t1", Duration::from_secs(10)).await;
}

#[tokio::test]
async fn cancel_task_blocks_with_operator_error() {
    let swarm = start(api_direct_config(), vec![slow_provider()]);

    swarm
        .dispatcher
        .submit_task(TaskSubmission::new("t1", "Cancelled", "Slow pipeline"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = swarm
        .dispatcher
        .intervene(TaskInterventionCommand::new("t1", "cancel_task"))
        .await;
    assert!(result.accepted);

    assert_eq!(
        wait_terminal(&swarm, "t1", Duration::from_secs(5)).await,
        TaskStatus::Blocked
    );
    let task = swarm.services.tasks.get("t1").await.unwrap();
    assert_eq!(task.error.as_deref(), Some("task cancelled by operator"));

    // Exactly one intervention event for the cancel
    let events = swarm.events.list_by_task("t1", 0, 1000).await;
    let interventions = events
        .iter()
        .filter(|e| e.event_type == EventKind::TaskIntervention)
        .count();
    assert_eq!(interventions, 1);
}

#[tokio::test]
async fn reject_review_requires_reason() {
    let swarm = start(api_direct_config(), vec![slow_provider()]);

    swarm
        .dispatcher
        .submit_task(TaskSubmission::new("t1", "Reviewed", "Slow pipeline"))
        .await
        .unwrap();

    // Wait until the task reaches Reviewing
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let status = swarm.services.tasks.get("t1").await.unwrap().status;
        if status == TaskStatus::Reviewing {
            break;
        }
        assert!(
            status != TaskStatus::Done && status != TaskStatus::Blocked,
            "task finished before reaching Reviewing"
        );
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Missing reason is rejected
    let result = swarm
        .dispatcher
        .intervene(TaskInterventionCommand::new("t1", "reject_review"))
        .await;
    assert_eq!(
        result.reason_code,
        Some(InterventionReasonCode::PayloadInvalid)
    );

    wait_terminal(&swarm, "t1", Duration::from_secs(10)).await;
}
