//! Consensus service: accumulate votes on an artifact until every expected
//! voter has reached in, then emit the tallied result.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::models::{tally, ConsensusMode, ConsensusResult, ConsensusVote, EventKind};
use crate::services::event_recorder::EventRecorder;
use crate::services::ui_stream::UiEventStream;

struct Round {
    artifact: String,
    expected_voters: usize,
    mode: ConsensusMode,
    votes: Vec<ConsensusVote>,
}

/// Accumulates consensus rounds keyed by task id.
pub struct ConsensusService {
    rounds: Mutex<HashMap<String, Round>>,
    recorder: Arc<EventRecorder>,
    ui: Arc<UiEventStream>,
}

impl ConsensusService {
    pub fn new(recorder: Arc<EventRecorder>, ui: Arc<UiEventStream>) -> Self {
        Self {
            rounds: Mutex::new(HashMap::new()),
            recorder,
            ui,
        }
    }

    /// Open a consensus round. Replaces any prior round for the task.
    pub async fn request(
        &self,
        task_id: &str,
        artifact: impl Into<String>,
        expected_voters: usize,
        mode: ConsensusMode,
    ) {
        let mut rounds = self.rounds.lock().await;
        rounds.insert(
            task_id.to_string(),
            Round {
                artifact: artifact.into(),
                expected_voters: expected_voters.max(1),
                mode,
                votes: Vec::new(),
            },
        );
    }

    /// Submit one vote. Returns the result once all expected voters are in.
    /// A voter's repeated vote replaces their earlier one.
    pub async fn submit_vote(
        &self,
        task_id: &str,
        vote: ConsensusVote,
    ) -> Option<ConsensusResult> {
        let mut rounds = self.rounds.lock().await;
        let round = rounds.get_mut(task_id)?;

        round.votes.retain(|v| v.voter_id != vote.voter_id);
        round.votes.push(vote);

        if round.votes.len() < round.expected_voters {
            return None;
        }

        let round = rounds.remove(task_id)?;
        drop(rounds);

        let Round {
            artifact,
            mode,
            votes,
            ..
        } = round;
        let approved = tally(mode, &votes);
        let result = ConsensusResult {
            task_id: task_id.to_string(),
            approved,
            votes,
        };

        let payload = serde_json::json!({
            "artifact": artifact,
            "mode": mode.as_str(),
            "approved": approved,
            "votes": result.votes.len(),
        })
        .to_string();
        self.recorder
            .record(task_id, None, EventKind::TelemetryConsensus, payload.clone())
            .await;
        self.ui.publish("consensus.result", payload);

        Some(result)
    }

    /// Votes received so far for a round.
    pub async fn pending_votes(&self, task_id: &str) -> usize {
        let rounds = self.rounds.lock().await;
        rounds.get(task_id).map_or(0, |r| r.votes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ConsensusService {
        ConsensusService::new(
            Arc::new(EventRecorder::disabled()),
            Arc::new(UiEventStream::new(16)),
        )
    }

    #[tokio::test]
    async fn test_majority_round() {
        let service = service();
        service
            .request("t1", "artifact-1", 3, ConsensusMode::Majority)
            .await;

        assert!(service
            .submit_vote("t1", ConsensusVote::new("a", true))
            .await
            .is_none());
        assert!(service
            .submit_vote("t1", ConsensusVote::new("b", false))
            .await
            .is_none());
        let result = service
            .submit_vote("t1", ConsensusVote::new("c", true))
            .await
            .unwrap();
        assert!(result.approved);
        assert_eq!(result.votes.len(), 3);
    }

    #[tokio::test]
    async fn test_unanimous_rejects_on_single_no() {
        let service = service();
        service
            .request("t1", "artifact-1", 2, ConsensusMode::Unanimous)
            .await;
        service
            .submit_vote("t1", ConsensusVote::new("a", true))
            .await;
        let result = service
            .submit_vote("t1", ConsensusVote::new("b", false))
            .await
            .unwrap();
        assert!(!result.approved);
    }

    #[tokio::test]
    async fn test_revote_replaces_earlier_vote() {
        let service = service();
        service
            .request("t1", "artifact-1", 2, ConsensusMode::Majority)
            .await;
        service
            .submit_vote("t1", ConsensusVote::new("a", false))
            .await;
        service
            .submit_vote("t1", ConsensusVote::new("a", true))
            .await;
        assert_eq!(service.pending_votes("t1").await, 1);
    }

    #[tokio::test]
    async fn test_vote_without_round_ignored() {
        let service = service();
        assert!(service
            .submit_vote("ghost", ConsensusVote::new("a", true))
            .await
            .is_none());
    }
}
