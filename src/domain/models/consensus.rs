//! Consensus voting models.

use serde::{Deserialize, Serialize};

/// How votes are tallied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMode {
    Majority,
    Unanimous,
    Weighted,
}

impl ConsensusMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Majority => "majority",
            Self::Unanimous => "unanimous",
            Self::Weighted => "weighted",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "majority" => Some(Self::Majority),
            "unanimous" => Some(Self::Unanimous),
            "weighted" => Some(Self::Weighted),
            _ => None,
        }
    }
}

/// One voter's verdict on an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusVote {
    pub voter_id: String,
    pub approved: bool,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl ConsensusVote {
    pub fn new(voter_id: impl Into<String>, approved: bool) -> Self {
        Self {
            voter_id: voter_id.into(),
            approved,
            weight: 1.0,
            rationale: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Final tally once every expected voter has reached in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub task_id: String,
    pub approved: bool,
    pub votes: Vec<ConsensusVote>,
}

/// Tally votes under a mode. Ties favor rejection in every mode.
pub fn tally(mode: ConsensusMode, votes: &[ConsensusVote]) -> bool {
    match mode {
        ConsensusMode::Majority => {
            let approvals = votes.iter().filter(|v| v.approved).count();
            let rejections = votes.len() - approvals;
            approvals > rejections
        }
        ConsensusMode::Unanimous => !votes.is_empty() && votes.iter().all(|v| v.approved),
        ConsensusMode::Weighted => {
            let approved: f64 = votes.iter().filter(|v| v.approved).map(|v| v.weight).sum();
            let rejected: f64 = votes.iter().filter(|v| !v.approved).map(|v| v.weight).sum();
            approved > rejected
        }
    }
}
