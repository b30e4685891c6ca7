//! World state for GOAP planning.
//!
//! The world is a mapping of atomic task facts to booleans. Construction is
//! purely functional: `with` returns a new state, so planner search nodes
//! can be hashed and memoized by value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Atomic task facts the planner reasons over.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WorldKey {
    TaskExists,
    PlanExists,
    BuildExists,
    ReviewCompleted,
    ReviewApproved,
    ReviewRejected,
    RetryLimitReached,
    ReworkAttempted,
    TaskCompleted,
    TaskBlocked,
    AdapterAvailable,
    SubTasksSpawned,
    SubTasksCompleted,
}

impl WorldKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskExists => "task_exists",
            Self::PlanExists => "plan_exists",
            Self::BuildExists => "build_exists",
            Self::ReviewCompleted => "review_completed",
            Self::ReviewApproved => "review_approved",
            Self::ReviewRejected => "review_rejected",
            Self::RetryLimitReached => "retry_limit_reached",
            Self::ReworkAttempted => "rework_attempted",
            Self::TaskCompleted => "task_completed",
            Self::TaskBlocked => "task_blocked",
            Self::AdapterAvailable => "adapter_available",
            Self::SubTasksSpawned => "sub_tasks_spawned",
            Self::SubTasksCompleted => "sub_tasks_completed",
        }
    }
}

/// Immutable mapping of world facts. Unset keys read as false.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldState {
    facts: BTreeMap<WorldKey, bool>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new state with the fact set.
    #[must_use]
    pub fn with(&self, key: WorldKey, value: bool) -> Self {
        let mut facts = self.facts.clone();
        facts.insert(key, value);
        Self { facts }
    }

    pub fn get(&self, key: WorldKey) -> bool {
        self.facts.get(&key).copied().unwrap_or(false)
    }

    /// True when every fact required by `goal` holds here.
    pub fn satisfies(&self, goal: &WorldState) -> bool {
        goal.facts.iter().all(|(key, want)| self.get(*key) == *want)
    }

    /// Number of goal facts not yet satisfied. Planner heuristic.
    pub fn unsatisfied_count(&self, goal: &WorldState) -> u32 {
        goal.facts
            .iter()
            .filter(|(key, want)| self.get(**key) != **want)
            .count() as u32
    }

    /// Iterate over explicitly set facts.
    pub fn facts(&self) -> impl Iterator<Item = (WorldKey, bool)> + '_ {
        self.facts.iter().map(|(k, v)| (*k, *v))
    }

    /// Compact single-line rendering for prompts and diagnostics.
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = self
            .facts
            .iter()
            .map(|(k, v)| format!("{}={}", k.as_str(), v))
            .collect();
        if parts.is_empty() {
            parts.push("(empty)".to_string());
        }
        parts.join(", ")
    }
}
