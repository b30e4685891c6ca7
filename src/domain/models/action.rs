//! GOAP actions and the fixed software-engineering action table.

use serde::{Deserialize, Serialize};

use super::world::{WorldKey, WorldState};

/// The fixed action set of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionName {
    Plan,
    Build,
    Review,
    Rework,
    Escalate,
    Finalize,
    WaitForSubTasks,
}

impl ActionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "Plan",
            Self::Build => "Build",
            Self::Review => "Review",
            Self::Rework => "Rework",
            Self::Escalate => "Escalate",
            Self::Finalize => "Finalize",
            Self::WaitForSubTasks => "WaitForSubTasks",
        }
    }

    /// Case-insensitive parse, used on orchestrator `ACTION:` lines.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "plan" => Some(Self::Plan),
            "build" => Some(Self::Build),
            "review" => Some(Self::Review),
            "rework" => Some(Self::Rework),
            "escalate" => Some(Self::Escalate),
            "finalize" => Some(Self::Finalize),
            "waitforsubtasks" | "wait_for_sub_tasks" | "wait" => Some(Self::WaitForSubTasks),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A preconditioned action with effects and a cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoapAction {
    pub name: ActionName,
    pub preconditions: Vec<(WorldKey, bool)>,
    pub effects: Vec<(WorldKey, bool)>,
    pub cost: u32,
}

impl GoapAction {
    pub fn new(
        name: ActionName,
        preconditions: Vec<(WorldKey, bool)>,
        effects: Vec<(WorldKey, bool)>,
        cost: u32,
    ) -> Self {
        debug_assert!(cost >= 1, "action cost must be >= 1");
        Self {
            name,
            preconditions,
            effects,
            cost,
        }
    }

    /// An action is applicable iff the state satisfies every precondition.
    pub fn applicable(&self, state: &WorldState) -> bool {
        self.preconditions
            .iter()
            .all(|(key, want)| state.get(*key) == *want)
    }

    /// Apply the effects to a state, producing the successor.
    #[must_use]
    pub fn apply(&self, state: &WorldState) -> WorldState {
        let mut next = state.clone();
        for (key, value) in &self.effects {
            next = next.with(*key, *value);
        }
        next
    }
}

/// The global action table, in declaration order. Declaration order is the
/// planner tie-break on equal plan cost.
///
/// Review's effects are the optimistic outcome (approval): the runtime
/// substitutes the actual verdict into the world state after the role runs.
/// Because of that, Build and Review carry guards the search needs to stay
/// sound: a standing rejection blocks Build (Rework is the sanctioned path
/// that clears it), and a completed review blocks re-Review until a fresh
/// build resets it.
pub fn action_table() -> Vec<GoapAction> {
    vec![
        GoapAction::new(
            ActionName::Plan,
            vec![(WorldKey::TaskExists, true)],
            vec![(WorldKey::PlanExists, true)],
            1,
        ),
        GoapAction::new(
            ActionName::Build,
            vec![
                (WorldKey::PlanExists, true),
                (WorldKey::AdapterAvailable, true),
                (WorldKey::ReviewRejected, false),
            ],
            vec![
                (WorldKey::BuildExists, true),
                (WorldKey::ReviewCompleted, false),
                (WorldKey::ReviewApproved, false),
            ],
            2,
        ),
        GoapAction::new(
            ActionName::Review,
            vec![
                (WorldKey::BuildExists, true),
                (WorldKey::ReviewCompleted, false),
            ],
            vec![
                (WorldKey::ReviewCompleted, true),
                (WorldKey::ReviewApproved, true),
            ],
            1,
        ),
        GoapAction::new(
            ActionName::Rework,
            vec![
                (WorldKey::ReviewRejected, true),
                (WorldKey::RetryLimitReached, false),
            ],
            vec![
                (WorldKey::ReviewRejected, false),
                (WorldKey::ReworkAttempted, true),
                (WorldKey::BuildExists, false),
            ],
            3,
        ),
        GoapAction::new(
            ActionName::Escalate,
            vec![
                (WorldKey::ReviewRejected, true),
                (WorldKey::RetryLimitReached, true),
            ],
            vec![(WorldKey::TaskBlocked, true)],
            10,
        ),
        GoapAction::new(
            ActionName::Finalize,
            vec![(WorldKey::ReviewApproved, true)],
            vec![(WorldKey::TaskCompleted, true)],
            1,
        ),
        GoapAction::new(
            ActionName::WaitForSubTasks,
            vec![
                (WorldKey::SubTasksSpawned, true),
                (WorldKey::SubTasksCompleted, false),
            ],
            vec![(WorldKey::SubTasksCompleted, true)],
            1,
        ),
    ]
}

/// Look up an action in the table by name.
pub fn find_action(name: ActionName) -> Option<GoapAction> {
    action_table().into_iter().find(|a| a.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_name_parse_case_insensitive() {
        assert_eq!(ActionName::from_str("Build"), Some(ActionName::Build));
        assert_eq!(ActionName::from_str("REWORK"), Some(ActionName::Rework));
        assert_eq!(
            ActionName::from_str("waitforsubtasks"),
            Some(ActionName::WaitForSubTasks)
        );
        assert_eq!(ActionName::from_str("compile"), None);
    }

    #[test]
    fn test_applicability() {
        let build = find_action(ActionName::Build).unwrap();
        let state = WorldState::new().with(WorldKey::PlanExists, true);
        assert!(!build.applicable(&state));
        let state = state.with(WorldKey::AdapterAvailable, true);
        assert!(build.applicable(&state));
    }

    #[test]
    fn test_apply_effects() {
        let rework = find_action(ActionName::Rework).unwrap();
        let state = WorldState::new()
            .with(WorldKey::ReviewRejected, true)
            .with(WorldKey::BuildExists, true);
        assert!(rework.applicable(&state));
        let next = rework.apply(&state);
        assert!(!next.get(WorldKey::ReviewRejected));
        assert!(!next.get(WorldKey::BuildExists));
        assert!(next.get(WorldKey::ReworkAttempted));
    }

    #[test]
    fn test_table_declaration_order() {
        let names: Vec<ActionName> = action_table().into_iter().map(|a| a.name).collect();
        assert_eq!(
            names,
            vec![
                ActionName::Plan,
                ActionName::Build,
                ActionName::Review,
                ActionName::Rework,
                ActionName::Escalate,
                ActionName::Finalize,
                ActionName::WaitForSubTasks,
            ]
        );
    }

    #[test]
    fn test_costs_match_table() {
        assert_eq!(find_action(ActionName::Plan).unwrap().cost, 1);
        assert_eq!(find_action(ActionName::Build).unwrap().cost, 2);
        assert_eq!(find_action(ActionName::Rework).unwrap().cost, 3);
        assert_eq!(find_action(ActionName::Escalate).unwrap().cost, 10);
    }
}
