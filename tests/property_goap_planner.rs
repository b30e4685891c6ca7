//! Property tests for the GOAP planner: every recommended plan must be
//! executable step by step and end in a state satisfying the goal.

use proptest::prelude::*;

use swarm_assistant::domain::models::{WorldKey, WorldState};
use swarm_assistant::services::GoapPlanner;

const KEYS: [WorldKey; 13] = [
    WorldKey::TaskExists,
    WorldKey::PlanExists,
    WorldKey::BuildExists,
    WorldKey::ReviewCompleted,
    WorldKey::ReviewApproved,
    WorldKey::ReviewRejected,
    WorldKey::RetryLimitReached,
    WorldKey::ReworkAttempted,
    WorldKey::TaskCompleted,
    WorldKey::TaskBlocked,
    WorldKey::AdapterAvailable,
    WorldKey::SubTasksSpawned,
    WorldKey::SubTasksCompleted,
];

fn arb_world() -> impl Strategy<Value = WorldState> {
    proptest::collection::vec((0usize..KEYS.len(), any::<bool>()), 0..10).prop_map(|facts| {
        let mut state = WorldState::new();
        for (index, value) in facts {
            state = state.with(KEYS[index], value);
        }
        state
    })
}

proptest! {
    #[test]
    fn recommended_plans_are_executable_and_reach_the_goal(state in arb_world()) {
        let planner = GoapPlanner::new();
        let goal = WorldState::new().with(WorldKey::TaskCompleted, true);
        let outcome = planner.plan(&state, &goal);

        if outcome.satisfied {
            prop_assert!(state.satisfies(&goal));
            prop_assert!(outcome.recommended_plan.is_empty());
        } else if outcome.dead_end {
            prop_assert!(outcome.recommended_plan.is_empty());
        } else {
            let mut current = state.clone();
            for action in &outcome.recommended_plan {
                prop_assert!(
                    action.applicable(&current),
                    "step {} not applicable",
                    action.name
                );
                current = action.apply(&current);
            }
            prop_assert!(current.satisfies(&goal));
        }
    }

    #[test]
    fn planning_never_mutates_the_input(state in arb_world()) {
        let planner = GoapPlanner::new();
        let goal = WorldState::new().with(WorldKey::TaskCompleted, true);
        let before = state.clone();
        let _ = planner.plan(&state, &goal);
        prop_assert_eq!(state, before);
    }
}
