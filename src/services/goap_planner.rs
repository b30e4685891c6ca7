//! Goal-oriented action planner.
//!
//! A*-style forward search over world states. The heuristic is the count of
//! goal keys not yet satisfied; expansion tries every applicable action from
//! the global table. Pure and side-effect-free.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::domain::models::{action_table, GoapAction, WorldState};

/// Outcome of a planning request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOutcome {
    /// The goal already holds in the given state.
    pub satisfied: bool,
    /// The frontier was exhausted without reaching the goal.
    pub dead_end: bool,
    /// Ordered actions that transform the state into the goal. Empty when
    /// satisfied or dead-ended.
    pub recommended_plan: Vec<GoapAction>,
}

impl PlanOutcome {
    fn satisfied() -> Self {
        Self {
            satisfied: true,
            dead_end: false,
            recommended_plan: Vec::new(),
        }
    }

    fn dead_end() -> Self {
        Self {
            satisfied: false,
            dead_end: true,
            recommended_plan: Vec::new(),
        }
    }

    fn plan(actions: Vec<GoapAction>) -> Self {
        Self {
            satisfied: false,
            dead_end: false,
            recommended_plan: actions,
        }
    }

    /// First action of the recommended plan, if any.
    pub fn first_action(&self) -> Option<&GoapAction> {
        self.recommended_plan.first()
    }
}

/// Search node bookkeeping: g-cost and the path taken (indices into the
/// action table).
struct NodeInfo {
    g: u32,
    path: Vec<usize>,
}

/// The GOAP planner. Stateless; the action table is fixed.
#[derive(Debug, Default, Clone, Copy)]
pub struct GoapPlanner;

impl GoapPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Find the cheapest action sequence from `state` to `goal`.
    ///
    /// Tie-break on equal total cost: the expansion pushed earliest wins,
    /// which prefers actions declared earlier in the global table.
    pub fn plan(&self, state: &WorldState, goal: &WorldState) -> PlanOutcome {
        if state.satisfies(goal) {
            return PlanOutcome::satisfied();
        }

        let actions = action_table();

        // Frontier ordered by (f, g, push order). Reverse for a min-heap.
        let mut frontier: BinaryHeap<Reverse<(u32, u32, u64, usize)>> = BinaryHeap::new();
        let mut nodes: Vec<(WorldState, NodeInfo)> = Vec::new();
        let mut best_cost: HashMap<WorldState, u32> = HashMap::new();
        let mut push_order: u64 = 0;

        nodes.push((
            state.clone(),
            NodeInfo {
                g: 0,
                path: Vec::new(),
            },
        ));
        best_cost.insert(state.clone(), 0);
        frontier.push(Reverse((state.unsatisfied_count(goal), 0, push_order, 0)));

        while let Some(Reverse((_, g, _, node_idx))) = frontier.pop() {
            // Stale entry: a cheaper route to this state was found already.
            let current_state = nodes[node_idx].0.clone();
            if best_cost.get(&current_state).copied().unwrap_or(u32::MAX) < g {
                continue;
            }

            for (action_idx, action) in actions.iter().enumerate() {
                if !action.applicable(&current_state) {
                    continue;
                }
                let next_state = action.apply(&current_state);
                let next_g = g + action.cost;

                if best_cost
                    .get(&next_state)
                    .is_some_and(|&known| known <= next_g)
                {
                    continue;
                }
                best_cost.insert(next_state.clone(), next_g);

                let mut path = nodes[node_idx].1.path.clone();
                path.push(action_idx);

                if next_state.satisfies(goal) {
                    let plan = path.into_iter().map(|i| actions[i].clone()).collect();
                    return PlanOutcome::plan(plan);
                }

                let h = next_state.unsatisfied_count(goal);
                push_order += 1;
                nodes.push((next_state, NodeInfo { g: next_g, path }));
                frontier.push(Reverse((next_g + h, next_g, push_order, nodes.len() - 1)));
            }
        }

        PlanOutcome::dead_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ActionName, WorldKey};

    fn goal_completed() -> WorldState {
        WorldState::new().with(WorldKey::TaskCompleted, true)
    }

    fn names(outcome: &PlanOutcome) -> Vec<ActionName> {
        outcome.recommended_plan.iter().map(|a| a.name).collect()
    }

    #[test]
    fn test_already_satisfied() {
        let planner = GoapPlanner::new();
        let state = WorldState::new().with(WorldKey::TaskCompleted, true);
        let outcome = planner.plan(&state, &goal_completed());
        assert!(outcome.satisfied);
        assert!(!outcome.dead_end);
        assert!(outcome.recommended_plan.is_empty());
    }

    #[test]
    fn test_full_pipeline_plan() {
        let planner = GoapPlanner::new();
        let state = WorldState::new()
            .with(WorldKey::TaskExists, true)
            .with(WorldKey::AdapterAvailable, true);
        let outcome = planner.plan(&state, &goal_completed());
        assert_eq!(
            names(&outcome),
            vec![
                ActionName::Plan,
                ActionName::Build,
                ActionName::Review,
                ActionName::Finalize,
            ]
        );
    }

    #[test]
    fn test_dead_end_without_adapter() {
        let planner = GoapPlanner::new();
        // No adapter available: Build can never fire, Finalize unreachable.
        let state = WorldState::new().with(WorldKey::TaskExists, true);
        let outcome = planner.plan(&state, &goal_completed());
        assert!(outcome.dead_end);
        assert!(!outcome.satisfied);
    }

    #[test]
    fn test_rework_path_after_rejection() {
        let planner = GoapPlanner::new();
        let state = WorldState::new()
            .with(WorldKey::TaskExists, true)
            .with(WorldKey::AdapterAvailable, true)
            .with(WorldKey::PlanExists, true)
            .with(WorldKey::BuildExists, true)
            .with(WorldKey::ReviewCompleted, true)
            .with(WorldKey::ReviewRejected, true);
        let outcome = planner.plan(&state, &goal_completed());
        assert_eq!(names(&outcome)[0], ActionName::Rework);
        assert!(names(&outcome).contains(&ActionName::Finalize));
    }

    #[test]
    fn test_escalate_when_retry_limit_reached() {
        let planner = GoapPlanner::new();
        let state = WorldState::new()
            .with(WorldKey::TaskExists, true)
            .with(WorldKey::AdapterAvailable, true)
            .with(WorldKey::PlanExists, true)
            .with(WorldKey::BuildExists, true)
            .with(WorldKey::ReviewRejected, true)
            .with(WorldKey::RetryLimitReached, true);
        let goal = WorldState::new().with(WorldKey::TaskBlocked, true);
        let outcome = planner.plan(&state, &goal);
        assert_eq!(names(&outcome), vec![ActionName::Escalate]);
    }

    #[test]
    fn test_wait_for_subtasks_plan() {
        let planner = GoapPlanner::new();
        let state = WorldState::new()
            .with(WorldKey::SubTasksSpawned, true)
            .with(WorldKey::SubTasksCompleted, false);
        let goal = WorldState::new().with(WorldKey::SubTasksCompleted, true);
        let outcome = planner.plan(&state, &goal);
        assert_eq!(names(&outcome), vec![ActionName::WaitForSubTasks]);
    }

    #[test]
    fn test_tie_break_prefers_earlier_declaration() {
        // From a state where both Review and Finalize paths exist at equal
        // cost only through distinct actions, the earliest-declared applicable
        // action leads. With ReviewApproved already true, Finalize (cost 1)
        // is strictly cheapest; ensure the plan is minimal.
        let planner = GoapPlanner::new();
        let state = WorldState::new()
            .with(WorldKey::TaskExists, true)
            .with(WorldKey::AdapterAvailable, true)
            .with(WorldKey::ReviewApproved, true);
        let outcome = planner.plan(&state, &goal_completed());
        assert_eq!(names(&outcome), vec![ActionName::Finalize]);
    }

    #[test]
    fn test_planner_is_pure() {
        let planner = GoapPlanner::new();
        let state = WorldState::new()
            .with(WorldKey::TaskExists, true)
            .with(WorldKey::AdapterAvailable, true);
        let before = state.clone();
        let _ = planner.plan(&state, &goal_completed());
        assert_eq!(state, before);
    }
}
