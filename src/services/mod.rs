//! Application services for the swarm coordination core.

pub mod blackboard;
pub mod capability_registry;
pub mod consensus;
pub mod event_recorder;
pub mod goap_planner;
pub mod prompt;
pub mod role_engine;
pub mod run_registry;
pub mod sandbox;
pub mod supervisor;
pub mod task_registry;
pub mod ui_stream;

pub use blackboard::{BlackboardChange, BlackboardStore, BoardScope};
pub use capability_registry::{
    AgentMessage, CapabilityRegistry, ContractNetAward, ContractNetBid, PeerResolution,
    RoleTaskOutcome,
};
pub use consensus::ConsensusService;
pub use event_recorder::EventRecorder;
pub use goap_planner::{GoapPlanner, PlanOutcome};
pub use prompt::{
    build_orchestrator_prompt, build_role_prompt, normalize_output, parse_action, parse_subtasks,
    review_approved, Skill,
};
pub use role_engine::RoleEngine;
pub use run_registry::RunRegistry;
pub use sandbox::{shell_quote, wrap_command};
pub use supervisor::{
    Supervisor, SupervisorDirective, SupervisorHandle, SupervisorMsg, SupervisorSnapshot,
};
pub use task_registry::TaskRegistry;
pub use ui_stream::{UiEnvelope, UiEventStream};
