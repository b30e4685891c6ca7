//! SwarmAssistant - multi-agent coding swarm runtime.
//!
//! The core implemented here is the task coordination and dispatch subsystem:
//! - Hierarchical coordinator/worker/reviewer/supervisor actor mesh
//! - GOAP-driven action selection over per-task world state
//! - Sub-task and run lifecycle management with bounded recursion
//! - Capability-scoped dispatch registry with contract-net auctions
//! - Supervisor retry policy and per-adapter circuit breakers
//! - Durable execution-event log with task- and run-scoped sequences

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod services;

// Re-export key types for convenience
pub use application::{DispatcherHandle, SwarmServices};
pub use config::SwarmConfig;
