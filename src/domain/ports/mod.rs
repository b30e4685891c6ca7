//! Ports: interfaces the core depends on, implemented by adapters.

pub mod event_repository;
pub mod model_provider;
pub mod task_sink;

pub use event_repository::{
    clamp_limit, EventRepository, InMemoryEventRepository, MAX_PAGE_LIMIT,
};
pub use model_provider::{ModelOptions, ModelProvider, ModelResponse, ModelSpec};
pub use task_sink::{NullTaskSink, TaskSink};
