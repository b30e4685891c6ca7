//! SQLite persistence adapters.

pub mod connection;
pub mod event_repository;
pub mod migrations;
pub mod task_repository;

pub use connection::{create_pool, create_test_pool};
pub use event_repository::SqliteEventRepository;
pub use task_repository::SqliteTaskSink;
