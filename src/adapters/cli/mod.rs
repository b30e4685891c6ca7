//! CLI adapter catalog and process runner.

pub mod catalog;
pub mod runner;

pub use catalog::{builtin_adapters, find_adapter, LOCAL_ECHO_ID};
pub use runner::{CliExecution, CliRunner};
