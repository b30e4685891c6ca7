//! Model provider implementations.

pub mod anthropic;
pub mod mock;
pub mod openai;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use mock::MockModelProvider;
pub use openai::{OpenAiCompatConfig, OpenAiCompatProvider};
