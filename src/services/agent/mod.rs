pub mod provider;
pub mod tools;
pub mod engine;

use thiserror::Error;

pub use engine::AgentEngine;
pub use provider::{create_provider, LLMProvider, Message, ProviderConfig};
pub use tools::{build_tool_registry, Tool, ToolDefinition, ToolRegistry};

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM provider error: {0}")]
    Provider(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Max iterations reached ({0})")]
    MaxIterations(usize),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}
