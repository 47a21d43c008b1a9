//! Tool execution seam.

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;

/// Tool execution error.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    Unknown(String),
    #[error("Tool execution failed: {0}")]
    Failed(String),
}

/// Trait for the external tool-execution collaborator.
///
/// Invoked from inside turn resolution; any error it raises is handled by
/// the engine's model-failure policy.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run a tool by name with the model's parsed arguments.
    ///
    /// # Errors
    /// Returns error if the tool is unknown or its execution fails.
    async fn execute(&self, name: &str, arguments: Value) -> Result<Value, ToolError>;
}

/// Executor that acknowledges every invocation without doing anything.
///
/// Stands in until real capabilities are wired up behind the trait.
pub struct NullToolExecutor;

#[async_trait]
impl ToolExecutor for NullToolExecutor {
    async fn execute(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        tracing::info!("Tool '{name}' invoked (null executor)");
        Ok(json!({
            "acknowledged": true,
            "tool": name,
            "arguments": arguments,
        }))
    }
}
