//! Model-call seam.
//!
//! The assistant treats the LLM as an opaque function from a conversation
//! plus a tool surface to one agent message, possibly carrying tool calls.
//! Concrete providers live outside this crate and adapt their SDK types to
//! [`Drafter`].

use async_trait::async_trait;

use crate::error::LlmError;
use crate::thread::{Message, MessageLog};

/// Tool surface descriptor handed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool's arguments.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// The drafting model call.
#[async_trait]
pub trait Drafter: Send + Sync {
    /// Produce the next agent message for the conversation.
    ///
    /// Implementations must return a message with `Role::Agent`; tool
    /// calls, when present, must name tools from `tools`.
    async fn draft(
        &self,
        conversation: &MessageLog,
        tools: &[ToolDefinition],
    ) -> Result<Message, LlmError>;
}
