//! The agent invocation port.
//!
//! `AgentInvoker` is the boundary to the backing model/provider. One
//! implementation exists per provider; the orchestration core treats
//! them as interchangeable and only ever calls through this trait.

use crate::agent::AgentId;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which capability of the backing model is being exercised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationRole {
    /// Generate the next narrative turn for an agent.
    Narrative,
    /// Summarize archived memory or extract structured elements.
    Summarization,
}

/// A structured tool call returned alongside narrative text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name.
    pub name: String,
    /// Tool arguments as free-form JSON.
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// The result of one agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Invocation {
    /// Generated text.
    pub text: String,
    /// Optional structured tool calls.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl Invocation {
    /// Creates a text-only invocation result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// An abstract capability that turns an assembled prompt into text.
///
/// Implementations wrap a concrete provider (or a scripted stub in
/// tests). Callers bound the call with their own timeout; an
/// implementation should not retry internally.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Invokes the backing model on behalf of `agent_id`.
    ///
    /// # Arguments
    ///
    /// * `agent_id` - The agent the output will be attributed to
    /// * `role` - Narrative generation or summarization
    /// * `prompt` - The fully assembled context, rendered as text
    ///
    /// # Errors
    ///
    /// Returns `InvocationFailure` if the provider errors or returns
    /// malformed output.
    async fn invoke(
        &self,
        agent_id: &AgentId,
        role: InvocationRole,
        prompt: &str,
    ) -> Result<Invocation>;
}
