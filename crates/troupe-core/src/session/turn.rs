//! Turn record types.

use crate::agent::{AgentId, ToolCall};
use serde::{Deserialize, Serialize};

/// One immutable unit of narrative output attributed to one agent.
///
/// Turns are the unit of both narrative and checkpoint granularity:
/// once appended to the turn log they are never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Position in the turn log (1-based; equals log length after append).
    pub turn_number: u64,
    /// The agent this output is attributed to.
    pub acting_agent: AgentId,
    /// Narrative text.
    pub content: String,
    /// Structured tool calls emitted alongside the text.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Timestamp when the turn was appended (RFC 3339).
    pub timestamp: String,
}

impl Turn {
    /// Creates a turn stamped with the current time.
    pub fn new(
        turn_number: u64,
        acting_agent: impl Into<AgentId>,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            turn_number,
            acting_agent: acting_agent.into(),
            content: content.into(),
            tool_calls,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
