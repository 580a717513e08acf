//! Private whisper channel records.

use crate::agent::AgentId;
use serde::{Deserialize, Serialize};

/// A private, agent-scoped message from the director to exactly one
/// participant.
///
/// Visible only in the target's assembled context until explicitly
/// revealed; reveal is an action, never an expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Whisper {
    /// Unique whisper identifier (UUID).
    pub id: String,
    /// Sender (the director, or a human acting as director).
    pub from_agent: AgentId,
    /// The single participant this whisper targets.
    pub to_agent: AgentId,
    /// Whisper content.
    pub content: String,
    /// Turn number at which the whisper was created.
    pub turn_created: u64,
    /// Whether the whisper has been revealed to all agents.
    #[serde(default)]
    pub revealed: bool,
    /// Turn number at which the whisper was revealed, if it was.
    #[serde(default)]
    pub turn_revealed: Option<u64>,
}

impl Whisper {
    /// Creates an unrevealed whisper with a fresh ID.
    pub fn new(
        from_agent: impl Into<AgentId>,
        to_agent: impl Into<AgentId>,
        content: impl Into<String>,
        turn_created: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            content: content.into(),
            turn_created,
            revealed: false,
            turn_revealed: None,
        }
    }

    /// Whether this whisper belongs in `agent_id`'s context.
    ///
    /// Unrevealed whispers are visible only to their target; revealed
    /// whispers are visible to everyone.
    pub fn visible_to(&self, agent_id: &str) -> bool {
        self.revealed || self.to_agent == agent_id
    }
}
