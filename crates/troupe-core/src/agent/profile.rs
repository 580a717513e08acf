//! Static agent identity facts.

use serde::{Deserialize, Serialize};

/// Agent identifier (stable, human-chosen, e.g. "director" or "mira").
pub type AgentId = String;

/// The role an agent plays in the turn order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Narrates, arbitrates world state, and routes the story.
    Director,
    /// One of the N controllable character roles.
    Participant,
}

/// Static identity facts for one agent.
///
/// Rendered as the first segment of every assembled context; never
/// mutated during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Stable agent identifier, unique within a session.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Role in the turn order.
    pub role: AgentRole,
    /// Character background injected into the context.
    #[serde(default)]
    pub background: String,
    /// Voice/style guidance injected into the context.
    #[serde(default)]
    pub voice: String,
}

impl AgentProfile {
    /// Creates a participant profile with the given identity facts.
    pub fn participant(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: AgentRole::Participant,
            background: String::new(),
            voice: String::new(),
        }
    }

    /// Creates the director profile.
    pub fn director(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: AgentRole::Director,
            background: String::new(),
            voice: String::new(),
        }
    }

    /// Renders the identity facts as a prompt section.
    pub fn to_prompt(&self) -> String {
        let role = match self.role {
            AgentRole::Director => "Director (narration and world-state arbitration)",
            AgentRole::Participant => "Participant character",
        };
        let mut prompt = format!("# Identity\n**Name**: {}\n**Role**: {}\n", self.name, role);
        if !self.background.is_empty() {
            prompt.push_str(&format!("\n## Background\n{}\n", self.background));
        }
        if !self.voice.is_empty() {
            prompt.push_str(&format!("\n## Voice\n{}\n", self.voice));
        }
        prompt
    }
}
