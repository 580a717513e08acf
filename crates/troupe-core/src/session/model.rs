//! Session domain model.
//!
//! The Session is the root aggregate: it owns the append-only turn
//! log, the turn order, every agent's memory, pending whispers, the
//! callback index, and the human-control flags. All invariants are
//! enforced at construction and by the mutation methods here; there is
//! no wrapper/validation layer on top.

use crate::agent::{AgentId, AgentProfile, AgentRole, ToolCall};
use crate::callback::CallbackIndex;
use crate::error::{Result, TroupeError};
use crate::memory::AgentMemory;
use crate::session::turn::Turn;
use crate::session::whisper::Whisper;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A complete narrative session.
///
/// Invariants:
/// - `turn_number` always equals `turn_log.len()`; the log is only
///   ever appended to.
/// - `turn_order` is non-empty and contains the single director agent.
///   It rotates as turns complete, so the director is at the head only
///   at the start of each round.
/// - Every agent in `turn_order` has a profile and a memory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (UUID format).
    pub id: String,
    /// Human-readable session title.
    pub title: String,
    /// Timestamp when the session was created (RFC 3339).
    pub created_at: String,
    /// Timestamp when the session was last updated (RFC 3339).
    pub updated_at: String,
    /// Round-robin turn order, director first.
    pub turn_order: Vec<AgentId>,
    /// Append-only log of every turn produced so far.
    #[serde(default)]
    pub turn_log: Vec<Turn>,
    /// Static identity facts per agent.
    pub profiles: HashMap<AgentId, AgentProfile>,
    /// Per-agent memory (compressed summary + short-term buffer).
    pub memories: HashMap<AgentId, AgentMemory>,
    /// All whispers created in this session, revealed or not.
    #[serde(default)]
    pub whispers: Vec<Whisper>,
    /// Narrative elements extracted from turns.
    #[serde(default)]
    pub callbacks: CallbackIndex,
    /// Free-text director guidance queued by observers, drained into
    /// the director's next assembled context.
    #[serde(default)]
    pub pending_nudges: Vec<String>,
    /// Whether a human currently has control of an agent.
    #[serde(default)]
    pub human_active: bool,
    /// The agent the human controls, if any.
    #[serde(default)]
    pub controlled_agent: Option<AgentId>,
    /// Whether autopilot is paused.
    #[serde(default)]
    pub paused: bool,
    /// Number of turns appended so far. Equals `turn_log.len()`.
    #[serde(default)]
    pub turn_number: u64,
}

impl Session {
    /// Creates a new session from agent profiles.
    ///
    /// The turn order is derived from `profiles` order: the director
    /// first, then every participant in the order given.
    ///
    /// # Arguments
    ///
    /// * `title` - Human-readable session title
    /// * `profiles` - One director plus N participants
    /// * `token_budget` - Per-agent short-term memory budget
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if there is not exactly one director
    /// or if agent IDs collide.
    pub fn new(title: impl Into<String>, profiles: Vec<AgentProfile>, token_budget: usize) -> Result<Self> {
        let directors: Vec<&AgentProfile> = profiles
            .iter()
            .filter(|p| p.role == AgentRole::Director)
            .collect();
        if directors.len() != 1 {
            return Err(TroupeError::config(format!(
                "A session needs exactly one director, got {}",
                directors.len()
            )));
        }
        let director_id = directors[0].id.clone();

        let mut turn_order = vec![director_id.clone()];
        turn_order.extend(
            profiles
                .iter()
                .filter(|p| p.role == AgentRole::Participant)
                .map(|p| p.id.clone()),
        );

        let mut profile_map = HashMap::new();
        let mut memories = HashMap::new();
        for profile in profiles {
            if profile_map.contains_key(&profile.id) {
                return Err(TroupeError::config(format!(
                    "Duplicate agent ID '{}'",
                    profile.id
                )));
            }
            memories.insert(profile.id.clone(), AgentMemory::new(token_budget));
            profile_map.insert(profile.id.clone(), profile);
        }

        let now = chrono::Utc::now().to_rfc3339();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            created_at: now.clone(),
            updated_at: now,
            turn_order,
            turn_log: Vec::new(),
            profiles: profile_map,
            memories,
            whispers: Vec::new(),
            callbacks: CallbackIndex::default(),
            pending_nudges: Vec::new(),
            human_active: false,
            controlled_agent: None,
            paused: false,
            turn_number: 0,
        })
    }

    /// Checks the aggregate invariants.
    ///
    /// Called after deserializing a checkpoint; a violation means the
    /// stored snapshot is corrupt.
    pub fn validate(&self) -> Result<()> {
        if self.turn_number != self.turn_log.len() as u64 {
            return Err(TroupeError::internal(format!(
                "turn_number {} does not match log length {}",
                self.turn_number,
                self.turn_log.len()
            )));
        }
        if self.turn_order.is_empty() {
            return Err(TroupeError::internal("Empty turn order"));
        }
        let mut directors = 0;
        for agent_id in &self.turn_order {
            let Some(profile) = self.profiles.get(agent_id) else {
                return Err(TroupeError::internal(format!(
                    "Agent '{agent_id}' in turn order has no profile"
                )));
            };
            if profile.role == AgentRole::Director {
                directors += 1;
            }
            if !self.memories.contains_key(agent_id) {
                return Err(TroupeError::internal(format!(
                    "Agent '{agent_id}' in turn order has no memory"
                )));
            }
        }
        if directors != 1 {
            return Err(TroupeError::internal(format!(
                "Expected one director in the turn order, got {directors}"
            )));
        }
        Ok(())
    }

    /// The director's agent ID, wherever the rotation has put it.
    pub fn director_id(&self) -> &AgentId {
        self.turn_order
            .iter()
            .find(|id| {
                matches!(self.profiles.get(*id), Some(p) if p.role == AgentRole::Director)
            })
            // Validated at construction: the director is always present.
            .unwrap_or(&self.turn_order[0])
    }

    /// The agent whose turn comes next (head of the rotation).
    pub fn next_actor(&self) -> &AgentId {
        &self.turn_order[0]
    }

    /// Rotates the turn order when a turn completes: the head moves to
    /// the tail, yielding `[director, p1, ..., pN, director, p1, ...]`
    /// over time.
    pub fn rotate_turn_order(&mut self) {
        let head = self.turn_order.remove(0);
        self.turn_order.push(head);
    }

    /// Undoes one rotation. Used when the turn being finalized fails
    /// to persist and its actor must come up again.
    pub fn rotate_turn_order_back(&mut self) {
        if let Some(tail) = self.turn_order.pop() {
            self.turn_order.insert(0, tail);
        }
    }

    /// Appends a turn for `acting_agent` and records it in the agent
    /// memories: the acting agent and every other agent receive the
    /// turn as a short-term buffer entry (all agents witness the
    /// public narration; privacy applies to whispers, not turns).
    ///
    /// Returns the appended turn.
    pub fn append_turn(
        &mut self,
        acting_agent: &AgentId,
        content: String,
        tool_calls: Vec<ToolCall>,
    ) -> Result<Turn> {
        if !self.profiles.contains_key(acting_agent) {
            return Err(TroupeError::not_found("Agent", acting_agent.clone()));
        }
        let turn = Turn::new(self.turn_number + 1, acting_agent.clone(), content, tool_calls);

        let entry = format!("[turn {}] {}: {}", turn.turn_number, acting_agent, turn.content);
        for agent_id in &self.turn_order {
            if let Some(memory) = self.memories.get_mut(agent_id) {
                memory.push_entry(entry.clone());
            }
        }

        self.turn_log.push(turn.clone());
        self.turn_number += 1;
        self.updated_at = chrono::Utc::now().to_rfc3339();
        Ok(turn)
    }

    /// Removes the most recent turn from the log.
    ///
    /// Only valid for a turn whose checkpoint write failed: the turn
    /// was never durable, so dropping it keeps the in-memory state in
    /// line with storage. The append-only invariant applies to
    /// checkpointed turns.
    pub fn revert_last_turn(&mut self) -> Option<Turn> {
        let turn = self.turn_log.pop()?;
        self.turn_number -= 1;
        let entry = format!("[turn {}] {}: {}", turn.turn_number, turn.acting_agent, turn.content);
        for memory in self.memories.values_mut() {
            memory.remove_entry(&entry);
        }
        Some(turn)
    }

    /// Creates a whisper from the director to one participant.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender is not the director or the
    /// target is not a participant in this session.
    pub fn add_whisper(
        &mut self,
        from_agent: &AgentId,
        to_agent: &AgentId,
        content: String,
    ) -> Result<&Whisper> {
        if from_agent != self.director_id() {
            return Err(TroupeError::InvalidState(format!(
                "Only the director may whisper, got '{from_agent}'"
            )));
        }
        match self.profiles.get(to_agent) {
            Some(p) if p.role == AgentRole::Participant => {}
            Some(_) => {
                return Err(TroupeError::InvalidState(
                    "Whispers target a participant, not the director".to_string(),
                ));
            }
            None => return Err(TroupeError::not_found("Agent", to_agent.clone())),
        }
        let whisper = Whisper::new(from_agent.clone(), to_agent.clone(), content, self.turn_number);
        self.whispers.push(whisper);
        Ok(self.whispers.last().unwrap())
    }

    /// Reveals a whisper, making it visible to all agents from the
    /// current turn on.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no whisper has the given ID.
    pub fn reveal_whisper(&mut self, whisper_id: &str) -> Result<&Whisper> {
        let turn = self.turn_number;
        let whisper = self
            .whispers
            .iter_mut()
            .find(|w| w.id == whisper_id)
            .ok_or_else(|| TroupeError::not_found("Whisper", whisper_id))?;
        if !whisper.revealed {
            whisper.revealed = true;
            whisper.turn_revealed = Some(turn);
        }
        Ok(whisper)
    }

    /// Queues a nudge for the director's next context.
    pub fn push_nudge(&mut self, content: String) {
        self.pending_nudges.push(content);
    }

    /// Drains all pending nudges.
    pub fn drain_nudges(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_nudges)
    }

    /// Participant agent IDs in turn-order position (excluding the
    /// director, independent of the current rotation).
    pub fn participant_ids(&self) -> Vec<AgentId> {
        let director = self.director_id().clone();
        let mut ids: Vec<AgentId> = self
            .turn_order
            .iter()
            .filter(|id| **id != director)
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}
