//! The command/event surface of the scheduler.
//!
//! Commands flow into the scheduler through an inbox that is drained
//! only at suspension points; events flow out on a broadcast channel.
//! Both are transport-agnostic serde enums, so any boundary layer
//! (HTTP, WebSocket, in-process) can speak them unchanged.

use serde::{Deserialize, Serialize};
use troupe_core::agent::{AgentId, ToolCall};

/// Asynchronous observer commands accepted by a running scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionCommand {
    /// Begin (or resume after a stop) autonomous turn generation.
    StartAutopilot,
    /// Stop autonomous turn generation; state is kept.
    StopAutopilot,
    /// Pause generation without stopping autopilot.
    Pause,
    /// Resume from a pause.
    Resume,
    /// Change the delay between autopilot turns.
    SetSpeed { delay_ms: u64 },
    /// Take human control of an agent. Switching directly from one
    /// agent to another is a single command, no release needed.
    DropIn { agent_id: AgentId },
    /// Return the controlled agent to the AI.
    ReleaseControl,
    /// Submit the controlled agent's turn while the scheduler waits
    /// for human input.
    SubmitHumanAction { content: String },
    /// Queue free-text guidance for the director's next context.
    Nudge { content: String },
    /// Create a private whisper from the director to one participant.
    Whisper {
        from_agent: AgentId,
        to_agent: AgentId,
        content: String,
    },
    /// Reveal a whisper to all agents.
    RevealWhisper { whisper_id: String },
    /// Create a fork from the checkpoint at `turn_number`.
    CreateFork { turn_number: u64, name: String },
    /// Continue generation on a fork's lineage.
    SwitchFork { fork_id: String },
    /// Make a fork the primary lineage (pointer swap).
    PromoteFork { fork_id: String },
    /// Rewind the live session to the checkpoint at `turn_number`.
    RestoreCheckpoint { turn_number: u64 },
    /// Mark a narrative element resolved so it stops being suggested.
    ResolveElement { element_id: String },
    /// End the session permanently.
    Terminate,
}

/// Events broadcast by a running scheduler.
///
/// `TurnAppended` is emitted only after the corresponding checkpoint
/// write has succeeded, so observers never see a turn that could still
/// be lost.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A turn was appended and checkpointed.
    TurnAppended {
        turn_number: u64,
        acting_agent: AgentId,
        content: String,
        #[serde(default)]
        tool_calls: Vec<ToolCall>,
    },
    /// The scheduler is suspended waiting for a human action.
    AwaitingInput { agent_id: AgentId },
    /// Autonomous generation started.
    AutopilotStarted,
    /// Autonomous generation stopped.
    AutopilotStopped { reason: String },
    /// An error surfaced to observers.
    Error {
        kind: String,
        message: String,
        recoverable: bool,
    },
    /// A checkpoint was durably written.
    CheckpointWritten { turn_number: u64 },
    /// A whisper became visible to all agents.
    WhisperRevealed { whisper_id: String },
    /// A fork lineage was created.
    ForkCreated { fork_id: String, name: String },
    /// An agent's short-term buffer was folded into its summary.
    MemoryCompressed { agent_id: AgentId },
}
