//! Context assembly.
//!
//! `assemble_context` is a pure function of session state: given the
//! same Session it always produces the same ordered segment list.
//! Participant isolation lives here — a participant sees only its own
//! memory and its own unrevealed whispers; the director sees all of
//! them.

use crate::agent::{AgentId, AgentRole};
use crate::callback::NarrativeElement;
use crate::error::{Result, TroupeError};
use crate::session::Session;

/// One ordered segment of an assembled context.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextSegment {
    /// Static identity facts for the acting agent.
    Identity { agent_id: AgentId, text: String },
    /// An agent's compressed long-term summary.
    LongTermSummary { agent_id: AgentId, text: String },
    /// An agent's short-term buffer entries, oldest first.
    ShortTermBuffer {
        agent_id: AgentId,
        entries: Vec<String>,
    },
    /// A whisper visible to the acting agent.
    Whisper {
        id: String,
        from_agent: AgentId,
        to_agent: AgentId,
        content: String,
        revealed: bool,
    },
    /// Queued observer guidance (director only).
    Nudge { content: String },
    /// A callback suggestion (director only).
    Suggestion { element: NarrativeElement },
}

/// Assembles the ordered context for `agent_id`.
///
/// Segment order is fixed: identity, own long-term summary, own
/// buffer, whispers; the director additionally gets every
/// participant's summary and buffer (participants in sorted ID order,
/// for reproducibility), all whispers, pending nudges, and callback
/// suggestions.
///
/// # Errors
///
/// Returns `NotFound` if the agent has no profile in the session.
pub fn assemble_context(
    session: &Session,
    agent_id: &AgentId,
    suggest_limit: usize,
) -> Result<Vec<ContextSegment>> {
    let profile = session
        .profiles
        .get(agent_id)
        .ok_or_else(|| TroupeError::not_found("Agent", agent_id.clone()))?;
    let memory = session
        .memories
        .get(agent_id)
        .ok_or_else(|| TroupeError::not_found("AgentMemory", agent_id.clone()))?;

    let mut segments = vec![ContextSegment::Identity {
        agent_id: agent_id.clone(),
        text: profile.to_prompt(),
    }];

    if !memory.long_term_summary.is_empty() {
        segments.push(ContextSegment::LongTermSummary {
            agent_id: agent_id.clone(),
            text: memory.long_term_summary.clone(),
        });
    }
    segments.push(ContextSegment::ShortTermBuffer {
        agent_id: agent_id.clone(),
        entries: memory.short_term_buffer.clone(),
    });

    let is_director = profile.role == AgentRole::Director;

    if is_director {
        for participant_id in session.participant_ids() {
            if let Some(other) = session.memories.get(&participant_id) {
                if !other.long_term_summary.is_empty() {
                    segments.push(ContextSegment::LongTermSummary {
                        agent_id: participant_id.clone(),
                        text: other.long_term_summary.clone(),
                    });
                }
                segments.push(ContextSegment::ShortTermBuffer {
                    agent_id: participant_id.clone(),
                    entries: other.short_term_buffer.clone(),
                });
            }
        }
    }

    for whisper in &session.whispers {
        if is_director || whisper.visible_to(agent_id) {
            segments.push(ContextSegment::Whisper {
                id: whisper.id.clone(),
                from_agent: whisper.from_agent.clone(),
                to_agent: whisper.to_agent.clone(),
                content: whisper.content.clone(),
                revealed: whisper.revealed,
            });
        }
    }

    if is_director {
        for nudge in &session.pending_nudges {
            segments.push(ContextSegment::Nudge {
                content: nudge.clone(),
            });
        }
        for element in session.callbacks.suggest(session.turn_number, suggest_limit) {
            segments.push(ContextSegment::Suggestion {
                element: element.clone(),
            });
        }
    }

    Ok(segments)
}

/// Renders assembled segments as a single prompt string.
pub fn render_context(segments: &[ContextSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            ContextSegment::Identity { text, .. } => {
                out.push_str(text);
                out.push('\n');
            }
            ContextSegment::LongTermSummary { agent_id, text } => {
                out.push_str(&format!("# Long-term memory ({agent_id})\n{text}\n\n"));
            }
            ContextSegment::ShortTermBuffer { agent_id, entries } => {
                out.push_str(&format!("# Recent events ({agent_id})\n"));
                for entry in entries {
                    out.push_str(entry);
                    out.push('\n');
                }
                out.push('\n');
            }
            ContextSegment::Whisper {
                from_agent,
                to_agent,
                content,
                revealed,
                ..
            } => {
                let tag = if *revealed { "revealed whisper" } else { "private whisper" };
                out.push_str(&format!("# {tag} ({from_agent} -> {to_agent})\n{content}\n\n"));
            }
            ContextSegment::Nudge { content } => {
                out.push_str(&format!("# Guidance from the table\n{content}\n\n"));
            }
            ContextSegment::Suggestion { element } => {
                out.push_str(&format!(
                    "# Dormant thread: {} ({})\n{}\n\n",
                    element.name,
                    element.kind_label(),
                    element.description
                ));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentProfile;

    fn session_with_whisper() -> Session {
        let mut session = Session::new(
            "Test",
            vec![
                AgentProfile::director("director", "Director"),
                AgentProfile::participant("p1", "One"),
                AgentProfile::participant("p2", "Two"),
            ],
            4096,
        )
        .unwrap();
        session
            .add_whisper(
                &"director".to_string(),
                &"p1".to_string(),
                "You hear a faint ticking.".to_string(),
            )
            .unwrap();
        session
    }

    fn whisper_count(segments: &[ContextSegment]) -> usize {
        segments
            .iter()
            .filter(|s| matches!(s, ContextSegment::Whisper { .. }))
            .count()
    }

    #[test]
    fn test_unrevealed_whisper_isolation() {
        let session = session_with_whisper();
        let p1 = assemble_context(&session, &"p1".to_string(), 5).unwrap();
        let p2 = assemble_context(&session, &"p2".to_string(), 5).unwrap();
        let director = assemble_context(&session, &"director".to_string(), 5).unwrap();
        assert_eq!(whisper_count(&p1), 1);
        assert_eq!(whisper_count(&p2), 0);
        assert_eq!(whisper_count(&director), 1);
    }

    #[test]
    fn test_revealed_whisper_visible_to_all() {
        let mut session = session_with_whisper();
        let id = session.whispers[0].id.clone();
        session.reveal_whisper(&id).unwrap();
        let p2 = assemble_context(&session, &"p2".to_string(), 5).unwrap();
        assert_eq!(whisper_count(&p2), 1);
    }

    #[test]
    fn test_participant_never_sees_other_buffers() {
        let mut session = session_with_whisper();
        session
            .memories
            .get_mut("p2")
            .unwrap()
            .push_entry("p2 secret plan".to_string());
        let p1 = assemble_context(&session, &"p1".to_string(), 5).unwrap();
        for segment in &p1 {
            if let ContextSegment::ShortTermBuffer { agent_id, .. } = segment {
                assert_eq!(agent_id, "p1");
            }
        }
    }

    #[test]
    fn test_director_sees_all_buffers() {
        let session = session_with_whisper();
        let director = assemble_context(&session, &"director".to_string(), 5).unwrap();
        let buffer_owners: Vec<&str> = director
            .iter()
            .filter_map(|s| match s {
                ContextSegment::ShortTermBuffer { agent_id, .. } => Some(agent_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(buffer_owners, vec!["director", "p1", "p2"]);
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let session = session_with_whisper();
        let a = assemble_context(&session, &"director".to_string(), 5).unwrap();
        let b = assemble_context(&session, &"director".to_string(), 5).unwrap();
        assert_eq!(a, b);
    }
}
