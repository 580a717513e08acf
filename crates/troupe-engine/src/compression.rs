//! Memory compression.
//!
//! Folds the archive prefix of an agent's short-term buffer into its
//! long-term summary through the summarization role of the invocation
//! port. Synchronous and blocking by design: no turn is generated
//! while any agent is over budget.

use std::sync::Arc;
use std::time::Duration;
use troupe_core::agent::{AgentId, AgentInvoker, InvocationRole};
use troupe_core::config::EngineConfig;
use troupe_core::error::{Result, TroupeError};
use troupe_core::session::Session;

/// Builds the merge directive handed to the summarization role.
fn summarization_prompt(long_term_summary: &str, archive: &[String]) -> String {
    let mut prompt = String::from(
        "Merge the events below into the existing summary. Preserve \
         names, inventory and state facts, goals, and status effects. \
         Discard verbatim dialogue and repetitive description. Reply \
         with the merged summary only.\n",
    );
    prompt.push_str("\n# Existing summary\n");
    if long_term_summary.is_empty() {
        prompt.push_str("(none)\n");
    } else {
        prompt.push_str(long_term_summary);
        prompt.push('\n');
    }
    prompt.push_str("\n# Events to fold in\n");
    for entry in archive {
        prompt.push_str(entry);
        prompt.push('\n');
    }
    prompt
}

/// Compresses one agent's memory if its buffer has an archive prefix.
///
/// Returns `Ok(false)` when there was nothing to archive (the
/// operation is idempotent). On failure the memory is left untouched;
/// the caller proceeds with the uncompressed buffer and retries next
/// cycle.
///
/// # Errors
///
/// Returns `CompressionFailure` if the summarization invocation times
/// out or fails.
pub async fn compress_agent(
    invoker: &Arc<dyn AgentInvoker>,
    config: &EngineConfig,
    session: &mut Session,
    agent_id: &AgentId,
) -> Result<bool> {
    let memory = session
        .memories
        .get(agent_id)
        .ok_or_else(|| TroupeError::not_found("AgentMemory", agent_id.clone()))?;

    let (archive, keep) = memory.split_archive(config.keep_recent);
    if archive.is_empty() {
        return Ok(false);
    }

    let prompt = summarization_prompt(&memory.long_term_summary, &archive);
    let timeout = Duration::from_secs(config.invocation_timeout_secs);
    let invocation = tokio::time::timeout(
        timeout,
        invoker.invoke(agent_id, InvocationRole::Summarization, &prompt),
    )
    .await
    .map_err(|_| TroupeError::CompressionFailure {
        agent_id: agent_id.clone(),
        message: format!("Summarization timed out after {}s", config.invocation_timeout_secs),
    })?
    .map_err(|e| TroupeError::CompressionFailure {
        agent_id: agent_id.clone(),
        message: e.to_string(),
    })?;

    if invocation.text.trim().is_empty() {
        return Err(TroupeError::CompressionFailure {
            agent_id: agent_id.clone(),
            message: "Summarizer returned empty output".to_string(),
        });
    }

    let memory = session
        .memories
        .get_mut(agent_id)
        .ok_or_else(|| TroupeError::not_found("AgentMemory", agent_id.clone()))?;
    memory.apply_compression(invocation.text.trim().to_string(), keep);

    tracing::debug!(agent_id = %agent_id, "memory compressed");
    Ok(true)
}
