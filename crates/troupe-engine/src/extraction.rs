//! Callback-element extraction.
//!
//! After a turn is checkpointed, the summarization role is asked for
//! any new narrative elements the turn introduced. This is a
//! best-effort side process: every failure is logged and skipped, and
//! the scheduler never waits on it across cycles.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use troupe_core::agent::{AgentInvoker, InvocationRole};
use troupe_core::callback::{ElementKind, NarrativeElement};
use troupe_core::config::EngineConfig;
use troupe_core::error::{Result, TroupeError};
use troupe_core::session::{Session, Turn};

/// One element as reported by the extraction prompt.
#[derive(Debug, Deserialize)]
struct ExtractedElement {
    kind: ElementKind,
    name: String,
    #[serde(default)]
    description: String,
}

fn extraction_prompt(turn: &Turn) -> String {
    format!(
        "List the narrative elements newly introduced in the passage \
         below: characters, items, locations, promises, threats, or \
         events that the story could call back to later. Reply with a \
         JSON array of objects with fields \"kind\" (one of \
         \"character\", \"item\", \"location\", \"promise\", \
         \"threat\", \"event\", \"other\"), \"name\", and \
         \"description\". Reply with [] if nothing qualifies.\n\n\
         # Passage (turn {}, {})\n{}\n",
        turn.turn_number, turn.acting_agent, turn.content
    )
}

/// Strips an optional Markdown code fence from model output.
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Extracts elements from `turn` and merges them into the session's
/// callback index.
///
/// Returns the number of newly inserted elements.
///
/// # Errors
///
/// Returns `ExtractionFailure` if the invocation fails, times out, or
/// returns unparseable output. Callers log and skip.
pub async fn extract_elements(
    invoker: &Arc<dyn AgentInvoker>,
    config: &EngineConfig,
    session: &mut Session,
    turn: &Turn,
) -> Result<usize> {
    let prompt = extraction_prompt(turn);
    let timeout = Duration::from_secs(config.invocation_timeout_secs);
    let director = session.director_id().clone();

    let invocation = tokio::time::timeout(
        timeout,
        invoker.invoke(&director, InvocationRole::Summarization, &prompt),
    )
    .await
    .map_err(|_| TroupeError::ExtractionFailure {
        turn_number: turn.turn_number,
        message: format!("Extraction timed out after {}s", config.invocation_timeout_secs),
    })?
    .map_err(|e| TroupeError::ExtractionFailure {
        turn_number: turn.turn_number,
        message: e.to_string(),
    })?;

    let extracted: Vec<ExtractedElement> = serde_json::from_str(strip_fence(&invocation.text))
        .map_err(|e| TroupeError::ExtractionFailure {
            turn_number: turn.turn_number,
            message: format!("Unparseable extraction output: {e}"),
        })?;

    let mut inserted = 0;
    for element in extracted {
        if session.callbacks.insert(NarrativeElement::new(
            element.kind,
            element.name,
            element.description,
            turn.turn_number,
        )) {
            inserted += 1;
        }
    }
    if inserted > 0 {
        tracing::debug!(turn = turn.turn_number, inserted, "narrative elements extracted");
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use troupe_core::agent::{AgentId, AgentProfile, Invocation};

    struct JsonInvoker(&'static str);

    #[async_trait]
    impl AgentInvoker for JsonInvoker {
        async fn invoke(
            &self,
            _agent_id: &AgentId,
            _role: InvocationRole,
            _prompt: &str,
        ) -> Result<Invocation> {
            Ok(Invocation::text(self.0))
        }
    }

    fn test_session() -> Session {
        Session::new(
            "Extraction test",
            vec![
                AgentProfile::director("director", "Director"),
                AgentProfile::participant("p1", "One"),
            ],
            4096,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_extracts_and_merges_elements() {
        let mut session = test_session();
        let turn = session
            .append_turn(
                &"director".to_string(),
                "A brass key glints under the floorboards.".to_string(),
                vec![],
            )
            .unwrap();

        let invoker: Arc<dyn AgentInvoker> = Arc::new(JsonInvoker(
            r#"[{"kind":"item","name":"brass key","description":"Found under the floorboards."}]"#,
        ));
        let inserted = extract_elements(&invoker, &EngineConfig::default(), &mut session, &turn)
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(session.callbacks.elements()[0].turn_introduced, 1);

        // A second extraction of the same element is deduplicated.
        let inserted = extract_elements(&invoker, &EngineConfig::default(), &mut session, &turn)
            .await
            .unwrap();
        assert_eq!(inserted, 0);
    }

    #[tokio::test]
    async fn test_fenced_output_is_accepted() {
        let mut session = test_session();
        let turn = session
            .append_turn(&"director".to_string(), "Narration.".to_string(), vec![])
            .unwrap();
        let invoker: Arc<dyn AgentInvoker> = Arc::new(JsonInvoker(
            "```json\n[{\"kind\":\"threat\",\"name\":\"the debt\"}]\n```",
        ));
        let inserted = extract_elements(&invoker, &EngineConfig::default(), &mut session, &turn)
            .await
            .unwrap();
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn test_unparseable_output_is_extraction_failure() {
        let mut session = test_session();
        let turn = session
            .append_turn(&"director".to_string(), "Narration.".to_string(), vec![])
            .unwrap();
        let invoker: Arc<dyn AgentInvoker> = Arc::new(JsonInvoker("not json at all"));
        let err = extract_elements(&invoker, &EngineConfig::default(), &mut session, &turn)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "extraction_failure");
        assert!(err.is_recoverable());
    }
}
