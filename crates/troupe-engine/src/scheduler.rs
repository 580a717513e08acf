//! The turn scheduler.
//!
//! One scheduler drives one session: a single-writer state machine that
//! generates turns round-robin, compresses memory before acting,
//! checkpoints every turn before broadcasting it, and drains observer
//! commands only at suspension points (between cycles and while waiting
//! for human input). A turn whose checkpoint write fails is reverted,
//! so the worst case on any failure is the loss of the turn in flight.

use crate::command::{SessionCommand, SessionEvent};
use crate::compression::compress_agent;
use crate::extraction::extract_elements;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use troupe_core::agent::{AgentId, AgentInvoker, Invocation, InvocationRole};
use troupe_core::config::EngineConfig;
use troupe_core::error::{Result, TroupeError};
use troupe_core::memory::{assemble_context, render_context};
use troupe_core::session::{LineageId, Session, SessionStore};

/// Where the scheduler currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Between cycles.
    Idle,
    /// Folding over-budget agent memories before the next turn.
    CompressingMemory,
    /// Generating the director's turn.
    DirectorTurn,
    /// Generating a participant's turn.
    ParticipantTurn,
    /// Suspended until a human submits the controlled agent's turn.
    AwaitingHumanInput,
    /// Writing the checkpoint for the turn just produced.
    Checkpointing,
    /// Generation suspended by an explicit pause command.
    Paused,
    /// Ended. A terminated scheduler never produces another turn.
    Terminated,
}

/// Result of one scheduler cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A turn was appended and durably checkpointed.
    TurnCompleted,
    /// The cycle was abandoned without a turn (control was redirected
    /// while waiting for human input). No state was lost.
    Skipped,
    /// The session ended during the cycle.
    Terminated,
}

/// What came out of a human-input wait.
enum HumanOutcome {
    /// The human submitted the controlled agent's turn.
    Action(String),
    /// Control was released; the turn falls back to the AI.
    Released,
    /// Control moved to a different agent; abandon this cycle.
    Redirected,
    /// The session ended while waiting.
    Terminated,
}

/// Drives one session: owns its state, storage handle, and inbox.
pub struct TurnScheduler {
    session: Session,
    lineage: LineageId,
    store: Arc<dyn SessionStore>,
    invoker: Arc<dyn AgentInvoker>,
    config: EngineConfig,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    state: SchedulerState,
    autopilot: bool,
    turn_delay: Duration,
    consecutive_failures: u32,
    cancel: CancellationToken,
}

impl TurnScheduler {
    /// Creates a scheduler for `session`, writing checkpoints to
    /// `lineage`.
    pub fn new(
        session: Session,
        lineage: LineageId,
        store: Arc<dyn SessionStore>,
        invoker: Arc<dyn AgentInvoker>,
        config: EngineConfig,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
        events: broadcast::Sender<SessionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let turn_delay = Duration::from_millis(config.turn_delay_ms);
        Self {
            session,
            lineage,
            store,
            invoker,
            config,
            commands,
            events,
            state: SchedulerState::Idle,
            autopilot: false,
            turn_delay,
            consecutive_failures: 0,
            cancel,
        }
    }

    /// The live session state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The lineage new checkpoints are written to.
    pub fn lineage(&self) -> &LineageId {
        &self.lineage
    }

    /// Current state-machine position.
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Whether autonomous generation is on.
    pub fn autopilot(&self) -> bool {
        self.autopilot
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine; events are observability, not control.
        let _ = self.events.send(event);
    }

    fn emit_error(&self, error: &TroupeError) {
        self.emit(SessionEvent::Error {
            kind: error.kind().to_string(),
            message: error.to_string(),
            recoverable: error.is_recoverable(),
        });
    }

    /// The main loop. Runs until terminated or cancelled.
    pub async fn run(mut self) {
        loop {
            if self.state == SchedulerState::Terminated || self.cancel.is_cancelled() {
                break;
            }
            self.drain_commands().await;
            if self.state == SchedulerState::Terminated {
                break;
            }

            if !self.autopilot || self.session.paused {
                self.state = if self.session.paused {
                    SchedulerState::Paused
                } else {
                    SchedulerState::Idle
                };
                // Nothing to generate. Block until the next command.
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        self.state = SchedulerState::Terminated;
                    }
                    command = self.commands.recv() => match command {
                        Some(command) => self.handle_command(command).await,
                        None => self.state = SchedulerState::Terminated,
                    }
                }
                continue;
            }

            match self.run_cycle().await {
                Ok(CycleOutcome::TurnCompleted) => {
                    self.consecutive_failures = 0;
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            self.state = SchedulerState::Terminated;
                        }
                        _ = tokio::time::sleep(self.turn_delay) => {}
                    }
                }
                Ok(CycleOutcome::Skipped) => {}
                Ok(CycleOutcome::Terminated) => break,
                Err(error) => {
                    self.consecutive_failures += 1;
                    tracing::warn!(
                        session_id = %self.session.id,
                        attempt = self.consecutive_failures,
                        error = %error,
                        "turn cycle failed"
                    );
                    self.emit_error(&error);
                    let exhausted = self.consecutive_failures > self.config.max_retries;
                    if !error.is_recoverable() || exhausted {
                        self.autopilot = false;
                        self.emit(SessionEvent::AutopilotStopped {
                            reason: error.to_string(),
                        });
                    } else {
                        let backoff = Duration::from_millis(
                            self.config.retry_backoff_ms * u64::from(self.consecutive_failures),
                        );
                        tokio::select! {
                            _ = self.cancel.cancelled() => {
                                self.state = SchedulerState::Terminated;
                            }
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                }
            }
        }
        tracing::info!(session_id = %self.session.id, "scheduler stopped");
    }

    /// Runs exactly one cycle: compress, act, checkpoint, broadcast.
    ///
    /// Public so the cycle can be driven deterministically without the
    /// autopilot loop.
    ///
    /// # Errors
    ///
    /// Returns the first invocation or persistence error; the session
    /// is left exactly as it was before the failed turn.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        if self.state == SchedulerState::Terminated {
            return Ok(CycleOutcome::Terminated);
        }

        self.compress_over_budget().await;

        let actor = self.session.next_actor().clone();
        let is_director = &actor == self.session.director_id();
        self.state = if is_director {
            SchedulerState::DirectorTurn
        } else {
            SchedulerState::ParticipantTurn
        };

        let human_controls_actor =
            self.session.human_active && self.session.controlled_agent.as_ref() == Some(&actor);
        let invocation = if human_controls_actor {
            match self.await_human_input(&actor).await? {
                HumanOutcome::Action(content) => Invocation::text(content),
                HumanOutcome::Released => self.invoke_actor(&actor).await?,
                HumanOutcome::Redirected => {
                    self.state = SchedulerState::Idle;
                    return Ok(CycleOutcome::Skipped);
                }
                HumanOutcome::Terminated => return Ok(CycleOutcome::Terminated),
            }
        } else {
            self.invoke_actor(&actor).await?
        };

        let turn = self
            .session
            .append_turn(&actor, invocation.text, invocation.tool_calls)?;
        let drained_nudges = if is_director {
            self.session.drain_nudges()
        } else {
            Vec::new()
        };

        // Rotate before the write so the checkpoint names the correct
        // next actor; a restored session must not replay this turn's
        // actor.
        self.session.rotate_turn_order();

        self.state = SchedulerState::Checkpointing;
        if let Err(error) = self.store.save_checkpoint(&self.lineage, &self.session).await {
            // The turn never became durable; roll it back so memory
            // and storage agree, then surface the write failure.
            self.session.rotate_turn_order_back();
            self.session.revert_last_turn();
            self.session.pending_nudges = drained_nudges;
            self.state = SchedulerState::Idle;
            return Err(error);
        }
        if let Err(error) = self
            .store
            .append_transcript(&self.session.id, &self.lineage, &turn)
            .await
        {
            tracing::warn!(
                session_id = %self.session.id,
                turn = turn.turn_number,
                error = %error,
                "transcript append failed"
            );
        }

        self.emit(SessionEvent::TurnAppended {
            turn_number: turn.turn_number,
            acting_agent: turn.acting_agent.clone(),
            content: turn.content.clone(),
            tool_calls: turn.tool_calls.clone(),
        });
        self.emit(SessionEvent::CheckpointWritten {
            turn_number: turn.turn_number,
        });

        // Callback upkeep rides behind the durable turn and never
        // blocks it; failures here are logged and skipped.
        if let Err(error) = self.session.callbacks.detect(turn.turn_number, &turn.content) {
            tracing::warn!(turn = turn.turn_number, error = %error, "callback detection skipped");
        }
        if let Err(error) =
            extract_elements(&self.invoker, &self.config, &mut self.session, &turn).await
        {
            tracing::warn!(turn = turn.turn_number, error = %error, "element extraction skipped");
        }

        self.state = SchedulerState::Idle;
        Ok(CycleOutcome::TurnCompleted)
    }

    /// Compresses every agent whose buffer has crossed the threshold.
    ///
    /// Blocking by design: no turn is generated over budget. A failed
    /// compression is reported and retried on the next cycle; the
    /// uncompressed buffer stays valid in the meantime.
    async fn compress_over_budget(&mut self) {
        let threshold = self.config.compression_threshold;
        let over_budget: Vec<AgentId> = self
            .session
            .turn_order
            .iter()
            .filter(|id| {
                self.session
                    .memories
                    .get(*id)
                    .is_some_and(|m| m.needs_compression(threshold))
            })
            .cloned()
            .collect();
        if over_budget.is_empty() {
            return;
        }

        self.state = SchedulerState::CompressingMemory;
        for agent_id in over_budget {
            match compress_agent(&self.invoker, &self.config, &mut self.session, &agent_id).await {
                Ok(true) => self.emit(SessionEvent::MemoryCompressed {
                    agent_id: agent_id.clone(),
                }),
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(agent_id = %agent_id, error = %error, "compression failed");
                    self.emit_error(&error);
                }
            }
        }
    }

    /// Assembles the actor's context and invokes it, bounded by the
    /// configured timeout.
    async fn invoke_actor(&self, actor: &AgentId) -> Result<Invocation> {
        let segments = assemble_context(&self.session, actor, self.config.suggest_limit)?;
        let prompt = render_context(&segments);
        tokio::time::timeout(
            Duration::from_secs(self.config.invocation_timeout_secs),
            self.invoker.invoke(actor, InvocationRole::Narrative, &prompt),
        )
        .await
        .map_err(|_| TroupeError::InvocationTimeout {
            agent_id: actor.clone(),
            timeout_secs: self.config.invocation_timeout_secs,
        })?
    }

    /// Suspends until the human resolves the controlled agent's turn.
    ///
    /// Every command arriving during the wait is processed; the wait
    /// ends on a submitted action, a release, a drop-in to a different
    /// agent, or termination.
    async fn await_human_input(&mut self, actor: &AgentId) -> Result<HumanOutcome> {
        self.state = SchedulerState::AwaitingHumanInput;
        self.emit(SessionEvent::AwaitingInput {
            agent_id: actor.clone(),
        });
        loop {
            let command = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.state = SchedulerState::Terminated;
                    return Ok(HumanOutcome::Terminated);
                }
                command = self.commands.recv() => command,
            };
            let Some(command) = command else {
                self.state = SchedulerState::Terminated;
                return Ok(HumanOutcome::Terminated);
            };
            match command {
                SessionCommand::SubmitHumanAction { content } => {
                    return Ok(HumanOutcome::Action(content));
                }
                SessionCommand::ReleaseControl => {
                    self.session.human_active = false;
                    self.session.controlled_agent = None;
                    return Ok(HumanOutcome::Released);
                }
                SessionCommand::DropIn { agent_id } if &agent_id != actor => {
                    self.handle_command(SessionCommand::DropIn { agent_id }).await;
                    return Ok(HumanOutcome::Redirected);
                }
                SessionCommand::Terminate => {
                    self.handle_command(SessionCommand::Terminate).await;
                    return Ok(HumanOutcome::Terminated);
                }
                other => self.handle_command(other).await,
            }
        }
    }

    /// Drains every queued command without blocking.
    ///
    /// The autopilot loop calls this between cycles; embedders driving
    /// `run_cycle` manually call it wherever their suspension points
    /// are.
    pub async fn drain_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.handle_command(command).await,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.state = SchedulerState::Terminated;
                    break;
                }
            }
        }
    }

    /// Applies one command, turning failures into error events.
    async fn handle_command(&mut self, command: SessionCommand) {
        if let Err(error) = self.apply_command(command).await {
            tracing::warn!(session_id = %self.session.id, error = %error, "command rejected");
            self.emit_error(&error);
        }
    }

    async fn apply_command(&mut self, command: SessionCommand) -> Result<()> {
        match command {
            SessionCommand::StartAutopilot => {
                self.autopilot = true;
                self.emit(SessionEvent::AutopilotStarted);
            }
            SessionCommand::StopAutopilot => {
                self.autopilot = false;
                self.emit(SessionEvent::AutopilotStopped {
                    reason: "stopped".to_string(),
                });
            }
            SessionCommand::Pause => {
                self.session.paused = true;
            }
            SessionCommand::Resume => {
                self.session.paused = false;
            }
            SessionCommand::SetSpeed { delay_ms } => {
                self.turn_delay = Duration::from_millis(delay_ms);
            }
            SessionCommand::DropIn { agent_id } => {
                if !self.session.profiles.contains_key(&agent_id) {
                    return Err(TroupeError::not_found("Agent", agent_id));
                }
                // Switching control is a plain re-target; no release
                // step in between.
                self.session.human_active = true;
                self.session.controlled_agent = Some(agent_id);
            }
            SessionCommand::ReleaseControl => {
                self.session.human_active = false;
                self.session.controlled_agent = None;
            }
            SessionCommand::SubmitHumanAction { .. } => {
                return Err(TroupeError::InvalidState(
                    "No agent is awaiting human input".to_string(),
                ));
            }
            SessionCommand::Nudge { content } => {
                self.session.push_nudge(content);
            }
            SessionCommand::Whisper {
                from_agent,
                to_agent,
                content,
            } => {
                self.session.add_whisper(&from_agent, &to_agent, content)?;
            }
            SessionCommand::RevealWhisper { whisper_id } => {
                self.session.reveal_whisper(&whisper_id)?;
                self.emit(SessionEvent::WhisperRevealed { whisper_id });
            }
            SessionCommand::CreateFork { turn_number, name } => {
                let fork = self
                    .store
                    .create_fork(&self.session.id, &self.lineage, turn_number, &name)
                    .await?;
                self.emit(SessionEvent::ForkCreated {
                    fork_id: fork.id,
                    name: fork.name,
                });
            }
            SessionCommand::SwitchFork { fork_id } => {
                let latest = self
                    .store
                    .latest_turn(&self.session.id, &fork_id)
                    .await?
                    .ok_or_else(|| TroupeError::not_found("Fork", fork_id.clone()))?;
                self.session = self
                    .store
                    .load_checkpoint(&self.session.id, &fork_id, latest)
                    .await?;
                self.lineage = fork_id;
            }
            SessionCommand::PromoteFork { fork_id } => {
                self.store.promote_fork(&self.session.id, &fork_id).await?;
            }
            SessionCommand::RestoreCheckpoint { turn_number } => {
                self.restore_checkpoint(turn_number).await?;
            }
            SessionCommand::ResolveElement { element_id } => {
                if !self.session.callbacks.mark_resolved(&element_id) {
                    return Err(TroupeError::not_found("NarrativeElement", element_id));
                }
            }
            SessionCommand::Terminate => {
                self.autopilot = false;
                self.state = SchedulerState::Terminated;
                self.emit(SessionEvent::AutopilotStopped {
                    reason: "terminated".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Rewinds the live session to the checkpoint at `turn_number`.
    ///
    /// Checkpoints are immutable, so a rewind never touches the files
    /// after the target: a fresh lineage is seeded from the target
    /// checkpoint, promoted to primary, and generation continues there.
    /// The abandoned turns stay readable in the old lineage.
    async fn restore_checkpoint(&mut self, turn_number: u64) -> Result<()> {
        let fork = self
            .store
            .create_fork(
                &self.session.id,
                &self.lineage,
                turn_number,
                &format!("restore-turn-{turn_number}"),
            )
            .await?;
        self.store.promote_fork(&self.session.id, &fork.id).await?;
        self.session = self
            .store
            .load_checkpoint(&self.session.id, &fork.id, turn_number)
            .await?;
        self.lineage = fork.id.clone();
        tracing::info!(
            session_id = %self.session.id,
            turn = turn_number,
            lineage = %fork.id,
            "session restored"
        );
        self.emit(SessionEvent::ForkCreated {
            fork_id: fork.id,
            name: fork.name,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use troupe_core::agent::AgentProfile;
    use troupe_infrastructure::InMemorySessionStore;

    /// Echoes a deterministic line per invocation and records every
    /// narrative prompt it saw.
    struct ScriptedInvoker {
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedInvoker {
        fn new() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AgentInvoker for ScriptedInvoker {
        async fn invoke(
            &self,
            agent_id: &AgentId,
            role: InvocationRole,
            prompt: &str,
        ) -> Result<Invocation> {
            match role {
                InvocationRole::Narrative => {
                    self.prompts.lock().unwrap().push(prompt.to_string());
                    Ok(Invocation::text(format!("{agent_id} acts")))
                }
                InvocationRole::Summarization => Ok(Invocation::text("[]")),
            }
        }
    }

    fn test_session() -> Session {
        Session::new(
            "Scheduler test",
            vec![
                AgentProfile::director("director", "Director"),
                AgentProfile::participant("p1", "One"),
                AgentProfile::participant("p2", "Two"),
            ],
            4096,
        )
        .unwrap()
    }

    struct Harness {
        scheduler: TurnScheduler,
        commands: mpsc::UnboundedSender<SessionCommand>,
        events: broadcast::Receiver<SessionEvent>,
        store: Arc<InMemorySessionStore>,
        invoker: Arc<ScriptedInvoker>,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemorySessionStore::new());
        let invoker = Arc::new(ScriptedInvoker::new());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = broadcast::channel(64);
        let scheduler = TurnScheduler::new(
            test_session(),
            "main".to_string(),
            store.clone(),
            invoker.clone(),
            EngineConfig::default(),
            command_rx,
            event_tx,
            CancellationToken::new(),
        );
        Harness {
            scheduler,
            commands: command_tx,
            events: event_rx,
            store,
            invoker,
        }
    }

    fn drain_events(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_cycle_rotates_and_checkpoints_every_turn() {
        let mut h = harness();
        for _ in 0..3 {
            let outcome = h.scheduler.run_cycle().await.unwrap();
            assert_eq!(outcome, CycleOutcome::TurnCompleted);
        }
        let actors: Vec<&str> = h
            .scheduler
            .session()
            .turn_log
            .iter()
            .map(|t| t.acting_agent.as_str())
            .collect();
        assert_eq!(actors, vec!["director", "p1", "p2"]);
        assert_eq!(h.store.checkpoint_count(&h.scheduler.session().id), 3);

        let events = drain_events(&mut h.events);
        let checkpoints: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::CheckpointWritten { turn_number } => Some(*turn_number),
                _ => None,
            })
            .collect();
        assert_eq!(checkpoints, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_checkpoint_failure_reverts_the_turn() {
        let mut h = harness();
        h.scheduler.run_cycle().await.unwrap();

        h.store.set_fail_saves(true);
        let err = h.scheduler.run_cycle().await.unwrap_err();
        assert_eq!(err.kind(), "persistence_failure");
        // The failed turn is gone everywhere and p1 is still up next.
        let session = h.scheduler.session();
        assert_eq!(session.turn_number, 1);
        assert_eq!(session.next_actor(), "p1");
        for memory in session.memories.values() {
            assert_eq!(memory.short_term_buffer.len(), 1);
        }

        h.store.set_fail_saves(false);
        h.scheduler.run_cycle().await.unwrap();
        assert_eq!(h.scheduler.session().turn_number, 2);
        assert_eq!(h.scheduler.session().turn_log[1].acting_agent, "p1");
    }

    #[tokio::test]
    async fn test_nudges_reach_only_the_next_director_turn() {
        let mut h = harness();
        h.commands
            .send(SessionCommand::Nudge {
                content: "introduce a storm".to_string(),
            })
            .unwrap();
        h.scheduler.drain_commands().await;

        h.scheduler.run_cycle().await.unwrap();
        assert!(h.invoker.prompts()[0].contains("introduce a storm"));
        assert!(h.scheduler.session().pending_nudges.is_empty());

        h.scheduler.run_cycle().await.unwrap();
        assert!(!h.invoker.prompts()[1].contains("introduce a storm"));
    }

    #[tokio::test]
    async fn test_drop_in_waits_for_human_action() {
        let mut h = harness();
        h.commands
            .send(SessionCommand::DropIn {
                agent_id: "director".to_string(),
            })
            .unwrap();
        h.scheduler.drain_commands().await;
        h.commands
            .send(SessionCommand::SubmitHumanAction {
                content: "I open the gates myself.".to_string(),
            })
            .unwrap();

        let outcome = h.scheduler.run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::TurnCompleted);
        let turn = &h.scheduler.session().turn_log[0];
        assert_eq!(turn.acting_agent, "director");
        assert_eq!(turn.content, "I open the gates myself.");
        // The AI was never consulted for this turn.
        assert!(h.invoker.prompts().is_empty());

        let events = drain_events(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::AwaitingInput { agent_id } if agent_id == "director"
        )));
    }

    #[tokio::test]
    async fn test_release_during_wait_falls_back_to_ai() {
        let mut h = harness();
        h.commands
            .send(SessionCommand::DropIn {
                agent_id: "director".to_string(),
            })
            .unwrap();
        h.scheduler.drain_commands().await;
        h.commands.send(SessionCommand::ReleaseControl).unwrap();

        h.scheduler.run_cycle().await.unwrap();
        assert_eq!(h.scheduler.session().turn_log[0].content, "director acts");
        assert!(!h.scheduler.session().human_active);
    }

    #[tokio::test]
    async fn test_restore_rewinds_onto_a_fresh_lineage() {
        let mut h = harness();
        for _ in 0..3 {
            h.scheduler.run_cycle().await.unwrap();
        }
        let old_lineage = h.scheduler.lineage().clone();

        h.scheduler
            .apply_command(SessionCommand::RestoreCheckpoint { turn_number: 2 })
            .await
            .unwrap();
        assert_eq!(h.scheduler.session().turn_number, 2);
        assert_ne!(h.scheduler.lineage(), &old_lineage);
        let session_id = h.scheduler.session().id.clone();
        assert_eq!(
            h.store.primary_lineage(&session_id).await.unwrap(),
            *h.scheduler.lineage()
        );

        // Turn 3 regenerates on the new lineage; the abandoned turn 3
        // checkpoint on the old lineage is untouched.
        h.scheduler.run_cycle().await.unwrap();
        assert_eq!(h.scheduler.session().turn_number, 3);
        assert!(
            h.store
                .load_checkpoint(&session_id, &old_lineage, 3)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_submit_without_wait_is_rejected() {
        let mut h = harness();
        h.commands
            .send(SessionCommand::SubmitHumanAction {
                content: "out of band".to_string(),
            })
            .unwrap();
        h.scheduler.drain_commands().await;

        let events = drain_events(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Error { kind, .. } if kind == "invalid_state"
        )));
        assert_eq!(h.scheduler.session().turn_number, 0);
    }

    #[tokio::test]
    async fn test_terminate_ends_the_machine() {
        let mut h = harness();
        h.commands.send(SessionCommand::Terminate).unwrap();
        h.scheduler.drain_commands().await;
        assert_eq!(h.scheduler.state(), SchedulerState::Terminated);
        assert_eq!(
            h.scheduler.run_cycle().await.unwrap(),
            CycleOutcome::Terminated
        );
    }
}
