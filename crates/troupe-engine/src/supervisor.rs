//! Session supervisor.
//!
//! Owns every running scheduler: spawns one task per session, hands out
//! command/event handles, and resumes sessions from their latest
//! checkpoint on the primary lineage.

use crate::command::{SessionCommand, SessionEvent};
use crate::scheduler::TurnScheduler;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use troupe_core::agent::{AgentInvoker, AgentProfile};
use troupe_core::config::EngineConfig;
use troupe_core::error::{Result, TroupeError};
use troupe_core::session::{LineageId, PRIMARY_LINEAGE, Session, SessionStore};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A handle to one running session: the command inbox plus the event
/// broadcast. Cheap to clone behind an `Arc`; dropping it does not stop
/// the session.
#[derive(Debug)]
pub struct SessionHandle {
    session_id: String,
    commands: mpsc::UnboundedSender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    /// The session this handle controls.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Queues a command for the scheduler. Commands are applied at the
    /// scheduler's next suspension point, never mid-turn.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the session has already stopped.
    pub fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| {
            TroupeError::InvalidState(format!("Session '{}' is not running", self.session_id))
        })
    }

    /// Subscribes to the session's event stream. Slow subscribers that
    /// fall behind the channel capacity miss events, never block the
    /// scheduler.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

/// Spawns and tracks one scheduler task per live session.
pub struct SessionSupervisor {
    store: Arc<dyn SessionStore>,
    invoker: Arc<dyn AgentInvoker>,
    config: EngineConfig,
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionSupervisor {
    /// Creates a supervisor over the given store and invocation port.
    pub fn new(
        store: Arc<dyn SessionStore>,
        invoker: Arc<dyn AgentInvoker>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            invoker,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a brand-new session and starts its scheduler.
    ///
    /// The empty session is checkpointed at turn zero before the
    /// scheduler starts, so forks and restores always have a base.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile set is invalid or the initial
    /// checkpoint cannot be written.
    pub async fn spawn_session(
        &self,
        title: impl Into<String>,
        profiles: Vec<AgentProfile>,
    ) -> Result<Arc<SessionHandle>> {
        let session = Session::new(title, profiles, self.config.token_budget)?;
        let lineage: LineageId = PRIMARY_LINEAGE.to_string();
        self.store.save_checkpoint(&lineage, &session).await?;
        self.spawn(session, lineage).await
    }

    /// Resumes a stopped session from the latest checkpoint on its
    /// primary lineage.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session has no checkpoints, or
    /// `InvalidState` if it is already running.
    pub async fn resume_session(&self, session_id: &str) -> Result<Arc<SessionHandle>> {
        let lineage = self.store.primary_lineage(session_id).await?;
        let latest = self
            .store
            .latest_turn(session_id, &lineage)
            .await?
            .ok_or_else(|| TroupeError::not_found("Session", session_id))?;
        let session = self.store.load_checkpoint(session_id, &lineage, latest).await?;
        self.spawn(session, lineage).await
    }

    async fn spawn(&self, session: Session, lineage: LineageId) -> Result<Arc<SessionHandle>> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(TroupeError::InvalidState(format!(
                "Session '{}' is already running",
                session.id
            )));
        }

        let session_id = session.id.clone();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let scheduler = TurnScheduler::new(
            session,
            lineage,
            self.store.clone(),
            self.invoker.clone(),
            self.config.clone(),
            command_rx,
            event_tx.clone(),
            cancel.clone(),
        );
        let task = tokio::spawn(scheduler.run());
        tracing::info!(session_id = %session_id, "session started");

        let handle = Arc::new(SessionHandle {
            session_id: session_id.clone(),
            commands: command_tx,
            events: event_tx,
            cancel,
            task: Mutex::new(Some(task)),
        });
        sessions.insert(session_id, handle.clone());
        Ok(handle)
    }

    /// The handle for a running session, if any.
    pub async fn handle(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// IDs of every running session.
    pub async fn running_sessions(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Stops one session's scheduler and waits for it to finish. The
    /// session stays resumable from its latest checkpoint.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session is not running.
    pub async fn stop_session(&self, session_id: &str) -> Result<()> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| TroupeError::not_found("Session", session_id))?;
        handle.cancel.cancel();
        if let Some(task) = handle.task.lock().await.take()
            && let Err(error) = task.await
        {
            tracing::warn!(session_id, error = %error, "scheduler task panicked");
        }
        tracing::info!(session_id, "session stopped");
        Ok(())
    }

    /// Stops every running session.
    pub async fn shutdown(&self) {
        let ids = self.running_sessions().await;
        for session_id in ids {
            if let Err(error) = self.stop_session(&session_id).await {
                tracing::warn!(session_id = %session_id, error = %error, "stop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use troupe_core::agent::{AgentId, Invocation, InvocationRole};
    use troupe_infrastructure::InMemorySessionStore;

    struct EchoInvoker;

    #[async_trait]
    impl AgentInvoker for EchoInvoker {
        async fn invoke(
            &self,
            agent_id: &AgentId,
            role: InvocationRole,
            _prompt: &str,
        ) -> Result<Invocation> {
            match role {
                InvocationRole::Narrative => Ok(Invocation::text(format!("{agent_id} acts"))),
                InvocationRole::Summarization => Ok(Invocation::text("[]")),
            }
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            turn_delay_ms: 1,
            ..EngineConfig::default()
        }
    }

    fn profiles() -> Vec<AgentProfile> {
        vec![
            AgentProfile::director("director", "Director"),
            AgentProfile::participant("p1", "One"),
        ]
    }

    async fn next_turn_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event channel closed");
            if matches!(event, SessionEvent::TurnAppended { .. }) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_spawn_runs_autopilot_until_stopped() {
        let store = Arc::new(InMemorySessionStore::new());
        let supervisor =
            SessionSupervisor::new(store.clone(), Arc::new(EchoInvoker), fast_config());

        let handle = supervisor.spawn_session("Run test", profiles()).await.unwrap();
        let mut events = handle.subscribe();
        handle.send(SessionCommand::StartAutopilot).unwrap();

        let SessionEvent::TurnAppended {
            turn_number,
            acting_agent,
            ..
        } = next_turn_event(&mut events).await
        else {
            unreachable!()
        };
        assert_eq!(turn_number, 1);
        assert_eq!(acting_agent, "director");

        supervisor.stop_session(handle.session_id()).await.unwrap();
        assert!(supervisor.handle(handle.session_id()).await.is_none());
        // Commands after shutdown are rejected.
        assert!(handle.send(SessionCommand::StartAutopilot).is_err());
    }

    #[tokio::test]
    async fn test_resume_picks_up_latest_checkpoint() {
        let store = Arc::new(InMemorySessionStore::new());
        let supervisor =
            SessionSupervisor::new(store.clone(), Arc::new(EchoInvoker), fast_config());

        let handle = supervisor.spawn_session("Resume test", profiles()).await.unwrap();
        let session_id = handle.session_id().to_string();
        let mut events = handle.subscribe();
        handle.send(SessionCommand::StartAutopilot).unwrap();
        next_turn_event(&mut events).await;
        next_turn_event(&mut events).await;
        supervisor.stop_session(&session_id).await.unwrap();

        let resumed = supervisor.resume_session(&session_id).await.unwrap();
        let mut events = resumed.subscribe();
        resumed.send(SessionCommand::StartAutopilot).unwrap();
        let SessionEvent::TurnAppended { turn_number, .. } = next_turn_event(&mut events).await
        else {
            unreachable!()
        };
        assert!(turn_number >= 3);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_spawn_is_rejected() {
        let store = Arc::new(InMemorySessionStore::new());
        let supervisor =
            SessionSupervisor::new(store.clone(), Arc::new(EchoInvoker), fast_config());

        let handle = supervisor.spawn_session("Dup test", profiles()).await.unwrap();
        let session_id = handle.session_id().to_string();
        let err = supervisor.resume_session(&session_id).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_resume_unknown_session_is_not_found() {
        let store = Arc::new(InMemorySessionStore::new());
        let supervisor = SessionSupervisor::new(store, Arc::new(EchoInvoker), fast_config());
        let err = supervisor.resume_session("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
