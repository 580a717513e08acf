//! In-memory `SessionStore` for tests and embedding.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use troupe_core::error::{Result, TroupeError};
use troupe_core::session::{ForkRecord, LineageId, PRIMARY_LINEAGE, Session, SessionStore, Turn};

#[derive(Default)]
struct Inner {
    /// Checkpoints keyed by (session, lineage, turn).
    checkpoints: HashMap<(String, LineageId, u64), Session>,
    /// Transcript lines keyed by (session, lineage).
    transcripts: HashMap<(String, LineageId), Vec<Turn>>,
    /// Primary lineage per session.
    primaries: HashMap<String, LineageId>,
    /// Fork records per session.
    forks: HashMap<String, Vec<ForkRecord>>,
}

/// A `SessionStore` holding everything in memory.
///
/// Mirrors the directory store's semantics (immutable checkpoints,
/// manifest pointer swaps) without touching the filesystem. The
/// `fail_saves` switch injects `PersistenceFailure` for recovery
/// tests.
#[derive(Default)]
pub struct InMemorySessionStore {
    inner: Mutex<Inner>,
    fail_saves: AtomicBool,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every subsequent `save_checkpoint` fails.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of checkpoints stored across all lineages of a session.
    pub fn checkpoint_count(&self, session_id: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .checkpoints
            .keys()
            .filter(|(sid, _, _)| sid == session_id)
            .count()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save_checkpoint(&self, lineage: &LineageId, session: &Session) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(TroupeError::persistence("Injected save failure"));
        }
        let mut inner = self.inner.lock().unwrap();
        let key = (session.id.clone(), lineage.clone(), session.turn_number);
        if inner.checkpoints.contains_key(&key) {
            return Err(TroupeError::persistence(format!(
                "Checkpoint already exists at turn {}",
                session.turn_number
            )));
        }
        inner.checkpoints.insert(key, session.clone());
        inner
            .primaries
            .entry(session.id.clone())
            .or_insert_with(|| lineage.clone());
        Ok(())
    }

    async fn load_checkpoint(
        &self,
        session_id: &str,
        lineage: &LineageId,
        turn_number: u64,
    ) -> Result<Session> {
        let inner = self.inner.lock().unwrap();
        inner
            .checkpoints
            .get(&(session_id.to_string(), lineage.clone(), turn_number))
            .cloned()
            .ok_or_else(|| {
                TroupeError::not_found("Checkpoint", format!("{session_id}/{lineage}/{turn_number}"))
            })
    }

    async fn latest_turn(&self, session_id: &str, lineage: &LineageId) -> Result<Option<u64>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .checkpoints
            .keys()
            .filter(|(sid, lin, _)| sid == session_id && lin == lineage)
            .map(|(_, _, turn)| *turn)
            .max())
    }

    async fn append_transcript(
        &self,
        session_id: &str,
        lineage: &LineageId,
        turn: &Turn,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .transcripts
            .entry((session_id.to_string(), lineage.clone()))
            .or_default()
            .push(turn.clone());
        Ok(())
    }

    async fn create_fork(
        &self,
        session_id: &str,
        from_lineage: &LineageId,
        turn_number: u64,
        name: &str,
    ) -> Result<ForkRecord> {
        let mut inner = self.inner.lock().unwrap();
        let source = inner
            .checkpoints
            .get(&(session_id.to_string(), from_lineage.clone(), turn_number))
            .cloned()
            .ok_or_else(|| {
                TroupeError::not_found(
                    "Checkpoint",
                    format!("{session_id}/{from_lineage}/{turn_number}"),
                )
            })?;

        let fork = ForkRecord::new(name, from_lineage.clone(), turn_number);
        inner
            .checkpoints
            .insert((session_id.to_string(), fork.id.clone(), turn_number), source);
        inner
            .forks
            .entry(session_id.to_string())
            .or_default()
            .push(fork.clone());
        Ok(fork)
    }

    async fn promote_fork(&self, session_id: &str, fork_id: &LineageId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();

        let latest_old_primary = inner
            .checkpoints
            .keys()
            .filter(|(sid, lin, _)| {
                sid == session_id && Some(lin) == inner.primaries.get(session_id)
            })
            .map(|(_, _, turn)| *turn)
            .max()
            .unwrap_or(0);

        let forks = inner.forks.entry(session_id.to_string()).or_default();
        let position = forks
            .iter()
            .position(|f| &f.id == fork_id)
            .ok_or_else(|| TroupeError::not_found("Fork", fork_id.clone()))?;
        let promoted = forks.remove(position);

        if let Some(old_primary) = inner.primaries.get(session_id).cloned() {
            inner
                .forks
                .entry(session_id.to_string())
                .or_default()
                .push(ForkRecord {
                    id: old_primary.clone(),
                    name: format!("demoted-{old_primary}"),
                    parent_lineage: old_primary,
                    parent_turn: latest_old_primary,
                    created: chrono::Utc::now().to_rfc3339(),
                });
        }
        inner
            .primaries
            .insert(session_id.to_string(), promoted.id.clone());
        Ok(())
    }

    async fn delete_fork(&self, session_id: &str, fork_id: &LineageId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.primaries.get(session_id) == Some(fork_id) {
            return Err(TroupeError::InvalidState(
                "Cannot delete the primary lineage".to_string(),
            ));
        }
        let forks = inner.forks.entry(session_id.to_string()).or_default();
        let position = forks
            .iter()
            .position(|f| &f.id == fork_id)
            .ok_or_else(|| TroupeError::not_found("Fork", fork_id.clone()))?;
        forks.remove(position);
        inner
            .checkpoints
            .retain(|(sid, lin, _), _| !(sid == session_id && lin == fork_id));
        inner
            .transcripts
            .retain(|(sid, lin), _| !(sid == session_id && lin == fork_id));
        Ok(())
    }

    async fn list_forks(&self, session_id: &str) -> Result<Vec<ForkRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.forks.get(session_id).cloned().unwrap_or_default())
    }

    async fn primary_lineage(&self, session_id: &str) -> Result<LineageId> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .primaries
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| PRIMARY_LINEAGE.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use troupe_core::agent::AgentProfile;

    fn test_session() -> Session {
        Session::new(
            "Memory store test",
            vec![
                AgentProfile::director("director", "Director"),
                AgentProfile::participant("p1", "One"),
            ],
            4096,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_checkpoint_rejects_duplicate_turn() {
        let store = InMemorySessionStore::new();
        let lineage = PRIMARY_LINEAGE.to_string();
        let mut session = test_session();
        session
            .append_turn(&"director".to_string(), "One.".to_string(), vec![])
            .unwrap();

        store.save_checkpoint(&lineage, &session).await.unwrap();
        assert!(store.save_checkpoint(&lineage, &session).await.is_err());
    }

    #[tokio::test]
    async fn test_fail_saves_injection() {
        let store = InMemorySessionStore::new();
        let lineage = PRIMARY_LINEAGE.to_string();
        let session = test_session();

        store.set_fail_saves(true);
        let err = store.save_checkpoint(&lineage, &session).await.unwrap_err();
        assert_eq!(err.kind(), "persistence_failure");

        store.set_fail_saves(false);
        store.save_checkpoint(&lineage, &session).await.unwrap();
    }
}
