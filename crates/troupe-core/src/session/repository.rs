//! Session persistence trait.
//!
//! Defines the interface for checkpoint, transcript, and fork storage,
//! decoupling the scheduler from the concrete storage mechanism.

use crate::error::Result;
use crate::session::fork::{ForkRecord, LineageId};
use crate::session::model::Session;
use crate::session::turn::Turn;
use async_trait::async_trait;

/// An abstract store for session checkpoints, transcripts, and forks.
///
/// Checkpoints are complete snapshots, keyed by
/// `(session, lineage, turn_number)`, and are immutable once written:
/// `save_checkpoint` must fail rather than overwrite. The transcript
/// is a separate append-only record per turn, intended for export, and
/// is never read back by the scheduler.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Durably writes a complete snapshot of `session` at its current
    /// turn number.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailure` if the write fails or a checkpoint
    /// already exists at this turn in this lineage.
    async fn save_checkpoint(&self, lineage: &LineageId, session: &Session) -> Result<()>;

    /// Loads the snapshot at `turn_number`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no checkpoint exists at that turn, or
    /// `CorruptCheckpoint` if it cannot be deserialized or fails
    /// validation.
    async fn load_checkpoint(
        &self,
        session_id: &str,
        lineage: &LineageId,
        turn_number: u64,
    ) -> Result<Session>;

    /// The highest checkpointed turn number in a lineage, if any.
    async fn latest_turn(&self, session_id: &str, lineage: &LineageId) -> Result<Option<u64>>;

    /// Appends one turn to the lineage's transcript record.
    async fn append_transcript(
        &self,
        session_id: &str,
        lineage: &LineageId,
        turn: &Turn,
    ) -> Result<()>;

    /// Creates a fork: an independent lineage seeded by copying the
    /// checkpoint at `turn_number` from `from_lineage`.
    ///
    /// The parent lineage is untouched.
    async fn create_fork(
        &self,
        session_id: &str,
        from_lineage: &LineageId,
        turn_number: u64,
        name: &str,
    ) -> Result<ForkRecord>;

    /// Promotes a fork to primary. A pointer swap: the old primary
    /// becomes a fork record and is never deleted.
    async fn promote_fork(&self, session_id: &str, fork_id: &LineageId) -> Result<()>;

    /// Deletes a fork's checkpoints entirely. Irreversible; deleting
    /// the primary lineage is refused.
    async fn delete_fork(&self, session_id: &str, fork_id: &LineageId) -> Result<()>;

    /// Lists all fork records for a session.
    async fn list_forks(&self, session_id: &str) -> Result<Vec<ForkRecord>>;

    /// The lineage new checkpoints should go to.
    async fn primary_lineage(&self, session_id: &str) -> Result<LineageId>;
}
