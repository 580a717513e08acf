//! Directory-backed `SessionStore` implementation.
//!
//! Stores each session under its own directory: immutable TOML
//! checkpoints per lineage, an append-only JSONL transcript per
//! lineage, and a manifest naming the primary lineage and every fork.

use crate::paths;
use crate::storage::AtomicTomlFile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write as IoWrite;
use std::path::PathBuf;
use troupe_core::error::{Result, TroupeError};
use troupe_core::session::{ForkRecord, LineageId, PRIMARY_LINEAGE, Session, SessionStore, Turn};

/// Per-session manifest: which lineage is primary, plus fork records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LineageManifest {
    /// The lineage new checkpoints go to.
    primary: Option<LineageId>,
    /// Every fork ever created (including demoted primaries).
    #[serde(default)]
    forks: Vec<ForkRecord>,
}

/// A `SessionStore` backed by a directory tree of TOML and JSONL files.
pub struct DirSessionStore {
    root: PathBuf,
}

impl DirSessionStore {
    /// Creates a store rooted at `root`, creating the directory if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Creates a store at the default location (`~/.troupe`).
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined or
    /// the directory structure cannot be created.
    pub fn default_location() -> Result<Self> {
        Self::new(paths::default_root()?)
    }

    fn manifest_file(&self, session_id: &str) -> AtomicTomlFile<LineageManifest> {
        AtomicTomlFile::new(paths::manifest_path(&self.root, session_id))
    }

    fn load_manifest(&self, session_id: &str) -> Result<LineageManifest> {
        Ok(self.manifest_file(session_id).load()?.unwrap_or_default())
    }

    fn save_manifest(&self, session_id: &str, manifest: &LineageManifest) -> Result<()> {
        self.manifest_file(session_id).save(manifest)
    }
}

#[async_trait]
impl SessionStore for DirSessionStore {
    async fn save_checkpoint(&self, lineage: &LineageId, session: &Session) -> Result<()> {
        let path = paths::checkpoint_path(&self.root, &session.id, lineage, session.turn_number);
        let file = AtomicTomlFile::<Session>::new(path.clone());
        file.save_new(session).map_err(|e| {
            TroupeError::persistence(format!("Checkpoint write failed at {path:?}: {e}"))
        })?;

        // First checkpoint of a fresh session seeds the manifest.
        let mut manifest = self.load_manifest(&session.id)?;
        if manifest.primary.is_none() {
            manifest.primary = Some(lineage.clone());
            self.save_manifest(&session.id, &manifest)?;
        }

        tracing::debug!(
            session_id = %session.id,
            lineage = %lineage,
            turn = session.turn_number,
            "checkpoint written"
        );
        Ok(())
    }

    async fn load_checkpoint(
        &self,
        session_id: &str,
        lineage: &LineageId,
        turn_number: u64,
    ) -> Result<Session> {
        let path = paths::checkpoint_path(&self.root, session_id, lineage, turn_number);
        let file = AtomicTomlFile::<Session>::new(path);

        let session = file
            .load()
            .map_err(|e| TroupeError::CorruptCheckpoint {
                session_id: session_id.to_string(),
                turn_number,
                message: e.to_string(),
            })?
            .ok_or_else(|| {
                TroupeError::not_found("Checkpoint", format!("{session_id}/{lineage}/{turn_number}"))
            })?;

        session
            .validate()
            .map_err(|e| TroupeError::CorruptCheckpoint {
                session_id: session_id.to_string(),
                turn_number,
                message: e.to_string(),
            })?;
        Ok(session)
    }

    async fn latest_turn(&self, session_id: &str, lineage: &LineageId) -> Result<Option<u64>> {
        let dir = paths::checkpoints_dir(&self.root, session_id, lineage);
        if !dir.exists() {
            return Ok(None);
        }

        let mut latest = None;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str()
                && let Some(turn) = paths::parse_checkpoint_turn(name)
            {
                latest = latest.max(Some(turn));
            }
        }
        Ok(latest)
    }

    async fn append_transcript(
        &self,
        session_id: &str,
        lineage: &LineageId,
        turn: &Turn,
    ) -> Result<()> {
        let path = paths::transcript_path(&self.root, session_id, lineage);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(turn)?;
        let mut file = OpenOptions::new().append(true).create(true).open(&path)?;
        writeln!(file, "{line}")?;
        file.sync_data()?;
        Ok(())
    }

    async fn create_fork(
        &self,
        session_id: &str,
        from_lineage: &LineageId,
        turn_number: u64,
        name: &str,
    ) -> Result<ForkRecord> {
        let source = paths::checkpoint_path(&self.root, session_id, from_lineage, turn_number);
        if !source.exists() {
            return Err(TroupeError::not_found(
                "Checkpoint",
                format!("{session_id}/{from_lineage}/{turn_number}"),
            ));
        }

        let fork = ForkRecord::new(name, from_lineage.clone(), turn_number);
        let dest = paths::checkpoint_path(&self.root, session_id, &fork.id, turn_number);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&source, &dest)?;

        let mut manifest = self.load_manifest(session_id)?;
        manifest.forks.push(fork.clone());
        self.save_manifest(session_id, &manifest)?;

        tracing::info!(
            session_id = %session_id,
            fork_id = %fork.id,
            parent_turn = turn_number,
            "fork created"
        );
        Ok(fork)
    }

    async fn promote_fork(&self, session_id: &str, fork_id: &LineageId) -> Result<()> {
        let mut manifest = self.load_manifest(session_id)?;

        let position = manifest
            .forks
            .iter()
            .position(|f| &f.id == fork_id)
            .ok_or_else(|| TroupeError::not_found("Fork", fork_id.clone()))?;
        let promoted = manifest.forks.remove(position);

        // The old primary is demoted to a fork record, never deleted.
        if let Some(old_primary) = manifest.primary.take() {
            let parent_turn = self.latest_turn(session_id, &old_primary).await?.unwrap_or(0);
            manifest.forks.push(ForkRecord {
                id: old_primary.clone(),
                name: format!("demoted-{old_primary}"),
                parent_lineage: old_primary,
                parent_turn,
                created: chrono::Utc::now().to_rfc3339(),
            });
        }
        manifest.primary = Some(promoted.id.clone());
        self.save_manifest(session_id, &manifest)?;

        tracing::info!(session_id = %session_id, fork_id = %fork_id, "fork promoted to primary");
        Ok(())
    }

    async fn delete_fork(&self, session_id: &str, fork_id: &LineageId) -> Result<()> {
        let mut manifest = self.load_manifest(session_id)?;

        if manifest.primary.as_ref() == Some(fork_id) {
            return Err(TroupeError::InvalidState(
                "Cannot delete the primary lineage".to_string(),
            ));
        }
        let position = manifest
            .forks
            .iter()
            .position(|f| &f.id == fork_id)
            .ok_or_else(|| TroupeError::not_found("Fork", fork_id.clone()))?;
        manifest.forks.remove(position);

        let dir = paths::lineage_dir(&self.root, session_id, fork_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        self.save_manifest(session_id, &manifest)?;

        tracing::info!(session_id = %session_id, fork_id = %fork_id, "fork deleted");
        Ok(())
    }

    async fn list_forks(&self, session_id: &str) -> Result<Vec<ForkRecord>> {
        Ok(self.load_manifest(session_id)?.forks)
    }

    async fn primary_lineage(&self, session_id: &str) -> Result<LineageId> {
        Ok(self
            .load_manifest(session_id)?
            .primary
            .unwrap_or_else(|| PRIMARY_LINEAGE.to_string()))
    }
}
