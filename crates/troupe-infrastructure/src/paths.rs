//! Storage layout for session data.
//!
//! ```text
//! <root>/sessions/<session-id>/
//! ├── lineage.toml                     # primary pointer + fork records
//! └── lineages/<lineage-id>/
//!     ├── checkpoints/turn-000042.toml # immutable full snapshots
//!     └── transcript.jsonl             # append-only export record
//! ```

use std::path::{Path, PathBuf};
use troupe_core::{Result, TroupeError};

/// Returns the default storage root (`~/.troupe`).
///
/// # Errors
///
/// Returns a `Config` error if the home directory cannot be resolved.
pub fn default_root() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TroupeError::config("Cannot determine home directory"))?;
    Ok(home.join(".troupe"))
}

/// Directory holding one session's data.
pub fn session_dir(root: &Path, session_id: &str) -> PathBuf {
    root.join("sessions").join(session_id)
}

/// Path of the lineage manifest for a session.
pub fn manifest_path(root: &Path, session_id: &str) -> PathBuf {
    session_dir(root, session_id).join("lineage.toml")
}

/// Directory holding one lineage's checkpoints and transcript.
pub fn lineage_dir(root: &Path, session_id: &str, lineage: &str) -> PathBuf {
    session_dir(root, session_id).join("lineages").join(lineage)
}

/// Directory holding one lineage's checkpoint files.
pub fn checkpoints_dir(root: &Path, session_id: &str, lineage: &str) -> PathBuf {
    lineage_dir(root, session_id, lineage).join("checkpoints")
}

/// Path of the checkpoint file for a given turn.
pub fn checkpoint_path(root: &Path, session_id: &str, lineage: &str, turn_number: u64) -> PathBuf {
    checkpoints_dir(root, session_id, lineage).join(format!("turn-{turn_number:06}.toml"))
}

/// Path of a lineage's append-only transcript.
pub fn transcript_path(root: &Path, session_id: &str, lineage: &str) -> PathBuf {
    lineage_dir(root, session_id, lineage).join("transcript.jsonl")
}

/// Parses a turn number back out of a checkpoint file name.
pub fn parse_checkpoint_turn(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix("turn-")?
        .strip_suffix(".toml")?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_path_round_trip() {
        let path = checkpoint_path(Path::new("/data"), "s1", "main", 42);
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert_eq!(name, "turn-000042.toml");
        assert_eq!(parse_checkpoint_turn(&name), Some(42));
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert_eq!(parse_checkpoint_turn("transcript.jsonl"), None);
        assert_eq!(parse_checkpoint_turn("turn-abc.toml"), None);
    }
}
