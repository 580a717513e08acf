//! Fork (alternate lineage) records.

use serde::{Deserialize, Serialize};

/// Identifier of a checkpoint lineage within a session's storage.
pub type LineageId = String;

/// The lineage a freshly created session writes to.
pub const PRIMARY_LINEAGE: &str = "main";

/// Metadata for one fork: an independent branch of session history
/// diverging from a shared ancestor checkpoint.
///
/// The fork's own checkpoints and transcript live under its lineage
/// directory; this record only describes where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkRecord {
    /// Lineage identifier (UUID).
    pub id: LineageId,
    /// Human-readable fork name.
    pub name: String,
    /// The lineage this fork was seeded from.
    pub parent_lineage: LineageId,
    /// The turn number of the ancestor checkpoint.
    pub parent_turn: u64,
    /// Creation timestamp (RFC 3339).
    pub created: String,
}

impl ForkRecord {
    /// Creates a fork record with a fresh lineage ID.
    pub fn new(name: impl Into<String>, parent_lineage: impl Into<LineageId>, parent_turn: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            parent_lineage: parent_lineage.into(),
            parent_turn,
            created: chrono::Utc::now().to_rfc3339(),
        }
    }
}
