//! Error types for the troupe orchestration core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the entire troupe workspace.
///
/// The first group of variants is the orchestration taxonomy the
/// scheduler recovers from (or halts on); the second group covers the
/// ambient storage and configuration failures. Errors are serializable
/// so they can ride on the event surface unchanged.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum TroupeError {
    /// The agent invocation exceeded its wall-clock bound.
    #[error("Invocation timed out for agent '{agent_id}' after {timeout_secs}s")]
    InvocationTimeout { agent_id: String, timeout_secs: u64 },

    /// The invocation backend returned an error or malformed output.
    #[error("Invocation failed for agent '{agent_id}': {message}")]
    InvocationFailure { agent_id: String, message: String },

    /// Memory summarization failed; the uncompressed buffer stays valid.
    #[error("Memory compression failed for agent '{agent_id}': {message}")]
    CompressionFailure { agent_id: String, message: String },

    /// Callback-element extraction failed; always non-fatal.
    #[error("Element extraction failed at turn {turn_number}: {message}")]
    ExtractionFailure { turn_number: u64, message: String },

    /// Callback detection failed; always non-fatal.
    #[error("Callback detection failed at turn {turn_number}: {message}")]
    DetectionFailure { turn_number: u64, message: String },

    /// A checkpoint or transcript write failed. Halts forward progress
    /// until a write succeeds; never corrupts existing checkpoints.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// A stored checkpoint could not be deserialized or failed its
    /// invariant checks on load.
    #[error("Corrupt checkpoint for session '{session_id}' at turn {turn_number}: {message}")]
    CorruptCheckpoint {
        session_id: String,
        turn_number: u64,
        message: String,
    },

    /// Entity not found error with type information.
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (file system operations).
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected state transition or invalid command for the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Internal error (should not happen in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TroupeError {
    /// Creates a NotFound error.
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Creates a PersistenceFailure error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceFailure(message.into())
    }

    /// Creates an InvocationFailure error.
    pub fn invocation(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvocationFailure {
            agent_id: agent_id.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable kind, used by the `error` event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvocationTimeout { .. } => "invocation_timeout",
            Self::InvocationFailure { .. } => "invocation_failure",
            Self::CompressionFailure { .. } => "compression_failure",
            Self::ExtractionFailure { .. } => "extraction_failure",
            Self::DetectionFailure { .. } => "detection_failure",
            Self::PersistenceFailure(_) => "persistence_failure",
            Self::CorruptCheckpoint { .. } => "corrupt_checkpoint",
            Self::NotFound { .. } => "not_found",
            Self::Io { .. } => "io",
            Self::Serialization { .. } => "serialization",
            Self::Config(_) => "config",
            Self::InvalidState(_) => "invalid_state",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the scheduler may recover by retrying (or restoring)
    /// without operator intervention.
    ///
    /// Invocation and compression errors are retried; extraction and
    /// detection are best-effort side effects that are always skipped;
    /// persistence failures halt forward progress but leave all
    /// written checkpoints intact.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvocationTimeout { .. }
                | Self::InvocationFailure { .. }
                | Self::CompressionFailure { .. }
                | Self::ExtractionFailure { .. }
                | Self::DetectionFailure { .. }
        )
    }

    /// Check if this is a NotFound error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<std::io::Error> for TroupeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for TroupeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for TroupeError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for TroupeError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, TroupeError>`.
pub type Result<T> = std::result::Result<T, TroupeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(
            TroupeError::InvocationTimeout {
                agent_id: "p1".to_string(),
                timeout_secs: 120,
            }
            .is_recoverable()
        );
        assert!(
            TroupeError::CompressionFailure {
                agent_id: "p1".to_string(),
                message: "backend closed".to_string(),
            }
            .is_recoverable()
        );
        assert!(!TroupeError::persistence("disk full").is_recoverable());
        assert!(
            !TroupeError::CorruptCheckpoint {
                session_id: "s".to_string(),
                turn_number: 3,
                message: "bad toml".to_string(),
            }
            .is_recoverable()
        );
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(TroupeError::persistence("x").kind(), "persistence_failure");
        assert_eq!(
            TroupeError::not_found("Session", "abc").kind(),
            "not_found"
        );
    }
}
