//! Engine configuration.
//!
//! All knobs the scheduler and memory store consult live here, loadable
//! from a TOML file with serde field defaults so a partial file works.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunable parameters for a running session engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-agent short-term buffer budget, in estimated tokens.
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    /// Fraction of `token_budget` at which compression triggers.
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: f32,
    /// Number of most recent buffer entries kept verbatim by compression.
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
    /// Wall-clock bound on a single agent invocation, in seconds.
    #[serde(default = "default_invocation_timeout_secs")]
    pub invocation_timeout_secs: u64,
    /// Delay between autopilot turns, in milliseconds.
    #[serde(default = "default_turn_delay_ms")]
    pub turn_delay_ms: u64,
    /// Retry attempts for a recoverable invocation error before the
    /// scheduler surfaces it and stops autopilot.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff between retries, in milliseconds (linear).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Maximum callback suggestions injected into the director context.
    #[serde(default = "default_suggest_limit")]
    pub suggest_limit: usize,
}

fn default_token_budget() -> usize {
    4096
}

fn default_compression_threshold() -> f32 {
    0.8
}

fn default_keep_recent() -> usize {
    4
}

fn default_invocation_timeout_secs() -> u64 {
    180
}

fn default_turn_delay_ms() -> u64 {
    2000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_suggest_limit() -> usize {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            compression_threshold: default_compression_threshold(),
            keep_recent: default_keep_recent(),
            invocation_timeout_secs: default_invocation_timeout_secs(),
            turn_delay_ms: default_turn_delay_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            suggest_limit: default_suggest_limit(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    ///
    /// Missing fields fall back to their defaults; a missing file is a
    /// configuration error (callers wanting pure defaults use
    /// `EngineConfig::default()`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.token_budget, 4096);
        assert!((config.compression_threshold - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.keep_recent, 4);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str("token_budget = 1024").unwrap();
        assert_eq!(config.token_budget, 1024);
        assert_eq!(config.keep_recent, 4);
        assert_eq!(config.turn_delay_ms, 2000);
    }
}
