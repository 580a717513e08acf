//! Per-agent memory model.
//!
//! Each agent carries a compressed long-term summary plus an
//! uncompressed short-term buffer bounded by a token budget. The
//! partitioning for compression is pure; the summarization invocation
//! itself lives in the engine.

mod context;

pub use context::{ContextSegment, assemble_context, render_context};

use serde::{Deserialize, Serialize};

/// Rough token estimate: one token per four characters.
///
/// Deliberately model-agnostic; the budget is a safety bound, not an
/// exact accounting.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// One agent's memory: long-term summary plus short-term buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMemory {
    /// Compressed long-term summary. Grows only by merge, never by
    /// truncation of unprocessed information.
    #[serde(default)]
    pub long_term_summary: String,
    /// Uncompressed recent entries, oldest first.
    #[serde(default)]
    pub short_term_buffer: Vec<String>,
    /// Token budget the buffer must stay under after compression.
    pub token_budget: usize,
}

impl AgentMemory {
    /// Creates an empty memory with the given budget.
    pub fn new(token_budget: usize) -> Self {
        Self {
            long_term_summary: String::new(),
            short_term_buffer: Vec::new(),
            token_budget,
        }
    }

    /// Estimated token size of the short-term buffer.
    pub fn buffer_tokens(&self) -> usize {
        self.short_term_buffer
            .iter()
            .map(|e| estimate_tokens(e))
            .sum()
    }

    /// Whether the buffer has crossed `threshold` (a fraction of the
    /// budget) and should be compressed before the next turn.
    pub fn needs_compression(&self, threshold: f32) -> bool {
        self.buffer_tokens() as f32 >= self.token_budget as f32 * threshold
    }

    /// Appends an entry to the short-term buffer.
    pub fn push_entry(&mut self, entry: String) {
        self.short_term_buffer.push(entry);
    }

    /// Removes the most recent occurrence of `entry`, if present.
    /// Used when a not-yet-durable turn is reverted.
    pub fn remove_entry(&mut self, entry: &str) {
        if let Some(pos) = self.short_term_buffer.iter().rposition(|e| e == entry) {
            self.short_term_buffer.remove(pos);
        }
    }

    /// Partitions the buffer into `(archive, keep)`: the archive is
    /// everything except the most recent `keep_recent` entries. The
    /// kept tail shrinks further, possibly to nothing, when it alone
    /// exceeds the token budget: after a compression pass the buffer
    /// must be under budget no matter how large individual entries are.
    ///
    /// An empty archive means compression is a no-op.
    pub fn split_archive(&self, keep_recent: usize) -> (Vec<String>, Vec<String>) {
        let len = self.short_term_buffer.len();
        let mut split = len.saturating_sub(keep_recent);
        while split < len && self.tail_tokens(split) > self.token_budget {
            split += 1;
        }
        (
            self.short_term_buffer[..split].to_vec(),
            self.short_term_buffer[split..].to_vec(),
        )
    }

    fn tail_tokens(&self, split: usize) -> usize {
        self.short_term_buffer[split..]
            .iter()
            .map(|e| estimate_tokens(e))
            .sum()
    }

    /// Replaces the summary and buffer after a successful
    /// summarization pass.
    pub fn apply_compression(&mut self, merged_summary: String, keep: Vec<String>) {
        self.long_term_summary = merged_summary;
        self.short_term_buffer = keep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_needs_compression_threshold() {
        let mut memory = AgentMemory::new(10);
        memory.push_entry("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string()); // 8 tokens
        assert!(memory.needs_compression(0.8));
        assert!(!memory.needs_compression(0.9));
    }

    #[test]
    fn test_split_archive() {
        let mut memory = AgentMemory::new(100);
        for i in 0..6 {
            memory.push_entry(format!("entry {i}"));
        }
        let (archive, keep) = memory.split_archive(4);
        assert_eq!(archive, vec!["entry 0", "entry 1"]);
        assert_eq!(keep.len(), 4);
        assert_eq!(keep[0], "entry 2");
    }

    #[test]
    fn test_split_archive_small_buffer_is_noop() {
        let mut memory = AgentMemory::new(100);
        memory.push_entry("only".to_string());
        let (archive, keep) = memory.split_archive(4);
        assert!(archive.is_empty());
        assert_eq!(keep, vec!["only"]);
    }

    #[test]
    fn test_split_archive_shrinks_oversized_tail() {
        let mut memory = AgentMemory::new(10);
        for _ in 0..6 {
            memory.push_entry("x".repeat(40)); // 10 tokens each
        }
        let (archive, keep) = memory.split_archive(4);
        // Four kept entries would be 40 tokens against a budget of 10;
        // only the newest entry fits.
        assert_eq!(keep.len(), 1);
        assert_eq!(archive.len(), 5);
    }

    #[test]
    fn test_split_archive_archives_a_short_buffer_over_budget() {
        let mut memory = AgentMemory::new(5);
        memory.push_entry("x".repeat(40)); // 10 tokens
        let (archive, keep) = memory.split_archive(4);
        assert_eq!(archive.len(), 1);
        assert!(keep.is_empty());
    }

    #[test]
    fn test_remove_entry_removes_last_occurrence() {
        let mut memory = AgentMemory::new(100);
        memory.push_entry("a".to_string());
        memory.push_entry("b".to_string());
        memory.push_entry("a".to_string());
        memory.remove_entry("a");
        assert_eq!(memory.short_term_buffer, vec!["a", "b"]);
    }
}
