//! Storage layer for the troupe orchestration core.
//!
//! Implements the `SessionStore` trait from `troupe-core` on top of a
//! directory tree of immutable TOML checkpoints and append-only JSONL
//! transcripts, plus an in-memory variant for tests.

pub mod dir_store;
pub mod memory_store;
pub mod paths;
pub mod storage;

pub use dir_store::DirSessionStore;
pub use memory_store::InMemorySessionStore;
