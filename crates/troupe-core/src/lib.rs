//! Domain layer for the troupe orchestration core.
//!
//! Owns the Session aggregate and its invariants, the per-agent memory
//! model, the whisper and callback records, the agent invocation port,
//! and the persistence trait. Everything here is storage- and
//! transport-agnostic; the infrastructure and engine crates plug into
//! these seams.

pub mod agent;
pub mod callback;
pub mod config;
pub mod error;
pub mod memory;
pub mod session;

pub use error::{Result, TroupeError};
