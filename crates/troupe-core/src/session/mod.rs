//! Session domain module.
//!
//! All session-related domain models and the persistence interface.
//!
//! # Module Structure
//!
//! - `model`: the Session root aggregate
//! - `turn`: immutable turn records
//! - `whisper`: private director-to-participant messages
//! - `fork`: lineage/fork metadata
//! - `repository`: the `SessionStore` persistence trait

mod fork;
mod model;
mod repository;
mod turn;
mod whisper;

pub use fork::{ForkRecord, LineageId, PRIMARY_LINEAGE};
pub use model::Session;
pub use repository::SessionStore;
pub use turn::Turn;
pub use whisper::Whisper;
