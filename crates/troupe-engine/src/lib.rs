//! Turn orchestration engine.
//!
//! The scheduler state machine, the command/event surface, memory
//! compression, callback extraction, and the session supervisor. The
//! domain model lives in `troupe-core`; storage backends implement
//! `troupe_core::session::SessionStore`.

pub mod command;
pub mod compression;
pub mod extraction;
pub mod scheduler;
pub mod supervisor;

pub use command::{SessionCommand, SessionEvent};
pub use scheduler::{CycleOutcome, SchedulerState, TurnScheduler};
pub use supervisor::{SessionHandle, SessionSupervisor};
