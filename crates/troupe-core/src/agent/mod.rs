//! Agent domain module.
//!
//! Contains the static agent identity (`AgentProfile`) and the
//! invocation port (`AgentInvoker`) through which all narrative and
//! summarization generation happens. The port is the only seam to the
//! backing model; the core never talks to a provider directly.

mod invoker;
mod profile;

pub use invoker::{AgentInvoker, Invocation, InvocationRole, ToolCall};
pub use profile::{AgentId, AgentProfile, AgentRole};
