//! # silo-agent
//!
//! A disposable worker that executes exactly one task. The compute endpoint
//! starts it with the address of the Host Task API and a task id; the agent
//! fetches the package, resolves the task descriptor against its own
//! [`TaskRegistry`](silo_core::TaskRegistry), runs the handler and posts the
//! outcome back.
//!
//! Handler failures are reported as structured error payloads, so the host
//! always learns why a task did not produce an output.

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod state;
pub mod tasks;

pub use agent::{Agent, AgentReport};
pub use api::{HttpTaskApi, TaskApi};
pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use state::AgentState;
pub use tasks::builtin_registry;
