//! The worker agent: fetch one task, run it, report the outcome.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use silo_core::{
    unpack, ExecutionFailure, FailureKind, FunctionPackage, PackageParts, TaskId, TaskOutcome,
    TaskRegistry,
};
use tracing::{debug, error, info, warn};

use crate::api::TaskApi;
use crate::error::Result;
use crate::state::AgentState;

/// What one agent run did.
#[derive(Debug, Clone)]
pub struct AgentReport {
    pub task_id: TaskId,
    /// Terminal state.
    pub state: AgentState,
    pub outcome: TaskOutcome,
    /// Whether the host accepted the posted outcome.
    pub posted: bool,
    /// Every state the agent passed through, in order.
    pub transitions: Vec<AgentState>,
}

/// Executes exactly one task. [`run`](Agent::run) consumes the agent.
pub struct Agent {
    task_id: TaskId,
    api: Arc<dyn TaskApi>,
    registry: TaskRegistry,
    state: AgentState,
    transitions: Vec<AgentState>,
}

impl Agent {
    pub fn new(task_id: TaskId, api: Arc<dyn TaskApi>, registry: TaskRegistry) -> Self {
        Self {
            task_id,
            api,
            registry,
            state: AgentState::Idle,
            transitions: vec![AgentState::Idle],
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Run the task to completion.
    ///
    /// Returns `Err` only when the task could not be fetched or the outcome
    /// could not be encoded; nothing is posted in either case. Handler
    /// failures, panics included, are posted as error payloads and reported
    /// with state [`AgentState::Failed`].
    pub async fn run(mut self) -> Result<AgentReport> {
        self.transition(AgentState::Fetching);
        let parts = match self.api.fetch_task(&self.task_id).await {
            Ok(parts) => parts,
            Err(e) => {
                self.transition(AgentState::Failed);
                error!(task_id = %self.task_id, error = %e, "failed to fetch task");
                return Err(e);
            }
        };

        self.transition(AgentState::Executing);
        let outcome = self.execute(&parts);

        self.transition(AgentState::Reporting);
        let body = match outcome.to_body() {
            Ok(body) => body,
            Err(e) => {
                self.transition(AgentState::Failed);
                error!(task_id = %self.task_id, error = %e, "failed to encode outcome");
                return Err(e.into());
            }
        };
        let posted = match self.api.post_result(&self.task_id, body).await {
            Ok(()) => true,
            Err(e) => {
                warn!(task_id = %self.task_id, error = %e, "posting result failed");
                false
            }
        };

        let terminal = if outcome.is_output() {
            AgentState::Done
        } else {
            AgentState::Failed
        };
        self.transition(terminal);
        info!(task_id = %self.task_id, state = %terminal, posted, "agent finished");

        Ok(AgentReport {
            task_id: self.task_id,
            state: terminal,
            outcome,
            posted,
            transitions: self.transitions,
        })
    }

    fn execute(&self, parts: &PackageParts) -> TaskOutcome {
        let decoded = FunctionPackage::from_encoded_parts(parts).and_then(|p| unpack(&p));
        let (descriptor, call) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(task_id = %self.task_id, error = %e, "undecodable task package");
                return TaskOutcome::Error(ExecutionFailure::from(&e));
            }
        };

        debug!(task_id = %self.task_id, task = %descriptor, arity = call.arity(), "executing");
        let invoked = catch_unwind(AssertUnwindSafe(|| self.registry.invoke(&descriptor, &call)));
        match invoked {
            Ok(Ok(output)) => TaskOutcome::Output(output),
            Ok(Err(e)) => {
                warn!(task_id = %self.task_id, task = %descriptor, error = %e, "task failed");
                TaskOutcome::Error(e.to_failure())
            }
            Err(payload) => {
                let message = format!("handler panicked: {}", panic_message(payload.as_ref()));
                error!(task_id = %self.task_id, task = %descriptor, %message, "task panicked");
                TaskOutcome::Error(ExecutionFailure::new(FailureKind::Failed, message))
            }
        }
    }

    fn transition(&mut self, next: AgentState) {
        debug!(task_id = %self.task_id, from = %self.state, to = %next, "state transition");
        self.state = next;
        self.transitions.push(next);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
