use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a worker agent.
///
/// ```text
/// Idle -> Fetching -> Executing -> Reporting -> Done
///            │                          │
///            └────────> Failed <────────┘
/// ```
///
/// A failed fetch ends in `Failed` without reporting. A failed execution
/// still reports its error payload and then ends in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Fetching,
    Executing,
    Reporting,
    Done,
    Failed,
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Done | AgentState::Failed)
    }

    /// Process exit code for a terminal state.
    pub fn exit_code(&self) -> i32 {
        match self {
            AgentState::Done => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Idle => "idle",
            AgentState::Fetching => "fetching",
            AgentState::Executing => "executing",
            AgentState::Reporting => "reporting",
            AgentState::Done => "done",
            AgentState::Failed => "failed",
        };
        f.write_str(s)
    }
}
