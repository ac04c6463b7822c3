use silo_core::{PackageError, TaskId};

/// Errors that end an agent before it can report an outcome.
#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    /// The host does not know the task, or no longer serves it.
    #[error("task {task_id} not found (status {status})")]
    TaskNotFound { task_id: TaskId, status: u16 },

    #[error("host error: {message}")]
    Host { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// The outcome could not be encoded for posting.
    #[error("payload error: {0}")]
    Payload(#[from] PackageError),
}

impl AgentError {
    pub fn host(message: impl Into<String>) -> Self {
        AgentError::Host {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
