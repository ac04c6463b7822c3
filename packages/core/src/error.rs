//! Error types shared across the Silo packages.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::TaskDescriptor;

/// Errors raised while turning a call into a package, or a package back
/// into a call.
#[derive(Debug, Error)]
pub enum PackageError {
    /// A value could not be represented in the package format.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// Package bytes are corrupt or do not have the expected layout.
    #[error("deserialization error: {message}")]
    Deserialization { message: String },

    /// The package was produced by an incompatible packer.
    #[error("unsupported package format {found} (expected {expected})")]
    UnsupportedFormat { found: u64, expected: u64 },
}

impl PackageError {
    pub fn serialization(message: impl fmt::Display) -> Self {
        PackageError::Serialization {
            message: message.to_string(),
        }
    }

    pub fn deserialization(message: impl fmt::Display) -> Self {
        PackageError::Deserialization {
            message: message.to_string(),
        }
    }
}

/// Errors raised by a task handler, or while resolving one.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// No handler is registered for the descriptor.
    #[error("unknown task: {0}")]
    UnknownTask(TaskDescriptor),

    /// The call arguments do not fit the handler's signature.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// The handler ran and reported a failure.
    #[error("task failed: {message}")]
    Failed { message: String },
}

impl ExecutionError {
    pub fn failed(message: impl Into<String>) -> Self {
        ExecutionError::Failed {
            message: message.into(),
        }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        ExecutionError::InvalidArguments {
            message: message.into(),
        }
    }

    /// Build the structured payload reported back to the caller.
    pub fn to_failure(&self) -> ExecutionFailure {
        let kind = match self {
            ExecutionError::UnknownTask(_) => FailureKind::UnknownTask,
            ExecutionError::InvalidArguments { .. } => FailureKind::InvalidArguments,
            ExecutionError::Failed { .. } => FailureKind::Failed,
        };
        ExecutionFailure::new(kind, self.to_string())
    }
}

/// Category of a reported execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The worker has no handler for the task.
    UnknownTask,
    /// The arguments did not match the handler.
    InvalidArguments,
    /// The handler itself failed.
    Failed,
    /// The package could not be decoded.
    Package,
    /// The worker ended without producing an outcome.
    Agent,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::UnknownTask => "unknown_task",
            FailureKind::InvalidArguments => "invalid_arguments",
            FailureKind::Failed => "failed",
            FailureKind::Package => "package",
            FailureKind::Agent => "agent",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable description of a failed execution.
///
/// This is what crosses the wire in place of an output when a task fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&PackageError> for ExecutionFailure {
    fn from(error: &PackageError) -> Self {
        ExecutionFailure::new(FailureKind::Package, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_error_display() {
        let e = PackageError::UnsupportedFormat {
            found: 7,
            expected: 1,
        };
        let display = e.to_string();
        assert!(display.contains("7"));
        assert!(display.contains("expected 1"));
    }

    #[test]
    fn execution_error_to_failure() {
        let e = ExecutionError::UnknownTask(TaskDescriptor::new("missing", 2));
        let failure = e.to_failure();
        assert_eq!(failure.kind, FailureKind::UnknownTask);
        assert!(failure.message.contains("missing@v2"));

        let failure = ExecutionError::failed("boom").to_failure();
        assert_eq!(failure.kind, FailureKind::Failed);
        assert_eq!(failure.message, "task failed: boom");
    }

    #[test]
    fn failure_serializes_with_snake_case_kind() {
        let failure = ExecutionFailure::new(FailureKind::InvalidArguments, "expected 2");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "invalid_arguments");
        assert_eq!(json["message"], "expected 2");
    }

    #[test]
    fn failure_display() {
        let failure = ExecutionFailure::new(FailureKind::Agent, "exited early");
        assert_eq!(failure.to_string(), "agent: exited early");
    }
}
