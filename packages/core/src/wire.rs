//! Wire types exchanged between the dispatch client, compute endpoints,
//! the content store and worker agents.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ExecutionFailure, PackageError};
use crate::package::FunctionPackage;

/// Address and symmetric key of one stored blob.
///
/// Together they can be exchanged for the original bytes. `Display` shows
/// only the address so the key stays out of logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentAddress {
    pub address: String,
    pub key: String,
}

impl ContentAddress {
    pub fn new(address: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentAddress")
            .field("address", &self.address)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Request sent to a compute endpoint.
///
/// Serialized as `{"reference": {"address", "key"}}` or
/// `{"inline": {"package": "<base64>"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionRequest {
    /// The package lives in the content store.
    Reference(ContentAddress),
    /// The package travels with the request.
    Inline { package: String },
}

impl ExecutionRequest {
    pub fn reference(address: ContentAddress) -> Self {
        ExecutionRequest::Reference(address)
    }

    pub fn inline(package: &FunctionPackage) -> Result<Self, PackageError> {
        Ok(ExecutionRequest::Inline {
            package: STANDARD.encode(package.to_bytes()?),
        })
    }

    /// Decode the embedded package of an inline request.
    ///
    /// Returns `None` for reference requests.
    pub fn inline_package(&self) -> Option<Result<FunctionPackage, PackageError>> {
        match self {
            ExecutionRequest::Reference(_) => None,
            ExecutionRequest::Inline { package } => Some(
                STANDARD
                    .decode(package)
                    .map_err(PackageError::deserialization)
                    .and_then(|bytes| FunctionPackage::from_bytes(&bytes)),
            ),
        }
    }
}

/// Response returned by a compute endpoint.
///
/// Serialized as `{"output": "<base64 json>"}` or
/// `{"error": {"kind", "message"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionResult {
    Output(String),
    Error(ExecutionFailure),
}

impl ExecutionResult {
    pub fn output(value: &Value) -> Result<Self, PackageError> {
        Ok(ExecutionResult::Output(encode_value(value)?))
    }

    /// Decode into the task's output value or its reported failure.
    pub fn into_outcome(self) -> Result<TaskOutcome, PackageError> {
        match self {
            ExecutionResult::Output(encoded) => Ok(TaskOutcome::Output(decode_value(&encoded)?)),
            ExecutionResult::Error(failure) => Ok(TaskOutcome::Error(failure)),
        }
    }
}

/// What a worker agent reports for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Output(Value),
    Error(ExecutionFailure),
}

impl TaskOutcome {
    /// Body posted to the Host Task API: base64 of the JSON outcome.
    pub fn to_body(&self) -> Result<String, PackageError> {
        let bytes = serde_json::to_vec(self).map_err(PackageError::serialization)?;
        Ok(STANDARD.encode(bytes))
    }

    pub fn from_body(body: &[u8]) -> Result<Self, PackageError> {
        let body = trim_ascii(body);
        let bytes = STANDARD
            .decode(body)
            .map_err(PackageError::deserialization)?;
        serde_json::from_slice(&bytes).map_err(PackageError::deserialization)
    }

    pub fn to_execution_result(&self) -> Result<ExecutionResult, PackageError> {
        match self {
            TaskOutcome::Output(value) => ExecutionResult::output(value),
            TaskOutcome::Error(failure) => Ok(ExecutionResult::Error(failure.clone())),
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(self, TaskOutcome::Output(_))
    }
}

/// Base64 of the JSON encoding of `value`.
pub fn encode_value(value: &Value) -> Result<String, PackageError> {
    let bytes = serde_json::to_vec(value).map_err(PackageError::serialization)?;
    Ok(STANDARD.encode(bytes))
}

/// Reverse [`encode_value`].
pub fn decode_value(encoded: &str) -> Result<Value, PackageError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(PackageError::deserialization)?;
    serde_json::from_slice(&bytes).map_err(PackageError::deserialization)
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
