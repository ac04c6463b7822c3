use std::time::Duration;

use serde_json::Value;
use silo_core::{ExecutionError, ExecutionFailure, PackageError};
use silo_store::StoreError;

/// Failures on the request/response channel to a compute endpoint.
#[derive(thiserror::Error, Debug)]
pub enum RpcError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("endpoint {endpoint} returned status {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("malformed response from {endpoint}: {message}")]
    Malformed { endpoint: String, message: String },

    /// Failure of a non-HTTP transport.
    #[error("transport error: {message}")]
    Transport { message: String },
}

/// Everything that can end a `remote`, `local` or `map` call.
#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    /// The call could not be packaged, or a result could not be decoded.
    #[error("package error: {0}")]
    Package(#[from] PackageError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    /// The task ran remotely and reported a failure.
    #[error("remote execution failed: {0}")]
    Remote(ExecutionFailure),

    /// The task failed when run in-process.
    #[error("local execution failed: {0}")]
    Local(#[from] ExecutionError),

    /// Remote and local outputs differ.
    #[error("verification failed: remote output {remote} differs from local output {local}")]
    Verification { remote: Value, local: Value },

    /// The output does not decode into the requested type.
    #[error("output decode error: {0}")]
    Output(serde_json::Error),

    #[error("dispatch cancelled")]
    Cancelled,

    #[error("dispatch timed out after {0:?}")]
    Timeout(Duration),

    #[error("endpoint pool is empty")]
    EmptyPool,

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
