//! Transport to compute endpoints.
//!
//! The dispatch client talks to endpoints through the [`Executor`] trait so
//! tests and in-process clusters can stand in for the network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use silo_core::{ExecutionRequest, ExecutionResult};

use crate::error::RpcError;
use crate::pool::Endpoint;

/// Header carrying the endpoint API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Path of the execute operation, relative to the endpoint base URL.
pub const EXECUTE_PATH: &str = "api/execute";

/// Sends one [`ExecutionRequest`] to one endpoint.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        endpoint: &Endpoint,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, RpcError>;
}

/// Production executor: JSON over HTTP with reqwest.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    pub fn new(timeout: Duration) -> Result<Self, RpcError> {
        Self::build(timeout, HeaderMap::new())
    }

    /// Create with default timeout of 30 seconds.
    pub fn with_default_timeout() -> Result<Self, RpcError> {
        Self::new(Duration::from_secs(30))
    }

    /// Executor that sends `api_key` with every request.
    pub fn with_api_key(timeout: Duration, api_key: &str) -> Result<Self, RpcError> {
        let mut headers = HeaderMap::new();
        let mut value = HeaderValue::from_str(api_key)?;
        value.set_sensitive(true);
        headers.insert(API_KEY_HEADER, value);
        Self::build(timeout, headers)
    }

    fn build(timeout: Duration, headers: HeaderMap) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(
        &self,
        endpoint: &Endpoint,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, RpcError> {
        let url = endpoint.url().join(EXECUTE_PATH)?;
        let response = self.client.post(url).json(request).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RpcError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| RpcError::Malformed {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}
