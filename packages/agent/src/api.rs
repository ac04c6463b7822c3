//! Client side of the Host Task API.
//!
//! ```text
//! GET  {host}/api/tasks/{task_id}    -> 200 {"func", "args", "kwargs"}
//! POST {host}/api/results/{task_id}  <- base64(json(outcome))
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use silo_core::{PackageParts, TaskId};
use url::Url;

use crate::error::{AgentError, Result};

/// Where an agent gets its task and sends its outcome.
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn fetch_task(&self, task_id: &TaskId) -> Result<PackageParts>;

    async fn post_result(&self, task_id: &TaskId, body: String) -> Result<()>;
}

/// [`TaskApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTaskApi {
    client: Client,
    base: Url,
}

impl HttpTaskApi {
    pub fn new(host_link: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(host_link)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    /// Create with default timeout of 30 seconds.
    pub fn with_default_timeout(host_link: &str) -> Result<Self> {
        Self::new(host_link, Duration::from_secs(30))
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn fetch_task(&self, task_id: &TaskId) -> Result<PackageParts> {
        let url = self.base.join(&format!("api/tasks/{}", task_id))?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::TaskNotFound {
                task_id: task_id.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| AgentError::host(format!("malformed task {}: {}", task_id, e)))
    }

    async fn post_result(&self, task_id: &TaskId, body: String) -> Result<()> {
        let url = self.base.join(&format!("api/results/{}", task_id))?;
        let response = self.client.post(url).body(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::host(format!(
                "result for {} rejected with status {}",
                task_id,
                status.as_u16()
            )));
        }
        Ok(())
    }
}
