//! HTTP surface of a [`LocalEndpoint`].
//!
//! ```text
//! POST /api/execute            ExecutionRequest -> ExecutionResult
//! GET  /api/tasks/{task_id}    -> {"func", "args", "kwargs"}
//! POST /api/results/{task_id}  <- base64(json(outcome))
//! ```
//!
//! When the server has an API key, `/api/execute` requires it in the
//! `x-api-key` header. The task routes belong to worker agents and are not
//! keyed.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use silo_core::{ExecutionRequest, TaskId};
use silo_dispatch::{API_KEY_HEADER, EXECUTE_PATH};
use silo_store::StoreError;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::board::BoardError;
use crate::endpoint::LocalEndpoint;

#[derive(thiserror::Error, Debug)]
pub enum ServeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
struct ServerState {
    endpoint: Arc<LocalEndpoint>,
    api_key: Option<Arc<str>>,
}

/// Routes for one endpoint. `api_key`, when set, guards `/api/execute`.
pub fn router(endpoint: Arc<LocalEndpoint>, api_key: Option<String>) -> Router {
    let state = ServerState {
        endpoint,
        api_key: api_key.map(Arc::from),
    };
    Router::new()
        .route(&format!("/{}", EXECUTE_PATH), post(execute))
        .route("/api/tasks/{task_id}", get(fetch_task))
        .route("/api/results/{task_id}", post(post_result))
        .with_state(state)
}

async fn execute(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(request): Json<ExecutionRequest>,
) -> Response {
    if let Some(expected) = &state.api_key {
        let presented = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_ref()) {
            warn!("execute request without a valid api key");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    match state.endpoint.handle(&request).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn fetch_task(State(state): State<ServerState>, Path(task_id): Path<String>) -> Response {
    let task_id = TaskId::from(task_id);
    match state.endpoint.board().claim(&task_id) {
        Ok(parts) => {
            debug!(task_id = %task_id, "task handed to agent");
            Json(parts).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn post_result(
    State(state): State<ServerState>,
    Path(task_id): Path<String>,
    body: String,
) -> Response {
    let task_id = TaskId::from(task_id);
    match state.endpoint.board().report_body(&task_id, body.as_bytes()) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

impl IntoResponse for BoardError {
    fn into_response(self) -> Response {
        let status = match &self {
            BoardError::NotFound { .. } => StatusCode::NOT_FOUND,
            BoardError::NotClaimed { .. } | BoardError::AlreadyReported { .. } => {
                StatusCode::CONFLICT
            }
            BoardError::Payload(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// A running server. Dropping the handle also stops it.
pub struct ServeHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<std::io::Result<()>>>,
}

impl ServeHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL for clients, e.g. `http://127.0.0.1:8000`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) -> Result<(), ServeError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            join.await??;
        }
        Ok(())
    }
}

/// Bind `bind` and serve `endpoint` on a spawned task.
pub async fn serve(
    endpoint: Arc<LocalEndpoint>,
    bind: &str,
    api_key: Option<String>,
) -> Result<ServeHandle, ServeError> {
    let listener = TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;
    info!(%addr, keyed = api_key.is_some(), "endpoint listening");

    let app = router(endpoint, api_key);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("endpoint shutting down");
            })
            .await
    });

    Ok(ServeHandle {
        addr,
        shutdown_tx: Some(shutdown_tx),
        join: Some(join),
    })
}
