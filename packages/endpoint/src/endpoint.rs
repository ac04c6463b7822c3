//! In-process compute endpoints.
//!
//! A [`LocalEndpoint`] serves execution requests the way a remote endpoint
//! does, minus the container: it resolves the package, files a task on its
//! [`TaskBoard`], runs a fresh [`Agent`] for that task and turns the posted
//! outcome into an [`ExecutionResult`].
//!
//! [`LocalCluster`] maps endpoint URLs to local endpoints so a
//! [`DispatchClient`](silo_dispatch::DispatchClient) can use it as its
//! transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use silo_agent::{Agent, TaskApi};
use silo_core::{
    ExecutionFailure, ExecutionRequest, ExecutionResult, FailureKind, FunctionPackage, TaskId,
    TaskOutcome, TaskRegistry,
};
use silo_dispatch::{DispatchError, Endpoint, EndpointPool, Executor, RpcError};
use silo_store::ContentStoreClient;
use tracing::{debug, warn};

use crate::board::TaskBoard;

/// Failure message when an agent ends without posting a result.
pub const NO_REPORT_MESSAGE: &str = "agent exited without reporting";

pub struct LocalEndpoint {
    board: Arc<TaskBoard>,
    store: ContentStoreClient,
    registry: TaskRegistry,
    served: AtomicUsize,
}

impl LocalEndpoint {
    pub fn new(store: ContentStoreClient, registry: TaskRegistry) -> Self {
        Self {
            board: Arc::new(TaskBoard::new()),
            store,
            registry,
            served: AtomicUsize::new(0),
        }
    }

    pub fn board(&self) -> &Arc<TaskBoard> {
        &self.board
    }

    /// Requests handled so far.
    pub fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }

    /// Serve one execution request.
    pub async fn handle(&self, request: &ExecutionRequest) -> Result<ExecutionResult, RpcError> {
        self.served.fetch_add(1, Ordering::SeqCst);

        let package = match self.resolve(request).await {
            Ok(package) => package,
            Err(failure) => {
                warn!(error = %failure, "could not resolve package");
                return Ok(ExecutionResult::Error(failure));
            }
        };

        let task_id = self.board.create(&package);
        let api: Arc<dyn TaskApi> = self.board.clone();
        let agent = Agent::new(task_id.clone(), api, self.registry.clone());

        match tokio::spawn(agent.run()).await {
            Ok(Ok(report)) => {
                debug!(task_id = %task_id, state = %report.state, "agent finished")
            }
            Ok(Err(e)) => warn!(task_id = %task_id, error = %e, "agent failed"),
            Err(e) => warn!(task_id = %task_id, error = %e, "agent aborted"),
        }

        self.collect(&task_id)
            .to_execution_result()
            .map_err(|e| RpcError::Transport {
                message: e.to_string(),
            })
    }

    /// Remove the task from the board and return what its agent reported.
    fn collect(&self, task_id: &TaskId) -> TaskOutcome {
        self.board.take_result(task_id).unwrap_or_else(|| {
            TaskOutcome::Error(ExecutionFailure::new(FailureKind::Agent, NO_REPORT_MESSAGE))
        })
    }

    async fn resolve(
        &self,
        request: &ExecutionRequest,
    ) -> Result<FunctionPackage, ExecutionFailure> {
        match request {
            ExecutionRequest::Reference(address) => self
                .store
                .fetch_package(address)
                .await
                .map_err(|e| ExecutionFailure::new(FailureKind::Package, e.to_string())),
            ExecutionRequest::Inline { .. } => match request.inline_package() {
                Some(Ok(package)) => Ok(package),
                Some(Err(e)) => Err(ExecutionFailure::from(&e)),
                None => Err(ExecutionFailure::new(
                    FailureKind::Package,
                    "request carries no package",
                )),
            },
        }
    }
}

#[async_trait]
impl Executor for LocalEndpoint {
    async fn execute(
        &self,
        _endpoint: &Endpoint,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, RpcError> {
        self.handle(request).await
    }
}

/// A set of local endpoints addressed by URL.
#[derive(Default)]
pub struct LocalCluster {
    members: Vec<(Endpoint, Arc<LocalEndpoint>)>,
}

impl LocalCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// One endpoint per URL, all sharing `store` and `registry`.
    pub fn with_endpoints<S: AsRef<str>>(
        store: &ContentStoreClient,
        registry: &TaskRegistry,
        urls: &[S],
    ) -> Result<Self, DispatchError> {
        let mut cluster = Self::new();
        for url in urls {
            cluster = cluster.with_member(
                Endpoint::parse(url.as_ref())?,
                LocalEndpoint::new(store.clone(), registry.clone()),
            );
        }
        Ok(cluster)
    }

    pub fn with_member(mut self, endpoint: Endpoint, local: LocalEndpoint) -> Self {
        self.members.retain(|(e, _)| e != &endpoint);
        self.members.push((endpoint, Arc::new(local)));
        self
    }

    pub fn get(&self, endpoint: &Endpoint) -> Option<&Arc<LocalEndpoint>> {
        self.members
            .iter()
            .find(|(e, _)| e == endpoint)
            .map(|(_, local)| local)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.members.iter().map(|(e, _)| e)
    }

    /// Pool over every member, in insertion order.
    pub fn pool(&self) -> Result<EndpointPool, DispatchError> {
        EndpointPool::new(self.endpoints().cloned().collect())
    }

    /// Requests served per member, in insertion order.
    pub fn served(&self) -> Vec<(Endpoint, usize)> {
        self.members
            .iter()
            .map(|(e, local)| (e.clone(), local.served()))
            .collect()
    }
}

#[async_trait]
impl Executor for LocalCluster {
    async fn execute(
        &self,
        endpoint: &Endpoint,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, RpcError> {
        match self.get(endpoint) {
            Some(local) => local.handle(request).await,
            None => Err(RpcError::Transport {
                message: format!("no endpoint at {}", endpoint),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use silo_core::{pack, Call, ContentAddress, ExecutionError, TaskDescriptor};
    use silo_store::RetryPolicy;

    fn registry() -> TaskRegistry {
        TaskRegistry::new()
            .with_typed("inc", |(x,): (i64,)| Ok(x + 1))
            .with("crash", |_: &Call| -> Result<serde_json::Value, ExecutionError> {
                panic!("handler crashed")
            })
    }

    fn package(name: &str, call: Call) -> FunctionPackage {
        pack(&TaskDescriptor::named(name), &call).unwrap()
    }

    #[tokio::test]
    async fn reference_request_runs_agent() {
        let store = ContentStoreClient::in_memory();
        let endpoint = LocalEndpoint::new(store.clone(), registry());
        let address = store
            .put_package(&package("inc", Call::with_args((41,)).unwrap()))
            .await
            .unwrap();

        let result = endpoint
            .handle(&ExecutionRequest::reference(address))
            .await
            .unwrap();
        assert_eq!(result, ExecutionResult::output(&json!(42)).unwrap());
        assert_eq!(endpoint.served(), 1);
        assert!(endpoint.board().is_empty());
    }

    #[tokio::test]
    async fn inline_request_runs_agent() {
        let endpoint = LocalEndpoint::new(ContentStoreClient::in_memory(), registry());
        let request =
            ExecutionRequest::inline(&package("inc", Call::with_args((1,)).unwrap())).unwrap();
        let result = endpoint.handle(&request).await.unwrap();
        assert_eq!(result, ExecutionResult::output(&json!(2)).unwrap());
    }

    #[tokio::test]
    async fn missing_blob_is_a_package_failure() {
        let store = ContentStoreClient::in_memory().with_retry(RetryPolicy::none());
        let endpoint = LocalEndpoint::new(store, registry());
        let missing = ContentAddress::new("c".repeat(64), "d".repeat(64));

        match endpoint.handle(&ExecutionRequest::reference(missing)).await.unwrap() {
            ExecutionResult::Error(failure) => assert_eq!(failure.kind, FailureKind::Package),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(endpoint.board().is_empty());
    }

    #[tokio::test]
    async fn panicking_handler_is_reported_as_failure() {
        let endpoint = LocalEndpoint::new(ContentStoreClient::in_memory(), registry());
        let request = ExecutionRequest::inline(&package("crash", Call::new())).unwrap();

        match endpoint.handle(&request).await.unwrap() {
            ExecutionResult::Error(failure) => {
                assert_eq!(failure.kind, FailureKind::Failed);
                assert_eq!(failure.message, "handler panicked: handler crashed");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(endpoint.board().is_empty());
    }

    #[test]
    fn unreported_task_yields_agent_failure() {
        let endpoint = LocalEndpoint::new(ContentStoreClient::in_memory(), registry());
        let id = endpoint
            .board()
            .create(&package("inc", Call::with_args((1,)).unwrap()));
        endpoint.board().claim(&id).unwrap();

        let outcome = endpoint.collect(&id);
        assert!(endpoint.board().is_empty());
        assert_eq!(
            outcome,
            TaskOutcome::Error(ExecutionFailure::new(FailureKind::Agent, NO_REPORT_MESSAGE))
        );
    }

    #[tokio::test]
    async fn board_is_drained_after_many_requests() {
        let endpoint = LocalEndpoint::new(ContentStoreClient::in_memory(), registry());
        for i in 0..200 {
            let request =
                ExecutionRequest::inline(&package("inc", Call::with_args((i,)).unwrap())).unwrap();
            let result = endpoint.handle(&request).await.unwrap();
            assert_eq!(result, ExecutionResult::output(&json!(i + 1)).unwrap());
        }
        assert_eq!(endpoint.served(), 200);
        assert!(endpoint.board().is_empty());
    }

    #[tokio::test]
    async fn cluster_routes_by_url() {
        let store = ContentStoreClient::in_memory();
        let cluster =
            LocalCluster::with_endpoints(&store, &registry(), &["http://a:1", "http://b:1"])
                .unwrap();
        let b = Endpoint::parse("http://b:1").unwrap();
        let request =
            ExecutionRequest::inline(&package("inc", Call::with_args((0,)).unwrap())).unwrap();

        cluster.execute(&b, &request).await.unwrap();
        let served: Vec<usize> = cluster.served().into_iter().map(|(_, n)| n).collect();
        assert_eq!(served, vec![0, 1]);

        let unknown = Endpoint::parse("http://c:1").unwrap();
        assert!(matches!(
            cluster.execute(&unknown, &request).await,
            Err(RpcError::Transport { .. })
        ));
    }
}
