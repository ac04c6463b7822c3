//! Dispatch client and remote function handles.
//!
//! A remote call runs this pipeline:
//!
//! ```text
//! pack(descriptor, call)
//!   -> store.put_package            (reference form only)
//!   -> pool.acquire                 (one endpoint per call)
//!   -> executor.execute
//!   -> decode output | Remote(failure)
//!   -> maybe verify against local execution
//! ```
//!
//! The upload and the execution share one deadline, `DispatchConfig::timeout`
//! after the call starts, and both stop when the cancellation token fires.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use silo_core::{
    pack, unpack, Call, ContentAddress, ExecutionError, ExecutionRequest, TaskDescriptor,
    TaskOutcome, TaskRegistry,
};
use silo_store::ContentStoreClient;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch;
use crate::config::{DispatchConfig, RequestForm};
use crate::error::{DispatchError, Result};
use crate::executor::{Executor, HttpExecutor};
use crate::pool::EndpointPool;
use crate::verify::{Sampler, Verifier};

struct ClientInner {
    config: DispatchConfig,
    store: ContentStoreClient,
    pool: EndpointPool,
    executor: Arc<dyn Executor>,
    registry: TaskRegistry,
    verifier: Verifier,
}

/// Entry point for remote execution. Cheap to clone.
#[derive(Clone)]
pub struct DispatchClient {
    inner: Arc<ClientInner>,
}

/// Builder for [`DispatchClient`].
pub struct DispatchClientBuilder {
    config: DispatchConfig,
    store: ContentStoreClient,
    pool: EndpointPool,
    executor: Option<Arc<dyn Executor>>,
    registry: TaskRegistry,
    sampler: Option<Box<dyn FnOnce(f64) -> Verifier + Send>>,
}

impl DispatchClientBuilder {
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Transport to the endpoints. Defaults to [`HttpExecutor`] with the
    /// configured timeout.
    pub fn executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    pub fn shared_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Handlers for local execution and verification.
    pub fn registry(mut self, registry: TaskRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the random verification sampler.
    pub fn sampler(mut self, sampler: impl Sampler + 'static) -> Self {
        self.sampler = Some(Box::new(move |p| Verifier::with_sampler(p, sampler)));
        self
    }

    pub fn build(self) -> Result<DispatchClient> {
        let executor = match self.executor {
            Some(executor) => executor,
            None => Arc::new(HttpExecutor::new(self.config.timeout)?),
        };
        let verifier = match self.sampler {
            Some(make) => make(self.config.verify_probability),
            None => Verifier::new(self.config.verify_probability),
        };
        Ok(DispatchClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                store: self.store,
                pool: self.pool,
                executor,
                registry: self.registry,
                verifier,
            }),
        })
    }
}

impl DispatchClient {
    pub fn builder(store: ContentStoreClient, pool: EndpointPool) -> DispatchClientBuilder {
        DispatchClientBuilder {
            config: DispatchConfig::default(),
            store,
            pool,
            executor: None,
            registry: TaskRegistry::new(),
            sampler: None,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.inner.pool
    }

    pub fn store(&self) -> &ContentStoreClient {
        &self.inner.store
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    /// Handle for calling one task.
    pub fn function(&self, descriptor: impl Into<TaskDescriptor>) -> RemoteFunction {
        RemoteFunction {
            client: self.clone(),
            descriptor: descriptor.into(),
        }
    }

    pub async fn remote(&self, descriptor: &TaskDescriptor, call: &Call) -> Result<Value> {
        self.remote_with(descriptor, call, &CancellationToken::new())
            .await
    }

    /// Execute `call` on one endpoint of the pool.
    pub async fn remote_with(
        &self,
        descriptor: &TaskDescriptor,
        call: &Call,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let deadline = self.deadline();
        let package = pack(descriptor, call)?;
        let request = match self.inner.config.request_form {
            RequestForm::Reference => {
                let address = self
                    .guarded(cancel, deadline, self.inner.store.put_package(&package))
                    .await?;
                ExecutionRequest::reference(address)
            }
            RequestForm::Inline => ExecutionRequest::inline(&package)?,
        };

        let output = self.dispatch(descriptor, &request, cancel, deadline).await?;
        self.maybe_verify(descriptor, call, output)
    }

    /// Execute `call` in this process.
    pub fn local(&self, descriptor: &TaskDescriptor, call: &Call) -> Result<Value> {
        Ok(self.inner.registry.invoke(descriptor, call)?)
    }

    pub async fn map<I>(&self, descriptor: &TaskDescriptor, calls: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = Call>,
    {
        self.map_with(descriptor, calls, &CancellationToken::new())
            .await
    }

    /// Run one remote call per element, at most `concurrency` at a time.
    ///
    /// Outputs are in input order. Every element runs to completion; if any
    /// failed, the first failure in input order is returned.
    pub async fn map_with<I>(
        &self,
        descriptor: &TaskDescriptor,
        calls: I,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = Call>,
    {
        let calls: Vec<Call> = calls.into_iter().collect();
        let total = calls.len();
        debug!(task = %descriptor, elements = total, "starting map");

        let results = batch::run_bounded(calls, self.inner.config.concurrency, cancel, |call| {
            let client = self.clone();
            let descriptor = descriptor.clone();
            let cancel = cancel.clone();
            async move { client.remote_with(&descriptor, &call, &cancel).await }
        })
        .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(task = %descriptor, elements = total, failed, "map finished with failures");
        } else {
            info!(task = %descriptor, elements = total, "map complete");
        }
        results.into_iter().collect()
    }

    /// Store the package for `call` without executing it.
    pub async fn publish(
        &self,
        descriptor: &TaskDescriptor,
        call: &Call,
    ) -> Result<ContentAddress> {
        let package = pack(descriptor, call)?;
        let address = self
            .guarded(
                &CancellationToken::new(),
                self.deadline(),
                self.inner.store.put_package(&package),
            )
            .await?;
        info!(task = %descriptor, %address, "published package");
        Ok(address)
    }

    /// Load a published package so it can be run again.
    pub async fn fetch_published(&self, address: &ContentAddress) -> Result<PublishedCall> {
        let package = self
            .guarded(
                &CancellationToken::new(),
                self.deadline(),
                self.inner.store.fetch_package(address),
            )
            .await?;
        let (descriptor, call) = unpack(&package)?;
        Ok(PublishedCall {
            client: self.clone(),
            address: address.clone(),
            descriptor,
            call,
        })
    }

    async fn dispatch(
        &self,
        descriptor: &TaskDescriptor,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<Value> {
        let lease = self.inner.pool.acquire();
        let endpoint = lease.endpoint().clone();
        debug!(task = %descriptor, %endpoint, "dispatching");

        let result = self
            .guarded(
                cancel,
                deadline,
                self.inner.executor.execute(&endpoint, request),
            )
            .await;
        match &result {
            Ok(_) => lease.succeeded(),
            Err(DispatchError::Cancelled) => {}
            Err(_) => lease.failed(),
        }
        drop(lease);

        match result?.into_outcome()? {
            TaskOutcome::Output(value) => Ok(value),
            TaskOutcome::Error(failure) => {
                debug!(task = %descriptor, %endpoint, %failure, "remote task failed");
                Err(DispatchError::Remote(failure))
            }
        }
    }

    fn maybe_verify(
        &self,
        descriptor: &TaskDescriptor,
        call: &Call,
        remote: Value,
    ) -> Result<Value> {
        let verifier = &self.inner.verifier;
        if !verifier.should_verify() {
            return Ok(remote);
        }

        let local = match self.inner.registry.invoke(descriptor, call) {
            Ok(local) => local,
            Err(ExecutionError::UnknownTask(_)) => {
                warn!(task = %descriptor, "no local handler, skipping verification");
                return Ok(remote);
            }
            Err(e) => return Err(e.into()),
        };
        verifier.check(&remote, &local)?;
        debug!(task = %descriptor, "verified remote output");
        Ok(remote)
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.inner.config.timeout
    }

    /// Run `fut` until it finishes, `deadline` passes or `cancel` fires.
    async fn guarded<T, E, F>(
        &self,
        cancel: &CancellationToken,
        deadline: Instant,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<DispatchError>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DispatchError::Cancelled),
            outcome = tokio::time::timeout_at(deadline, fut) => match outcome {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(DispatchError::Timeout(self.inner.config.timeout)),
            },
        }
    }
}

impl std::fmt::Debug for DispatchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchClient")
            .field("config", &self.inner.config)
            .field("pool", &self.inner.pool)
            .field("verifier", &self.inner.verifier)
            .finish_non_exhaustive()
    }
}

/// A task bound to a dispatch client.
#[derive(Debug, Clone)]
pub struct RemoteFunction {
    client: DispatchClient,
    descriptor: TaskDescriptor,
}

impl RemoteFunction {
    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    pub async fn remote(&self, call: &Call) -> Result<Value> {
        self.client.remote(&self.descriptor, call).await
    }

    pub async fn remote_with(&self, call: &Call, cancel: &CancellationToken) -> Result<Value> {
        self.client
            .remote_with(&self.descriptor, call, cancel)
            .await
    }

    /// [`remote`](Self::remote), decoded into `T`.
    pub async fn remote_as<T: DeserializeOwned>(&self, call: &Call) -> Result<T> {
        decode_output(self.remote(call).await?)
    }

    pub fn local(&self, call: &Call) -> Result<Value> {
        self.client.local(&self.descriptor, call)
    }

    pub fn local_as<T: DeserializeOwned>(&self, call: &Call) -> Result<T> {
        decode_output(self.local(call)?)
    }

    pub async fn map<I>(&self, calls: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = Call>,
    {
        self.client.map(&self.descriptor, calls).await
    }

    pub async fn map_with<I>(&self, calls: I, cancel: &CancellationToken) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = Call>,
    {
        self.client.map_with(&self.descriptor, calls, cancel).await
    }

    pub async fn publish(&self, call: &Call) -> Result<ContentAddress> {
        self.client.publish(&self.descriptor, call).await
    }
}

/// A package loaded back from the store by address.
#[derive(Debug, Clone)]
pub struct PublishedCall {
    client: DispatchClient,
    address: ContentAddress,
    descriptor: TaskDescriptor,
    call: Call,
}

impl PublishedCall {
    pub fn address(&self) -> &ContentAddress {
        &self.address
    }

    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    pub fn call(&self) -> &Call {
        &self.call
    }

    /// Handle for calling the same task with other arguments.
    pub fn function(&self) -> RemoteFunction {
        self.client.function(self.descriptor.clone())
    }

    /// Execute remotely by sending the existing address; nothing is
    /// uploaded again.
    pub async fn remote(&self) -> Result<Value> {
        self.remote_with(&CancellationToken::new()).await
    }

    pub async fn remote_with(&self, cancel: &CancellationToken) -> Result<Value> {
        let request = ExecutionRequest::reference(self.address.clone());
        let output = self
            .client
            .dispatch(&self.descriptor, &request, cancel, self.client.deadline())
            .await?;
        self.client
            .maybe_verify(&self.descriptor, &self.call, output)
    }

    pub fn local(&self) -> Result<Value> {
        self.client.local(&self.descriptor, &self.call)
    }
}

fn decode_output<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(DispatchError::Output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use silo_core::FailureKind;

    use crate::executor::mock::MockExecutor;
    use crate::pool::Endpoint;
    use crate::verify::FixedSampler;
    use silo_store::{BlobBackend, MemoryBackend};

    fn registry() -> TaskRegistry {
        TaskRegistry::new()
            .with_typed("greet", |(name,): (String,)| Ok(format!("Hello, {}!", name)))
            .with_typed("square", |(x,): (i64,)| Ok(x * x))
            .with("fail", |_: &Call| -> std::result::Result<Value, ExecutionError> {
                Err(ExecutionError::failed("boom"))
            })
    }

    fn pool() -> EndpointPool {
        EndpointPool::from_urls(&["http://a:9000", "http://b:9000"]).unwrap()
    }

    fn client_with(
        executor: MockExecutor,
        store: ContentStoreClient,
        config: DispatchConfig,
    ) -> DispatchClient {
        DispatchClient::builder(store, pool())
            .config(config)
            .executor(executor)
            .registry(registry())
            .sampler(FixedSampler(false))
            .build()
            .unwrap()
    }

    fn setup() -> (DispatchClient, MockExecutor) {
        let store = ContentStoreClient::in_memory();
        let executor = MockExecutor::new(store.clone(), registry());
        let client = client_with(executor.clone(), store, DispatchConfig::default());
        (client, executor)
    }

    fn call1(v: impl serde::Serialize) -> Call {
        Call::new().arg(v).unwrap()
    }

    #[tokio::test]
    async fn remote_matches_local() {
        let (client, executor) = setup();
        let greet = client.function("greet");

        let remote = greet.remote(&call1("World")).await.unwrap();
        let local = greet.local(&call1("World")).unwrap();
        assert_eq!(remote, json!("Hello, World!"));
        assert_eq!(remote, local);

        let recorded = executor.recorded();
        assert_eq!(recorded.len(), 1);
        assert!(matches!(recorded[0].1, ExecutionRequest::Reference(_)));
    }

    #[tokio::test]
    async fn remote_as_decodes() {
        let (client, _) = setup();
        let square = client.function("square");
        let n: i64 = square.remote_as(&call1(7)).await.unwrap();
        assert_eq!(n, 49);
        let n: i64 = square.local_as(&call1(-3)).unwrap();
        assert_eq!(n, 9);
    }

    #[tokio::test]
    async fn remote_as_wrong_type_is_output_error() {
        let (client, _) = setup();
        let err = client
            .function("greet")
            .remote_as::<i64>(&call1("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Output(_)));
    }

    #[tokio::test]
    async fn remote_failure_is_reported() {
        let (client, _) = setup();
        let err = client
            .function("fail")
            .remote(&Call::new())
            .await
            .unwrap_err();
        match err {
            DispatchError::Remote(failure) => {
                assert_eq!(failure.kind, FailureKind::Failed);
                assert_eq!(failure.message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_remote_task_is_reported() {
        let (client, _) = setup();
        let err = client
            .function("nope")
            .remote(&Call::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Remote(ref f) if f.kind == FailureKind::UnknownTask
        ));
    }

    #[tokio::test]
    async fn inline_form_skips_the_store() {
        let store = ContentStoreClient::in_memory();
        let executor = MockExecutor::new(store.clone(), registry());
        let client = client_with(
            executor.clone(),
            store,
            DispatchConfig::default().with_request_form(RequestForm::Inline),
        );

        let out = client.function("square").remote(&call1(5)).await.unwrap();
        assert_eq!(out, json!(25));
        assert!(matches!(
            executor.recorded()[0].1,
            ExecutionRequest::Inline { .. }
        ));
    }

    #[tokio::test]
    async fn map_preserves_order_under_reordered_completion() {
        let store = ContentStoreClient::in_memory();
        let executor = MockExecutor::new(store.clone(), registry())
            .with_delay(|n| Duration::from_millis(30 - 3 * n.min(10) as u64));
        let client = client_with(
            executor,
            store,
            DispatchConfig::default().with_concurrency(10),
        );

        let outputs = client
            .function("square")
            .map((0..10).map(call1))
            .await
            .unwrap();
        let expected: Vec<Value> = (0..10i64).map(|i| json!(i * i)).collect();
        assert_eq!(outputs, expected);
    }

    #[tokio::test]
    async fn map_over_empty_input_is_empty() {
        let (client, executor) = setup();
        let outputs = client.function("square").map(Vec::new()).await.unwrap();
        assert!(outputs.is_empty());
        assert!(executor.recorded().is_empty());
    }

    #[tokio::test]
    async fn map_reports_first_failure_after_all_complete() {
        let (client, executor) = setup();
        let calls = vec![call1(1), call1("not a number"), call1(3), Call::new()];

        let err = client.function("square").map(calls).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Remote(ref f) if f.kind == FailureKind::InvalidArguments
        ));
        assert_eq!(executor.recorded().len(), 4);
    }

    #[tokio::test]
    async fn verification_detects_tampering() {
        let store = ContentStoreClient::in_memory();
        let executor = MockExecutor::new(store.clone(), registry()).with_tamper(|_| json!(0));
        let client = DispatchClient::builder(store, pool())
            .executor(executor)
            .registry(registry())
            .sampler(FixedSampler(true))
            .build()
            .unwrap();

        let err = client
            .function("square")
            .remote(&call1(4))
            .await
            .unwrap_err();
        match err {
            DispatchError::Verification { remote, local } => {
                assert_eq!(remote, json!(0));
                assert_eq!(local, json!(16));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn verification_passes_for_honest_endpoint() {
        let store = ContentStoreClient::in_memory();
        let client = DispatchClient::builder(store.clone(), pool())
            .executor(MockExecutor::new(store, registry()))
            .registry(registry())
            .sampler(FixedSampler(true))
            .build()
            .unwrap();
        assert_eq!(
            client.function("square").remote(&call1(4)).await.unwrap(),
            json!(16)
        );
    }

    #[tokio::test]
    async fn verification_is_skipped_without_local_handler() {
        let store = ContentStoreClient::in_memory();
        let client = DispatchClient::builder(store.clone(), pool())
            .executor(MockExecutor::new(store, registry()))
            .sampler(FixedSampler(true))
            .build()
            .unwrap();
        assert_eq!(
            client.function("square").remote(&call1(4)).await.unwrap(),
            json!(16)
        );
    }

    #[tokio::test]
    async fn transport_failure_is_rpc_error() {
        let store = ContentStoreClient::in_memory();
        let executor = MockExecutor::new(store.clone(), registry()).failing("connection refused");
        let client = client_with(executor, store, DispatchConfig::default());

        let err = client
            .function("square")
            .remote(&call1(2))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Rpc(_)));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let store = ContentStoreClient::in_memory();
        let executor = MockExecutor::new(store.clone(), registry())
            .with_delay(|_| Duration::from_secs(5));
        let client = client_with(
            executor,
            store,
            DispatchConfig::default().with_timeout(Duration::from_millis(20)),
        );

        let err = client
            .function("square")
            .remote(&call1(2))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Timeout(_)));
    }

    /// Memory backend whose uploads take `delay`.
    struct SlowUploads {
        inner: MemoryBackend,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl BlobBackend for SlowUploads {
        async fn put(&self, address: &str, blob: Vec<u8>) -> silo_store::Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.put(address, blob).await
        }

        async fn get(&self, address: &str) -> silo_store::Result<Vec<u8>> {
            self.inner.get(address).await
        }
    }

    #[tokio::test]
    async fn timeout_covers_upload_and_execution_together() {
        let store = ContentStoreClient::new(SlowUploads {
            inner: MemoryBackend::new(),
            delay: Duration::from_millis(150),
        });
        // each step alone fits in the timeout, both together do not
        let executor = MockExecutor::new(store.clone(), registry())
            .with_delay(|_| Duration::from_millis(150));
        let client = client_with(
            executor.clone(),
            store,
            DispatchConfig::default().with_timeout(Duration::from_millis(250)),
        );

        let err = client
            .function("square")
            .remote(&call1(3))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Timeout(t) if t == Duration::from_millis(250)));
        assert_eq!(executor.recorded().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_call() {
        let store = ContentStoreClient::in_memory();
        let executor = MockExecutor::new(store.clone(), registry())
            .with_delay(|_| Duration::from_secs(5));
        let client = client_with(executor, store, DispatchConfig::default());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = client
            .function("square")
            .remote_with(&call1(2), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled));
    }

    #[tokio::test]
    async fn published_call_runs_by_reference() {
        let (client, executor) = setup();
        let greet = client.function("greet");

        let address = greet.publish(&call1("Ada")).await.unwrap();
        let published = client.fetch_published(&address).await.unwrap();
        assert_eq!(published.descriptor(), &TaskDescriptor::named("greet"));
        assert_eq!(published.local().unwrap(), json!("Hello, Ada!"));
        assert_eq!(published.remote().await.unwrap(), json!("Hello, Ada!"));

        // the endpoint received the published address itself
        match &executor.recorded()[0].1 {
            ExecutionRequest::Reference(sent) => assert_eq!(sent, &address),
            other => panic!("unexpected request: {other:?}"),
        }

        let again = published.function().remote(&call1("Grace")).await.unwrap();
        assert_eq!(again, json!("Hello, Grace!"));
    }

    #[tokio::test]
    async fn requests_go_to_pool_members() {
        let (client, executor) = setup();
        let square = client.function("square");
        for i in 0..20 {
            square.remote(&call1(i)).await.unwrap();
        }
        let members: Vec<Endpoint> = client.pool().endpoints().cloned().collect();
        assert!(executor
            .recorded()
            .iter()
            .all(|(endpoint, _)| members.contains(endpoint)));
    }
}
