//! # silo-dispatch
//!
//! The caller side of Silo: package a task call, place it in the content
//! store, hand it to one endpoint of a pool and bring the output back.
//!
//! ```text
//!  RemoteFunction ──remote()──> DispatchClient ──> EndpointPool ──> Executor
//!        │                            │                                 │
//!        └──local()──> TaskRegistry   └──put_package──> ContentStore <──┘
//! ```
//!
//! - [`DispatchClient`] owns the pipeline, the timeout and verification.
//! - [`EndpointPool`] picks an endpoint per call through a
//!   [`SelectionStrategy`] and an optional circuit breaker.
//! - [`Executor`] is the transport; [`HttpExecutor`] posts JSON to
//!   `{endpoint}/api/execute`.
//!
//! ```ignore
//! use silo_core::Call;
//! use silo_dispatch::{DispatchClient, EndpointPool};
//! use silo_store::ContentStoreClient;
//!
//! let client = DispatchClient::builder(
//!     ContentStoreClient::http("http://blobs:8080")?,
//!     EndpointPool::from_urls(&["http://worker-a:9000", "http://worker-b:9000"])?,
//! )
//! .build()?;
//!
//! let greet = client.function("greet");
//! let out = greet.remote(&Call::with_args(("World",))?).await?;
//! ```

mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod pool;
pub mod verify;

pub use client::{DispatchClient, DispatchClientBuilder, PublishedCall, RemoteFunction};
pub use config::{DispatchConfig, RequestForm, DEFAULT_VERIFY_PROBABILITY};
pub use error::{DispatchError, Result, RpcError};
pub use executor::{Executor, HttpExecutor, API_KEY_HEADER, EXECUTE_PATH};
pub use pool::{
    BreakerConfig, Candidate, Endpoint, EndpointPool, LeastLoaded, Lease, Random, RoundRobin,
    SelectionStrategy,
};
pub use tokio_util::sync::CancellationToken;
pub use verify::{FixedSampler, RandomSampler, Sampler, Verifier};
