//! Silo: task dispatch and execution.
//!
//! A caller packages a task call, places it in an encrypted content store,
//! routes it to one endpoint of a pool and gets back the output, optionally
//! cross-checked against a local run. Each endpoint executes the call in a
//! single-task worker agent.
//!
//! | Crate | Role |
//! |---|---|
//! | [`model`] | descriptors, calls, packages, wire types, task registry |
//! | [`store`] | AES-256-GCM content-addressed blob store client |
//! | [`dispatch`] | dispatch client, endpoint pool, verification |
//! | [`agent`] | worker agent and Host Task API client |
//! | [`endpoint`] | in-process endpoints and task board |

pub use silo_agent as agent;
pub use silo_core as model;
pub use silo_dispatch as dispatch;
pub use silo_endpoint as endpoint;
pub use silo_store as store;

/// The types most callers need.
pub mod prelude {
    pub use silo_core::{Call, ContentAddress, TaskDescriptor, TaskRegistry};
    pub use silo_dispatch::{
        CancellationToken, DispatchClient, DispatchConfig, DispatchError, EndpointPool,
        RemoteFunction, RequestForm,
    };
    pub use silo_store::ContentStoreClient;
}
