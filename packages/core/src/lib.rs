//! # silo-core
//!
//! Shared vocabulary of the Silo task dispatch protocol.
//!
//! A caller never ships executable code. Instead it ships a
//! [`TaskDescriptor`] (a registered name plus a version) and a [`Call`]
//! (positional and keyword JSON arguments). Both ends hold a
//! [`TaskRegistry`] that maps descriptors to native handlers.
//!
//! ```text
//! descriptor + call --pack--> FunctionPackage --to_bytes--> blob
//!                                                            |
//!                                                     content store
//!                                                            |
//! registry.invoke <--unpack-- FunctionPackage <--from_bytes--+
//! ```
//!
//! ## Example
//!
//! ```rust
//! use silo_core::{pack, unpack, Call, TaskDescriptor, TaskRegistry};
//!
//! let registry = TaskRegistry::new()
//!     .with_typed("greet", |(name,): (String,)| Ok(format!("GM, {}!", name)));
//!
//! let call = Call::with_args(("World",)).unwrap();
//! let package = pack(&TaskDescriptor::named("greet"), &call).unwrap();
//!
//! let (descriptor, call) = unpack(&package).unwrap();
//! let output = registry.invoke(&descriptor, &call).unwrap();
//! assert_eq!(output, serde_json::json!("GM, World!"));
//! ```

pub mod call;
pub mod descriptor;
pub mod error;
pub mod package;
pub mod registry;
pub mod task;
pub mod wire;

pub use call::Call;
pub use descriptor::TaskDescriptor;
pub use error::{ExecutionError, ExecutionFailure, FailureKind, PackageError};
pub use package::{pack, unpack, FunctionPackage, PackageParts, PACKAGE_FORMAT};
pub use registry::{TaskHandler, TaskRegistry};
pub use task::TaskId;
pub use wire::{
    decode_value, encode_value, ContentAddress, ExecutionRequest, ExecutionResult, TaskOutcome,
};
