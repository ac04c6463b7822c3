//! Local registry of task handlers.
//!
//! Both sides of a dispatch hold a registry: the caller uses it for local
//! execution and verification, the worker resolves incoming descriptors
//! against it. Nothing executable ever crosses the wire.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::call::Call;
use crate::descriptor::TaskDescriptor;
use crate::error::ExecutionError;

/// A native task implementation.
///
/// Handlers must be deterministic and free of side effects for remote
/// verification to be meaningful. The registry does not check this.
pub trait TaskHandler: Send + Sync {
    fn call(&self, call: &Call) -> Result<Value, ExecutionError>;
}

impl<F> TaskHandler for F
where
    F: Fn(&Call) -> Result<Value, ExecutionError> + Send + Sync,
{
    fn call(&self, call: &Call) -> Result<Value, ExecutionError> {
        self(call)
    }
}

/// Handler adapter that decodes positional arguments into `A` and encodes
/// the return value as JSON.
struct Typed<F, A, R> {
    f: F,
    _marker: std::marker::PhantomData<fn(A) -> R>,
}

impl<F, A, R> TaskHandler for Typed<F, A, R>
where
    F: Fn(A) -> Result<R, ExecutionError> + Send + Sync,
    A: DeserializeOwned,
    R: Serialize,
{
    fn call(&self, call: &Call) -> Result<Value, ExecutionError> {
        let args: A = call.positional_tuple()?;
        let output = (self.f)(args)?;
        serde_json::to_value(output)
            .map_err(|e| ExecutionError::failed(format!("output not serializable: {}", e)))
    }
}

/// Maps task descriptors to handlers.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: BTreeMap<TaskDescriptor, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, returning the one it replaced, if any.
    pub fn register(
        &mut self,
        descriptor: TaskDescriptor,
        handler: impl TaskHandler + 'static,
    ) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.insert(descriptor, Arc::new(handler))
    }

    /// Register a handler taking its positional arguments as a typed tuple.
    ///
    /// Keyword arguments are ignored by typed handlers; use [`register`]
    /// with a closure over [`Call`] when they matter.
    ///
    /// [`register`]: TaskRegistry::register
    pub fn register_typed<F, A, R>(&mut self, descriptor: TaskDescriptor, f: F)
    where
        F: Fn(A) -> Result<R, ExecutionError> + Send + Sync + 'static,
        A: DeserializeOwned + 'static,
        R: Serialize + 'static,
    {
        self.register(
            descriptor,
            Typed {
                f,
                _marker: std::marker::PhantomData,
            },
        );
    }

    /// Builder form of [`register`](TaskRegistry::register).
    pub fn with(
        mut self,
        descriptor: impl Into<TaskDescriptor>,
        handler: impl TaskHandler + 'static,
    ) -> Self {
        self.register(descriptor.into(), handler);
        self
    }

    /// Builder form of [`register_typed`](TaskRegistry::register_typed).
    pub fn with_typed<F, A, R>(mut self, descriptor: impl Into<TaskDescriptor>, f: F) -> Self
    where
        F: Fn(A) -> Result<R, ExecutionError> + Send + Sync + 'static,
        A: DeserializeOwned + 'static,
        R: Serialize + 'static,
    {
        self.register_typed(descriptor.into(), f);
        self
    }

    pub fn resolve(
        &self,
        descriptor: &TaskDescriptor,
    ) -> Result<Arc<dyn TaskHandler>, ExecutionError> {
        self.handlers
            .get(descriptor)
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownTask(descriptor.clone()))
    }

    /// Resolve and run a handler in-process.
    pub fn invoke(
        &self,
        descriptor: &TaskDescriptor,
        call: &Call,
    ) -> Result<Value, ExecutionError> {
        self.resolve(descriptor)?.call(call)
    }

    pub fn contains(&self, descriptor: &TaskDescriptor) -> bool {
        self.handlers.contains_key(descriptor)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.handlers.keys()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
