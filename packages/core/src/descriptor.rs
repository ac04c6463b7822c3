use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a registered task handler.
///
/// A descriptor is what travels in place of executable code: the worker
/// looks it up in its own [`TaskRegistry`](crate::TaskRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Registered task name, e.g. `"greet"`.
    pub name: String,

    /// Version of the handler's argument contract.
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

impl TaskDescriptor {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Descriptor for version 1 of `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, default_version())
    }
}

impl fmt::Display for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.name, self.version)
    }
}

impl From<&str> for TaskDescriptor {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}
