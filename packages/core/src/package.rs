//! Function packaging.
//!
//! A [`FunctionPackage`] bundles a task descriptor with its call arguments as
//! three opaque byte strings. It is the unit stored in the content store and
//! handed to workers. On its own the package is encoded as a versioned JSON
//! envelope whose fields are base64.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::call::Call;
use crate::descriptor::TaskDescriptor;
use crate::error::PackageError;

/// Envelope format written by this packer.
pub const PACKAGE_FORMAT: u64 = 1;

/// A serialized task descriptor with its positional and keyword arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionPackage {
    serialized_function: Vec<u8>,
    serialized_args: Vec<u8>,
    serialized_kwargs: Vec<u8>,
}

/// The three package parts, base64-encoded.
///
/// This is also the body the Host Task API serves for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageParts {
    pub func: String,
    pub args: String,
    pub kwargs: String,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    format: u64,
    #[serde(flatten)]
    parts: PackageParts,
}

impl FunctionPackage {
    pub fn from_parts(
        serialized_function: Vec<u8>,
        serialized_args: Vec<u8>,
        serialized_kwargs: Vec<u8>,
    ) -> Self {
        Self {
            serialized_function,
            serialized_args,
            serialized_kwargs,
        }
    }

    pub fn serialized_function(&self) -> &[u8] {
        &self.serialized_function
    }

    pub fn serialized_args(&self) -> &[u8] {
        &self.serialized_args
    }

    pub fn serialized_kwargs(&self) -> &[u8] {
        &self.serialized_kwargs
    }

    /// Base64 form of the three parts.
    pub fn to_parts(&self) -> PackageParts {
        PackageParts {
            func: STANDARD.encode(&self.serialized_function),
            args: STANDARD.encode(&self.serialized_args),
            kwargs: STANDARD.encode(&self.serialized_kwargs),
        }
    }

    pub fn from_encoded_parts(parts: &PackageParts) -> Result<Self, PackageError> {
        let decode = |field: &str, value: &str| {
            STANDARD
                .decode(value)
                .map_err(|e| PackageError::deserialization(format!("{}: {}", field, e)))
        };
        Ok(Self {
            serialized_function: decode("func", &parts.func)?,
            serialized_args: decode("args", &parts.args)?,
            serialized_kwargs: decode("kwargs", &parts.kwargs)?,
        })
    }

    /// Encode the package as a single versioned blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PackageError> {
        serde_json::to_vec(&Envelope {
            format: PACKAGE_FORMAT,
            parts: self.to_parts(),
        })
        .map_err(PackageError::serialization)
    }

    /// Decode a blob produced by [`to_bytes`](FunctionPackage::to_bytes).
    ///
    /// The format version is checked before the rest of the envelope so a
    /// newer layout reports a version mismatch rather than a parse error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PackageError> {
        let value: Value = serde_json::from_slice(bytes).map_err(PackageError::deserialization)?;
        let found = value
            .get("format")
            .and_then(Value::as_u64)
            .ok_or_else(|| PackageError::deserialization("missing package format"))?;
        if found != PACKAGE_FORMAT {
            return Err(PackageError::UnsupportedFormat {
                found,
                expected: PACKAGE_FORMAT,
            });
        }
        let envelope: Envelope =
            serde_json::from_value(value).map_err(PackageError::deserialization)?;
        Self::from_encoded_parts(&envelope.parts)
    }
}

/// Package a task descriptor with its call arguments.
pub fn pack(descriptor: &TaskDescriptor, call: &Call) -> Result<FunctionPackage, PackageError> {
    Ok(FunctionPackage {
        serialized_function: serde_json::to_vec(descriptor).map_err(PackageError::serialization)?,
        serialized_args: serde_json::to_vec(&call.args).map_err(PackageError::serialization)?,
        serialized_kwargs: serde_json::to_vec(&call.kwargs).map_err(PackageError::serialization)?,
    })
}

/// Reverse [`pack`].
pub fn unpack(package: &FunctionPackage) -> Result<(TaskDescriptor, Call), PackageError> {
    let descriptor: TaskDescriptor = serde_json::from_slice(&package.serialized_function)
        .map_err(|e| PackageError::deserialization(format!("function: {}", e)))?;
    let args = serde_json::from_slice(&package.serialized_args)
        .map_err(|e| PackageError::deserialization(format!("args: {}", e)))?;
    let kwargs = serde_json::from_slice(&package.serialized_kwargs)
        .map_err(|e| PackageError::deserialization(format!("kwargs: {}", e)))?;
    Ok((descriptor, Call { args, kwargs }))
}
