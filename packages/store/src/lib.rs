//! # silo-store
//!
//! Client for the encrypted, content-addressed blob store that carries
//! Silo packages between callers and compute endpoints.
//!
//! ## Layers
//!
//! - [`BlobBackend`] moves sealed bytes: [`MemoryBackend`] in-process,
//!   [`HttpBackend`] against a blob service.
//! - [`ContentStoreClient`] seals with a fresh AES-256-GCM key per blob,
//!   addresses blobs by the SHA-256 of their ciphertext, checks integrity on
//!   the way back and retries `NotFound` within a bounded [`RetryPolicy`].
//!
//! ```ignore
//! use silo_store::ContentStoreClient;
//!
//! let store = ContentStoreClient::http("http://blobs.internal:8080")?;
//! let address = store.put(b"payload").await?;
//! assert_eq!(store.fetch(&address).await?, b"payload");
//! ```

pub mod backend;
pub mod cipher;
pub mod client;
pub mod error;

pub use backend::{BlobBackend, HttpBackend, MemoryBackend};
pub use cipher::SealingKey;
pub use client::{ContentStoreClient, RetryPolicy};
pub use error::{Result, StoreError};
