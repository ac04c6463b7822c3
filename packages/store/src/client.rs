//! Content store client.
//!
//! The client seals blobs before they leave the process and opens them after
//! they come back, so backends only ever hold ciphertext:
//!
//! ```text
//! put(blob)  -> seal(fresh key) -> address = sha256(sealed) -> backend.put
//! get(addr)  -> backend.get -> check sha256 == address -> open(key)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use silo_core::{ContentAddress, FunctionPackage};
use tracing::{debug, warn};

use crate::backend::{BlobBackend, HttpBackend, MemoryBackend};
use crate::cipher::{self, SealingKey};
use crate::error::{Result, StoreError};

/// Bounded retry across `NotFound` while a fresh blob propagates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(200))
    }
}

/// Client for an encrypted, content-addressed blob store.
///
/// Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct ContentStoreClient {
    backend: Arc<dyn BlobBackend>,
    retry: RetryPolicy,
}

impl ContentStoreClient {
    pub fn new(backend: impl BlobBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
            retry: RetryPolicy::default(),
        }
    }

    /// Client over a fresh in-process backend.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Client over an HTTP blob service with the default timeout.
    pub fn http(base_url: &str) -> Result<Self> {
        Ok(Self::new(HttpBackend::with_default_timeout(base_url)?))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Seal and upload `blob` under a fresh key.
    pub async fn put(&self, blob: &[u8]) -> Result<ContentAddress> {
        let key = SealingKey::generate();
        let sealed = cipher::seal(&key, blob)?;
        let address = cipher::digest(&sealed);

        self.backend.put(&address, sealed).await?;
        debug!(%address, bytes = blob.len(), "stored blob");

        Ok(ContentAddress::new(address, key.to_hex()))
    }

    /// Download and open a blob with a single attempt.
    pub async fn get(&self, address: &ContentAddress) -> Result<Vec<u8>> {
        if !cipher::is_valid_address(&address.address) {
            return Err(StoreError::InvalidAddress {
                address: address.address.clone(),
            });
        }
        let key = SealingKey::from_hex(&address.key)?;

        let sealed = self.backend.get(&address.address).await?;
        if cipher::digest(&sealed) != address.address {
            return Err(StoreError::Integrity {
                address: address.address.clone(),
            });
        }

        cipher::open(&key, &sealed).map_err(|_| StoreError::Decryption {
            address: address.address.clone(),
        })
    }

    /// [`get`](ContentStoreClient::get), retried across `NotFound` per the
    /// client's [`RetryPolicy`]. Any other error is returned immediately.
    pub async fn fetch(&self, address: &ContentAddress) -> Result<Vec<u8>> {
        let mut attempt = 1;
        loop {
            match self.get(address).await {
                Err(e) if e.is_not_found() && attempt < self.retry.attempts => {
                    debug!(%address, attempt, "blob not visible yet, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.retry.backoff).await;
                }
                Err(e) if e.is_not_found() => {
                    warn!(%address, attempts = attempt, "blob still missing after retries");
                    return Err(e);
                }
                other => return other,
            }
        }
    }

    pub async fn put_package(&self, package: &FunctionPackage) -> Result<ContentAddress> {
        self.put(&package.to_bytes()?).await
    }

    pub async fn fetch_package(&self, address: &ContentAddress) -> Result<FunctionPackage> {
        let bytes = self.fetch(address).await?;
        Ok(FunctionPackage::from_bytes(&bytes)?)
    }
}

impl fmt::Debug for ContentStoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStoreClient")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
