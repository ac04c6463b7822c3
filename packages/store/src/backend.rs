//! Raw blob backends.
//!
//! A backend moves sealed bytes to and from physical storage. It never sees
//! plaintext or keys; sealing and verification live in
//! [`ContentStoreClient`](crate::ContentStoreClient).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::error::{Result, StoreError};

/// Storage for sealed, content-addressed blobs.
///
/// Backends may be eventually consistent: a successful `put` does not
/// guarantee that an immediate `get` sees the blob.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Store `blob` under `address`. Storing identical bytes twice is a no-op.
    async fn put(&self, address: &str, blob: Vec<u8>) -> Result<()>;

    /// Fetch the blob stored under `address`.
    ///
    /// Returns [`StoreError::NotFound`] for unknown or not-yet-visible addresses.
    async fn get(&self, address: &str) -> Result<Vec<u8>>;
}

struct Entry {
    blob: Vec<u8>,
    hidden_reads: u32,
}

/// In-process backend.
///
/// Cloning shares the underlying storage. A visibility lag makes each new
/// blob report `NotFound` for its first N reads, which simulates the
/// propagation window of a replicated store.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    blobs: Arc<Mutex<HashMap<String, Entry>>>,
    visibility_lag: u32,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_visibility_lag(mut self, reads: u32) -> Self {
        self.visibility_lag = reads;
        self
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.blobs.lock().contains_key(address)
    }

    #[cfg(test)]
    pub(crate) fn overwrite(&self, address: &str, blob: Vec<u8>) {
        self.blobs.lock().insert(
            address.to_string(),
            Entry {
                blob,
                hidden_reads: 0,
            },
        );
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    async fn put(&self, address: &str, blob: Vec<u8>) -> Result<()> {
        let mut blobs = self.blobs.lock();
        blobs.entry(address.to_string()).or_insert(Entry {
            blob,
            hidden_reads: self.visibility_lag,
        });
        Ok(())
    }

    async fn get(&self, address: &str) -> Result<Vec<u8>> {
        let mut blobs = self.blobs.lock();
        match blobs.get_mut(address) {
            Some(entry) if entry.hidden_reads > 0 => {
                entry.hidden_reads -= 1;
                Err(StoreError::NotFound {
                    address: address.to_string(),
                })
            }
            Some(entry) => Ok(entry.blob.clone()),
            None => Err(StoreError::NotFound {
                address: address.to_string(),
            }),
        }
    }
}

/// Backend for an HTTP blob service.
///
/// - `PUT {base}/api/blobs/{address}` with the sealed bytes
/// - `GET {base}/api/blobs/{address}` returns them, 404 when unknown
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    /// Create a backend with the given request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// Create with default timeout of 30 seconds.
    pub fn with_default_timeout(base_url: &str) -> Result<Self> {
        Self::new(base_url, Duration::from_secs(30))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn blob_url(&self, address: &str) -> Result<Url> {
        Ok(self.base_url.join(&format!("api/blobs/{}", address))?)
    }
}

#[async_trait]
impl BlobBackend for HttpBackend {
    async fn put(&self, address: &str, blob: Vec<u8>) -> Result<()> {
        let response = self
            .client
            .put(self.blob_url(address)?)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(blob)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(StoreError::Backend {
                message: format!("upload of {} failed with status {}", address, status),
            })
        }
    }

    async fn get(&self, address: &str) -> Result<Vec<u8>> {
        let response = self.client.get(self.blob_url(address)?).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound {
                address: address.to_string(),
            }),
            status if status.is_success() => Ok(response.bytes().await?.to_vec()),
            status => Err(StoreError::Backend {
                message: format!("download of {} failed with status {}", address, status),
            }),
        }
    }
}
