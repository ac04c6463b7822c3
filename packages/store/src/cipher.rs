//! Blob sealing.
//!
//! Blobs are encrypted with AES-256-GCM under a fresh random key. The
//! 12-byte nonce is prepended to the ciphertext. Addresses are the hex
//! SHA-256 of the sealed bytes, so a blob can be checked against its
//! address before any decryption is attempted.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Symmetric key for one stored blob.
#[derive(Clone, PartialEq, Eq)]
pub struct SealingKey([u8; KEY_LEN]);

impl SealingKey {
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        Self(key)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded).map_err(|e| StoreError::InvalidKey {
            message: e.to_string(),
        })?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|bytes: Vec<u8>| StoreError::InvalidKey {
            message: format!("expected {} bytes, got {}", KEY_LEN, bytes.len()),
        })?;
        Ok(Self(key))
    }
}

impl fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SealingKey(<redacted>)")
    }
}

/// The key did not authenticate the ciphertext.
#[derive(Debug, thiserror::Error)]
#[error("ciphertext could not be authenticated")]
pub struct OpenError;

pub fn seal(key: &SealingKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| StoreError::Encryption)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

pub fn open(key: &SealingKey, sealed: &[u8]) -> std::result::Result<Vec<u8>, OpenError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(OpenError);
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0))
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| OpenError)
}

/// Content address of sealed bytes: lowercase hex SHA-256.
pub fn digest(sealed: &[u8]) -> String {
    hex::encode(Sha256::digest(sealed))
}

pub fn is_valid_address(address: &str) -> bool {
    address.len() == 64
        && address
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
