use silo_core::PackageError;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The address is unknown, or not yet visible after a recent put.
    #[error("blob not found: {address}")]
    NotFound { address: String },

    /// The key does not authenticate the stored ciphertext.
    #[error("decryption failed for {address}")]
    Decryption { address: String },

    /// The downloaded bytes do not hash to their address.
    #[error("integrity check failed for {address}")]
    Integrity { address: String },

    #[error("invalid address: {address}")]
    InvalidAddress { address: String },

    #[error("invalid key: {message}")]
    InvalidKey { message: String },

    #[error("encryption failed")]
    Encryption,

    #[error("backend error: {message}")]
    Backend { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("package error: {0}")]
    Package(#[from] PackageError),
}

impl StoreError {
    /// True for the transient condition callers may retry.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
