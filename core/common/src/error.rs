//! Common error types for SecureVault.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for SecureVault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Encrypted input is not in the expected format (bad magic, unknown
    /// method byte, truncated header or chunk).
    #[error("Format error: {0}")]
    Format(String),

    /// Key length does not match the selected algorithm.
    #[error("Invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    /// Decryption or authentication failed (tampering or wrong key).
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Key derivation was given unusable parameters.
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// Wipe target is missing, inaccessible, or cannot be classified.
    #[error("Invalid wipe target: {0}")]
    InvalidTarget(String),

    /// A wiped file did not read back as the expected fill byte.
    #[error("Verification failed: {} differs at offset {offset}", path.display())]
    FailedVerification { path: PathBuf, offset: u64 },

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error means the ciphertext could not be authenticated.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Error::Decryption(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
