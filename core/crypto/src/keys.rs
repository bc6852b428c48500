//! Key types with secure memory handling.
//!
//! Keys automatically zeroize their memory on drop to prevent sensitive
//! data from persisting in memory.

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::Path;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::cipher::CipherMethod;
use securevault_common::{Error, Result};

/// Length of the key-derivation salt in bytes.
pub const SALT_LENGTH: usize = 16;

/// Symmetric key for one of the cipher strategies.
///
/// The length is not fixed: AES variants use 16/24/32 bytes and the token
/// scheme uses 32 bytes (signing half followed by encryption half).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Key {
    bytes: Vec<u8>,
}

impl Key {
    /// Create a key from raw bytes, taking ownership.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Create a key by copying a slice.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Generate a random key sized for `method`.
    pub fn generate(method: CipherMethod) -> Self {
        let mut bytes = vec![0u8; method.key_length()];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the key holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Check that this key can be used with `method`.
    ///
    /// # Errors
    /// - `Error::InvalidKeySize` if the length does not match
    pub fn check_for(&self, method: CipherMethod) -> Result<()> {
        if self.bytes.len() != method.key_length() {
            return Err(Error::InvalidKeySize {
                expected: method.key_length(),
                actual: self.bytes.len(),
            });
        }
        Ok(())
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for Key {}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key([REDACTED; {} bytes])", self.bytes.len())
    }
}

/// Salt for key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Salt(pub [u8; SALT_LENGTH]);

impl Salt {
    /// Generate a random salt.
    pub fn generate() -> Self {
        let mut salt = [0u8; SALT_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt);
        Self(salt)
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }
}

/// Encode a key the way it is stored in a key file.
///
/// Token keys use the base64url text form common to Fernet tooling; AES
/// keys are stored as raw bytes.
pub fn encode_key_file(key: &Key, method: CipherMethod) -> Result<Zeroizing<Vec<u8>>> {
    key.check_for(method)?;
    let encoded = match method {
        CipherMethod::Token => URL_SAFE.encode(key.as_bytes()).into_bytes(),
        _ => key.as_bytes().to_vec(),
    };
    Ok(Zeroizing::new(encoded))
}

/// Write a key file with owner-only permissions.
///
/// # Errors
/// - `Error::InvalidKeySize` if the key does not fit `method`
/// - I/O errors creating or writing the file
pub fn save_key_file(path: &Path, key: &Key, method: CipherMethod) -> Result<()> {
    let encoded = encode_key_file(key, method)?;
    let mut file = crate::file_ops::create_private_file(path)?;
    file.write_all(&encoded)?;
    file.sync_all()?;
    Ok(())
}

/// Read a key file.
///
/// Raw files of 16, 24 or 32 bytes are returned as-is. Anything else is
/// tried as a base64url token key (surrounding whitespace ignored); if that
/// fails the raw bytes are returned and size validation is left to the
/// cipher that receives the key.
pub fn load_key_file(path: &Path) -> Result<Key> {
    let contents = Zeroizing::new(std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::InvalidInput(format!("Key file not found: {}", path.display()))
        } else {
            Error::Io(e)
        }
    })?);
    Ok(decode_key_bytes(&contents))
}

/// Interpret key-file contents.
pub fn decode_key_bytes(contents: &[u8]) -> Key {
    if matches!(contents.len(), 16 | 24 | 32) {
        return Key::from_slice(contents);
    }
    let trimmed = contents.trim_ascii();
    if let Ok(decoded) = URL_SAFE.decode(trimmed) {
        let decoded = Zeroizing::new(decoded);
        if decoded.len() == CipherMethod::Token.key_length() {
            return Key::from_slice(&decoded);
        }
    }
    Key::from_slice(contents)
}
