//! Cipher strategy selection.
//!
//! Three incompatible ciphertext layouts share one dispatch byte in the
//! file header. Each layout is a [`Cipher`] implementation; [`CipherMethod`]
//! maps header bytes and display names onto them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::cfb::CfbCipher;
use crate::gcm::GcmCipher;
use crate::token::TokenCipher;
use securevault_common::{Error, Result};

/// Encrypt/decrypt strategy over a raw key.
pub trait Cipher: Send + Sync {
    /// Encrypt `plaintext`, returning a self-contained ciphertext.
    ///
    /// # Errors
    /// - `Error::InvalidKeySize` if `key` does not match [`Cipher::key_length`]
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a ciphertext produced by [`Cipher::encrypt`].
    ///
    /// # Errors
    /// - `Error::InvalidKeySize` if `key` does not match [`Cipher::key_length`]
    /// - `Error::Decryption` on malformed or (where detectable) tampered input
    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// Required key length in bytes.
    fn key_length(&self) -> usize;
}

/// Fail fast when a key does not match the expected size.
pub(crate) fn ensure_key_length(key: &[u8], expected: usize) -> Result<()> {
    if key.len() != expected {
        return Err(Error::InvalidKeySize {
            expected,
            actual: key.len(),
        });
    }
    Ok(())
}

static TOKEN: TokenCipher = TokenCipher::new();
static AES128_CFB: CfbCipher = CfbCipher::new(16);
static AES192_CFB: CfbCipher = CfbCipher::new(24);
static AES256_CFB: CfbCipher = CfbCipher::new(32);
static AES256_GCM: GcmCipher = GcmCipher;

/// Encryption method recorded in the file header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherMethod {
    /// Fernet-compatible authenticated token.
    #[default]
    Token,
    /// AES-128 in CFB mode.
    Aes128Cfb,
    /// AES-192 in CFB mode.
    Aes192Cfb,
    /// AES-256 in CFB mode.
    Aes256Cfb,
    /// AES-256 in GCM mode with a 16-byte IV.
    Aes256Gcm,
}

impl CipherMethod {
    /// Every method, in header-byte order.
    pub const ALL: [CipherMethod; 5] = [
        CipherMethod::Token,
        CipherMethod::Aes128Cfb,
        CipherMethod::Aes192Cfb,
        CipherMethod::Aes256Cfb,
        CipherMethod::Aes256Gcm,
    ];

    /// Header dispatch byte.
    pub fn as_byte(self) -> u8 {
        match self {
            CipherMethod::Token => b'F',
            CipherMethod::Aes128Cfb => b'A',
            CipherMethod::Aes192Cfb => b'B',
            CipherMethod::Aes256Cfb => b'C',
            CipherMethod::Aes256Gcm => b'G',
        }
    }

    /// Parse a header dispatch byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_byte() == byte)
    }

    /// Display name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            CipherMethod::Token => "Fernet",
            CipherMethod::Aes128Cfb => "AES-128",
            CipherMethod::Aes192Cfb => "AES-192",
            CipherMethod::Aes256Cfb => "AES-256",
            CipherMethod::Aes256Gcm => "AES-256-GCM",
        }
    }

    /// Whether ciphertexts are authenticated.
    pub fn is_authenticated(self) -> bool {
        matches!(self, CipherMethod::Token | CipherMethod::Aes256Gcm)
    }

    /// Strategy implementing this method.
    pub fn cipher(self) -> &'static dyn Cipher {
        match self {
            CipherMethod::Token => &TOKEN,
            CipherMethod::Aes128Cfb => &AES128_CFB,
            CipherMethod::Aes192Cfb => &AES192_CFB,
            CipherMethod::Aes256Cfb => &AES256_CFB,
            CipherMethod::Aes256Gcm => &AES256_GCM,
        }
    }

    /// Required key length in bytes.
    pub fn key_length(self) -> usize {
        self.cipher().key_length()
    }

    /// Encrypt one buffer with this method.
    pub fn encrypt(self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.cipher().encrypt(key, plaintext)
    }

    /// Decrypt one buffer with this method.
    pub fn decrypt(self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.cipher().decrypt(key, ciphertext)
    }
}

impl fmt::Display for CipherMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CipherMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        if wanted.eq_ignore_ascii_case("token") {
            return Ok(CipherMethod::Token);
        }
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown encryption method: {}", s)))
    }
}
