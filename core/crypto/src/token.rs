//! Self-describing authenticated tokens, compatible with Fernet.
//!
//! A token is the base64url encoding of
//! `0x80 || timestamp(u64 BE) || iv(16) || AES-128-CBC-PKCS7(plaintext) || HMAC-SHA256(32)`.
//! The 32-byte key is split into a signing half (first 16 bytes) and an
//! encryption half (last 16 bytes). The HMAC covers every byte before it.

use aes::Aes128;
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::time::Duration;

use crate::cipher::{ensure_key_length, Cipher};
use securevault_common::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Token format version byte.
pub const VERSION: u8 = 0x80;

/// Key size: 16-byte signing key followed by 16-byte encryption key.
pub const KEY_LENGTH: usize = 32;

const TIMESTAMP_SIZE: usize = 8;
const IV_SIZE: usize = 16;
const BLOCK_SIZE: usize = 16;
const HMAC_SIZE: usize = 32;
const HEADER_SIZE: usize = 1 + TIMESTAMP_SIZE + IV_SIZE;

/// Tolerated clock skew for tokens stamped in the future, in seconds.
const MAX_CLOCK_SKEW: i64 = 60;

/// Token strategy.
///
/// Without a TTL, token age is not checked. With a TTL, tokens older than
/// the TTL, or stamped further in the future than the allowed clock skew,
/// are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCipher {
    ttl: Option<Duration>,
}

impl TokenCipher {
    /// Create a strategy that accepts tokens of any age.
    pub const fn new() -> Self {
        Self { ttl: None }
    }

    /// Reject tokens older than `ttl`.
    pub const fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }

    fn encrypt_at(&self, key: &[u8], plaintext: &[u8], timestamp: i64) -> Result<Vec<u8>> {
        ensure_key_length(key, KEY_LENGTH)?;
        let (signing_key, encryption_key) = key.split_at(KEY_LENGTH / 2);

        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = cbc::Encryptor::<Aes128>::new_from_slices(encryption_key, &iv)
            .map_err(|_| Error::Decryption("Invalid token key".to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut token = Vec::with_capacity(HEADER_SIZE + ciphertext.len() + HMAC_SIZE);
        token.push(VERSION);
        token.extend_from_slice(&(timestamp as u64).to_be_bytes());
        token.extend_from_slice(&iv);
        token.extend_from_slice(&ciphertext);

        let mut mac = <HmacSha256 as Mac>::new_from_slice(signing_key)
            .map_err(|_| Error::Decryption("Invalid token key".to_string()))?;
        mac.update(&token);
        token.extend_from_slice(&mac.finalize().into_bytes());

        Ok(URL_SAFE.encode(token).into_bytes())
    }

    fn decrypt_at(&self, key: &[u8], encoded: &[u8], now: i64) -> Result<Vec<u8>> {
        ensure_key_length(key, KEY_LENGTH)?;
        let (signing_key, encryption_key) = key.split_at(KEY_LENGTH / 2);

        let data = URL_SAFE
            .decode(encoded)
            .map_err(|_| Error::Decryption("Token is not valid base64url".to_string()))?;

        if data.len() < HEADER_SIZE + BLOCK_SIZE + HMAC_SIZE
            || (data.len() - HEADER_SIZE - HMAC_SIZE) % BLOCK_SIZE != 0
        {
            return Err(Error::Decryption("Token has invalid length".to_string()));
        }
        if data[0] != VERSION {
            return Err(Error::Decryption(format!(
                "Unsupported token version: {:#04x}",
                data[0]
            )));
        }

        let mut timestamp_bytes = [0u8; TIMESTAMP_SIZE];
        timestamp_bytes.copy_from_slice(&data[1..1 + TIMESTAMP_SIZE]);
        let timestamp = u64::from_be_bytes(timestamp_bytes) as i64;

        if let Some(ttl) = self.ttl {
            if timestamp.saturating_add(ttl.as_secs() as i64) < now {
                return Err(Error::Decryption("Token has expired".to_string()));
            }
            if now.saturating_add(MAX_CLOCK_SKEW) < timestamp {
                return Err(Error::Decryption("Token timestamp is in the future".to_string()));
            }
        }

        let (signed, tag) = data.split_at(data.len() - HMAC_SIZE);
        let mut mac = <HmacSha256 as Mac>::new_from_slice(signing_key)
            .map_err(|_| Error::Decryption("Invalid token key".to_string()))?;
        mac.update(signed);
        mac.verify_slice(tag)
            .map_err(|_| Error::Decryption("Token signature mismatch".to_string()))?;

        let iv = &signed[1 + TIMESTAMP_SIZE..HEADER_SIZE];
        let ciphertext = &signed[HEADER_SIZE..];

        cbc::Decryptor::<Aes128>::new_from_slices(encryption_key, iv)
            .map_err(|_| Error::Decryption("Invalid token key".to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| Error::Decryption("Token padding is invalid".to_string()))
    }
}

impl Cipher for TokenCipher {
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encrypt_at(key, plaintext, chrono::Utc::now().timestamp())
    }

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_at(key, ciphertext, chrono::Utc::now().timestamp())
    }

    fn key_length(&self) -> usize {
        KEY_LENGTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LENGTH] = [0x24; KEY_LENGTH];

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = TokenCipher::new();
        let token = cipher.encrypt(&KEY, b"token payload").unwrap();
        assert_eq!(cipher.decrypt(&KEY, &token).unwrap(), b"token payload");
    }

    #[test]
    fn test_token_structure() {
        let cipher = TokenCipher::new();
        let token = cipher.encrypt_at(&KEY, b"abc", 1_700_000_000).unwrap();
        let raw = URL_SAFE.decode(&token).unwrap();

        assert_eq!(raw[0], VERSION);
        assert_eq!(&raw[1..9], &1_700_000_000u64.to_be_bytes());
        // One padded block of ciphertext.
        assert_eq!(raw.len(), HEADER_SIZE + BLOCK_SIZE + HMAC_SIZE);
        assert!(token.iter().all(|b| b.is_ascii()));
    }

    #[test]
    fn test_tampered_token_fails() {
        let cipher = TokenCipher::new();
        let token = cipher.encrypt(&KEY, b"Important data").unwrap();
        let mut raw = URL_SAFE.decode(&token).unwrap();

        for index in 0..raw.len() {
            raw[index] ^= 0x01;
            let tampered = URL_SAFE.encode(&raw).into_bytes();
            assert!(
                cipher.decrypt(&KEY, &tampered).is_err(),
                "flip at byte {} went undetected",
                index
            );
            raw[index] ^= 0x01;
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let cipher = TokenCipher::new();
        let token = cipher.encrypt(&KEY, b"secret").unwrap();
        let result = cipher.decrypt(&[0x25; KEY_LENGTH], &token);
        assert!(matches!(result, Err(Error::Decryption(_))));
    }

    #[test]
    fn test_garbage_input_fails() {
        let cipher = TokenCipher::new();
        assert!(cipher.decrypt(&KEY, b"not a token!").is_err());
        assert!(cipher.decrypt(&KEY, b"").is_err());
    }

    #[test]
    fn test_ttl_expiry() {
        let cipher = TokenCipher::with_ttl(Duration::from_secs(60));
        let token = cipher.encrypt_at(&KEY, b"old", 1_000).unwrap();

        assert!(cipher.decrypt_at(&KEY, &token, 1_030).is_ok());
        assert!(cipher.decrypt_at(&KEY, &token, 1_061).is_err());
    }

    #[test]
    fn test_ttl_rejects_future_tokens() {
        let cipher = TokenCipher::with_ttl(Duration::from_secs(60));
        let token = cipher.encrypt_at(&KEY, b"early", 10_000).unwrap();
        assert!(cipher.decrypt_at(&KEY, &token, 10_000 - MAX_CLOCK_SKEW - 1).is_err());
    }

    #[test]
    fn test_no_ttl_accepts_old_tokens() {
        let cipher = TokenCipher::new();
        let token = cipher.encrypt_at(&KEY, b"ancient", 0).unwrap();
        assert_eq!(cipher.decrypt(&KEY, &token).unwrap(), b"ancient");
    }

    #[test]
    fn test_empty_plaintext() {
        let cipher = TokenCipher::new();
        let token = cipher.encrypt(&KEY, b"").unwrap();
        assert!(cipher.decrypt(&KEY, &token).unwrap().is_empty());
    }
}
