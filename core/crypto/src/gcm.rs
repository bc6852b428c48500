//! Authenticated encryption using AES-256-GCM.
//!
//! Layout: `iv(16) || tag(16) || ciphertext`. The IV is 16 bytes rather
//! than the usual 12, so the initial counter block is derived through
//! GHASH as GCM specifies for non-96-bit IVs.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use rand::RngCore;

use crate::cipher::{ensure_key_length, Cipher};
use securevault_common::{Error, Result};

/// IV size (16 bytes).
pub const IV_SIZE: usize = 16;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Key size for AES-256.
pub const KEY_LENGTH: usize = 32;

type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// AES-256-GCM strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcmCipher;

impl Cipher for GcmCipher {
    /// # Postconditions
    /// - Returns iv || tag || ciphertext
    /// - The IV is randomly generated per call
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        ensure_key_length(key, KEY_LENGTH)?;

        let cipher = Aes256Gcm16::new_from_slice(key)
            .map_err(|_| Error::InvalidKeySize {
                expected: KEY_LENGTH,
                actual: key.len(),
            })?;

        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&iv), b"", &mut buffer)
            .map_err(|e| Error::Decryption(format!("Encryption failed: {}", e)))?;

        let mut result = Vec::with_capacity(IV_SIZE + TAG_SIZE + buffer.len());
        result.extend_from_slice(&iv);
        result.extend_from_slice(&tag);
        result.extend_from_slice(&buffer);

        Ok(result)
    }

    /// # Errors
    /// - Returns error if ciphertext is shorter than iv + tag
    /// - Returns error if authentication fails (tampered data or wrong key)
    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        ensure_key_length(key, KEY_LENGTH)?;

        if ciphertext.len() < IV_SIZE + TAG_SIZE {
            return Err(Error::Decryption("Ciphertext too short".to_string()));
        }

        let (iv, rest) = ciphertext.split_at(IV_SIZE);
        let (tag, encrypted) = rest.split_at(TAG_SIZE);

        let cipher = Aes256Gcm16::new_from_slice(key)
            .map_err(|_| Error::InvalidKeySize {
                expected: KEY_LENGTH,
                actual: key.len(),
            })?;

        let mut buffer = encrypted.to_vec();
        cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(iv),
                b"",
                &mut buffer,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| Error::Decryption("Authentication tag mismatch".to_string()))?;

        Ok(buffer)
    }

    fn key_length(&self) -> usize {
        KEY_LENGTH
    }
}
