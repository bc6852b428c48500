//! AES in full-block CFB mode.
//!
//! Layout: `iv(16) || ciphertext`. CFB is unauthenticated: a flipped
//! ciphertext bit decrypts to different plaintext without any error. The
//! layout is part of the file format and is kept as-is.

use aes::{Aes128, Aes192, Aes256};
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use rand::RngCore;

use crate::cipher::{ensure_key_length, Cipher};
use securevault_common::{Error, Result};

/// IV size for AES-CFB (one AES block).
pub const IV_SIZE: usize = 16;

/// AES-CFB strategy for a fixed key size (16, 24 or 32 bytes).
#[derive(Debug, Clone, Copy)]
pub struct CfbCipher {
    key_length: usize,
}

impl CfbCipher {
    /// Create a strategy for the given AES key size.
    pub const fn new(key_length: usize) -> Self {
        Self { key_length }
    }
}

fn invalid_length(_: cfb_mode::cipher::InvalidLength) -> Error {
    Error::Decryption("Invalid AES-CFB key or IV length".to_string())
}

fn apply_keystream(key: &[u8], iv: &[u8], buf: &mut [u8], encrypt: bool) -> Result<()> {
    match (key.len(), encrypt) {
        (16, true) => cfb_mode::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(invalid_length)?
            .encrypt(buf),
        (16, false) => cfb_mode::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(invalid_length)?
            .decrypt(buf),
        (24, true) => cfb_mode::Encryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(invalid_length)?
            .encrypt(buf),
        (24, false) => cfb_mode::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(invalid_length)?
            .decrypt(buf),
        (32, true) => cfb_mode::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(invalid_length)?
            .encrypt(buf),
        (32, false) => cfb_mode::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(invalid_length)?
            .decrypt(buf),
        (other, _) => {
            return Err(Error::InvalidKeySize {
                expected: 32,
                actual: other,
            })
        }
    }
    Ok(())
}

impl Cipher for CfbCipher {
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        ensure_key_length(key, self.key_length)?;

        let mut output = vec![0u8; IV_SIZE + plaintext.len()];
        let (iv, body) = output.split_at_mut(IV_SIZE);
        rand::thread_rng().fill_bytes(iv);
        body.copy_from_slice(plaintext);
        apply_keystream(key, iv, body, true)?;

        Ok(output)
    }

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        ensure_key_length(key, self.key_length)?;

        if ciphertext.len() < IV_SIZE {
            return Err(Error::Decryption("Ciphertext too short".to_string()));
        }

        let (iv, body) = ciphertext.split_at(IV_SIZE);
        let mut plaintext = body.to_vec();
        apply_keystream(key, iv, &mut plaintext, false)?;

        Ok(plaintext)
    }

    fn key_length(&self) -> usize {
        self.key_length
    }
}
