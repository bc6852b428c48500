//! Cryptographic primitives for SecureVault.
//!
//! This module provides:
//! - Key derivation using PBKDF2-HMAC-SHA256
//! - Three interchangeable cipher strategies (token, AES-CFB, AES-GCM)
//! - Key material with automatic zeroization and key-file handling
//! - Chunked streaming encryption behind a fixed file header
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Token and GCM ciphertexts fail closed on tampering; CFB does not
//!   authenticate and cannot detect tampering

pub mod cfb;
pub mod cipher;
pub mod entropy;
pub mod file_ops;
pub mod gcm;
pub mod header;
pub mod kdf;
pub mod keys;
pub mod stream;
pub mod token;

pub use cipher::{Cipher, CipherMethod};
pub use file_ops::{
    decrypt_file_with_key, decrypt_file_with_password, encrypt_file_with_key,
    encrypt_file_with_password,
};
pub use header::EncryptionHeader;
pub use kdf::{derive_key, PBKDF2_ITERATIONS};
pub use keys::{load_key_file, save_key_file, Key, Salt};
pub use stream::{decrypt_with_password, read_header, StreamCodec};
