//! Key derivation using PBKDF2-HMAC-SHA256.
//!
//! The iteration count is a crate constant. It is part of the file format:
//! changing it makes existing password-encrypted files undecryptable.

use sha2::Sha256;

use crate::cipher::CipherMethod;
use crate::keys::{Key, Salt};
use securevault_common::{Error, Result};

/// PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Derive a key of `length` bytes from a password and salt.
///
/// # Preconditions
/// - `length` must be positive
///
/// # Postconditions
/// - The derived key is deterministic given the same inputs
///
/// # Errors
/// - Returns `Error::KeyDerivation` if `length` is zero
///
/// # Security
/// - Empty passwords are accepted; rejecting them is the caller's policy
/// - Password is not stored or logged
pub fn derive_key(password: &[u8], salt: &Salt, length: usize) -> Result<Key> {
    if length == 0 {
        return Err(Error::KeyDerivation(
            "Key length must be positive".to_string(),
        ));
    }

    let mut key_bytes = vec![0u8; length];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt.as_bytes(), PBKDF2_ITERATIONS, &mut key_bytes);

    Ok(Key::from_bytes(key_bytes))
}

/// Derive a key sized for `method`.
pub fn derive_key_for(password: &[u8], salt: &Salt, method: CipherMethod) -> Result<Key> {
    derive_key(password, salt, method.key_length())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_deterministic() {
        let password = b"test-password-123";
        let salt = Salt::from_bytes([42u8; 16]);

        let key1 = derive_key(password, &salt, 32).unwrap();
        let key2 = derive_key(password, &salt, 32).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_salt() {
        let password = b"test-password-123";
        let salt1 = Salt::from_bytes([1u8; 16]);
        let salt2 = Salt::from_bytes([2u8; 16]);

        let key1 = derive_key(password, &salt1, 32).unwrap();
        let key2 = derive_key(password, &salt2, 32).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_password() {
        let salt = Salt::from_bytes([42u8; 16]);

        let key1 = derive_key(b"password1", &salt, 32).unwrap();
        let key2 = derive_key(b"password2", &salt, 32).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_length_is_prefix_stable() {
        // PBKDF2 output blocks are independent, so a shorter key is a
        // prefix of a longer one; lengths still yield distinct keys.
        let salt = Salt::from_bytes([9u8; 16]);
        let short = derive_key(b"pw", &salt, 16).unwrap();
        let long = derive_key(b"pw", &salt, 32).unwrap();

        assert_eq!(short.len(), 16);
        assert_eq!(long.len(), 32);
        assert_ne!(short, long);
        assert_eq!(short.as_bytes(), &long.as_bytes()[..16]);
    }

    #[test]
    fn test_derive_key_zero_length_fails() {
        let salt = Salt::generate();
        assert!(matches!(
            derive_key(b"pw", &salt, 0),
            Err(Error::KeyDerivation(_))
        ));
    }

    #[test]
    fn test_derive_key_empty_password_allowed() {
        let salt = Salt::from_bytes([0u8; 16]);
        let key = derive_key(b"", &salt, 24).unwrap();
        assert_eq!(key.len(), 24);
    }

    #[test]
    fn test_derive_key_for_method() {
        let salt = Salt::from_bytes([5u8; 16]);
        for method in CipherMethod::ALL {
            let key = derive_key_for(b"pw", &salt, method).unwrap();
            key.check_for(method).unwrap();
        }
    }
}
