//! Streaming encryption for large files.
//!
//! Input is split into chunks that are encrypted independently, so memory
//! use stays bounded by the chunk size regardless of input size. Each chunk
//! is written as `len(u32 BE) || ciphertext`; there is no chaining state
//! between chunks beyond the key.

use std::io::{Read, Write};

use sysinfo::System;
use tracing::debug;

use crate::cipher::CipherMethod;
use crate::header::{read_full, EncryptionHeader, HEADER_SIZE};
use crate::kdf::derive_key_for;
use crate::keys::Key;
use securevault_common::{Error, NoProgress, ProgressObserver, Result, StreamSettings};

/// Size of the big-endian chunk length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Pick a chunk size for the given amount of available memory.
///
/// The result is `available / 4`, raised to `min_chunk_size` and capped at
/// `max_chunk_size`.
pub fn chunk_size_for(available_memory: u64, settings: &StreamSettings) -> usize {
    let quarter = usize::try_from(available_memory / 4).unwrap_or(usize::MAX);
    settings
        .max_chunk_size
        .min(settings.min_chunk_size.max(quarter))
}

/// Chunk size adapted to the memory currently available on this host.
pub fn adaptive_chunk_size(settings: &StreamSettings) -> usize {
    let mut system = System::new();
    system.refresh_memory();
    let size = chunk_size_for(system.available_memory(), settings);
    debug!(
        "Chunk size {} bytes ({} bytes available)",
        size,
        system.available_memory()
    );
    size
}

/// Chunked encrypt/decrypt driver for one cipher method.
#[derive(Debug, Clone)]
pub struct StreamCodec {
    method: CipherMethod,
    chunk_size: usize,
}

impl StreamCodec {
    /// Create a codec using default chunk sizing.
    pub fn new(method: CipherMethod) -> Self {
        Self::with_settings(method, &StreamSettings::default())
    }

    /// Create a codec whose chunk size follows `settings` and available memory.
    pub fn with_settings(method: CipherMethod, settings: &StreamSettings) -> Self {
        Self {
            method,
            chunk_size: adaptive_chunk_size(settings),
        }
    }

    /// Force a specific chunk size.
    ///
    /// A size of zero is raised to one byte.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Cipher method of this codec.
    pub fn method(&self) -> CipherMethod {
        self.method
    }

    /// Plaintext bytes per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Encrypt `reader` into a headerless chunk sequence on `writer`.
    ///
    /// `total` is only used for progress reports.
    ///
    /// # Postconditions
    /// - Returns the number of plaintext bytes consumed
    /// - Empty input produces no chunks
    ///
    /// # Errors
    /// - `Error::InvalidKeySize` if `key` does not fit the method
    /// - I/O errors from reader/writer
    pub fn encrypt_stream<R: Read, W: Write>(
        &self,
        key: &Key,
        mut reader: R,
        mut writer: W,
        total: u64,
        observer: &dyn ProgressObserver,
    ) -> Result<u64> {
        key.check_for(self.method)?;
        let cipher = self.method.cipher();

        let mut buffer = vec![0u8; self.chunk_size];
        let mut processed = 0u64;
        let mut chunks = 0u64;

        loop {
            let bytes_read = read_full(&mut reader, &mut buffer)?;
            if bytes_read == 0 {
                break;
            }

            let encrypted = cipher.encrypt(key.as_bytes(), &buffer[..bytes_read])?;
            let length = u32::try_from(encrypted.len()).map_err(|_| {
                Error::InvalidInput("Encrypted chunk exceeds 4 GiB".to_string())
            })?;
            writer.write_all(&length.to_be_bytes())?;
            writer.write_all(&encrypted)?;

            processed += bytes_read as u64;
            chunks += 1;
            observer.on_progress(processed, total);

            if bytes_read < buffer.len() {
                break;
            }
        }

        writer.flush()?;
        debug!("Encrypted {} bytes in {} chunks", processed, chunks);
        Ok(processed)
    }

    /// Decrypt a headerless chunk sequence from `reader` until end of input.
    ///
    /// `consumed` is the number of input bytes already read (for example a
    /// header) and seeds the progress count; `total` is the input size.
    ///
    /// # Postconditions
    /// - Returns the number of plaintext bytes written
    ///
    /// # Errors
    /// - `Error::Format` if a length prefix or chunk body is truncated
    /// - `Error::Decryption` if a chunk fails authentication
    /// - I/O errors from reader/writer
    pub fn decrypt_stream<R: Read, W: Write>(
        &self,
        key: &Key,
        mut reader: R,
        mut writer: W,
        consumed: u64,
        total: u64,
        observer: &dyn ProgressObserver,
    ) -> Result<u64> {
        key.check_for(self.method)?;
        let cipher = self.method.cipher();

        let mut consumed = consumed;
        let mut written = 0u64;
        let mut encrypted = Vec::new();

        loop {
            let mut length_bytes = [0u8; LENGTH_PREFIX_SIZE];
            let n = read_full(&mut reader, &mut length_bytes)?;
            if n == 0 {
                break;
            }
            if n < LENGTH_PREFIX_SIZE {
                return Err(Error::Format("Truncated chunk length prefix".to_string()));
            }
            let length = u32::from_be_bytes(length_bytes) as u64;

            // Never allocates past the bytes actually present.
            encrypted.clear();
            (&mut reader).take(length).read_to_end(&mut encrypted)?;
            if (encrypted.len() as u64) < length {
                return Err(Error::Format(format!(
                    "Chunk declares {} bytes but only {} remain",
                    length,
                    encrypted.len()
                )));
            }

            let plaintext = cipher.decrypt(key.as_bytes(), &encrypted)?;
            writer.write_all(&plaintext)?;

            written += plaintext.len() as u64;
            consumed += LENGTH_PREFIX_SIZE as u64 + length;
            observer.on_progress(consumed, total);
        }

        writer.flush()?;
        Ok(written)
    }

    /// Write a header with a fresh salt, derive the chunk key from
    /// `password`, and encrypt `reader` behind it.
    ///
    /// # Postconditions
    /// - Returns the number of plaintext bytes consumed
    pub fn encrypt_with_password<R: Read, W: Write>(
        &self,
        password: &[u8],
        reader: R,
        mut writer: W,
        total: u64,
        observer: &dyn ProgressObserver,
    ) -> Result<u64> {
        let header = EncryptionHeader::generate(self.method);
        let key = derive_key_for(password, &header.salt, self.method)?;

        header.write_to(&mut writer)?;
        self.encrypt_stream(&key, reader, writer, total, observer)
    }
}

/// Read a header, derive the key from `password`, and decrypt the chunks
/// that follow.
///
/// The magic is validated before any key derivation is attempted.
///
/// # Postconditions
/// - Returns the method recorded in the header and the plaintext size
///
/// # Errors
/// - `Error::Format` for a missing/invalid header or truncated chunk
/// - `Error::Decryption` on authentication failure (wrong password or
///   tampering) for authenticated methods
pub fn decrypt_with_password<R: Read, W: Write>(
    password: &[u8],
    mut reader: R,
    writer: W,
    total: u64,
    observer: &dyn ProgressObserver,
) -> Result<(CipherMethod, u64)> {
    let header = EncryptionHeader::read_from(&mut reader)?;
    let key = derive_key_for(password, &header.salt, header.method)?;

    let written = StreamCodec {
        method: header.method,
        chunk_size: 1,
    }
    .decrypt_stream(&key, reader, writer, HEADER_SIZE as u64, total, observer)?;

    Ok((header.method, written))
}

/// Parse the header of a password-encrypted stream without deriving a key.
pub fn read_header<R: Read>(mut reader: R) -> Result<EncryptionHeader> {
    EncryptionHeader::read_from(&mut reader)
}

/// Encrypt a complete byte slice with a key.
///
/// This is a convenience function for when the complete data is available.
pub fn encrypt_bytes(
    method: CipherMethod,
    key: &Key,
    data: &[u8],
    chunk_size: usize,
) -> Result<Vec<u8>> {
    let codec = StreamCodec {
        method,
        chunk_size: chunk_size.max(1),
    };
    let mut output = Vec::new();
    codec.encrypt_stream(key, data, &mut output, data.len() as u64, &NoProgress)?;
    Ok(output)
}

/// Decrypt a complete byte slice that was encrypted with [`encrypt_bytes`].
pub fn decrypt_bytes(method: CipherMethod, key: &Key, data: &[u8]) -> Result<Vec<u8>> {
    let codec = StreamCodec {
        method,
        chunk_size: 1,
    };
    let mut output = Vec::new();
    codec.decrypt_stream(key, data, &mut output, 0, data.len() as u64, &NoProgress)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use securevault_common::config::MIB;
    use std::io::Cursor;
    use std::sync::Mutex;

    #[test]
    fn test_chunk_size_bounds() {
        let settings = StreamSettings::default();
        assert_eq!(chunk_size_for(0, &settings), MIB);
        assert_eq!(chunk_size_for(64 * 1024 * 1024 * 1024, &settings), MIB);

        let wide = StreamSettings {
            max_chunk_size: 8 * MIB,
            min_chunk_size: MIB,
        };
        assert_eq!(chunk_size_for(2 * MIB as u64, &wide), MIB);
        assert_eq!(chunk_size_for(16 * MIB as u64, &wide), 4 * MIB);
        assert_eq!(chunk_size_for(1 << 40, &wide), 8 * MIB);
    }

    #[test]
    fn test_adaptive_chunk_size_within_bounds() {
        let size = StreamCodec::new(CipherMethod::Token).chunk_size();
        assert_eq!(size, MIB);
    }

    #[test]
    fn test_stream_roundtrip_every_method() {
        let plaintext: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        for method in CipherMethod::ALL {
            let key = Key::generate(method);
            let encrypted = encrypt_bytes(method, &key, &plaintext, 1000).unwrap();
            let decrypted = decrypt_bytes(method, &key, &encrypted).unwrap();
            assert_eq!(decrypted, plaintext, "{} stream round trip", method);
        }
    }

    #[test]
    fn test_chunk_framing() {
        let key = Key::generate(CipherMethod::Aes128Cfb);
        let encrypted = encrypt_bytes(CipherMethod::Aes128Cfb, &key, &[0u8; 250], 100).unwrap();

        // Three chunks of 100, 100, 50 plaintext bytes, each iv || ct.
        let mut offset = 0;
        for expected in [100usize, 100, 50] {
            let len = u32::from_be_bytes(encrypted[offset..offset + 4].try_into().unwrap());
            assert_eq!(len as usize, 16 + expected);
            offset += 4 + len as usize;
        }
        assert_eq!(offset, encrypted.len());
    }

    #[test]
    fn test_exact_multiple_of_chunk_size() {
        let key = Key::generate(CipherMethod::Aes256Gcm);
        let plaintext = vec![0xCD; 300];
        let encrypted = encrypt_bytes(CipherMethod::Aes256Gcm, &key, &plaintext, 100).unwrap();
        assert_eq!(encrypted.len(), 3 * (4 + 16 + 16 + 100));
        assert_eq!(decrypt_bytes(CipherMethod::Aes256Gcm, &key, &encrypted).unwrap(), plaintext);
    }

    #[test]
    fn test_empty_input_has_no_chunks() {
        let key = Key::generate(CipherMethod::Token);
        let encrypted = encrypt_bytes(CipherMethod::Token, &key, b"", 64).unwrap();
        assert!(encrypted.is_empty());
        assert!(decrypt_bytes(CipherMethod::Token, &key, &encrypted).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_chunk_is_format_error() {
        let key = Key::generate(CipherMethod::Aes256Gcm);
        let encrypted = encrypt_bytes(CipherMethod::Aes256Gcm, &key, &[1u8; 64], 64).unwrap();

        let result = decrypt_bytes(CipherMethod::Aes256Gcm, &key, &encrypted[..encrypted.len() - 1]);
        assert!(matches!(result, Err(Error::Format(_))));

        let result = decrypt_bytes(CipherMethod::Aes256Gcm, &key, &encrypted[..2]);
        assert!(matches!(result, Err(Error::Format(_))));
    }

    #[test]
    fn test_oversized_length_prefix_is_format_error() {
        let key = Key::generate(CipherMethod::Aes256Cfb);
        let mut data = u32::MAX.to_be_bytes().to_vec();
        data.extend_from_slice(&[0u8; 40]);
        let result = decrypt_bytes(CipherMethod::Aes256Cfb, &key, &data);
        assert!(matches!(result, Err(Error::Format(_))));
    }

    #[test]
    fn test_wrong_key_size_rejected() {
        let key = Key::from_bytes(vec![0u8; 16]);
        let result = encrypt_bytes(CipherMethod::Aes256Gcm, &key, b"data", 16);
        assert!(matches!(result, Err(Error::InvalidKeySize { .. })));
    }

    #[test]
    fn test_progress_reports_cumulative_bytes() {
        let key = Key::generate(CipherMethod::Aes128Cfb);
        let reports = Mutex::new(Vec::new());
        let observer = |processed: u64, total: u64| reports.lock().unwrap().push((processed, total));

        let codec = StreamCodec::new(CipherMethod::Aes128Cfb).with_chunk_size(10);
        let mut output = Vec::new();
        codec
            .encrypt_stream(&key, &[0u8; 25][..], &mut output, 25, &observer)
            .unwrap();

        assert_eq!(*reports.lock().unwrap(), vec![(10, 25), (20, 25), (25, 25)]);
    }

    #[test]
    fn test_password_roundtrip_with_header() {
        let codec = StreamCodec::new(CipherMethod::Aes256Gcm).with_chunk_size(32);
        let plaintext = b"password protected stream spanning several chunks of data";

        let mut encrypted = Vec::new();
        codec
            .encrypt_with_password(b"pw", &plaintext[..], &mut encrypted, plaintext.len() as u64, &NoProgress)
            .unwrap();
        assert_eq!(&encrypted[..4], b"SVEP");
        assert_eq!(encrypted[4], b'G');

        let mut decrypted = Vec::new();
        let total = encrypted.len() as u64;
        let (method, written) =
            decrypt_with_password(b"pw", Cursor::new(encrypted), &mut decrypted, total, &NoProgress)
                .unwrap();

        assert_eq!(method, CipherMethod::Aes256Gcm);
        assert_eq!(written, plaintext.len() as u64);
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_decrypt_progress_reaches_total() {
        let codec = StreamCodec::new(CipherMethod::Token).with_chunk_size(16);
        let mut encrypted = Vec::new();
        codec
            .encrypt_with_password(b"pw", &[9u8; 40][..], &mut encrypted, 40, &NoProgress)
            .unwrap();

        let last = Mutex::new((0u64, 0u64));
        let observer = |processed: u64, total: u64| *last.lock().unwrap() = (processed, total);
        let total = encrypted.len() as u64;
        decrypt_with_password(b"pw", Cursor::new(encrypted), Vec::new(), total, &observer).unwrap();

        assert_eq!(*last.lock().unwrap(), (total, total));
    }

    #[test]
    fn test_bad_magic_fails_before_key_derivation() {
        let data = b"NOPE this is not an encrypted file".to_vec();
        let result = decrypt_with_password(b"pw", Cursor::new(data), Vec::new(), 0, &NoProgress);
        assert!(matches!(result, Err(Error::Format(_))));
    }
}
