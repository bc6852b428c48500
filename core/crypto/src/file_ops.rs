//! File-level encryption and decryption.
//!
//! Thin wrappers that open the input and output paths and drive a
//! [`StreamCodec`] over them. Output files are created with mode 0o600
//! (read/write for owner only) on Unix systems.
//!
//! An I/O or decryption error aborts the operation and leaves the partial
//! output in place.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tracing::info;

use crate::cipher::CipherMethod;
use crate::keys::Key;
use crate::header::{EncryptionHeader, HEADER_SIZE};
use crate::kdf::derive_key_for;
use crate::stream::StreamCodec;
use securevault_common::{Error, ProgressObserver, Result, StreamSettings};

/// Create (or truncate) a file readable and writable by its owner only.
pub fn create_private_file(path: &Path) -> Result<File> {
    #[cfg(unix)]
    {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        Ok(file)
    }

    #[cfg(not(unix))]
    {
        Ok(File::create(path)?)
    }
}

fn open_input(path: &Path) -> Result<(File, u64)> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::InvalidInput(format!("Input file not found: {}", path.display()))
        } else {
            Error::Io(e)
        }
    })?;
    let size = file.metadata()?.len();
    Ok((file, size))
}

fn finish(writer: BufWriter<File>) -> Result<()> {
    let file = writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(())
}

/// Encrypt `input` to `output` under a password.
///
/// The output starts with an [`EncryptionHeader`](crate::EncryptionHeader)
/// carrying `method` and a fresh salt.
///
/// # Errors
/// - `Error::InvalidInput` if the input file does not exist
/// - `Error::KeyDerivation` if key derivation fails
/// - I/O errors reading or writing
pub fn encrypt_file_with_password(
    password: &[u8],
    method: CipherMethod,
    input: &Path,
    output: &Path,
    settings: &StreamSettings,
    observer: &dyn ProgressObserver,
) -> Result<u64> {
    let (source, total) = open_input(input)?;
    let mut writer = BufWriter::new(create_private_file(output)?);

    info!("Encrypting {} with {}", input.display(), method);
    let codec = StreamCodec::with_settings(method, settings);
    let processed =
        codec.encrypt_with_password(password, BufReader::new(source), &mut writer, total, observer)?;
    finish(writer)?;

    info!("Encrypted {} bytes to {}", processed, output.display());
    Ok(processed)
}

/// Decrypt a password-encrypted `input` to `output`.
///
/// The method is read from the file header. Returns it so callers can
/// report what was used.
///
/// # Errors
/// - `Error::Format` if the input is not a password-encrypted file or is truncated
/// - `Error::Decryption` on a wrong password or tampering (authenticated methods)
/// - I/O errors reading or writing
pub fn decrypt_file_with_password(
    password: &[u8],
    input: &Path,
    output: &Path,
    observer: &dyn ProgressObserver,
) -> Result<CipherMethod> {
    let (source, total) = open_input(input)?;
    let mut reader = BufReader::new(source);

    // Foreign files are rejected before the output is created.
    let header = EncryptionHeader::read_from(&mut reader)?;
    let key = derive_key_for(password, &header.salt, header.method)?;
    let mut writer = BufWriter::new(create_private_file(output)?);

    info!("Decrypting {} ({})", input.display(), header.method);
    let written = StreamCodec::new(header.method).decrypt_stream(
        &key,
        reader,
        &mut writer,
        HEADER_SIZE as u64,
        total,
        observer,
    )?;
    finish(writer)?;

    info!("Decrypted {} bytes to {}", written, output.display());
    Ok(header.method)
}

/// Encrypt `input` to `output` with a raw key, without a header.
///
/// # Errors
/// - `Error::InvalidKeySize` if `key` does not fit `method`
/// - I/O errors reading or writing
pub fn encrypt_file_with_key(
    key: &Key,
    method: CipherMethod,
    input: &Path,
    output: &Path,
    settings: &StreamSettings,
    observer: &dyn ProgressObserver,
) -> Result<u64> {
    key.check_for(method)?;
    let (source, total) = open_input(input)?;
    let mut writer = BufWriter::new(create_private_file(output)?);

    info!("Encrypting {} with {} key", input.display(), method);
    let processed = StreamCodec::with_settings(method, settings).encrypt_stream(
        key,
        BufReader::new(source),
        &mut writer,
        total,
        observer,
    )?;
    finish(writer)?;
    Ok(processed)
}

/// Decrypt a keyed (headerless) stream from `input` to `output`.
///
/// # Errors
/// - `Error::InvalidKeySize` if `key` does not fit `method`
/// - `Error::Format` on a truncated chunk
/// - `Error::Decryption` on a wrong key or tampering (authenticated methods)
pub fn decrypt_file_with_key(
    key: &Key,
    method: CipherMethod,
    input: &Path,
    output: &Path,
    observer: &dyn ProgressObserver,
) -> Result<u64> {
    key.check_for(method)?;
    let (source, total) = open_input(input)?;
    let mut writer = BufWriter::new(create_private_file(output)?);

    info!("Decrypting {} with {} key", input.display(), method);
    let written = StreamCodec::new(method).decrypt_stream(
        key,
        BufReader::new(source),
        &mut writer,
        0,
        total,
        observer,
    )?;
    finish(writer)?;
    Ok(written)
}
