//! Read-back verification of wiped files.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use securevault_common::{Error, Result};

/// Default read block size.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Check that every byte of `path` equals `expected`.
///
/// # Errors
/// - `Error::FailedVerification` with the offset of the first mismatch
/// - I/O errors opening or reading the file
pub fn verify(path: &Path, expected: u8) -> Result<()> {
    verify_with_block_size(path, expected, DEFAULT_BLOCK_SIZE)
}

/// [`verify`] with an explicit read block size.
pub fn verify_with_block_size(path: &Path, expected: u8, block_size: usize) -> Result<()> {
    let mut file = File::open(path)?;
    let mut block = vec![0u8; block_size.max(1)];
    let mut offset = 0u64;

    loop {
        let n = match file.read(&mut block) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        if let Some(index) = block[..n].iter().position(|&b| b != expected) {
            return Err(Error::FailedVerification {
                path: path.to_path_buf(),
                offset: offset + index as u64,
            });
        }
        offset += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_verify_uniform_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("zeros");
        fs::write(&path, vec![0u8; 10_000]).unwrap();
        verify(&path, 0).unwrap();
    }

    #[test]
    fn test_verify_reports_first_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dirty");
        let mut data = vec![0u8; 10_000];
        data[5000] = 1;
        data[9000] = 1;
        fs::write(&path, data).unwrap();

        match verify_with_block_size(&path, 0, 512) {
            Err(Error::FailedVerification { offset, .. }) => assert_eq!(offset, 5000),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_verify_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();
        verify(&path, 0xFF).unwrap();
    }

    #[test]
    fn test_verify_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            verify(&dir.path().join("absent"), 0),
            Err(Error::Io(_))
        ));
    }
}
