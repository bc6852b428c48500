//! Fixed header of password-encrypted files.
//!
//! Layout: `MAGIC(4) || METHOD(1) || SALT(16)`.

use std::io::{self, Read, Write};

use crate::cipher::CipherMethod;
use crate::keys::{Salt, SALT_LENGTH};
use securevault_common::{Error, Result};

/// File magic.
pub const MAGIC: [u8; 4] = *b"SVEP";

/// Total header size in bytes.
pub const HEADER_SIZE: usize = MAGIC.len() + 1 + SALT_LENGTH;

/// Header written once before the first chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionHeader {
    /// Cipher used for every chunk.
    pub method: CipherMethod,
    /// Salt the chunk key was derived with.
    pub salt: Salt,
}

impl EncryptionHeader {
    /// Create a header with a fresh random salt.
    pub fn generate(method: CipherMethod) -> Self {
        Self {
            method,
            salt: Salt::generate(),
        }
    }

    /// Serialize the header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..4].copy_from_slice(&MAGIC);
        bytes[4] = self.method.as_byte();
        bytes[5..].copy_from_slice(self.salt.as_bytes());
        bytes
    }

    /// Write the header to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Read and validate a header.
    ///
    /// The magic is checked before anything else, so a foreign file is
    /// rejected without touching the rest of its contents.
    ///
    /// # Errors
    /// - `Error::Format` for a short read, bad magic, or unknown method byte
    /// - `Error::Io` for underlying read failures
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        if read_full(reader, &mut magic)? < magic.len() || magic != MAGIC {
            return Err(Error::Format(
                "Invalid file format or not password-encrypted".to_string(),
            ));
        }

        let mut method_byte = [0u8; 1];
        if read_full(reader, &mut method_byte)? < 1 {
            return Err(Error::Format("Header is truncated".to_string()));
        }
        let method = CipherMethod::from_byte(method_byte[0]).ok_or_else(|| {
            Error::Format(format!(
                "Unsupported method in file header: {:#04x}",
                method_byte[0]
            ))
        })?;

        let mut salt = [0u8; SALT_LENGTH];
        if read_full(reader, &mut salt)? < SALT_LENGTH {
            return Err(Error::Format("Header is truncated".to_string()));
        }

        Ok(Self {
            method,
            salt: Salt::from_bytes(salt),
        })
    }
}

/// Fill `buf` from `reader`, stopping early only at end of input.
///
/// Returns the number of bytes read.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
