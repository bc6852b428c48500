//! In-place overwrite of a single file.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use crate::control::JobControl;
use securevault_common::Result;

/// Replicate `pattern` to fill exactly `size` bytes.
///
/// A multi-byte pattern is cut off mid-pattern at the end if `size` is not
/// a multiple of its length.
pub fn fill_buffer(pattern: &[u8], size: usize) -> Vec<u8> {
    if pattern.is_empty() {
        return vec![0u8; size];
    }
    pattern.iter().copied().cycle().take(size).collect()
}

/// How an overwrite pass over one file ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overwrite {
    /// Every byte of the file was written.
    Complete(u64),
    /// Cancellation stopped the pass after this many bytes.
    Interrupted(u64),
}

/// Overwrite `path` from offset 0 with repeated copies of `buffer`.
///
/// The file length is unchanged; the last write is truncated to fit. Data
/// is synced after every write and [`JobControl::checkpoint`] is consulted
/// between writes.
pub(crate) fn overwrite_file(path: &Path, buffer: &[u8], control: &JobControl) -> Result<Overwrite> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    let length = file.metadata()?.len();
    file.seek(SeekFrom::Start(0))?;

    let mut written = 0u64;
    while written < length {
        if !control.checkpoint() {
            return Ok(Overwrite::Interrupted(written));
        }

        let remaining = length - written;
        let step = usize::try_from(remaining).map_or(buffer.len(), |r| r.min(buffer.len()));
        file.write_all(&buffer[..step])?;
        file.sync_data()?;
        written += step as u64;
    }

    Ok(Overwrite::Complete(written))
}
