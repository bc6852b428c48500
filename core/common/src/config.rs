//! Engine configuration.
//!
//! Settings are stored as JSON. Every field has a default, so a partial
//! (or empty) document is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

/// One mebibyte.
pub const MIB: usize = 1024 * 1024;

/// Chunk sizing for streaming encryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Upper bound for a plaintext chunk.
    pub max_chunk_size: usize,
    /// Lower bound for a plaintext chunk, applied after the memory heuristic.
    pub min_chunk_size: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            max_chunk_size: MIB,
            min_chunk_size: MIB,
        }
    }
}

/// Overwrite settings for the wipe engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WipeSettings {
    /// Size of the pattern buffer written per I/O call.
    pub buffer_size: usize,
    /// Worker threads used to overwrite files in parallel. `0` means one
    /// per available CPU.
    pub workers: usize,
    /// Block size used when reading files back for verification.
    pub verify_block_size: usize,
}

impl Default for WipeSettings {
    fn default() -> Self {
        Self {
            buffer_size: MIB,
            workers: 0,
            verify_block_size: 4096,
        }
    }
}

impl WipeSettings {
    /// Number of workers after resolving `0` to the CPU count.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

/// Top-level settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub stream: StreamSettings,
    pub wipe: WipeSettings,
}

impl Settings {
    /// Check that every size is usable.
    ///
    /// # Errors
    /// - Any buffer or chunk size is zero
    /// - `min_chunk_size` exceeds `max_chunk_size`
    pub fn validate(&self) -> Result<()> {
        if self.stream.max_chunk_size == 0 || self.stream.min_chunk_size == 0 {
            return Err(Error::InvalidInput(
                "Chunk sizes must be positive".to_string(),
            ));
        }
        if self.stream.min_chunk_size > self.stream.max_chunk_size {
            return Err(Error::InvalidInput(format!(
                "min_chunk_size ({}) exceeds max_chunk_size ({})",
                self.stream.min_chunk_size, self.stream.max_chunk_size
            )));
        }
        // Length prefixes are u32; leave room for cipher framing.
        if self.stream.max_chunk_size > (u32::MAX / 2) as usize {
            return Err(Error::InvalidInput(
                "max_chunk_size is too large".to_string(),
            ));
        }
        if self.wipe.buffer_size == 0 || self.wipe.verify_block_size == 0 {
            return Err(Error::InvalidInput(
                "Wipe buffer sizes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Deserialize settings from JSON and validate them.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serialize settings to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Load settings from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Configuration file name inside the per-user config directory.
pub const CONFIG_FILENAME: &str = "config.json";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.stream.max_chunk_size, MIB);
        assert_eq!(settings.wipe.verify_block_size, 4096);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = Settings::from_json(r#"{"wipe": {"workers": 3}}"#).unwrap();
        assert_eq!(settings.wipe.workers, 3);
        assert_eq!(settings.wipe.buffer_size, MIB);
        assert_eq!(settings.stream, StreamSettings::default());
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let result = Settings::from_json(r#"{"wipe": {"buffer_size": 0}}"#);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_inverted_chunk_bounds_rejected() {
        let result = Settings::from_json(
            r#"{"stream": {"max_chunk_size": 1024, "min_chunk_size": 4096}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_json() {
        let result = Settings::from_json("{not json");
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut settings = Settings::default();
        settings.wipe.workers = 2;
        let json = settings.to_json().unwrap();
        assert_eq!(Settings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_effective_workers_nonzero() {
        let settings = WipeSettings::default();
        assert!(settings.effective_workers() >= 1);
    }
}
