//! Common utilities and types shared across SecureVault crates.
//!
//! This crate provides the error taxonomy, progress reporting types and
//! engine configuration used by both the encryption and wipe engines.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Settings, StreamSettings, WipeSettings};
pub use error::{Error, Result};
pub use types::{JobId, NoProgress, ProgressObserver, SensitiveBytes};
