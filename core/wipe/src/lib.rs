//! Multi-pass secure erase for SecureVault.
//!
//! This crate provides:
//! - A registry of named overwrite methods (DoD, Gutmann, ...)
//! - Target resolution for files, directory trees and mounted volumes
//! - A pausable, cancelable wipe engine that fans out across files
//! - Read-back verification of wiped files
//!
//! # Limitations
//! Overwriting through the filesystem cannot reach remapped sectors,
//! SSD over-provisioning or copy-on-write snapshots. Volume targets only
//! overwrite journal artifacts at the volume root.

pub mod control;
pub mod engine;
pub mod methods;
pub mod overwrite;
pub mod target;
pub mod verify;

pub use control::{JobState, WipeHandle};
pub use engine::{PassObserver, WipeEngine, WipeJob, WipeObserver, WipeOutcome, WipeReport};
pub use methods::WipeMethod;
pub use target::WipeTarget;
pub use verify::verify;
