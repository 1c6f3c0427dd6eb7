//! Error types for provisioning.
//!
//! Only faults that stop the driver from talking to the device end up
//! here. A device that refuses credentials or fails an artifact fetch is
//! an [`Outcome`](super::Outcome), not an error.

use thiserror::Error;

use crate::result::{ExpectError, PatternError};

/// Errors that abort a provisioning run before it reaches an outcome.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Transport failure (I/O, PTY, spawn).
    #[error("Console error: {0}")]
    Console(#[from] ExpectError),

    /// A prompt signature in the OS profile does not compile.
    #[error("Invalid prompt signature: {0}")]
    Pattern(#[from] PatternError),

    /// A prompt signature in the OS profile is not a valid regex.
    #[error("Invalid prompt regex: {0}")]
    Regex(#[from] regex::Error),

    /// The console reported a match outside the set it was given.
    #[error("Console matched pattern {0}, which is not in the waited set")]
    UnknownPattern(usize),

    /// A device or OS profile is inconsistent.
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    /// A profile file could not be read.
    #[error("Cannot read profile: {0}")]
    Io(#[from] std::io::Error),

    /// A profile file is not valid JSON for its type.
    #[error("Cannot parse profile: {0}")]
    Json(#[from] serde_json::Error),
}
