//! Error types for the console expect engine

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to a device console.
///
/// `Eof` and `Timeout` are only returned as errors when the pattern set
/// being waited on does not contain [`Pattern::Eof`](crate::Pattern::Eof) or
/// [`Pattern::Timeout`](crate::Pattern::Timeout). The provisioning driver
/// always includes both, so for it these surface as ordinary matches.
///
/// # Examples
///
/// ```no_run
/// use sonic_loader::{ExpectError, Pattern, Session};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = Session::builder()
///     .timeout(Duration::from_secs(5))
///     .telnet("192.168.54.97", 4000)?;
///
/// match session.expect(Pattern::exact("login:")).await {
///     Ok(result) => println!("Matched: {}", result.matched),
///     Err(ExpectError::Timeout { duration }) => {
///         eprintln!("No prompt after {:?}", duration);
///     }
///     Err(ExpectError::Eof) => {
///         eprintln!("Console closed");
///     }
///     Err(e) => return Err(e.into()),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Error, Debug)]
pub enum ExpectError {
    /// Timeout waiting for pattern.
    #[error("Timeout waiting for pattern (after {duration:?})")]
    Timeout {
        /// Duration that was waited before timeout
        duration: Duration,
    },

    /// EOF reached before pattern matched.
    ///
    /// The console process closed its output (telnet exited, serial
    /// program quit).
    #[error("EOF reached before pattern matched")]
    Eof,

    /// Invalid pattern.
    #[error("Invalid pattern: {0}")]
    PatternError(#[from] PatternError),

    /// I/O error while reading from or writing to the PTY.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// PTY creation or manipulation failed.
    #[error("PTY error: {0}")]
    PtyError(String),

    /// The console command could not be spawned.
    #[error("Failed to spawn console: {0}")]
    SpawnError(String),

    /// The console process has already been waited on or terminated.
    #[error("Console process has already exited")]
    ProcessExited,
}

/// Errors related to pattern creation.
#[derive(Error, Debug)]
pub enum PatternError {
    /// Invalid regex pattern.
    #[error("Invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// Empty pattern.
    #[error("Pattern cannot be empty")]
    EmptyPattern,
}
