//! The transport contract the provisioning driver is written against.

use crate::pattern::PatternSet;
use crate::result::{ExpectError, MatchResult};
use std::time::Duration;

/// A bidirectional text stream to a device console.
///
/// [`Session`](crate::Session) implements this over a PTY-spawned telnet
/// or serial client. The driver only ever needs these three operations,
/// so anything that can send bytes and wait for the first of several
/// patterns can stand in for a real console.
///
/// When `patterns` contains [`Pattern::Eof`](crate::Pattern::Eof) or
/// [`Pattern::Timeout`](crate::Pattern::Timeout), end of stream and
/// running out of time must be reported as a match on that pattern's index
/// rather than as an error.
#[allow(async_fn_in_trait)]
pub trait Console {
    /// Send raw bytes (control characters and escape sequences included).
    async fn send(&mut self, data: &[u8]) -> Result<(), ExpectError>;

    /// Send `line` followed by a newline.
    async fn send_line(&mut self, line: &str) -> Result<(), ExpectError> {
        self.send(line.as_bytes()).await?;
        self.send(b"\n").await
    }

    /// Wait up to `timeout` for the first pattern of `patterns` to appear.
    async fn expect_within(
        &mut self,
        patterns: &PatternSet,
        timeout: Duration,
    ) -> Result<MatchResult, ExpectError>;
}
