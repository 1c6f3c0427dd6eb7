//! PTY-backed console sessions

mod builder;
mod console;
mod spawn;

pub use builder::SessionBuilder;
pub use console::Console;

use crate::buffer::BufferManager;
use crate::pattern::{Pattern, PatternSet};
use crate::result::{ExpectError, MatchResult};
use portable_pty::{Child, ChildKiller, ExitStatus, MasterPty};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

/// A console connection to a device.
///
/// A `Session` owns a console client process (telnet, or a serial terminal
/// program) running on a PTY. Output is pumped by a background reader
/// thread, so a wait that times out never loses bytes: they are still in
/// the buffer for the next wait.
///
/// One session is owned by exactly one driver; there is no shared state
/// between sessions, so independent devices can be provisioned from
/// independent tasks.
///
/// # Examples
///
/// ```no_run
/// use sonic_loader::{Session, Pattern};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = Session::builder()
///     .timeout(Duration::from_secs(30))
///     .telnet("192.168.54.97", 4000)?;
///
/// session.send(b"\r\n").await?;
/// session.expect(Pattern::regex(r"login:")?).await?;
/// session.send_line("admin").await?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    _master: Box<dyn MasterPty + Send>,
    child: Option<Box<dyn Child + Send>>,
    output: mpsc::UnboundedReceiver<Vec<u8>>,
    master_writer: Arc<Mutex<Box<dyn Write + Send>>>,
    buffer: BufferManager,
    timeout: Option<Duration>,
    eof_reached: bool,
    echo: bool,
}

impl Session {
    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Spawn a console command with default settings.
    ///
    /// Shorthand for `Session::builder().spawn(command)`.
    pub fn spawn(command: &str) -> Result<Self, ExpectError> {
        SessionBuilder::new().spawn(command)
    }

    /// Wait for a pattern using the session's default timeout.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, end of stream, or I/O failure.
    pub async fn expect(&mut self, pattern: Pattern) -> Result<MatchResult, ExpectError> {
        self.expect_any(&[pattern]).await
    }

    /// Wait for any of the given patterns (first-match-wins in list order)
    /// using the session's default timeout.
    ///
    /// This compiles `patterns` on every call; compile a [`PatternSet`]
    /// once and use [`Console::expect_within`] for waits that repeat.
    ///
    /// ```no_run
    /// use sonic_loader::{Session, Pattern};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let mut session = Session::spawn("echo test")?;
    /// let patterns = [
    ///     Pattern::regex(r"[pP]assword:")?,
    ///     Pattern::exact("Login incorrect"),
    ///     Pattern::Eof,
    /// ];
    ///
    /// let result = session.expect_any(&patterns).await?;
    /// match result.pattern_index {
    ///     0 => println!("Password prompt"),
    ///     1 => println!("Rejected"),
    ///     _ => println!("Console closed"),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn expect_any(&mut self, patterns: &[Pattern]) -> Result<MatchResult, ExpectError> {
        let set = PatternSet::new(patterns)?;
        self.expect_set(&set, self.timeout).await
    }

    async fn expect_set(
        &mut self,
        patterns: &PatternSet,
        timeout: Option<Duration>,
    ) -> Result<MatchResult, ExpectError> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if let Some((pattern_index, m)) = patterns.find(self.buffer.unmatched()) {
                let start = self.buffer.matched_position() + m.start;
                let end = self.buffer.matched_position() + m.end;

                let matched =
                    String::from_utf8_lossy(&self.buffer.as_bytes()[start..end]).into_owned();
                let before = String::from_utf8_lossy(self.buffer.since_match(start)).into_owned();

                self.buffer.mark_matched(end);

                return Ok(MatchResult {
                    pattern_index,
                    matched,
                    start,
                    end,
                    before,
                    captures: m.captures,
                });
            }

            if self.eof_reached {
                return match patterns.eof_index() {
                    Some(idx) => {
                        let before = self.buffer.unmatched_text();
                        self.buffer.mark_all_matched();
                        Ok(MatchResult::special(idx, self.buffer.len(), before))
                    }
                    None => Err(ExpectError::Eof),
                };
            }

            let chunk = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, self.output.recv()).await {
                        Ok(chunk) => chunk,
                        Err(_) => return self.timed_out(patterns, timeout.unwrap_or_default()),
                    }
                }
                None => self.output.recv().await,
            };

            match chunk {
                Some(data) => self.receive(&data),
                None => self.eof_reached = true,
            }
        }
    }

    /// Timeouts leave the unmatched output in place for the next wait.
    fn timed_out(
        &self,
        patterns: &PatternSet,
        duration: Duration,
    ) -> Result<MatchResult, ExpectError> {
        match patterns.timeout_index() {
            Some(idx) => Ok(MatchResult::special(
                idx,
                self.buffer.len(),
                self.buffer.unmatched_text(),
            )),
            None => Err(ExpectError::Timeout { duration }),
        }
    }

    fn receive(&mut self, data: &[u8]) {
        log::trace!("received {} bytes", data.len());
        if self.echo {
            let mut stdout = std::io::stdout().lock();
            // Transcript output is best effort
            let _ = stdout.write_all(data);
            let _ = stdout.flush();
        }
        self.buffer.append(data);
    }

    /// Send raw bytes to the console.
    ///
    /// Control characters and escape sequences go through untouched:
    ///
    /// ```no_run
    /// use sonic_loader::Session;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let mut session = Session::spawn("cat")?;
    /// // Cursor up in a boot menu
    /// session.send(b"\x1b[A").await?;
    ///
    /// // Bare carriage return + line feed
    /// session.send(b"\r\n").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn send(&mut self, data: &[u8]) -> Result<(), ExpectError> {
        let writer = self.master_writer.clone();
        let data = data.to_vec();
        let len = data.len();

        tokio::task::spawn_blocking(move || {
            let mut writer = writer.blocking_lock();
            writer.write_all(&data)?;
            writer.flush()
        })
        .await
        .map_err(|e| ExpectError::IoError(std::io::Error::other(e)))??;

        // Content is never logged: passwords go through here
        log::trace!("sent {} bytes", len);
        Ok(())
    }

    /// Send a line to the console (appends `\n`).
    pub async fn send_line(&mut self, line: &str) -> Result<(), ExpectError> {
        self.send(line.as_bytes()).await?;
        self.send(b"\n").await?;
        Ok(())
    }

    /// Check if the console process is still running.
    ///
    /// # Errors
    ///
    /// Returns an error if the process handle was consumed by `wait()` or
    /// `terminate()`.
    pub fn is_alive(&mut self) -> Result<bool, ExpectError> {
        match &mut self.child {
            Some(child) => spawn::is_alive(child),
            None => Err(ExpectError::ProcessExited),
        }
    }

    /// Wait for the console process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the process handle was already consumed or the
    /// wait itself fails.
    pub async fn wait(&mut self) -> Result<ExitStatus, ExpectError> {
        let mut child = self.child.take().ok_or(ExpectError::ProcessExited)?;

        let status = tokio::task::spawn_blocking(move || child.wait())
            .await
            .map_err(|e| ExpectError::IoError(std::io::Error::other(e)))??;

        Ok(status)
    }

    /// Kill the console client process.
    ///
    /// Closing telnet releases the console server port for the next user.
    ///
    /// # Errors
    ///
    /// Returns an error if the process handle was already consumed.
    pub fn terminate(&mut self) -> Result<(), ExpectError> {
        let mut child = self.child.take().ok_or(ExpectError::ProcessExited)?;
        if matches!(child.try_wait(), Ok(None)) {
            child.kill()?;
        }
        Ok(())
    }
}

impl Console for Session {
    async fn send(&mut self, data: &[u8]) -> Result<(), ExpectError> {
        Session::send(self, data).await
    }

    async fn send_line(&mut self, line: &str) -> Result<(), ExpectError> {
        Session::send_line(self, line).await
    }

    async fn expect_within(
        &mut self,
        patterns: &PatternSet,
        timeout: Duration,
    ) -> Result<MatchResult, ExpectError> {
        self.expect_set(patterns, Some(timeout)).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                let _ = child.kill();
            }
        }
    }
}
