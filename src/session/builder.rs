//! Session builder for configuration

use crate::buffer::BufferManager;
use crate::result::ExpectError;
use crate::session::{spawn, Session};
use portable_pty::{native_pty_system, CommandBuilder, PtyPair, PtySize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Default timeout for expect operations (in seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default maximum buffer size (in bytes)
const DEFAULT_MAX_BUFFER_SIZE: usize = 8192;

/// Default PTY rows
const DEFAULT_PTY_ROWS: u16 = 24;

/// Default PTY columns
const DEFAULT_PTY_COLS: u16 = 80;

/// Builder for configuring and opening console sessions.
///
/// # Defaults
///
/// - Timeout: 30 seconds (used by [`Session::expect`] and
///   [`Session::expect_any`]; the provisioning driver passes its own)
/// - Max buffer size: 8192 bytes
/// - ANSI stripping: disabled
/// - Echo of received output: disabled
/// - PTY size: 24 rows x 80 columns
///
/// # Examples
///
/// ```no_run
/// use sonic_loader::Session;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Session::builder()
///     .timeout(Duration::from_secs(120))
///     .strip_ansi(true)
///     .echo(true)
///     .telnet("192.168.54.97", 4000)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    timeout: Option<Duration>,
    max_buffer_size: usize,
    strip_ansi: bool,
    echo: bool,
    pty_size: PtySize,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Create a new session builder with default configuration.
    pub fn new() -> Self {
        Self {
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            strip_ansi: false,
            echo: false,
            pty_size: PtySize {
                rows: DEFAULT_PTY_ROWS,
                cols: DEFAULT_PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            },
        }
    }

    /// Set the default timeout for `expect` / `expect_any`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disable the default timeout (wait indefinitely).
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Set maximum buffer size in bytes.
    ///
    /// When the buffer fills up, consumed output is discarded first, then
    /// the oldest unmatched output.
    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    /// Enable or disable ANSI escape sequence stripping before matching.
    pub fn strip_ansi(mut self, strip: bool) -> Self {
        self.strip_ansi = strip;
        self
    }

    /// Copy everything received from the console to stdout.
    ///
    /// This is the console transcript an operator watches while a device
    /// is being provisioned.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Set PTY (terminal) size.
    pub fn pty_size(mut self, rows: u16, cols: u16) -> Self {
        self.pty_size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        self
    }

    /// Open a telnet connection to a console server port.
    ///
    /// Spawns `telnet <host> <port>` on a PTY.
    ///
    /// # Errors
    ///
    /// Returns an error if the PTY cannot be created or `telnet` cannot be
    /// spawned.
    pub fn telnet(self, host: &str, port: u16) -> Result<Session, ExpectError> {
        let mut cmd = CommandBuilder::new("telnet");
        cmd.arg(host);
        cmd.arg(port.to_string());
        self.launch(cmd)
    }

    /// Spawn an arbitrary console command (for example a serial terminal
    /// program) and return a configured session.
    ///
    /// The command is split on whitespace; no shell quoting is applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is empty, the PTY cannot be created,
    /// or the process cannot be spawned.
    ///
    /// ```no_run
    /// use sonic_loader::Session;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let session = Session::builder().spawn("picocom -b 115200 /dev/ttyUSB0")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn spawn(self, command: &str) -> Result<Session, ExpectError> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ExpectError::SpawnError("Empty command".to_string()))?;

        let mut cmd = CommandBuilder::new(program);
        for arg in parts {
            cmd.arg(arg);
        }
        self.launch(cmd)
    }

    fn launch(self, cmd: CommandBuilder) -> Result<Session, ExpectError> {
        let pty_system = native_pty_system();

        let PtyPair { master, slave } = pty_system
            .openpty(self.pty_size)
            .map_err(|e| ExpectError::PtyError(e.to_string()))?;

        let child = slave
            .spawn_command(cmd)
            .map_err(|e| ExpectError::SpawnError(e.to_string()))?;
        // The parent must not hold the slave open, or EOF never arrives
        drop(slave);

        let reader = master
            .try_clone_reader()
            .map_err(|e| ExpectError::PtyError(e.to_string()))?;

        // The writer half can only be taken once
        let writer = master
            .take_writer()
            .map_err(|e| ExpectError::PtyError(e.to_string()))?;

        Ok(Session {
            _master: master,
            child: Some(child),
            output: spawn::spawn_reader(reader)?,
            master_writer: Arc::new(Mutex::new(writer)),
            buffer: BufferManager::new(self.max_buffer_size, self.strip_ansi),
            timeout: self.timeout,
            eof_reached: false,
            echo: self.echo,
        })
    }
}
