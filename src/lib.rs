//! sonic-loader: unattended network OS installation over a device console
//!
//! A switch fresh out of the box, or one running the wrong build, has
//! exactly one interface you can rely on: its serial console, usually
//! reached through a console server over telnet. This crate drives that
//! console the way an operator would: it logs in, reboots into the boot
//! menu, picks the installer, installs the requested image over HTTP,
//! configures the management network, fetches and applies the device
//! configuration, and logs in again to check the result.
//!
//! # Layers
//!
//! - [`Session`] owns a console client on a PTY and waits for patterns
//!   ([`Pattern`], [`PatternSet`]) in its output.
//! - [`Console`] is the contract the driver needs from a session; tests
//!   and alternative transports implement it too.
//! - [`provision`] holds the expectation table, the per-session state
//!   and the [`Driver`] that ties them together.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sonic_loader::{DeviceProfile, Driver, DriverConfig, OsProfile, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let device = DeviceProfile::from_json_file("lab7.json")?;
//!     let driver = Driver::new(device.clone(), OsProfile::sonic(), DriverConfig::default())?;
//!
//!     let mut session = Session::builder()
//!         .no_timeout()
//!         .strip_ansi(true)
//!         .echo(true)
//!         .telnet(&device.console_host, device.console_port)?;
//!
//!     let report = driver.run(&mut session).await?;
//!     println!("{} after {} iterations", report.outcome, report.iterations);
//!     session.terminate()?;
//!
//!     std::process::exit(report.outcome.exit_code().into());
//! }
//! ```
//!
//! # Pattern Matching
//!
//! Waits are first-match-wins in list order, not in text order:
//!
//! ```rust
//! use sonic_loader::{Pattern, PatternSet};
//!
//! let set = PatternSet::new(&[
//!     Pattern::exact("Login incorrect"),
//!     Pattern::regex(r"sonic-(\w+ *)login:").unwrap(),
//!     Pattern::Eof,
//!     Pattern::Timeout,
//! ]).unwrap();
//!
//! // The banner wins even though the prompt comes first in the text
//! let (index, _) = set.find(b"sonic-lab7 login: \r\nLogin incorrect").unwrap();
//! assert_eq!(index, 0);
//! ```
//!
//! # Sending Control Characters
//!
//! Boot menus are navigated with raw escape sequences:
//!
//! ```rust,no_run
//! use sonic_loader::Session;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let mut session = Session::spawn("telnet 192.168.54.97 4000")?;
//! // Cursor down, then select
//! session.send(b"\x1b[B").await?;
//! session.send(b"\r\n").await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod buffer;
mod pattern;
mod result;
mod session;

pub mod provision;

// Public API exports
pub use pattern::{Match, Pattern, PatternSet};
pub use provision::{
    Completion, Credential, DeviceProfile, Driver, DriverConfig, FailureReason, OsProfile,
    Outcome, Pacing, ProvisionError, Report,
};
pub use result::{ExpectError, MatchResult, PatternError};
pub use session::{Console, Session, SessionBuilder};

// Re-export commonly used types
pub use portable_pty::ExitStatus;
pub use tokio_util::sync::CancellationToken;
