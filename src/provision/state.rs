//! Per-session provisioning state and session outcomes.

use std::fmt;

use super::device::Credential;

/// How a session that succeeded ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Logged into the installed OS after the configuration was saved.
    Provisioned,
    /// The installer prompt came back after the install command was issued.
    InstallerExited,
}

/// Why a session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Every credential profile was rejected the maximum number of times.
    CredentialsExhausted,
    /// The device could not fetch a configuration artifact.
    ArtifactFetchFailed,
    /// Consecutive waits ended without output or with the console closed.
    NoResponse,
    /// A root shell appeared before any install was started.
    UnexpectedPrivilegedShell,
    /// The iteration budget ran out before a terminal state.
    IterationBudgetExhausted,
}

/// Terminal result of a provisioning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The device is installed (and configured, when that was requested).
    Success(Completion),
    /// The session gave up.
    Failure(FailureReason),
    /// The session was cancelled from outside.
    Aborted,
}

impl Outcome {
    /// Whether the outcome is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Process exit status for this outcome: 0 success, 1 failure,
    /// 2 aborted.
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Success(_) => 0,
            Outcome::Failure(_) => 1,
            Outcome::Aborted => 2,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success(Completion::Provisioned) => {
                write!(f, "pass: device installed and configured")
            }
            Outcome::Success(Completion::InstallerExited) => {
                write!(f, "pass: installer returned after install")
            }
            Outcome::Failure(FailureReason::CredentialsExhausted) => {
                write!(f, "fail: all credential profiles rejected")
            }
            Outcome::Failure(FailureReason::ArtifactFetchFailed) => {
                write!(f, "fail: default configuration could not be fetched from the server")
            }
            Outcome::Failure(FailureReason::NoResponse) => {
                write!(f, "fail: no matching console output")
            }
            Outcome::Failure(FailureReason::UnexpectedPrivilegedShell) => {
                write!(f, "fail: root shell reached before install")
            }
            Outcome::Failure(FailureReason::IterationBudgetExhausted) => {
                write!(f, "fail: iteration budget exhausted")
            }
            Outcome::Aborted => write!(f, "aborted"),
        }
    }
}

/// Boot menu entries the driver can select.
///
/// Rescue, uninstall, update and embed entries are deliberately absent:
/// the driver only ever moves the cursor away from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuEntry {
    /// The installed network OS.
    OperatingSystem,
    /// The installer's top-level entry.
    Installer,
    /// The installer's "Install OS" entry.
    InstallerInstall,
}

/// Result of recording an authentication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthVerdict {
    /// Stay on the current profile.
    Retry {
        /// Failures on this profile so far.
        attempts: u32,
    },
    /// Moved on to the next profile.
    Advanced {
        /// Index of the new profile.
        index: usize,
    },
    /// The last profile hit the retry limit.
    Exhausted,
}

/// Cursor into the ordered credential list.
///
/// The index never decreases and never wraps. Exhaustion is an explicit
/// terminal state rather than an out-of-bounds index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialCursor {
    index: usize,
    retries: u32,
    count: usize,
    default_index: Option<usize>,
    exhausted: bool,
}

impl CredentialCursor {
    /// Cursor at the first credential of `credentials`.
    pub fn new(credentials: &[Credential]) -> Self {
        Self {
            index: 0,
            retries: 0,
            count: credentials.len(),
            default_index: credentials.iter().position(|c| c.default),
            exhausted: credentials.is_empty(),
        }
    }

    /// Index of the credential in use.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Consecutive failures on the current credential.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Whether every credential has been used up.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// The credential in use, unless exhausted.
    pub fn current<'a>(&self, credentials: &'a [Credential]) -> Option<&'a Credential> {
        if self.exhausted {
            return None;
        }
        credentials.get(self.index)
    }

    /// Jump forward to the default credential.
    ///
    /// Never moves backwards: if the cursor is already past the default
    /// profile it stays where it is.
    pub fn select_default(&mut self) -> usize {
        if let Some(default_index) = self.default_index {
            if default_index > self.index {
                self.index = default_index;
                self.retries = 0;
            }
        }
        self.index
    }

    /// Record one rejected login and decide what happens next.
    pub fn record_failure(&mut self, limit: u32) -> AuthVerdict {
        if self.exhausted {
            return AuthVerdict::Exhausted;
        }

        self.retries += 1;
        if self.retries < limit {
            return AuthVerdict::Retry {
                attempts: self.retries,
            };
        }

        if self.index + 1 < self.count {
            self.index += 1;
            self.retries = 0;
            AuthVerdict::Advanced { index: self.index }
        } else {
            self.exhausted = true;
            AuthVerdict::Exhausted
        }
    }

    /// A shell prompt proves the current credential works.
    pub fn reset_retries(&mut self) {
        self.retries = 0;
    }
}

/// Mutable context of one provisioning session.
///
/// Created with every flag cleared and the cursor on the first
/// credential; it lives exactly as long as one driver run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningState {
    credentials: CredentialCursor,
    installing: bool,
    os_configured: bool,
    update_in_progress: bool,
    escalation_sent: bool,
    stalls: u32,
    menu_selection: Option<MenuEntry>,
    outcome: Option<Outcome>,
}

impl ProvisioningState {
    /// Fresh state for a session using `credentials`.
    pub fn new(credentials: &[Credential]) -> Self {
        Self {
            credentials: CredentialCursor::new(credentials),
            installing: false,
            os_configured: false,
            update_in_progress: false,
            escalation_sent: false,
            stalls: 0,
            menu_selection: None,
            outcome: None,
        }
    }

    /// The credential cursor.
    pub fn credentials(&self) -> &CredentialCursor {
        &self.credentials
    }

    pub(crate) fn credentials_mut(&mut self) -> &mut CredentialCursor {
        &mut self.credentials
    }

    /// Credential profile index in use.
    pub fn credential_index(&self) -> usize {
        self.credentials.index()
    }

    /// Consecutive authentication failures on the current profile.
    pub fn retry_count(&self) -> u32 {
        self.credentials.retries()
    }

    /// An install command has been issued.
    pub fn installing(&self) -> bool {
        self.installing
    }

    /// The freshly installed OS has had its post-install configuration.
    pub fn os_configured(&self) -> bool {
        self.os_configured
    }

    /// The saved configuration was confirmed and the device is rebooting
    /// into it.
    pub fn update_in_progress(&self) -> bool {
        self.update_in_progress
    }

    /// Last boot menu entry the driver selected.
    pub fn menu_selection(&self) -> Option<MenuEntry> {
        self.menu_selection
    }

    /// Consecutive waits that ended in timeout or end of stream.
    pub fn stalls(&self) -> u32 {
        self.stalls
    }

    /// Terminal outcome, once reached.
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Whether the session has reached a terminal outcome.
    pub fn is_terminated(&self) -> bool {
        self.outcome.is_some()
    }

    pub(crate) fn begin_install(&mut self) {
        self.installing = true;
    }

    pub(crate) fn mark_configured(&mut self) {
        self.os_configured = true;
    }

    pub(crate) fn begin_update(&mut self) {
        self.update_in_progress = true;
    }

    pub(crate) fn select(&mut self, entry: MenuEntry) {
        self.menu_selection = Some(entry);
    }

    /// Returns true the first time it is called since the last login.
    pub(crate) fn take_escalation(&mut self) -> bool {
        !std::mem::replace(&mut self.escalation_sent, true)
    }

    pub(crate) fn begin_login(&mut self) {
        self.escalation_sent = false;
    }

    pub(crate) fn record_stall(&mut self) -> u32 {
        self.stalls += 1;
        self.stalls
    }

    pub(crate) fn clear_stalls(&mut self) {
        self.stalls = 0;
    }

    /// The first terminal outcome wins.
    pub(crate) fn finish(&mut self, outcome: Outcome) {
        self.outcome.get_or_insert(outcome);
    }
}
