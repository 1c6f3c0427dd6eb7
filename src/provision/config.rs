//! Driver budgets and pacing.

use std::time::Duration;

/// Default bound on driver iterations per session.
const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Default wait for the next recognisable console output (in seconds).
const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 120;

/// Default wait for the boot menu after a reboot (in seconds).
const DEFAULT_REBOOT_TIMEOUT_SECS: u64 = 600;

/// Pauses inserted between inputs.
///
/// Consoles drop characters typed while the device is still drawing a
/// prompt; these give it time to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Before credentials and shell commands.
    pub settle: Duration,
    /// After confirming the configuration overwrite.
    pub confirm: Duration,
    /// Between post-install commands.
    pub step: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(2),
            confirm: Duration::from_secs(5),
            step: Duration::from_secs(1),
        }
    }
}

impl Pacing {
    /// No pauses at all (scripted consoles, tests).
    pub fn none() -> Self {
        Self {
            settle: Duration::ZERO,
            confirm: Duration::ZERO,
            step: Duration::ZERO,
        }
    }
}

/// Limits and timings for one driver run.
///
/// ```
/// use sonic_loader::DriverConfig;
/// use std::time::Duration;
///
/// let config = DriverConfig::default().with_wait_timeout(Duration::from_secs(60));
/// assert_eq!(config.max_iterations, 50);
/// assert_eq!(config.reboot_timeout, Duration::from_secs(600));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Upper bound on expectation-table rounds.
    pub max_iterations: usize,
    /// Per-wait bound for ordinary prompts.
    pub wait_timeout: Duration,
    /// Bound for the wait between a reboot and the boot menu.
    pub reboot_timeout: Duration,
    /// Pauses between inputs.
    pub pacing: Pacing,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            wait_timeout: Duration::from_secs(DEFAULT_WAIT_TIMEOUT_SECS),
            reboot_timeout: Duration::from_secs(DEFAULT_REBOOT_TIMEOUT_SECS),
            pacing: Pacing::default(),
        }
    }
}

impl DriverConfig {
    /// Set the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the per-wait timeout.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Set the reboot-to-boot-menu timeout.
    pub fn with_reboot_timeout(mut self, timeout: Duration) -> Self {
        self.reboot_timeout = timeout;
        self
    }

    /// Set the pacing.
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }
}
