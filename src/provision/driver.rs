//! The provisioning driver: wait, classify, plan, act, repeat.

use std::future::Future;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use super::config::DriverConfig;
use super::device::DeviceProfile;
use super::dispatch::{Action, Dispatcher};
use super::error::ProvisionError;
use super::os_profile::{render, OsProfile, PostInstallStep};
use super::state::{FailureReason, Outcome, ProvisioningState};
use super::table::{ExpectationTable, Tag, TaggedSet};
use crate::pattern::{Pattern, PatternSet};
use crate::result::{ExpectError, MatchResult};
use crate::session::Console;

/// Longest command prefix matched as its echo. Terminals wrap long lines,
/// so the rest of the echo may come back broken up.
const ECHO_PREFIX: usize = 40;

/// What a finished run looked like.
#[derive(Debug, Clone)]
pub struct Report {
    /// Terminal outcome.
    pub outcome: Outcome,
    /// Expectation-table rounds used.
    pub iterations: usize,
    /// State at the end of the run.
    pub state: ProvisioningState,
}

/// Drives one device from whatever state its console is in to an
/// installed and configured network OS.
///
/// The driver owns the profiles and the compiled expectation table; each
/// call to [`run`](Self::run) starts from a fresh [`ProvisioningState`].
///
/// ```no_run
/// use sonic_loader::{DeviceProfile, Driver, DriverConfig, OsProfile, Session};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let device = DeviceProfile::default();
/// let driver = Driver::new(device.clone(), OsProfile::sonic(), DriverConfig::default())?;
///
/// let mut session = Session::builder()
///     .no_timeout()
///     .strip_ansi(true)
///     .telnet(&device.console_host, device.console_port)?;
///
/// let report = driver.run(&mut session).await?;
/// println!("{}", report.outcome);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Driver {
    device: DeviceProfile,
    os: OsProfile,
    config: DriverConfig,
    table: ExpectationTable,
    cancel: CancellationToken,
}

impl Driver {
    /// Validate the profiles and compile the expectation table.
    ///
    /// # Errors
    ///
    /// Returns an error if the device profile is inconsistent, the retry
    /// limit is zero, or a prompt signature does not compile.
    pub fn new(
        device: DeviceProfile,
        os: OsProfile,
        config: DriverConfig,
    ) -> Result<Self, ProvisionError> {
        device.validate()?;
        if os.auth_retry_limit == 0 {
            return Err(ProvisionError::InvalidProfile(
                "auth_retry_limit must be at least 1".to_string(),
            ));
        }
        let table = ExpectationTable::compile(&os.prompts)?;

        Ok(Self {
            device,
            os,
            config,
            table,
            cancel: CancellationToken::new(),
        })
    }

    /// Use `token` to abort runs from outside.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that aborts this driver's runs when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The device being provisioned.
    pub fn device(&self) -> &DeviceProfile {
        &self.device
    }

    /// The OS profile in use.
    pub fn os(&self) -> &OsProfile {
        &self.os
    }

    /// Budgets and pacing.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Provision the device behind `console`.
    ///
    /// Device-side failures (rejected credentials, missing artifacts,
    /// silence) come back as an [`Outcome`] in the report. Cancellation
    /// comes back as [`Outcome::Aborted`].
    ///
    /// # Errors
    ///
    /// Returns an error only when the console itself fails.
    pub async fn run<C: Console>(&self, console: &mut C) -> Result<Report, ProvisionError> {
        info!(
            "provisioning {}:{} with {} build {}",
            self.device.console_host,
            self.device.console_port,
            self.os.name,
            self.device.build_version
        );

        let mut run = Run {
            driver: self,
            dispatcher: Dispatcher::new(&self.os, &self.device, self.config.pacing),
            console,
            state: ProvisioningState::new(&self.device.credentials),
            iterations: 0,
        };

        let outcome = match run.drive().await {
            Ok(outcome) => outcome,
            Err(Halt::Aborted) => {
                warn!("provisioning cancelled");
                Outcome::Aborted
            }
            Err(Halt::Failed(e)) => {
                error!("console failure after {} iterations: {}", run.iterations, e);
                return Err(e);
            }
        };
        run.state.finish(outcome);

        match outcome {
            Outcome::Success(_) => info!("{}", outcome),
            _ => warn!("{}", outcome),
        }

        Ok(Report {
            outcome,
            iterations: run.iterations,
            state: run.state,
        })
    }
}

/// Why a run stopped before reaching an outcome on its own.
enum Halt {
    Aborted,
    Failed(ProvisionError),
}

impl From<ExpectError> for Halt {
    fn from(e: ExpectError) -> Self {
        Halt::Failed(e.into())
    }
}

impl From<ProvisionError> for Halt {
    fn from(e: ProvisionError) -> Self {
        Halt::Failed(e)
    }
}

/// One run's mutable context.
struct Run<'a, C> {
    driver: &'a Driver,
    dispatcher: Dispatcher<'a>,
    console: &'a mut C,
    state: ProvisioningState,
    iterations: usize,
}

impl<C: Console> Run<'_, C> {
    async fn drive(&mut self) -> Result<Outcome, Halt> {
        let driver = self.driver;
        let config = &driver.config;

        // Wake the console past any banner
        self.send_newline().await?;
        self.pause(config.pacing.settle).await?;

        while self.iterations < config.max_iterations {
            self.iterations += 1;

            let (tag, _) = self.wait(&driver.table.main, config.wait_timeout).await?;
            debug!("iteration {}: {}", self.iterations, tag);

            for action in self.dispatcher.plan(tag, &mut self.state) {
                self.execute(action).await?;
                if self.state.is_terminated() {
                    break;
                }
            }

            if let Some(outcome) = self.state.outcome() {
                return Ok(outcome);
            }
        }

        Ok(Outcome::Failure(FailureReason::IterationBudgetExhausted))
    }

    async fn execute(&mut self, action: Action) -> Result<(), Halt> {
        match action {
            Action::Send(text) => self.console.send(text.as_bytes()).await?,
            Action::SendLine(line) => self.send_line(&line).await?,
            Action::SendSecret(secret) => {
                debug!("send: <hidden>");
                self.console.send_line(&secret).await?;
            }
            Action::Sleep(duration) => self.pause(duration).await?,
            Action::AwaitBootMenu => self.await_boot_menu().await?,
            Action::RunInstaller => self.run_installer().await?,
            Action::RunPostInstall => self.post_install().await?,
            Action::Finish(outcome) => self.state.finish(outcome),
        }
        Ok(())
    }

    /// Race `future` against cancellation.
    async fn cancellable<T>(&self, future: impl Future<Output = T>) -> Result<T, Halt> {
        let cancel = &self.driver.cancel;
        if cancel.is_cancelled() {
            return Err(Halt::Aborted);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Halt::Aborted),
            value = future => Ok(value),
        }
    }

    async fn expect(
        &mut self,
        patterns: &PatternSet,
        timeout: Duration,
    ) -> Result<MatchResult, Halt> {
        let cancel = self.driver.cancel.clone();
        if cancel.is_cancelled() {
            return Err(Halt::Aborted);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Halt::Aborted),
            result = self.console.expect_within(patterns, timeout) => Ok(result?),
        }
    }

    async fn wait(
        &mut self,
        set: &TaggedSet,
        timeout: Duration,
    ) -> Result<(Tag, MatchResult), Halt> {
        let result = self.expect(set.patterns(), timeout).await?;
        let tag = set
            .tag(result.pattern_index)
            .ok_or(ProvisionError::UnknownPattern(result.pattern_index))?;
        Ok((tag, result))
    }

    async fn pause(&self, duration: Duration) -> Result<(), Halt> {
        if duration.is_zero() {
            return Ok(());
        }
        self.cancellable(tokio::time::sleep(duration)).await
    }

    async fn send_newline(&mut self) -> Result<(), Halt> {
        let newline = self.driver.os.keys.newline.as_bytes();
        self.console.send(newline).await?;
        Ok(())
    }

    async fn send_line(&mut self, line: &str) -> Result<(), Halt> {
        debug!("send: {}", line);
        self.console.send_line(line).await?;
        Ok(())
    }

    /// Type a shell command and wait for its echo.
    ///
    /// Prompts printed before the command was typed (answers to earlier
    /// newlines) are consumed along with the echo, so the next prompt
    /// wait sees only what the command produced. Returns false when the
    /// echo never came back.
    async fn send_command(&mut self, command: &str) -> Result<bool, Halt> {
        self.send_line(command).await?;
        let Some(echo) = echo_signature(command) else {
            return Ok(true);
        };

        let timeout = self.driver.config.wait_timeout;
        let patterns = PatternSet::new(&[Pattern::exact(echo), Pattern::Eof, Pattern::Timeout])
            .map_err(ProvisionError::from)?;
        let result = self.expect(&patterns, timeout).await?;
        if result.pattern_index == 0 {
            Ok(true)
        } else {
            warn!("device did not echo '{}'", echo);
            Ok(false)
        }
    }

    /// A reboot takes minutes; only the boot menu ends the wait early.
    async fn await_boot_menu(&mut self) -> Result<(), Halt> {
        let driver = self.driver;
        let timeout = driver.config.reboot_timeout;
        info!("waiting up to {:?} for the boot menu", timeout);

        let (tag, _) = self.wait(&driver.table.boot_menu, timeout).await?;
        if tag == Tag::BootMenu {
            debug!("boot menu reached");
            self.state.clear_stalls();
        } else {
            warn!("boot menu did not appear ({})", tag);
            self.state.record_stall();
        }
        Ok(())
    }

    /// Installer dialogue: stop discovery, check the boot reason, install
    /// or reboot.
    ///
    /// A step that times out hands control back to the main loop, which
    /// will find the installer prompt again.
    async fn run_installer(&mut self) -> Result<(), Halt> {
        let driver = self.driver;
        let os = &driver.os;
        let commands = &os.commands;
        let timeout = driver.config.wait_timeout;
        info!("installer prompt reached, checking boot reason");

        if !self.send_command(&commands.discovery_stop).await?
            || self.installer_step(timeout).await?.is_none()
        {
            return Ok(());
        }

        if !self.send_command(&commands.boot_reason).await? {
            return Ok(());
        }
        let Some(result) = self.installer_step(timeout).await? else {
            return Ok(());
        };

        let install_mode = result
            .before
            .lines()
            .any(|line| line.trim() == commands.boot_reason_install);

        if install_mode {
            if !self.send_command(&commands.machine_conf).await?
                || self.installer_step(timeout).await?.is_none()
            {
                return Ok(());
            }

            let install = os.install_command(&driver.device);
            info!("installing: {}", install);
            self.send_line(&install).await?;
            self.state.begin_install();
        } else {
            info!("installer not in install mode, rebooting");
            self.send_line(&commands.reboot_from_installer).await?;
        }

        self.await_boot_menu().await
    }

    async fn installer_step(&mut self, timeout: Duration) -> Result<Option<MatchResult>, Halt> {
        let driver = self.driver;
        let (tag, result) = self.wait(&driver.table.installer, timeout).await?;
        if tag == Tag::InstallerPrompt {
            Ok(Some(result))
        } else {
            warn!("installer dialogue interrupted ({})", tag);
            Ok(None)
        }
    }

    /// Configure the freshly installed OS from a root shell.
    ///
    /// The OS is only marked configured when every step went through.
    async fn post_install(&mut self) -> Result<(), Halt> {
        let driver = self.driver;
        let os = &driver.os;
        let device = &driver.device;
        let step_pause = driver.config.pacing.step;
        info!("configuring installed {} ({})", os.name, device.mgmt_ip);

        for step in &os.post_install {
            match step {
                PostInstallStep::Newline => self.send_newline().await?,
                PostInstallStep::Run { command, wait } => {
                    if !self.send_command(&render(command, device)).await?
                        || (*wait && !self.await_root_prompt().await?)
                    {
                        return Ok(());
                    }
                }
                PostInstallStep::FetchArtifacts => {
                    let files =
                        std::iter::once(&device.device_config).chain(os.aux_scripts.iter());
                    for file in files {
                        if !self.send_command(&os.fetch_command(device, file)).await?
                            || !self.await_root_prompt().await?
                        {
                            return Ok(());
                        }
                    }
                }
                PostInstallStep::RunScripts => {
                    for script in &os.aux_scripts {
                        if !self.send_command(&os.run_script_command(script)).await?
                            || !self.await_root_prompt().await?
                        {
                            return Ok(());
                        }
                    }
                }
            }
            self.pause(step_pause).await?;
        }

        info!("post-install configuration sent");
        self.state.mark_configured();
        Ok(())
    }

    /// Wait for the root prompt after a post-install command. Returns
    /// false when the sequence has to stop.
    async fn await_root_prompt(&mut self) -> Result<bool, Halt> {
        let driver = self.driver;
        let (tag, _) = self
            .wait(&driver.table.shell_step, driver.config.wait_timeout)
            .await?;

        match tag {
            Tag::PrivilegedShell => Ok(true),
            Tag::FetchFailure => {
                error!("device could not fetch a configuration artifact");
                self.state
                    .finish(Outcome::Failure(FailureReason::ArtifactFetchFailed));
                Ok(false)
            }
            _ => {
                warn!("post-install step got no prompt back ({})", tag);
                Ok(false)
            }
        }
    }
}

/// The part of `command` a terminal echoes back on one line.
fn echo_signature(command: &str) -> Option<&str> {
    let line = command.lines().next()?.trim_end();
    let mut end = line.len().min(ECHO_PREFIX);
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    Some(&line[..end]).filter(|echo| !echo.is_empty())
}
