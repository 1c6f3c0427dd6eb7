//! Action dispatcher: tag + state -> what to do next.
//!
//! Planning is synchronous and touches nothing but the state, so every
//! transition can be checked without a console. The driver executes the
//! plan; the three procedures that need their own waits (installer
//! dialogue, post-install sequence, boot-menu wait) appear here only as
//! single actions.

use std::fmt;
use std::time::Duration;

use log::{info, warn};

use super::config::Pacing;
use super::device::DeviceProfile;
use super::os_profile::OsProfile;
use super::state::{AuthVerdict, Completion, FailureReason, MenuEntry, Outcome, ProvisioningState};
use super::table::Tag;

/// One step of a plan.
#[derive(Clone, PartialEq, Eq)]
pub enum Action {
    /// Send raw text (keys, bare newlines).
    Send(String),
    /// Send text followed by a newline.
    SendLine(String),
    /// Send a line that must not appear in logs.
    SendSecret(String),
    /// Pause.
    Sleep(Duration),
    /// Wait, with the reboot timeout, for the boot menu.
    AwaitBootMenu,
    /// Run the installer dialogue (boot reason check, install command).
    RunInstaller,
    /// Run the OS profile's post-install configuration sequence.
    RunPostInstall,
    /// End the session.
    Finish(Outcome),
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Send(text) => f.debug_tuple("Send").field(text).finish(),
            Action::SendLine(text) => f.debug_tuple("SendLine").field(text).finish(),
            Action::SendSecret(_) => f.debug_tuple("SendSecret").field(&"<hidden>").finish(),
            Action::Sleep(duration) => f.debug_tuple("Sleep").field(duration).finish(),
            Action::AwaitBootMenu => f.write_str("AwaitBootMenu"),
            Action::RunInstaller => f.write_str("RunInstaller"),
            Action::RunPostInstall => f.write_str("RunPostInstall"),
            Action::Finish(outcome) => f.debug_tuple("Finish").field(outcome).finish(),
        }
    }
}

/// Maps matched tags to plans for one session.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher<'a> {
    os: &'a OsProfile,
    device: &'a DeviceProfile,
    pacing: Pacing,
}

impl<'a> Dispatcher<'a> {
    /// Dispatcher for `device` running `os`.
    pub fn new(os: &'a OsProfile, device: &'a DeviceProfile, pacing: Pacing) -> Self {
        Self { os, device, pacing }
    }

    /// Decide what to do about `tag`, updating `state` along the way.
    pub fn plan(&self, tag: Tag, state: &mut ProvisioningState) -> Vec<Action> {
        if !tag.is_special() {
            state.clear_stalls();
        }

        let keys = &self.os.keys;
        let commands = &self.os.commands;

        match tag {
            Tag::LastLogin | Tag::CliError => vec![self.newline()],

            Tag::ProfileLogin => {
                state.begin_login();
                self.send_username(state)
            }

            Tag::DefaultLogin => {
                state.begin_login();
                state.credentials_mut().select_default();
                self.send_username(state)
            }

            Tag::Password => self.send_password(state),

            Tag::UserShell => self.user_shell(state),

            Tag::PrivilegedShell => self.privileged_shell(state),

            Tag::OverwriteConfirm => {
                info!("configuration saved, rebooting into it");
                state.begin_update();
                vec![
                    Action::SendLine(commands.confirm.clone()),
                    Action::Sleep(self.pacing.confirm),
                    Action::SendLine(commands.reboot_from_shell.clone()),
                    Action::AwaitBootMenu,
                ]
            }

            Tag::MenuOsEntry => {
                if state.installing() {
                    state.select(MenuEntry::OperatingSystem);
                    vec![self.newline()]
                } else {
                    state.select(MenuEntry::Installer);
                    vec![Action::SendLine(keys.down.clone())]
                }
            }

            Tag::ServiceDiscovery => vec![
                self.newline(),
                Action::SendLine(commands.discovery_stop.clone()),
                self.newline(),
            ],

            Tag::MenuInstallerInstall => {
                state.select(MenuEntry::InstallerInstall);
                vec![self.newline()]
            }

            Tag::MenuInstallerRescue
            | Tag::MenuInstallerUninstall
            | Tag::MenuInstallerUpdate
            | Tag::MenuInstallerEmbed => vec![Action::Send(keys.up.clone())],

            Tag::MenuInstallerEntry => {
                if state.installing() {
                    vec![Action::Send(keys.up.clone())]
                } else {
                    state.select(MenuEntry::Installer);
                    vec![self.newline()]
                }
            }

            Tag::BootMenu => vec![],

            Tag::InstallerPrompt => {
                if state.installing() {
                    vec![Action::Finish(Outcome::Success(Completion::InstallerExited))]
                } else {
                    vec![Action::RunInstaller]
                }
            }

            Tag::InstallUnavailable => vec![
                Action::SendLine(commands.reboot_from_installer.clone()),
                Action::AwaitBootMenu,
            ],

            Tag::AuthFailure => self.auth_failure(state),

            Tag::FetchFailure => vec![Action::Finish(Outcome::Failure(
                FailureReason::ArtifactFetchFailed,
            ))],

            Tag::EndOfStream | Tag::Timeout => {
                if state.record_stall() > 1 {
                    vec![Action::Finish(Outcome::Failure(FailureReason::NoResponse))]
                } else {
                    warn!("{} with no recognisable output, nudging console", tag);
                    vec![self.newline()]
                }
            }
        }
    }

    fn newline(&self) -> Action {
        Action::Send(self.os.keys.newline.clone())
    }

    fn send_username(&self, state: &ProvisioningState) -> Vec<Action> {
        match state.credentials().current(&self.device.credentials) {
            Some(credential) => {
                info!("logging in with credential profile '{}'", credential.name);
                vec![
                    Action::Sleep(self.pacing.settle),
                    Action::SendLine(credential.username.clone()),
                ]
            }
            None => vec![Action::Finish(Outcome::Failure(
                FailureReason::CredentialsExhausted,
            ))],
        }
    }

    fn send_password(&self, state: &mut ProvisioningState) -> Vec<Action> {
        let Some(credential) = state.credentials().current(&self.device.credentials) else {
            return vec![Action::Finish(Outcome::Failure(
                FailureReason::CredentialsExhausted,
            ))];
        };

        let mut actions = vec![
            Action::Sleep(self.pacing.settle),
            Action::SendSecret(credential.password.clone()),
        ];
        if credential.escalate && state.take_escalation() {
            actions.push(Action::SendLine(self.os.commands.escalate.clone()));
        }
        actions
    }

    fn user_shell(&self, state: &mut ProvisioningState) -> Vec<Action> {
        state.credentials_mut().reset_retries();

        let commands = &self.os.commands;
        let mut actions = vec![Action::Sleep(self.pacing.settle), self.newline()];

        if !state.installing() {
            info!("network OS is up, rebooting into the installer");
            actions.push(Action::SendLine(commands.reboot_from_shell.clone()));
            actions.push(Action::AwaitBootMenu);
        } else if !state.os_configured() && !state.update_in_progress() {
            state.take_escalation();
            actions.push(Action::Sleep(self.pacing.settle));
            actions.push(Action::SendLine(commands.escalate.clone()));
        } else {
            actions.push(Action::Sleep(self.pacing.step));
            actions.push(Action::SendLine(commands.exit.clone()));
            actions.push(Action::Finish(Outcome::Success(Completion::Provisioned)));
        }
        actions
    }

    fn privileged_shell(&self, state: &mut ProvisioningState) -> Vec<Action> {
        state.credentials_mut().reset_retries();

        match (
            state.installing(),
            state.os_configured(),
            state.update_in_progress(),
        ) {
            (true, false, _) => vec![Action::Sleep(self.pacing.settle), Action::RunPostInstall],
            (true, true, false) => vec![],
            (true, true, true) => vec![Action::Finish(Outcome::Success(Completion::Provisioned))],
            (false, _, _) => vec![Action::Finish(Outcome::Failure(
                FailureReason::UnexpectedPrivilegedShell,
            ))],
        }
    }

    fn auth_failure(&self, state: &mut ProvisioningState) -> Vec<Action> {
        let verdict = state
            .credentials_mut()
            .record_failure(self.os.auth_retry_limit);

        match verdict {
            AuthVerdict::Retry { attempts } => {
                warn!(
                    "login rejected (profile {}, attempt {})",
                    state.credential_index(),
                    attempts
                );
                vec![]
            }
            AuthVerdict::Advanced { index } => {
                warn!("credential profile exhausted, moving to profile {}", index);
                vec![]
            }
            AuthVerdict::Exhausted => vec![Action::Finish(Outcome::Failure(
                FailureReason::CredentialsExhausted,
            ))],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::device::Credential;
    use proptest::prelude::*;

    struct Fixture {
        os: OsProfile,
        device: DeviceProfile,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                os: OsProfile::sonic(),
                device: DeviceProfile::default(),
            }
        }

        fn dispatcher(&self) -> Dispatcher<'_> {
            Dispatcher::new(&self.os, &self.device, Pacing::none())
        }

        fn state(&self) -> ProvisioningState {
            ProvisioningState::new(&self.device.credentials)
        }
    }

    fn sends(actions: &[Action]) -> Vec<&str> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Send(s) | Action::SendLine(s) | Action::SendSecret(s) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }

    fn finish(actions: &[Action]) -> Option<Outcome> {
        actions.iter().find_map(|a| match a {
            Action::Finish(outcome) => Some(*outcome),
            _ => None,
        })
    }

    #[test]
    fn test_default_login_selects_factory_profile() {
        let fx = Fixture::new();
        let mut state = fx.state();

        let actions = fx.dispatcher().plan(Tag::DefaultLogin, &mut state);

        assert_eq!(state.credential_index(), 1);
        assert_eq!(sends(&actions), vec!["admin"]);
    }

    #[test]
    fn test_profile_login_uses_current_profile() {
        let fx = Fixture {
            device: DeviceProfile {
                credentials: vec![
                    Credential::new("provisioned", "netops", "pw1"),
                    Credential::new("factory", "admin", "pw2").as_default(),
                ],
                ..DeviceProfile::default()
            },
            ..Fixture::new()
        };
        let mut state = fx.state();

        let actions = fx.dispatcher().plan(Tag::ProfileLogin, &mut state);
        assert_eq!(sends(&actions), vec!["netops"]);

        let actions = fx.dispatcher().plan(Tag::Password, &mut state);
        assert_eq!(sends(&actions), vec!["pw1"]);
        assert!(matches!(actions.last(), Some(Action::SendSecret(_))));
    }

    #[test]
    fn test_password_escalates_once_for_escalating_profile() {
        let fx = Fixture {
            device: DeviceProfile {
                credentials: vec![Credential::new("op", "admin", "pw").with_escalation()],
                ..DeviceProfile::default()
            },
            ..Fixture::new()
        };
        let dispatcher = fx.dispatcher();
        let mut state = fx.state();

        dispatcher.plan(Tag::ProfileLogin, &mut state);
        let first = dispatcher.plan(Tag::Password, &mut state);
        assert_eq!(sends(&first), vec!["pw", "sudo su"]);

        // sudo asks for the password again: answer it, don't re-escalate
        let second = dispatcher.plan(Tag::Password, &mut state);
        assert_eq!(sends(&second), vec!["pw"]);
    }

    #[test]
    fn test_user_shell_before_install_reboots_to_menu() {
        let fx = Fixture::new();
        let mut state = fx.state();

        let actions = fx.dispatcher().plan(Tag::UserShell, &mut state);

        assert_eq!(sends(&actions), vec!["\r\n", "sudo -S reboot"]);
        assert_eq!(actions.last(), Some(&Action::AwaitBootMenu));
    }

    #[test]
    fn test_user_shell_after_install_escalates() {
        let fx = Fixture::new();
        let mut state = fx.state();
        state.begin_install();

        let actions = fx.dispatcher().plan(Tag::UserShell, &mut state);
        assert_eq!(sends(&actions), vec!["\r\n", "sudo su"]);
    }

    #[test]
    fn test_user_shell_after_update_exits_with_success() {
        let fx = Fixture::new();
        let mut state = fx.state();
        state.begin_install();
        state.mark_configured();
        state.begin_update();

        let actions = fx.dispatcher().plan(Tag::UserShell, &mut state);
        assert_eq!(sends(&actions), vec!["\r\n", "exit"]);
        assert_eq!(
            finish(&actions),
            Some(Outcome::Success(Completion::Provisioned))
        );
    }

    #[test]
    fn test_privileged_shell_transitions() {
        let fx = Fixture::new();
        let dispatcher = fx.dispatcher();

        let mut state = fx.state();
        assert_eq!(
            finish(&dispatcher.plan(Tag::PrivilegedShell, &mut state)),
            Some(Outcome::Failure(FailureReason::UnexpectedPrivilegedShell))
        );

        let mut state = fx.state();
        state.begin_install();
        let actions = dispatcher.plan(Tag::PrivilegedShell, &mut state);
        assert_eq!(actions.last(), Some(&Action::RunPostInstall));
        // The sequence opens with its own newline
        assert!(sends(&actions).is_empty());

        state.mark_configured();
        assert!(dispatcher.plan(Tag::PrivilegedShell, &mut state).is_empty());

        state.begin_update();
        assert_eq!(
            finish(&dispatcher.plan(Tag::PrivilegedShell, &mut state)),
            Some(Outcome::Success(Completion::Provisioned))
        );
    }

    #[test]
    fn test_overwrite_confirmation_reboots_without_finishing() {
        let fx = Fixture::new();
        let mut state = fx.state();

        let actions = fx.dispatcher().plan(Tag::OverwriteConfirm, &mut state);

        assert!(state.update_in_progress());
        assert_eq!(sends(&actions), vec!["y", "sudo -S reboot"]);
        assert_eq!(actions.last(), Some(&Action::AwaitBootMenu));
        assert_eq!(finish(&actions), None);
    }

    #[test]
    fn test_menu_never_selects_rescue_family() {
        let fx = Fixture::new();
        let dispatcher = fx.dispatcher();
        let mut state = fx.state();

        for tag in [
            Tag::MenuInstallerRescue,
            Tag::MenuInstallerUninstall,
            Tag::MenuInstallerUpdate,
            Tag::MenuInstallerEmbed,
        ] {
            let actions = dispatcher.plan(tag, &mut state);
            assert_eq!(actions, vec![Action::Send("\x1b[A".to_string())]);
            assert_eq!(state.menu_selection(), None);
        }

        dispatcher.plan(Tag::MenuInstallerInstall, &mut state);
        assert_eq!(state.menu_selection(), Some(MenuEntry::InstallerInstall));
    }

    #[test]
    fn test_os_entry_selection_depends_on_install_phase() {
        let fx = Fixture::new();
        let dispatcher = fx.dispatcher();
        let mut state = fx.state();

        let actions = dispatcher.plan(Tag::MenuOsEntry, &mut state);
        assert_eq!(actions, vec![Action::SendLine("\x1b[B".to_string())]);
        assert_eq!(state.menu_selection(), Some(MenuEntry::Installer));

        state.begin_install();
        dispatcher.plan(Tag::MenuInstallerRescue, &mut state);
        let actions = dispatcher.plan(Tag::MenuOsEntry, &mut state);
        assert_eq!(actions, vec![Action::Send("\r\n".to_string())]);
        assert_eq!(state.menu_selection(), Some(MenuEntry::OperatingSystem));
    }

    #[test]
    fn test_installer_prompt() {
        let fx = Fixture::new();
        let dispatcher = fx.dispatcher();
        let mut state = fx.state();

        assert_eq!(
            dispatcher.plan(Tag::InstallerPrompt, &mut state),
            vec![Action::RunInstaller]
        );

        state.begin_install();
        assert_eq!(
            finish(&dispatcher.plan(Tag::InstallerPrompt, &mut state)),
            Some(Outcome::Success(Completion::InstallerExited))
        );
    }

    #[test]
    fn test_fetch_failure_finishes_without_sending() {
        let fx = Fixture::new();
        let mut state = fx.state();
        state.begin_install();

        let actions = fx.dispatcher().plan(Tag::FetchFailure, &mut state);
        assert_eq!(
            actions,
            vec![Action::Finish(Outcome::Failure(
                FailureReason::ArtifactFetchFailed
            ))]
        );
    }

    #[test]
    fn test_second_consecutive_stall_is_fatal() {
        let fx = Fixture::new();
        let dispatcher = fx.dispatcher();
        let mut state = fx.state();

        assert_eq!(
            dispatcher.plan(Tag::Timeout, &mut state),
            vec![Action::Send("\r\n".to_string())]
        );
        assert_eq!(
            finish(&dispatcher.plan(Tag::EndOfStream, &mut state)),
            Some(Outcome::Failure(FailureReason::NoResponse))
        );
    }

    #[test]
    fn test_output_between_stalls_resets_the_count() {
        let fx = Fixture::new();
        let dispatcher = fx.dispatcher();
        let mut state = fx.state();

        dispatcher.plan(Tag::Timeout, &mut state);
        dispatcher.plan(Tag::BootMenu, &mut state);
        let actions = dispatcher.plan(Tag::Timeout, &mut state);

        assert_eq!(finish(&actions), None);
    }

    #[test]
    fn test_repeated_noise_is_idempotent() {
        let fx = Fixture::new();
        let dispatcher = fx.dispatcher();

        for tag in [Tag::CliError, Tag::UserShell] {
            let mut state = fx.state();
            let first = dispatcher.plan(tag, &mut state);
            let snapshot = state.clone();
            for _ in 0..5 {
                assert_eq!(dispatcher.plan(tag, &mut state), first);
                assert_eq!(state, snapshot);
            }
        }
    }

    fn auth_tag() -> impl Strategy<Value = Tag> {
        prop_oneof![
            Just(Tag::AuthFailure),
            Just(Tag::ProfileLogin),
            Just(Tag::Password),
            Just(Tag::LastLogin),
            Just(Tag::CliError),
        ]
    }

    fn login_tag() -> impl Strategy<Value = Tag> {
        prop_oneof![
            Just(Tag::LastLogin),
            Just(Tag::ProfileLogin),
            Just(Tag::DefaultLogin),
            Just(Tag::Password),
            Just(Tag::AuthFailure),
        ]
    }

    proptest! {
        #[test]
        fn prop_credential_index_never_decreases(tags in prop::collection::vec(auth_tag(), 0..60)) {
            let fx = Fixture::new();
            let dispatcher = fx.dispatcher();
            let mut state = fx.state();
            let mut last_index = state.credential_index();

            for tag in tags {
                let actions = dispatcher.plan(tag, &mut state);
                prop_assert!(state.credential_index() >= last_index);
                prop_assert!(state.credential_index() < fx.device.credentials.len());
                last_index = state.credential_index();
                if finish(&actions).is_some() {
                    prop_assert!(state.credentials().is_exhausted());
                    break;
                }
            }
        }

        #[test]
        fn prop_login_uses_the_current_credential(
            tags in prop::collection::vec(login_tag(), 0..60),
        ) {
            let fx = Fixture {
                device: DeviceProfile {
                    credentials: vec![
                        Credential::new("provisioned", "netops", "pw1"),
                        Credential::new("staging", "ops", "pw2"),
                        Credential::new("factory", "admin", "pw3").as_default(),
                    ],
                    ..DeviceProfile::default()
                },
                ..Fixture::new()
            };
            let dispatcher = fx.dispatcher();
            let mut state = fx.state();

            for tag in tags {
                let actions = dispatcher.plan(tag, &mut state);
                let current = &fx.device.credentials[state.credential_index()];
                for action in &actions {
                    match (tag, action) {
                        (Tag::ProfileLogin | Tag::DefaultLogin, Action::SendLine(user)) => {
                            prop_assert_eq!(user, &current.username);
                        }
                        (Tag::Password, Action::SendSecret(password)) => {
                            prop_assert_eq!(password, &current.password);
                        }
                        _ => {}
                    }
                }
                if finish(&actions).is_some() {
                    break;
                }
            }
        }

        #[test]
        fn prop_consecutive_failures_terminate(noise in prop::collection::vec(auth_tag(), 0..10)) {
            let fx = Fixture::new();
            let dispatcher = fx.dispatcher();
            let mut state = fx.state();
            for tag in noise {
                if finish(&dispatcher.plan(tag, &mut state)).is_some() {
                    return Ok(());
                }
            }

            // At most limit * profiles more rejections end the session
            let budget = fx.os.auth_retry_limit as usize * fx.device.credentials.len();
            let terminated = (0..budget).any(|_| {
                finish(&dispatcher.plan(Tag::AuthFailure, &mut state))
                    == Some(Outcome::Failure(FailureReason::CredentialsExhausted))
            });
            prop_assert!(terminated);
        }
    }

    #[test]
    fn test_exactly_three_failures_advance_profile() {
        let fx = Fixture::new();
        let dispatcher = fx.dispatcher();
        let mut state = fx.state();

        dispatcher.plan(Tag::AuthFailure, &mut state);
        dispatcher.plan(Tag::AuthFailure, &mut state);
        assert_eq!(state.credential_index(), 0);
        assert_eq!(state.retry_count(), 2);

        dispatcher.plan(Tag::AuthFailure, &mut state);
        assert_eq!(state.credential_index(), 1);
        assert_eq!(state.retry_count(), 0);

        dispatcher.plan(Tag::AuthFailure, &mut state);
        dispatcher.plan(Tag::AuthFailure, &mut state);
        let actions = dispatcher.plan(Tag::AuthFailure, &mut state);
        assert_eq!(
            finish(&actions),
            Some(Outcome::Failure(FailureReason::CredentialsExhausted))
        );
    }
}
