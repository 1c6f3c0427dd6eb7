//! Expectation table: which console signature was seen, as a closed set of tags.

use std::fmt;

use super::error::ProvisionError;
use super::os_profile::PromptSet;
use crate::pattern::{Pattern, PatternSet};

/// Symbolic identity of a matched console signature.
///
/// The set is closed so the dispatcher's `match` is exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Artifact fetch failed ("No such file or directory").
    FetchFailure,
    /// Login or sudo rejected the password.
    AuthFailure,
    /// Generic CLI error banner.
    CliError,
    /// Installer refuses to install in its current mode.
    InstallUnavailable,
    /// "Last login:" banner.
    LastLogin,
    /// Login prompt carrying a provisioned hostname.
    ProfileLogin,
    /// Login prompt carrying the factory hostname.
    DefaultLogin,
    /// Password prompt (login or sudo).
    Password,
    /// Unprivileged shell prompt.
    UserShell,
    /// Privileged (root) shell prompt.
    PrivilegedShell,
    /// "Existing file will be overwritten" confirmation.
    OverwriteConfirm,
    /// Network OS entry highlighted in the boot menu.
    MenuOsEntry,
    /// Installer started automatic service discovery.
    ServiceDiscovery,
    /// Installer "Install OS" entry highlighted.
    MenuInstallerInstall,
    /// Installer "Rescue" entry highlighted.
    MenuInstallerRescue,
    /// Installer "Uninstall OS" entry highlighted.
    MenuInstallerUninstall,
    /// Installer "Update" entry highlighted.
    MenuInstallerUpdate,
    /// Installer "Embed" entry highlighted.
    MenuInstallerEmbed,
    /// Top-level installer entry highlighted in the boot menu.
    MenuInstallerEntry,
    /// Boot menu header.
    BootMenu,
    /// Installer root shell prompt.
    InstallerPrompt,
    /// Console closed.
    EndOfStream,
    /// Nothing recognisable within the wait.
    Timeout,
}

impl Tag {
    /// Every tag in expectation-table order.
    ///
    /// Banners that arrive in the same burst as a prompt ("Login
    /// incorrect" followed by a fresh login prompt) are listed before the
    /// prompts, otherwise matching the prompt would consume the banner.
    /// Highlighted menu entries precede the menu header for the same
    /// reason.
    pub const ALL: [Tag; 23] = [
        Tag::FetchFailure,
        Tag::AuthFailure,
        Tag::CliError,
        Tag::InstallUnavailable,
        Tag::LastLogin,
        Tag::ProfileLogin,
        Tag::DefaultLogin,
        Tag::Password,
        Tag::UserShell,
        Tag::PrivilegedShell,
        Tag::OverwriteConfirm,
        Tag::MenuOsEntry,
        Tag::ServiceDiscovery,
        Tag::MenuInstallerInstall,
        Tag::MenuInstallerRescue,
        Tag::MenuInstallerUninstall,
        Tag::MenuInstallerUpdate,
        Tag::MenuInstallerEmbed,
        Tag::MenuInstallerEntry,
        Tag::BootMenu,
        Tag::InstallerPrompt,
        Tag::EndOfStream,
        Tag::Timeout,
    ];

    /// Tags that do not correspond to console text.
    pub fn is_special(self) -> bool {
        matches!(self, Tag::EndOfStream | Tag::Timeout)
    }

    fn as_str(self) -> &'static str {
        match self {
            Tag::FetchFailure => "artifact fetch failure",
            Tag::AuthFailure => "authentication failure",
            Tag::CliError => "cli error",
            Tag::InstallUnavailable => "install unavailable",
            Tag::LastLogin => "last login banner",
            Tag::ProfileLogin => "profile login prompt",
            Tag::DefaultLogin => "default login prompt",
            Tag::Password => "password prompt",
            Tag::UserShell => "user shell prompt",
            Tag::PrivilegedShell => "privileged shell prompt",
            Tag::OverwriteConfirm => "overwrite confirmation",
            Tag::MenuOsEntry => "boot menu: os entry",
            Tag::ServiceDiscovery => "installer service discovery",
            Tag::MenuInstallerInstall => "installer menu: install",
            Tag::MenuInstallerRescue => "installer menu: rescue",
            Tag::MenuInstallerUninstall => "installer menu: uninstall",
            Tag::MenuInstallerUpdate => "installer menu: update",
            Tag::MenuInstallerEmbed => "installer menu: embed",
            Tag::MenuInstallerEntry => "boot menu: installer entry",
            Tag::BootMenu => "boot menu",
            Tag::InstallerPrompt => "installer prompt",
            Tag::EndOfStream => "end of stream",
            Tag::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled pattern set whose indices map back to tags.
#[derive(Debug)]
pub struct TaggedSet {
    tags: Vec<Tag>,
    patterns: PatternSet,
}

impl TaggedSet {
    /// Compile the signatures of `tags`, in order, from `prompts`.
    pub fn compile(prompts: &PromptSet, tags: &[Tag]) -> Result<Self, ProvisionError> {
        let patterns = tags
            .iter()
            .map(|&tag| match (tag, prompts.signature(tag)) {
                (_, Some(signature)) => signature_pattern(signature),
                (Tag::EndOfStream, None) => Ok(Pattern::Eof),
                (_, None) => Ok(Pattern::Timeout),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            tags: tags.to_vec(),
            patterns: PatternSet::new(&patterns)?,
        })
    }

    /// The compiled patterns, for handing to a console.
    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Tag of the pattern at `index`.
    pub fn tag(&self, index: usize) -> Option<Tag> {
        self.tags.get(index).copied()
    }
}

/// Fixed-text signatures go to the exact matcher, everything else is a regex.
fn signature_pattern(signature: &str) -> Result<Pattern, regex::Error> {
    if regex::escape(signature) == signature {
        Ok(Pattern::exact(signature))
    } else {
        Pattern::regex(signature)
    }
}

/// Every pattern set a session waits on, compiled once at session start.
#[derive(Debug)]
pub struct ExpectationTable {
    /// The full table presented on every driver iteration.
    pub main: TaggedSet,
    /// Waiting for the bootloader after a reboot.
    pub boot_menu: TaggedSet,
    /// Installer dialogue steps.
    pub installer: TaggedSet,
    /// Post-install steps that wait for the root prompt.
    pub shell_step: TaggedSet,
}

impl ExpectationTable {
    /// Compile all sets from an OS profile's prompt set.
    ///
    /// # Errors
    ///
    /// Returns an error if any signature is not a valid regex.
    pub fn compile(prompts: &PromptSet) -> Result<Self, ProvisionError> {
        Ok(Self {
            main: TaggedSet::compile(prompts, &Tag::ALL)?,
            boot_menu: TaggedSet::compile(
                prompts,
                &[Tag::BootMenu, Tag::EndOfStream, Tag::Timeout],
            )?,
            installer: TaggedSet::compile(
                prompts,
                &[Tag::InstallerPrompt, Tag::EndOfStream, Tag::Timeout],
            )?,
            shell_step: TaggedSet::compile(
                prompts,
                &[
                    Tag::FetchFailure,
                    Tag::PrivilegedShell,
                    Tag::EndOfStream,
                    Tag::Timeout,
                ],
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ExpectationTable {
        ExpectationTable::compile(&PromptSet::default()).unwrap()
    }

    fn classify(text: &str) -> Option<Tag> {
        let table = table();
        let (index, _) = table.main.patterns().find(text.as_bytes())?;
        table.main.tag(index)
    }

    #[test]
    fn test_profile_login_precedes_default_login() {
        assert_eq!(classify("sonic-lab7 login: "), Some(Tag::ProfileLogin));
        assert_eq!(classify("sonic login: "), Some(Tag::DefaultLogin));
    }

    #[test]
    fn test_auth_failure_wins_over_following_prompt() {
        assert_eq!(
            classify("\r\nLogin incorrect\r\nsonic login: "),
            Some(Tag::AuthFailure)
        );
        assert_eq!(classify("Sorry, try again.\r\n"), Some(Tag::AuthFailure));
    }

    #[test]
    fn test_shell_prompts() {
        assert_eq!(classify("admin@sonic:~$ "), Some(Tag::UserShell));
        assert_eq!(classify("root@sonic:/home/admin# "), Some(Tag::PrivilegedShell));
    }

    #[test]
    fn test_menu_entries_precede_menu_header() {
        let redraw = "GNU GRUB  version 2.02\r\n*ONIE: Rescue\r\n ONIE: Install OS";
        assert_eq!(classify(redraw), Some(Tag::MenuInstallerRescue));

        let redraw = "GNU GRUB  version 2.02\r\n*SONiC-OS-HEAD\r\n ONIE";
        assert_eq!(classify(redraw), Some(Tag::MenuOsEntry));

        assert_eq!(classify("GNU GRUB  version 2.02"), Some(Tag::BootMenu));
    }

    #[test]
    fn test_installer_signatures() {
        assert_eq!(classify("ONIE:/ # "), Some(Tag::InstallerPrompt));
        assert_eq!(
            classify("Starting ONIE Service Discovery\r\nONIE:/ # "),
            Some(Tag::ServiceDiscovery)
        );
        assert_eq!(
            classify("NOS install unavailable in current ONIE mode"),
            Some(Tag::InstallUnavailable)
        );
        assert_eq!(classify("*ONIE       |"), Some(Tag::MenuInstallerEntry));
    }

    #[test]
    fn test_overwrite_and_fetch_failure() {
        assert_eq!(
            classify("Existing file will be overwritten, continue? [y/N]:"),
            Some(Tag::OverwriteConfirm)
        );
        assert_eq!(
            classify("cfg_default.json: No such file or directory"),
            Some(Tag::FetchFailure)
        );
    }

    #[test]
    fn test_unknown_text_matches_nothing() {
        assert_eq!(classify("Loading Linux 4.9.0-9-2-amd64 ..."), None);
    }

    #[test]
    fn test_special_tags_map_to_special_patterns() {
        let table = table();
        let eof = table.main.patterns().eof_index().unwrap();
        let timeout = table.main.patterns().timeout_index().unwrap();

        assert_eq!(table.main.tag(eof), Some(Tag::EndOfStream));
        assert_eq!(table.main.tag(timeout), Some(Tag::Timeout));
        assert_eq!(table.main.tag(Tag::ALL.len()), None);
    }

    #[test]
    fn test_fixed_text_signatures_use_exact_matching() {
        assert!(matches!(
            signature_pattern("GNU GRUB"),
            Ok(Pattern::Exact(text)) if text == "GNU GRUB"
        ));
        assert!(matches!(
            signature_pattern("Starting ONIE Service Discovery"),
            Ok(Pattern::Exact(_))
        ));
        assert!(matches!(
            signature_pattern(r"ONIE:/\w* #"),
            Ok(Pattern::Regex(_))
        ));
        assert!(matches!(
            signature_pattern("Sorry, try again."),
            Ok(Pattern::Regex(_))
        ));
    }

    #[test]
    fn test_invalid_signature_is_rejected() {
        let prompts = PromptSet {
            password: "[unclosed".to_string(),
            ..PromptSet::default()
        };
        assert!(matches!(
            ExpectationTable::compile(&prompts),
            Err(ProvisionError::Regex(_))
        ));
    }
}
