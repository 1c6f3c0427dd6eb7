//! OS profile: the prompt set and command vocabulary of one bootloader /
//! installer / network OS combination.
//!
//! Everything that differs between OS builds lives here, so a single
//! driver serves all of them.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::device::DeviceProfile;
use super::error::ProvisionError;
use super::table::Tag;

/// Prompt and banner signatures, one per matchable tag.
///
/// Every entry is a regular expression matched against partial lines of
/// console output. Case is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSet {
    /// Banner printed after a successful login.
    pub last_login: String,
    /// Login prompt of a device with a provisioned hostname.
    pub profile_login: String,
    /// Login prompt of a device with the factory hostname.
    pub default_login: String,
    /// Password prompt, login or sudo.
    pub password: String,
    /// Unprivileged shell prompt.
    pub user_shell: String,
    /// Root shell prompt.
    pub privileged_shell: String,
    /// Configuration overwrite confirmation.
    pub overwrite_confirm: String,
    /// Highlighted network OS entry in the boot menu.
    pub menu_os_entry: String,
    /// Installer service discovery banner.
    pub service_discovery: String,
    /// Highlighted installer "Install OS" entry.
    pub menu_installer_install: String,
    /// Highlighted installer "Rescue" entry.
    pub menu_installer_rescue: String,
    /// Highlighted installer "Uninstall OS" entry.
    pub menu_installer_uninstall: String,
    /// Highlighted installer "Update" entry.
    pub menu_installer_update: String,
    /// Highlighted installer "Embed" entry.
    pub menu_installer_embed: String,
    /// Highlighted top-level installer entry.
    pub menu_installer_entry: String,
    /// Boot menu header.
    pub boot_menu: String,
    /// Installer root prompt.
    pub installer_prompt: String,
    /// Installer refusing to install in its current mode.
    pub install_unavailable: String,
    /// Rejected login or sudo password.
    pub auth_failure: String,
    /// Too many incorrect password attempts.
    pub cli_error: String,
    /// Missing file after a fetch.
    pub fetch_failure: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            last_login: r"Last login:".to_string(),
            profile_login: r"sonic-(\w+ *)login:".to_string(),
            default_login: r"sonic login:".to_string(),
            password: r"[pP]assword:|\[sudo\] password for \w*:".to_string(),
            user_shell: r"@[-\w_]*:[\w~/-]*\$".to_string(),
            privileged_shell: r"@[-\w_]*:[\w~/-]*#".to_string(),
            overwrite_confirm: r"Existing file will be(\s\w+,\s\w+\?\s\[\w/\w+\]:)".to_string(),
            menu_os_entry: r"\*SONiC-OS-HEAD".to_string(),
            service_discovery: r"Starting ONIE Service Discovery".to_string(),
            menu_installer_install: r"\*ONIE: Install OS".to_string(),
            menu_installer_rescue: r"\*ONIE: Rescue".to_string(),
            menu_installer_uninstall: r"\*ONIE: Uninstall OS".to_string(),
            menu_installer_update: r"\*ONIE: Update ONIE".to_string(),
            menu_installer_embed: r"\*ONIE: Embed ONIE".to_string(),
            menu_installer_entry: r"\*ONIE *\|".to_string(),
            boot_menu: r"GNU GRUB".to_string(),
            installer_prompt: r"ONIE:/\w* #".to_string(),
            install_unavailable: r"NOS install unavailable in current ONIE mode".to_string(),
            auth_failure: r"Login incorrect|Sorry, try again\.".to_string(),
            cli_error: r"incorrect password attempts".to_string(),
            fetch_failure: r"No such(\s\w+ \w+ \w+)".to_string(),
        }
    }
}

impl PromptSet {
    /// Signature for `tag`, or `None` for the non-textual tags
    /// (end of stream, timeout).
    pub fn signature(&self, tag: Tag) -> Option<&str> {
        let signature = match tag {
            Tag::LastLogin => &self.last_login,
            Tag::ProfileLogin => &self.profile_login,
            Tag::DefaultLogin => &self.default_login,
            Tag::Password => &self.password,
            Tag::UserShell => &self.user_shell,
            Tag::PrivilegedShell => &self.privileged_shell,
            Tag::OverwriteConfirm => &self.overwrite_confirm,
            Tag::MenuOsEntry => &self.menu_os_entry,
            Tag::ServiceDiscovery => &self.service_discovery,
            Tag::MenuInstallerInstall => &self.menu_installer_install,
            Tag::MenuInstallerRescue => &self.menu_installer_rescue,
            Tag::MenuInstallerUninstall => &self.menu_installer_uninstall,
            Tag::MenuInstallerUpdate => &self.menu_installer_update,
            Tag::MenuInstallerEmbed => &self.menu_installer_embed,
            Tag::MenuInstallerEntry => &self.menu_installer_entry,
            Tag::BootMenu => &self.boot_menu,
            Tag::InstallerPrompt => &self.installer_prompt,
            Tag::InstallUnavailable => &self.install_unavailable,
            Tag::AuthFailure => &self.auth_failure,
            Tag::CliError => &self.cli_error,
            Tag::FetchFailure => &self.fetch_failure,
            Tag::EndOfStream | Tag::Timeout => return None,
        };
        Some(signature)
    }
}

/// Raw key sequences sent to menus and shells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Keys {
    /// Line terminator for bare newlines.
    pub newline: String,
    /// Cursor up.
    pub up: String,
    /// Cursor down.
    pub down: String,
}

impl Default for Keys {
    fn default() -> Self {
        Self {
            newline: "\r\n".to_string(),
            up: "\x1b[A".to_string(),
            down: "\x1b[B".to_string(),
        }
    }
}

/// Commands the driver types at the device.
///
/// `fetch` and `run_script` are templates: `{url}` and `{file}` are
/// substituted per artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commands {
    /// Reboot from the network OS shell.
    pub reboot_from_shell: String,
    /// Reboot from the installer prompt.
    pub reboot_from_installer: String,
    /// Become root.
    pub escalate: String,
    /// Stop installer service discovery.
    pub discovery_stop: String,
    /// Print the installer's boot reason.
    pub boot_reason: String,
    /// Boot reason value meaning "install mode".
    pub boot_reason_install: String,
    /// Dump platform information before installing.
    pub machine_conf: String,
    /// Installer's install command.
    pub install_tool: String,
    /// Image file name under the device's image path.
    pub installer_artifact: String,
    /// Answer to the overwrite confirmation.
    pub confirm: String,
    /// Leave the shell.
    pub exit: String,
    /// Artifact download template.
    pub fetch: String,
    /// Helper script invocation template.
    pub run_script: String,
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            reboot_from_shell: "sudo -S reboot".to_string(),
            reboot_from_installer: "reboot".to_string(),
            escalate: "sudo su".to_string(),
            discovery_stop: "onie-discovery-stop".to_string(),
            boot_reason: "echo $boot_reason".to_string(),
            boot_reason_install: "install".to_string(),
            machine_conf: "cat /etc/machine.conf".to_string(),
            install_tool: "onie-nos-install".to_string(),
            installer_artifact: "sonic-broadcom.bin".to_string(),
            confirm: "y".to_string(),
            exit: "exit".to_string(),
            fetch: "curl {url} -s -o {file}".to_string(),
            run_script: "bash {file}".to_string(),
        }
    }
}

/// One step of the post-install configuration sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostInstallStep {
    /// Send a bare newline.
    Newline,
    /// Send a templated shell command; with `wait`, block until the
    /// privileged prompt comes back before the next step.
    Run {
        /// Command template, see [`render`].
        command: String,
        /// Wait for the root prompt afterwards.
        #[serde(default)]
        wait: bool,
    },
    /// Fetch the device config and every auxiliary script.
    FetchArtifacts,
    /// Execute every auxiliary script.
    RunScripts,
}

impl PostInstallStep {
    /// Fire-and-forget command.
    pub fn run(command: impl Into<String>) -> Self {
        PostInstallStep::Run {
            command: command.into(),
            wait: false,
        }
    }

    /// Command followed by a wait for the prompt.
    pub fn run_and_wait(command: impl Into<String>) -> Self {
        PostInstallStep::Run {
            command: command.into(),
            wait: true,
        }
    }
}

/// Descriptor of one OS flavour the driver can provision.
///
/// ```
/// use sonic_loader::OsProfile;
///
/// let os = OsProfile::sonic();
/// assert_eq!(os.auth_retry_limit, 3);
/// assert_eq!(os.commands.install_tool, "onie-nos-install");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsProfile {
    /// Profile name, for logs.
    pub name: String,
    /// Console signatures.
    pub prompts: PromptSet,
    /// Key sequences.
    pub keys: Keys,
    /// Command vocabulary.
    pub commands: Commands,
    /// Helper scripts fetched from the artifact host and run after install.
    pub aux_scripts: Vec<String>,
    /// Configuration sequence run at the first root prompt after install.
    pub post_install: Vec<PostInstallStep>,
    /// Consecutive authentication failures tolerated per credential.
    pub auth_retry_limit: u32,
}

impl Default for OsProfile {
    fn default() -> Self {
        Self::sonic()
    }
}

impl OsProfile {
    /// SONiC installed through ONIE from a GRUB menu.
    pub fn sonic() -> Self {
        Self {
            name: "sonic".to_string(),
            prompts: PromptSet::default(),
            keys: Keys::default(),
            commands: Commands::default(),
            aux_scripts: vec![
                "autologout_time.sh".to_string(),
                "sshd_mod.sh".to_string(),
                "clearlog_gz.sh".to_string(),
            ],
            post_install: vec![
                PostInstallStep::Newline,
                PostInstallStep::run("ifconfig {mgmt_interface} down"),
                PostInstallStep::run_and_wait(
                    "ifconfig {mgmt_interface} {mgmt_ip} netmask {mgmt_mask} up",
                ),
                PostInstallStep::run_and_wait("route delete default"),
                PostInstallStep::run("route add default gw {gateway_ip} {mgmt_interface}"),
                PostInstallStep::Newline,
                PostInstallStep::FetchArtifacts,
                PostInstallStep::RunScripts,
                PostInstallStep::run_and_wait("sonic-cfggen -j {device_config} --write-to-db"),
                PostInstallStep::run("config save"),
            ],
            auth_retry_limit: 3,
        }
    }

    /// Load a profile from a JSON file; omitted fields keep the SONiC
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// `auth_retry_limit` is zero.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ProvisionError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let profile: Self = serde_json::from_str(&text)?;
        if profile.auth_retry_limit == 0 {
            return Err(ProvisionError::InvalidProfile(
                "auth_retry_limit must be at least 1".to_string(),
            ));
        }
        Ok(profile)
    }

    /// The OS install command for `device`.
    pub fn install_command(&self, device: &DeviceProfile) -> String {
        format!(
            "{} {}",
            self.commands.install_tool,
            device.install_url(&self.commands.installer_artifact)
        )
    }

    /// Command that downloads `file` from the artifact host.
    pub fn fetch_command(&self, device: &DeviceProfile, file: &str) -> String {
        self.commands
            .fetch
            .replace("{url}", &device.artifact_url(file))
            .replace("{file}", file)
    }

    /// Command that runs a fetched helper script.
    pub fn run_script_command(&self, file: &str) -> String {
        self.commands.run_script.replace("{file}", file)
    }
}

/// Substitute device fields into a post-install command template.
pub fn render(template: &str, device: &DeviceProfile) -> String {
    template
        .replace("{mgmt_interface}", &device.mgmt_interface)
        .replace("{mgmt_ip}", &device.mgmt_ip)
        .replace("{mgmt_mask}", &device.mgmt_mask)
        .replace("{gateway_ip}", &device.gateway_ip)
        .replace("{device_config}", &device.device_config)
        .replace("{artifact_base}", &device.artifact_base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_command() {
        let os = OsProfile::sonic();
        let device = DeviceProfile::default();

        assert_eq!(
            os.install_command(&device),
            "onie-nos-install http://192.168.59.161/sonic/images/Deb9/v280/sonic-broadcom.bin"
        );
    }

    #[test]
    fn test_render_management_template() {
        let device = DeviceProfile::default();
        assert_eq!(
            render("ifconfig {mgmt_interface} {mgmt_ip} netmask {mgmt_mask} up", &device),
            "ifconfig ma1 192.168.2.56 netmask 255.255.255.0 up"
        );
        assert_eq!(
            render("route add default gw {gateway_ip} {mgmt_interface}", &device),
            "route add default gw 192.168.2.254 ma1"
        );
    }

    #[test]
    fn test_fetch_and_run_commands() {
        let os = OsProfile::sonic();
        let device = DeviceProfile::default();

        assert_eq!(
            os.fetch_command(&device, "sshd_mod.sh"),
            "curl http://192.168.59.161/sonic/conf/sshd_mod.sh -s -o sshd_mod.sh"
        );
        assert_eq!(os.run_script_command("sshd_mod.sh"), "bash sshd_mod.sh");
    }

    #[test]
    fn test_every_textual_tag_has_a_signature() {
        let prompts = PromptSet::default();
        for tag in Tag::ALL {
            let signature = prompts.signature(tag);
            assert_eq!(signature.is_none(), tag.is_special(), "{:?}", tag);
        }
    }

    #[test]
    fn test_post_install_step_json_shape() {
        let steps: Vec<PostInstallStep> = serde_json::from_str(
            r#"[{"kind": "newline"}, {"kind": "run", "command": "config save"}, {"kind": "fetch_artifacts"}]"#,
        )
        .unwrap();

        assert_eq!(
            steps,
            vec![
                PostInstallStep::Newline,
                PostInstallStep::run("config save"),
                PostInstallStep::FetchArtifacts,
            ]
        );
    }
}
