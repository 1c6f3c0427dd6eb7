//! Device profile: everything known about the target before the session starts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use super::error::ProvisionError;

/// One assumed identity on the device.
///
/// `escalate` marks identities whose login lands in a shell that must be
/// elevated immediately after the password is accepted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Short label used in logs ("provisioned", "factory").
    pub name: String,
    /// Login user name.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Send the privilege-escalation command right after the password.
    #[serde(default)]
    pub escalate: bool,
    /// Selected by the generic (factory hostname) login prompt.
    #[serde(default)]
    pub default: bool,
}

impl Credential {
    /// Create a credential with escalation off and not marked default.
    pub fn new(
        name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            username: username.into(),
            password: password.into(),
            escalate: false,
            default: false,
        }
    }

    /// Mark this credential as the factory-default identity.
    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }

    /// Escalate privilege right after logging in with this credential.
    pub fn with_escalation(mut self) -> Self {
        self.escalate = true;
        self
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &"<hidden>")
            .field("escalate", &self.escalate)
            .field("default", &self.default)
            .finish()
    }
}

/// Immutable description of the device being provisioned.
///
/// Missing fields in a JSON profile fall back to the built-in lab
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    /// Console server address.
    pub console_host: String,
    /// Console server TCP port for this device's line.
    pub console_port: u16,
    /// HTTP host serving installer images.
    pub http_host: String,
    /// Image directory on the HTTP host (e.g. `sonic/images/Deb9/`).
    pub image: String,
    /// Build version directory (e.g. `v280`).
    pub build_version: String,
    /// Management interface name on the device.
    pub mgmt_interface: String,
    /// Management IP address.
    pub mgmt_ip: String,
    /// Management netmask.
    pub mgmt_mask: String,
    /// Default gateway for the management network.
    pub gateway_ip: String,
    /// Base of the configuration artifacts, `host/path/` without scheme.
    pub artifact_base: String,
    /// Device default-configuration file name under `artifact_base`.
    pub device_config: String,
    /// Ordered credential profiles. The cursor only moves forward.
    pub credentials: Vec<Credential>,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            console_host: "192.168.54.97".to_string(),
            console_port: 4000,
            http_host: "192.168.59.161".to_string(),
            image: "sonic/images/Deb9/".to_string(),
            build_version: "v280".to_string(),
            mgmt_interface: "ma1".to_string(),
            mgmt_ip: "192.168.2.56".to_string(),
            mgmt_mask: "255.255.255.0".to_string(),
            gateway_ip: "192.168.2.254".to_string(),
            artifact_base: "192.168.59.161/sonic/conf/".to_string(),
            device_config: "cfg_default.json".to_string(),
            credentials: vec![
                Credential::new("provisioned", "admin", "YourPaSsWoRd"),
                Credential::new("factory", "admin", "YourPaSsWoRd").as_default(),
            ],
        }
    }
}

impl DeviceProfile {
    /// Load a profile from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting profile fails [`validate`](Self::validate).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ProvisionError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let profile: Self = serde_json::from_str(&text)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Check the invariants the driver relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::InvalidProfile`] when there are no
    /// credentials, more than one default credential, or the artifact
    /// base is empty.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        if self.credentials.is_empty() {
            return Err(ProvisionError::InvalidProfile(
                "at least one credential is required".to_string(),
            ));
        }
        if self.credentials.iter().filter(|c| c.default).count() > 1 {
            return Err(ProvisionError::InvalidProfile(
                "only one credential may be marked default".to_string(),
            ));
        }
        if self.artifact_base.trim().is_empty() {
            return Err(ProvisionError::InvalidProfile(
                "artifact base must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// URL of the installer image handed to the install tool.
    ///
    /// ```
    /// use sonic_loader::DeviceProfile;
    ///
    /// let device = DeviceProfile::default();
    /// assert_eq!(
    ///     device.install_url("sonic-broadcom.bin"),
    ///     "http://192.168.59.161/sonic/images/Deb9/v280/sonic-broadcom.bin"
    /// );
    /// ```
    pub fn install_url(&self, artifact: &str) -> String {
        let path = [
            self.image.as_str(),
            self.build_version.as_str(),
            artifact,
        ]
        .iter()
        .map(|part| part.trim_matches('/'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/");

        format!("http://{}/{}", self.http_host.trim_end_matches('/'), path)
    }

    /// URL of a configuration artifact under `artifact_base`.
    pub fn artifact_url(&self, file: &str) -> String {
        format!(
            "http://{}/{}",
            self.artifact_base.trim_end_matches('/'),
            file.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_credentials_order() {
        let device = DeviceProfile::default();
        assert_eq!(device.credentials.len(), 2);
        assert!(!device.credentials[0].default);
        assert!(device.credentials[1].default);
        assert!(device.validate().is_ok());
    }

    #[test]
    fn test_install_url_collapses_slashes() {
        let device = DeviceProfile {
            http_host: "10.0.0.1/".to_string(),
            image: "/images/".to_string(),
            build_version: "v300/".to_string(),
            ..DeviceProfile::default()
        };

        assert_eq!(
            device.install_url("sonic-broadcom.bin"),
            "http://10.0.0.1/images/v300/sonic-broadcom.bin"
        );
    }

    #[test]
    fn test_artifact_url() {
        let device = DeviceProfile::default();
        assert_eq!(
            device.artifact_url("cfg_default.json"),
            "http://192.168.59.161/sonic/conf/cfg_default.json"
        );
    }

    #[test]
    fn test_validate_rejects_empty_credentials() {
        let device = DeviceProfile {
            credentials: vec![],
            ..DeviceProfile::default()
        };
        assert!(matches!(
            device.validate(),
            Err(ProvisionError::InvalidProfile(_))
        ));
    }

    #[test]
    fn test_validate_rejects_two_defaults() {
        let device = DeviceProfile {
            credentials: vec![
                Credential::new("a", "admin", "x").as_default(),
                Credential::new("b", "admin", "y").as_default(),
            ],
            ..DeviceProfile::default()
        };
        assert!(device.validate().is_err());
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let device: DeviceProfile =
            serde_json::from_str(r#"{"console_port": 1056, "build_version": "v281"}"#).unwrap();

        assert_eq!(device.console_port, 1056);
        assert_eq!(device.build_version, "v281");
        assert_eq!(device.mgmt_interface, "ma1");
        assert_eq!(device.credentials.len(), 2);
    }

    #[test]
    fn test_credential_debug_hides_password() {
        let credential = Credential::new("factory", "admin", "s3cret");
        let rendered = format!("{:?}", credential);
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<hidden>"));
    }
}
