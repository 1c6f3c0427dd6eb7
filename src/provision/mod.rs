//! Unattended installation of a network OS over a device console.
//!
//! The [`Driver`] repeatedly waits on the [`ExpectationTable`], asks the
//! [`Dispatcher`] what the matched [`Tag`] means in the current
//! [`ProvisioningState`], and executes the resulting [`Action`]s until an
//! [`Outcome`] is reached. Everything OS-specific comes from an
//! [`OsProfile`]; everything device-specific from a [`DeviceProfile`].

mod config;
mod device;
mod dispatch;
mod driver;
mod error;
mod os_profile;
#[cfg(test)]
mod scripted;
mod state;
mod table;

pub use config::{DriverConfig, Pacing};
pub use device::{Credential, DeviceProfile};
pub use dispatch::{Action, Dispatcher};
pub use driver::{Driver, Report};
pub use error::ProvisionError;
pub use os_profile::{render, Commands, Keys, OsProfile, PostInstallStep, PromptSet};
pub use state::{
    AuthVerdict, Completion, CredentialCursor, FailureReason, MenuEntry, Outcome,
    ProvisioningState,
};
pub use table::{ExpectationTable, Tag, TaggedSet};
