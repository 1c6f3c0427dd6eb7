//! Console provisioning tool: install and configure SONiC on one device.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use sonic_loader::{CancellationToken, DeviceProfile, Driver, DriverConfig, OsProfile, Session};

/// Exit status for failures before a run could reach an outcome.
const EXIT_SETUP_ERROR: u8 = 3;

#[derive(Parser)]
#[command(name = "sonic-loader")]
#[command(author, version, about = "Install SONiC on a switch through its console", long_about = None)]
struct Args {
    /// Device profile (JSON); flags below override its fields
    #[arg(long)]
    profile: Option<PathBuf>,

    /// OS profile (JSON); defaults to the built-in SONiC/ONIE profile
    #[arg(long)]
    os_profile: Option<PathBuf>,

    /// Console server address
    #[arg(long)]
    console_ip: Option<String>,

    /// Console server port
    #[arg(long)]
    console_port: Option<u16>,

    /// Image HTTP server
    #[arg(long)]
    http_ip: Option<String>,

    /// Image directory on the HTTP server
    #[arg(long)]
    image: Option<String>,

    /// Build version directory
    #[arg(long)]
    build_ver: Option<String>,

    /// Management interface
    #[arg(long)]
    mgmt_interface: Option<String>,

    /// Management IP address
    #[arg(long)]
    mgmt_ip: Option<String>,

    /// Management netmask
    #[arg(long)]
    mgmt_mask: Option<String>,

    /// Management default gateway
    #[arg(long)]
    gw_ip: Option<String>,

    /// Configuration artifact base (host/path/)
    #[arg(long)]
    fileweb: Option<String>,

    /// Device configuration file under the artifact base
    #[arg(long)]
    dut_cfg: Option<String>,

    /// Password of the provisioned credential
    #[arg(long, env = "SONIC_LOADER_PASSWORD")]
    password: Option<String>,

    /// Password of the factory-default credential
    #[arg(long, env = "SONIC_LOADER_FACTORY_PASSWORD")]
    factory_password: Option<String>,

    /// Console client command instead of `telnet <console-ip> <console-port>`
    #[arg(long)]
    console_cmd: Option<String>,

    /// Seconds to wait for each prompt
    #[arg(long)]
    timeout: Option<u64>,

    /// Seconds to wait for the boot menu after a reboot
    #[arg(long)]
    reboot_timeout: Option<u64>,

    /// Expectation-table rounds before giving up
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Don't copy the console transcript to stdout
    #[arg(long)]
    no_echo: bool,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn device(&self) -> Result<DeviceProfile> {
        let mut device = match &self.profile {
            Some(path) => DeviceProfile::from_json_file(path)
                .with_context(|| format!("loading device profile {}", path.display()))?,
            None => DeviceProfile::default(),
        };

        let overrides = [
            (&self.console_ip, &mut device.console_host),
            (&self.http_ip, &mut device.http_host),
            (&self.image, &mut device.image),
            (&self.build_ver, &mut device.build_version),
            (&self.mgmt_interface, &mut device.mgmt_interface),
            (&self.mgmt_ip, &mut device.mgmt_ip),
            (&self.mgmt_mask, &mut device.mgmt_mask),
            (&self.gw_ip, &mut device.gateway_ip),
            (&self.fileweb, &mut device.artifact_base),
            (&self.dut_cfg, &mut device.device_config),
        ];
        for (value, field) in overrides {
            if let Some(value) = value {
                *field = value.clone();
            }
        }
        if let Some(port) = self.console_port {
            device.console_port = port;
        }

        if let Some(password) = &self.password {
            if let Some(credential) = device.credentials.iter_mut().find(|c| !c.default) {
                credential.password = password.clone();
            }
        }
        if let Some(password) = &self.factory_password {
            if let Some(credential) = device.credentials.iter_mut().find(|c| c.default) {
                credential.password = password.clone();
            }
        }

        device.validate().context("invalid device profile")?;
        Ok(device)
    }

    fn os(&self) -> Result<OsProfile> {
        match &self.os_profile {
            Some(path) => OsProfile::from_json_file(path)
                .with_context(|| format!("loading OS profile {}", path.display())),
            None => Ok(OsProfile::sonic()),
        }
    }

    fn config(&self) -> DriverConfig {
        let mut config = DriverConfig::default();
        if let Some(secs) = self.timeout {
            config = config.with_wait_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.reboot_timeout {
            config = config.with_reboot_timeout(Duration::from_secs(secs));
        }
        if let Some(max) = self.max_iterations {
            config = config.with_max_iterations(max);
        }
        config
    }

    fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_filter()))
        .init();

    match provision(&args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_SETUP_ERROR)
        }
    }
}

async fn provision(args: &Args) -> Result<u8> {
    let device = args.device()?;
    let os = args.os()?;

    let token = CancellationToken::new();
    let driver = Driver::new(device.clone(), os, args.config())
        .context("preparing driver")?
        .with_cancellation(token.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            token.cancel();
        }
    });

    let builder = Session::builder()
        .no_timeout()
        .strip_ansi(true)
        .echo(!args.no_echo);
    let mut session = match &args.console_cmd {
        Some(command) => builder.spawn(command),
        None => builder.telnet(&device.console_host, device.console_port),
    }
    .context("opening console")?;

    let result = driver.run(&mut session).await;

    // Free the console server line whatever happened
    if let Err(e) = session.terminate() {
        warn!("closing console: {}", e);
    }

    let report = result.context("provisioning")?;
    info!("{} ({} iterations)", report.outcome, report.iterations);
    println!("{}", report.outcome);

    Ok(report.outcome.exit_code())
}
