//! CLI entry point for pjctl.
//!
//! # Usage
//!
//! Run every enabled projector until Ctrl+C:
//! ```bash
//! pjctl --config config/pjctl.toml run
//! ```
//!
//! One-shot control of a single device:
//! ```bash
//! pjctl exec proj-1 power-on
//! pjctl exec proj-1 input 3
//! pjctl exec proj-1 mute toggle
//! pjctl exec proj-1 status
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pjctl::config::{AppConfig, LogFormat, DEFAULT_CONFIG_PATH};
use pjctl::daemon::{self, Daemon, Device, DeviceAction, MuteState};
use pjctl_core::capabilities::SwitchOutcome;
use pjctl::logging::{self, TracingConfig};
use pjctl_driver_christie::ProjectorModel;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "pjctl")]
#[command(about = "Christie projector control over RS-232 or TCP", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the configured log format
    #[arg(long, global = true, value_enum)]
    log_format: Option<CliLogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliLogFormat {
    Pretty,
    Compact,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(value: CliLogFormat) -> Self {
        match value {
            CliLogFormat::Pretty => LogFormat::Pretty,
            CliLogFormat::Compact => LogFormat::Compact,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to every enabled device and keep polling until Ctrl+C
    Run,

    /// Send one command to a device and print its status afterwards
    Exec {
        /// Device key
        device: String,

        #[command(subcommand)]
        action: Action,

        /// How long to wait for feedback before printing status
        #[arg(long, default_value = "1500")]
        wait_ms: u64,

        /// How long to wait for the device to answer before acting
        #[arg(long, default_value = "5000")]
        ready_timeout_ms: u64,

        /// How long to wait for warm-up when an input switch is deferred
        #[arg(long, default_value = "120")]
        switch_timeout_secs: u64,
    },

    /// Check the configuration and every device table
    Validate,

    /// List the input ports of a projector type
    Inputs {
        /// Driver type name
        #[arg(long = "type", default_value = "ChristieProjector")]
        type_name: String,
    },
}

#[derive(Subcommand)]
enum Action {
    /// Power on (ignored while warming or cooling)
    PowerOn,
    /// Power off (ignored while warming or cooling)
    PowerOff,
    /// Toggle power based on last feedback
    PowerToggle,
    /// Select an input by 1-based ordinal
    Input {
        /// Input ordinal as listed by `pjctl inputs`
        ordinal: usize,
    },
    /// Video mute (shutter)
    Mute {
        #[arg(value_enum)]
        state: MuteState,
    },
    /// Only query and print status
    Status,
}

impl From<Action> for DeviceAction {
    fn from(action: Action) -> Self {
        match action {
            Action::PowerOn => DeviceAction::PowerOn,
            Action::PowerOff => DeviceAction::PowerOff,
            Action::PowerToggle => DeviceAction::PowerToggle,
            Action::Input { ordinal } => DeviceAction::SelectInput(ordinal),
            Action::Mute { state } => DeviceAction::VideoMute(state),
            Action::Status => DeviceAction::Status,
        }
    }
}

/// Timing knobs for `exec`.
struct ExecTiming {
    ready: Duration,
    switch: Duration,
    settle: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    let mut tracing_config =
        TracingConfig::from_logging(&config.logging).map_err(anyhow::Error::msg)?;
    if let Some(format) = cli.log_format {
        tracing_config = tracing_config.with_format(format.into());
    }
    logging::init(tracing_config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Exec {
            device,
            action,
            wait_ms,
            ready_timeout_ms,
            switch_timeout_secs,
        } => {
            let timing = ExecTiming {
                ready: Duration::from_millis(ready_timeout_ms),
                switch: Duration::from_secs(switch_timeout_secs),
                settle: Duration::from_millis(wait_ms),
            };
            exec(config, &device, action.into(), timing).await
        }
        Commands::Validate => validate(&config),
        Commands::Inputs { type_name } => {
            list_inputs(&type_name);
            Ok(())
        }
    }
}

async fn run(config: AppConfig) -> Result<()> {
    config.validate()?;
    let registry = daemon::registry();
    let daemon = Daemon::build(&registry, &config).await?;
    if daemon.devices().is_empty() {
        warn!("No enabled devices configured");
    }

    info!(
        name = %config.application.name,
        devices = daemon.devices().len(),
        "pjctl starting"
    );
    daemon.start_all().await?;

    let interval_secs = config.application.status_interval_secs;
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    ticker.tick().await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Failed to listen for Ctrl+C: {}", e);
                }
                break;
            }
            _ = ticker.tick(), if interval_secs > 0 => {
                for snapshot in daemon.snapshots() {
                    info!(status = %snapshot, "Device status");
                }
            }
        }
    }

    info!("Shutting down");
    daemon.shutdown_all().await;
    Ok(())
}

async fn exec(config: AppConfig, key: &str, action: DeviceAction, timing: ExecTiming) -> Result<()> {
    config.validate()?;
    let definition = config
        .device(key)
        .with_context(|| format!("No device with key '{}' in config", key))?;
    let device = Device::build(&daemon::registry(), definition).await?;
    device.start().await?;

    let result = apply(&device, action, &timing).await;
    tokio::time::sleep(timing.settle).await;

    println!("{}", serde_json::to_string_pretty(&device.snapshot())?);
    device.shutdown().await;
    result
}

async fn apply(device: &Device, action: DeviceAction, timing: &ExecTiming) -> Result<()> {
    device.wait_online(timing.ready).await?;

    if device.execute(action).await? == Some(SwitchOutcome::Deferred) {
        info!(
            device = %device.key,
            timeout = ?timing.switch,
            "Projector is off; input switch deferred until warm-up completes"
        );
        device.wait_pending_switch(timing.switch).await?;
    }
    Ok(())
}

fn validate(config: &AppConfig) -> Result<()> {
    config.validate()?;
    let errors = daemon::validate_devices(&daemon::registry(), config);
    for e in &errors {
        eprintln!("{:#}", e);
    }
    if !errors.is_empty() {
        anyhow::bail!("{} of {} devices invalid", errors.len(), config.devices.len());
    }
    println!("OK: {} devices", config.devices.len());
    Ok(())
}

fn list_inputs(type_name: &str) {
    let dialect = ProjectorModel::from_type_name(type_name).dialect();
    println!("{}", dialect.name);
    for (i, port) in dialect.inputs.iter().enumerate() {
        println!(
            "{:>3}  {:<16} {:<12} code {:<3} {}",
            i + 1,
            port.key,
            port.connection_kind.to_string(),
            port.feedback_match_code,
            port.display_name
        );
    }
}
