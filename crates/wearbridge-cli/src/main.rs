/*!
 * wearbridged: runs the bridge service until interrupted.
 *
 * Devices listed in the configuration are registered at start. With
 * `--stdin`, every input line is parsed as a JSON command envelope and
 * dispatched, e.g.
 *
 * ```text
 * {"action":"notification","target":"test","title":"Hi","body":"there"}
 * ```
 */
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use wearbridge_core::config::{Config, ConfigBuilder, SharedConfig};
use wearbridge_core::runtime;
use wearbridge_devices::device::{DeviceFamily, DeviceHandle};
use wearbridge_devices::driver::RadioAdapter;
use wearbridge_devices::drivers::test::TestBench;
use wearbridge_devices::factory::DriverFactory;
use wearbridge_devices::prefs::{MemoryPreferences, SharedPreferences};
use wearbridge_engine::{
    Command, Dispatcher, DispatcherSettings, Envelope, LoggingSubscriptions, ServiceHandle,
};

#[derive(Parser)]
#[command(name = "wearbridged", version, about = "Wearable companion bridge daemon")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = "wearbridge.toml")]
    config: PathBuf,

    /// Log level or filter directive, overrides the configuration
    #[arg(long)]
    log_level: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Read JSON command envelopes from stdin, one per line
    #[arg(long)]
    stdin: bool,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = ConfigBuilder::new()
        .with_config_file(&cli.config)
        .with_environment_prefix("WEARBRIDGE")
        .build()
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    wearbridge_core::init(&config)?;
    wearbridge_devices::init()?;
    wearbridge_engine::init()?;
    info!(transports = ?wearbridge_devices::available_transports(), "Starting wearbridged");
    let rt = runtime::build(&config.runtime, "wearbridge")?;
    rt.block_on(run(SharedConfig::new(config), cli.stdin))
}

async fn run(config: SharedConfig, read_stdin: bool) -> Result<()> {
    let settings = config.get();
    let prefs: SharedPreferences = Arc::new(MemoryPreferences::from_config(settings));
    let radio = Arc::new(RadioAdapter::new(settings.radio.available, settings.radio.enabled));

    let bench = TestBench::new();
    let mut factory = DriverFactory::new(radio, prefs.clone());
    factory.register_named("test", bench.constructor());

    let dispatcher = Dispatcher::new(
        DispatcherSettings::from_config(settings),
        factory,
        prefs,
        Arc::new(LoggingSubscriptions),
    );
    let (service, task) = wearbridge_engine::spawn(dispatcher, settings.runtime.mailbox_capacity)?;
    tokio::spawn(log_notices(service.clone()));

    for device in &settings.devices {
        let family: DeviceFamily = device
            .family
            .parse()
            .with_context(|| format!("device {}", device.address))?;
        let mut handle = DeviceHandle::new(device.address.as_str(), family);
        if let Some(alias) = &device.alias {
            handle = handle.with_alias(alias.as_str());
        }
        service.register_device(handle).await?;
    }
    info!(devices = settings.devices.len(), "Devices registered");

    if settings.general.connect_on_start {
        service
            .post(Envelope::broadcast(Command::Connect { first_time: false }))
            .await?;
    }
    if read_stdin {
        tokio::spawn(read_envelopes(service.clone()));
    }

    runtime::shutdown_signal().await?;
    service.shutdown().await?;
    task.await.context("service task")?;
    Ok(())
}

async fn log_notices(service: ServiceHandle) {
    let mut notices = service.subscribe_notices();
    while let Ok(notice) = notices.recv().await {
        info!(?notice, "Service notice");
    }
}

async fn read_envelopes(service: ServiceHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let envelope = match Envelope::from_json(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Ignoring malformed envelope: {}", e);
                continue;
            }
        };
        match service.dispatch(envelope).await {
            Ok(outcome) => debug!(?outcome, "Dispatched"),
            Err(e) => {
                warn!("Service is gone: {}", e);
                break;
            }
        }
    }
    debug!("Stdin closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["wearbridged"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("wearbridge.toml"));
        assert!(!cli.stdin);
        assert!(!cli.print_config);
    }

    #[test]
    fn test_log_level_overrides_config() {
        let cli = Cli::try_parse_from([
            "wearbridged",
            "--config",
            "/nonexistent/wearbridge.toml",
            "--log-level",
            "wearbridge_engine=debug",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.logging.level, "wearbridge_engine=debug");
        assert_eq!(config.cache.capacity, 10);
    }
}
