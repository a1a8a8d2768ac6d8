//! RX868 relay - Main Entry Point
//!
//! Samples an RX868 receiver on GPIO and republishes decoded sensor readings
//! to MQTT until SIGINT or SIGTERM.

use anyhow::Context;
use clap::Parser;
use rx868_relay::{
    backend::{decoder_from_settings, MqttBus, PinInterface, SysfsPins},
    config::{resolve_config_path, LoggingSettings, PinBackendKind, RelayConfig},
    pipeline::{install_signal_handler, Relay, RelayOptions},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Relay RX868 weather sensor readings to an MQTT broker
#[derive(Parser, Debug)]
#[command(name = "rx868relay", version, about)]
struct Cli {
    /// Configuration file (default: ./relay.toml, then the user config directory)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Validate the configuration, print it and exit
    #[arg(long)]
    check_config: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = resolve_config_path(cli.config.as_deref())?;
    let config = RelayConfig::load(&path)?;

    if cli.check_config {
        println!("{} is valid\n{}", path.display(), config);
        return Ok(());
    }

    let _log_guard = init_logging(&config.logging)?;

    tracing::info!("Starting rx868relay {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Using configuration {}", path.display());
    tracing::debug!("Configuration:\n{}", config);

    let pins = build_pins(&config)?;
    let decoder = decoder_from_settings(config.receiver.decoder.as_ref())?;
    let bus = MqttBus::from_config(&config)?;

    let relay = Relay::new(pins, decoder, bus, RelayOptions::from(&config));
    install_signal_handler(relay.run_flag())?;

    let report = relay.run().context("Relay failed to start")?;
    tracing::info!("Shut down cleanly: {}", report);
    Ok(())
}

/// Console logging plus an optional daily-rolling log file
fn init_logging(settings: &LoggingSettings) -> anyhow::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match &settings.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)
                .with_context(|| format!("Failed to create log directory {}", directory.display()))?;
            let appender = tracing_appender::rolling::daily(directory, &settings.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rx868_relay=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

fn build_pins(config: &RelayConfig) -> anyhow::Result<Arc<dyn PinInterface>> {
    match config.receiver.backend {
        PinBackendKind::Rpi => rpi_pins(config),
        PinBackendKind::Sysfs => {
            tracing::info!(
                "Using sysfs GPIO (base {}) for data pin {} and enable pin {}",
                config.receiver.gpio_base,
                config.receiver.data_pin,
                config.receiver.enable_pin
            );
            Ok(Arc::new(SysfsPins::new(config.receiver.gpio_base)))
        }
        PinBackendKind::Simulated => simulated_pins(config),
    }
}

#[cfg(target_os = "linux")]
fn rpi_pins(config: &RelayConfig) -> anyhow::Result<Arc<dyn PinInterface>> {
    tracing::info!(
        "Using Raspberry Pi GPIO for data pin {} ({:?} pull) and enable pin {}",
        config.receiver.data_pin,
        config.receiver.pull,
        config.receiver.enable_pin
    );
    Ok(Arc::new(rx868_relay::backend::RppalPins::new()?))
}

#[cfg(not(target_os = "linux"))]
fn rpi_pins(_config: &RelayConfig) -> anyhow::Result<Arc<dyn PinInterface>> {
    anyhow::bail!("receiver.backend = \"rpi\" is only available on Linux")
}

#[cfg(feature = "mock-pins")]
fn simulated_pins(config: &RelayConfig) -> anyhow::Result<Arc<dyn PinInterface>> {
    use rx868_relay::backend::MockPins;

    let simulation = &config.receiver.simulation;
    let pulses = simulation
        .pulses
        .iter()
        .map(|&[high, low]| (high, low))
        .collect();
    tracing::warn!("Using a simulated receiver; no radio data will be received");
    Ok(Arc::new(
        MockPins::new(config.receiver.data_pin)
            .with_pulses(pulses)
            .with_realtime(simulation.realtime),
    ))
}

#[cfg(not(feature = "mock-pins"))]
fn simulated_pins(_config: &RelayConfig) -> anyhow::Result<Arc<dyn PinInterface>> {
    anyhow::bail!("receiver.backend = \"simulated\" requires a build with --features mock-pins")
}
