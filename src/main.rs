//! CLI entry point for the TC-08 relay
//!
//! Serve the instrument to one remote controller at a time:
//! ```bash
//! tc08-relay serve --bind 0.0.0.0:8001
//! ```
//!
//! Check that the instrument answers, without a network peer:
//! ```bash
//! tc08-relay check
//! ```
//!
//! Both commands accept `--mock` to run against a simulated instrument.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tc08_relay::config::{DriverBackend, RelayConfig, DEFAULT_CONFIG_PATH};
use tc08_relay::device::{DeviceController, CJC_CHANNEL};
use tc08_relay::driver::{MockDriver, Tc08Driver};
use tc08_relay::logging;
use tc08_relay::protocol::encode_snapshot;
use tc08_relay::server::{DriverFactory, RelayServer};
use tracing::info;

#[derive(Parser)]
#[command(name = "tc08-relay")]
#[command(about = "WebSocket command relay for the Pico USB TC-08", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept remote controllers and relay their commands to the instrument
    Serve {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Listen address, overriding the configuration
        #[arg(long)]
        bind: Option<String>,

        /// Use the simulated instrument
        #[arg(long)]
        mock: bool,
    },

    /// Open the instrument, take one reading of every channel and close it
    Check {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Use the simulated instrument
        #[arg(long)]
        mock: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, bind, mock } => {
            let mut config = load_config(&config, mock)?;
            if let Some(bind) = bind {
                config.server.bind_address = bind;
            }
            serve(config).await
        }
        Commands::Check { config, mock } => check(load_config(&config, mock)?),
    }
}

fn load_config(path: &Path, mock: bool) -> Result<RelayConfig> {
    let mut config = RelayConfig::load_from(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    if mock {
        config.instrument.backend = DriverBackend::Mock;
    }
    config.validate().map_err(|e| anyhow!(e))?;
    logging::init_from_config(&config).map_err(|e| anyhow!(e))?;
    Ok(config)
}

async fn serve(config: RelayConfig) -> Result<()> {
    let factory = driver_factory(&config)?;
    let server = RelayServer::bind(
        &config.server.bind_address,
        config.instrument.units,
        factory,
    )
    .await?;

    info!(
        backend = ?config.instrument.backend,
        "Relay ready, press Ctrl-C to stop"
    );
    server.run().await?;
    Ok(())
}

fn check(config: RelayConfig) -> Result<()> {
    let factory = driver_factory(&config)?;
    let mut controller = DeviceController::new(factory(), config.instrument.units);

    controller.open().context("failed to open instrument")?;
    println!("Minimum sampling interval: {} ms", controller.minimum_interval_ms());

    let snapshot = controller.measure_all().context("failed to read channels")?;
    println!("Units: {}", controller.units());
    if let Some(cold_junction) = snapshot.get(CJC_CHANNEL) {
        println!("Cold junction: {cold_junction}");
    }
    println!("{}", encode_snapshot(&snapshot)?);

    controller.close().context("failed to close instrument")?;
    Ok(())
}

fn driver_factory(config: &RelayConfig) -> Result<DriverFactory> {
    match config.instrument.backend {
        DriverBackend::Mock => {
            let readings = config.mock_readings().unwrap_or_default();
            Ok(Arc::new(move || -> Box<dyn Tc08Driver> {
                Box::new(MockDriver::new().with_readings(readings))
            }))
        }
        DriverBackend::Hardware => hardware_factory(),
    }
}

#[cfg(feature = "hardware")]
fn hardware_factory() -> Result<DriverFactory> {
    use tc08_relay::driver::Usbtc08Driver;
    Ok(Arc::new(|| -> Box<dyn Tc08Driver> { Box::new(Usbtc08Driver) }))
}

#[cfg(not(feature = "hardware"))]
fn hardware_factory() -> Result<DriverFactory> {
    anyhow::bail!(
        "the hardware backend needs the `hardware` feature; rebuild with \
         `--features hardware` or pass --mock"
    )
}
