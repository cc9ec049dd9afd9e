//! instrument-ctl: command-line control of bench instruments
//!
//! Instruments are declared in a TOML file (see `config/instruments.toml`)
//! and reached through the registered driver factories.
//!
//! # Usage
//!
//! ```bash
//! instrument-ctl list
//! instrument-ctl validate
//! instrument-ctl read counter --count 5
//! instrument-ctl get supply voltage
//! instrument-ctl set supply voltage 12.5
//! instrument-ctl set counter function "PER A"
//! ```

mod config;
mod logging;
mod registry;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::AppConfig;
use daq_core::driver::DeviceComponents;
use daq_core::DaqError;
use registry::DriverRegistry;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "instrument-ctl")]
#[command(about = "Control bench instruments over serial and GPIB", long_about = None)]
struct Cli {
    /// Instrument configuration file (TOML format)
    #[arg(long, short, global = true, default_value = "config/instruments.toml")]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Override the configured log format
    #[arg(long, global = true, value_enum)]
    log_format: Option<logging::OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured instruments and available drivers
    List,

    /// Check the configuration without touching hardware
    Validate,

    /// Take readings from an instrument
    Read {
        /// Instrument ID
        id: String,
        /// Number of readings
        #[arg(long, default_value_t = 1)]
        count: u32,
    },

    /// Query a named property
    Get {
        /// Instrument ID
        id: String,
        /// Property name (e.g. voltage, function, srq_mask)
        property: String,
    },

    /// Write a named property
    Set {
        /// Instrument ID
        id: String,
        /// Property name
        property: String,
        /// New value; parsed as JSON, falling back to a plain string
        value: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:?}", e);
            exit_code(&e)
        }
    }
}

/// 2 when the request was rejected before any I/O, 1 otherwise.
fn exit_code(error: &anyhow::Error) -> ExitCode {
    let rejected = error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<DaqError>())
        .any(DaqError::is_input_error);
    if rejected {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let mut tracing_config = logging::TracingConfig::from_app_config(&config)?;
    if let Some(level) = &cli.log_level {
        tracing_config = tracing_config
            .with_level(logging::parse_log_level(level).map_err(anyhow::Error::msg)?);
    }
    if let Some(format) = cli.log_format {
        tracing_config = tracing_config.with_format(format);
    }
    logging::init(tracing_config)?;
    tracing::debug!(application = %config.application.name, "instrument-ctl starting");

    let registry = DriverRegistry::with_builtin_drivers();

    match cli.command {
        Commands::List => list(&config, &registry),
        Commands::Validate => validate(&config, &registry),
        Commands::Read { id, count } => read(&config, &registry, &id, count).await,
        Commands::Get { id, property } => {
            let device = connect(&config, &registry, &id).await?;
            let settable = device
                .settable
                .with_context(|| format!("instrument '{}' has no settable properties", id))?;
            let value = settable.get_value(&property).await?;
            println!("{}", value);
            Ok(())
        }
        Commands::Set {
            id,
            property,
            value,
        } => {
            let device = connect(&config, &registry, &id).await?;
            let settable = device
                .settable
                .with_context(|| format!("instrument '{}' has no settable properties", id))?;
            settable.set_value(&property, parse_value(&value)).await?;
            tracing::info!(id = %id, property = %property, value = %value, "Property written");
            Ok(())
        }
    }
}

fn list(config: &AppConfig, registry: &DriverRegistry) -> Result<()> {
    println!("Instruments:");
    for instrument in &config.instruments {
        let state = if !registry.has_factory(&instrument.r#type) {
            "unknown driver"
        } else if instrument.enabled {
            "enabled"
        } else {
            "disabled"
        };
        println!("  {:<16} {:<16} {}", instrument.id, instrument.r#type, state);
    }

    println!("Drivers:");
    for info in registry.factories() {
        let capabilities: Vec<&str> = info.capabilities.iter().map(|c| c.name()).collect();
        println!(
            "  {:<16} {} [{}]",
            info.driver_type,
            info.name,
            capabilities.join(", ")
        );
    }
    Ok(())
}

fn validate(config: &AppConfig, registry: &DriverRegistry) -> Result<()> {
    config.validate()?;

    let mut failures = 0;
    for instrument in config.enabled_instruments() {
        match registry.validate(instrument) {
            Ok(()) => println!("{}: ok", instrument.id),
            Err(e) => {
                failures += 1;
                println!("{}: {:#}", instrument.id, e);
            }
        }
    }

    if failures > 0 {
        bail!("{} instrument(s) failed validation", failures);
    }
    Ok(())
}

async fn connect(
    config: &AppConfig,
    registry: &DriverRegistry,
    id: &str,
) -> Result<DeviceComponents> {
    config.validate()?;
    let instrument = config
        .instrument(id)
        .with_context(|| format!("no instrument '{}' in the configuration", id))?;
    if !instrument.enabled {
        bail!("instrument '{}' is disabled", id);
    }
    registry.build(instrument).await
}

async fn read(config: &AppConfig, registry: &DriverRegistry, id: &str, count: u32) -> Result<()> {
    let device = connect(config, registry, id).await?;
    let readable = device
        .readable
        .with_context(|| format!("instrument '{}' cannot take readings", id))?;
    let units = device.metadata.measurement_units.unwrap_or_default();

    for _ in 0..count {
        let value = readable.read().await?;
        println!("{} {}", value, units);
    }
    Ok(())
}

/// JSON if it parses (`12.5`, `true`, `241`), otherwise the raw string.
fn parse_value(text: &str) -> serde_json::Value {
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
}
