//! TTi PL330PD Power Supply Driver
//!
//! Reference: TTi PL-P Series Instruction Manual (remote operation)
//!
//! Protocol Overview:
//! - Format: SCPI-like ASCII commands, IEEE 488.2 common commands
//! - Transport: RS-232 (9600 8N1) or GPIB
//! - Terminator: LF (\n)
//! - Set points: `V1 <volts>`, `I1 <amps>`, queried as `V1?` / `I1?`
//!   (reply `V1 <volts>`)
//! - Readback: `V1O?` / `I1O?` (reply `<value>V` / `<value>A`)
//! - Output: `OP1 0|1`
//! - Status: `*ESR?`, `*STB?`, `LSR?` (limit events, read clears)
//!
//! Only output 1 is driven.
//!
//! # Usage
//!
//! ```rust,ignore
//! use daq_driver_tti::Pl330pdFactory;
//!
//! registry.register_factory(Box::new(Pl330pdFactory));
//!
//! let config = toml::toml! {
//!     port = "/dev/ttyUSB0"
//! };
//! let components = factory.build(config.into()).await?;
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use bitflags::bitflags;
use daq_core::capabilities::{Readable, Settable};
use daq_core::driver::{Capability, DeviceComponents, DeviceMetadata, DriverFactory};
use daq_core::error::DaqError;
use daq_core::property::{CommandChannel, CommandProperty, PropertyValue, Validator};
use daq_core::status::{decode_register, flags_to_json};
use daq_core::transport::{connect_transport, Transport, TransportSettings};
use futures::future::BoxFuture;
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;

// =============================================================================
// Status Registers
// =============================================================================

bitflags! {
    /// Limit Event Status Register / Limit Event Status Enable Register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LimitEventStatus: u8 {
        /// Output 1 entered current limit
        const OUTPUT1_CURRENT_LIMIT = 1;
        /// Output 2 entered current limit
        const OUTPUT2_CURRENT_LIMIT = 2;
        /// Output 3 entered current limit
        const OUTPUT3_CURRENT_LIMIT = 4;
        /// Output 3 over-voltage trip
        const OUTPUT3_VOLTAGE_TRIP = 8;
        /// Output 1 entered voltage limit
        const OUTPUT1_VOLTAGE_LIMIT = 16;
        /// Output 2 entered voltage limit
        const OUTPUT2_VOLTAGE_LIMIT = 32;
        /// Output 3 entered voltage limit
        const OUTPUT3_VOLTAGE_LIMIT = 64;
    }
}

bitflags! {
    /// Standard Event Status Register / Standard Event Status Enable Register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StandardEventStatus: u8 {
        /// Operation complete (`*OPC`)
        const OPERATION_COMPLETE = 1;
        /// Query error
        const QUERY_ERROR = 4;
        /// Operation timed out
        const OPERATION_TIMEOUT_ERROR = 8;
        /// Execution error
        const EXECUTION_ERROR = 16;
        /// Command error
        const COMMAND_ERROR = 32;
        /// Power on since last read
        const POWER_ON = 128;
    }
}

bitflags! {
    /// Status Byte Register / Service Request Enable Register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusByte: u8 {
        /// Summary of the limit event register
        const LIMIT_STATUS = 1;
        /// A reply is waiting in the output queue
        const RESPONSE_READY = 16;
        /// Summary of the standard event register
        const EVENT_STATUS = 32;
        /// Requesting service / master summary
        const RQS_MSS = 64;
        /// Hardware fault
        const FAULT_BIT = 128;
    }
}

// =============================================================================
// Command Properties
// =============================================================================

fn set_voltage_field(reply: &str) -> Option<&str> {
    reply.strip_prefix("V1")
}

fn set_current_field(reply: &str) -> Option<&str> {
    reply.strip_prefix("I1")
}

fn volts_field(reply: &str) -> Option<&str> {
    reply.strip_suffix('V')
}

fn amps_field(reply: &str) -> Option<&str> {
    reply.strip_suffix('A')
}

/// Instrument identification.
pub const ID: CommandProperty<String> = CommandProperty {
    name: "id",
    description: "Instrument identification",
    get_command: Some("*IDN?"),
    ..CommandProperty::EMPTY
};

/// Output 1 set voltage in volts.
pub const VOLTAGE: CommandProperty<f64> = CommandProperty {
    name: "voltage",
    description: "Output 1 set voltage (V)",
    get_command: Some("V1?"),
    set_command: Some("V1 {}"),
    validator: Validator::Range { min: 0.0, max: 32.0 },
    extract: Some(set_voltage_field),
    ..CommandProperty::EMPTY
};

/// Output 1 current limit in amps.
pub const CURRENT: CommandProperty<f64> = CommandProperty {
    name: "current",
    description: "Output 1 current limit (A)",
    get_command: Some("I1?"),
    set_command: Some("I1 {}"),
    extract: Some(set_current_field),
    ..CommandProperty::EMPTY
};

/// Output 1 on/off.
pub const OUTPUT_ENABLE: CommandProperty<u8> = CommandProperty {
    name: "output_enabled",
    description: "Output 1 on (1) or off (0)",
    set_command: Some("OP1 {}"),
    validator: Validator::DiscreteSet(&[0, 1]),
    ..CommandProperty::EMPTY
};

/// Output 1 measured voltage in volts.
pub const MEASURED_VOLTAGE: CommandProperty<f64> = CommandProperty {
    name: "measured_voltage",
    description: "Output 1 measured voltage (V)",
    get_command: Some("V1O?"),
    extract: Some(volts_field),
    ..CommandProperty::EMPTY
};

/// Output 1 measured current in amps.
pub const MEASURED_CURRENT: CommandProperty<f64> = CommandProperty {
    name: "measured_current",
    description: "Output 1 measured current (A)",
    get_command: Some("I1O?"),
    extract: Some(amps_field),
    ..CommandProperty::EMPTY
};

/// Standard Event Status Enable Register.
pub const EVENT_STATUS_ENABLE: CommandProperty<i64> = CommandProperty {
    name: "standard_event_status_enable",
    description: "Standard Event Status Enable Register",
    get_command: Some("*ESE?"),
    set_command: Some("*ESE {}"),
    validator: Validator::Range { min: 0, max: 255 },
    ..CommandProperty::EMPTY
};

/// Standard Event Status Register (read clears).
pub const EVENT_STATUS: CommandProperty<i64> = CommandProperty {
    name: "standard_event_status",
    description: "Standard Event Status Register",
    get_command: Some("*ESR?"),
    ..CommandProperty::EMPTY
};

/// Service Request Enable Register.
pub const SERVICE_REQUEST_ENABLE: CommandProperty<i64> = CommandProperty {
    name: "service_request_enable",
    description: "Service Request Enable Register",
    get_command: Some("*SRE?"),
    set_command: Some("*SRE {}"),
    validator: Validator::Range { min: 0, max: 255 },
    ..CommandProperty::EMPTY
};

/// Status Byte Register.
pub const STATUS_BYTE: CommandProperty<i64> = CommandProperty {
    name: "status_byte",
    description: "Status Byte Register",
    get_command: Some("*STB?"),
    ..CommandProperty::EMPTY
};

/// Limit Event Status Register (read clears).
pub const LIMIT_EVENT_STATUS: CommandProperty<i64> = CommandProperty {
    name: "limit_event_status",
    description: "Limit Event Status Register",
    get_command: Some("LSR?"),
    ..CommandProperty::EMPTY
};

/// Limit Event Status Enable Register.
pub const LIMIT_EVENT_ENABLE: CommandProperty<i64> = CommandProperty {
    name: "limit_event_status_enable",
    description: "Limit Event Status Enable Register",
    get_command: Some("LSE?"),
    set_command: Some("LSE {}"),
    validator: Validator::Range { min: 0, max: 255 },
    ..CommandProperty::EMPTY
};

const VALUE_NAMES: &[&str] = &[
    "id",
    "voltage",
    "current",
    "output_enabled",
    "measured_voltage",
    "measured_current",
    "standard_event_status_enable",
    "standard_event_status",
    "service_request_enable",
    "status_byte",
    "limit_event_status",
    "limit_event_status_enable",
];

// =============================================================================
// Pl330pdFactory - DriverFactory implementation
// =============================================================================

fn default_reset_on_connect() -> bool {
    true
}

/// Configuration for the PL330PD driver
#[derive(Debug, Clone, Deserialize)]
pub struct Pl330pdConfig {
    /// Bus settings
    #[serde(flatten)]
    pub transport: TransportSettings,
    /// Send `*RST` after connecting (default: true)
    #[serde(default = "default_reset_on_connect")]
    pub reset_on_connect: bool,
}

/// Factory for creating PL330PD driver instances.
pub struct Pl330pdFactory;

static PL330PD_CAPABILITIES: &[Capability] = &[Capability::Readable, Capability::Settable];

impl DriverFactory for Pl330pdFactory {
    fn driver_type(&self) -> &'static str {
        "tti_pl330pd"
    }

    fn name(&self) -> &'static str {
        "TTi PL330PD Power Supply"
    }

    fn capabilities(&self) -> &'static [Capability] {
        PL330PD_CAPABILITIES
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: Pl330pdConfig = config.clone().try_into()?;
        cfg.transport.validate()?;
        Ok(())
    }

    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>> {
        Box::pin(async move {
            let cfg: Pl330pdConfig = config.try_into().context("Invalid PL330PD config")?;
            let transport = connect_transport(&cfg.transport, "PL330PD").await?;
            let driver = Arc::new(Pl330pdDriver::new(transport));
            let identity = driver.initialize(cfg.reset_on_connect).await?;

            Ok(DeviceComponents::new()
                .with_readable(driver.clone())
                .with_settable(driver)
                .with_metadata(DeviceMetadata {
                    identity: Some(identity),
                    measurement_units: Some("V".to_string()),
                }))
        })
    }
}

// =============================================================================
// Pl330pdDriver
// =============================================================================

/// Driver for the TTi PL330PD programmable power supply
///
/// Implements Readable (measured output voltage) and Settable.
pub struct Pl330pdDriver {
    transport: Arc<dyn Transport>,
}

impl Pl330pdDriver {
    /// Create a driver on an open transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Start-up sequence: optional `*RST`, then identify.
    pub async fn initialize(&self, reset: bool) -> Result<String> {
        if reset {
            self.reset()
                .await
                .context("PL330PD: reset during initialization failed")?;
        }
        let identity = self
            .identify()
            .await
            .context("PL330PD: no response to *IDN?")?;
        tracing::info!(identity = %identity, "PL330PD connected");
        Ok(identity)
    }

    /// Instrument identification string.
    pub async fn identify(&self) -> Result<String> {
        self.get(&ID).await
    }

    /// Output 1 set voltage (V).
    pub async fn voltage(&self) -> Result<f64> {
        self.get(&VOLTAGE).await
    }

    /// Set output 1 voltage, 0-32 V.
    pub async fn set_voltage(&self, volts: f64) -> Result<()> {
        self.set(&VOLTAGE, volts).await
    }

    /// Output 1 current limit (A).
    pub async fn current(&self) -> Result<f64> {
        self.get(&CURRENT).await
    }

    /// Set output 1 current limit.
    pub async fn set_current(&self, amps: f64) -> Result<()> {
        self.set(&CURRENT, amps).await
    }

    /// Switch output 1 on or off.
    pub async fn set_output_enabled(&self, enabled: bool) -> Result<()> {
        self.set(&OUTPUT_ENABLE, u8::from(enabled)).await
    }

    /// Output 1 measured voltage (V).
    pub async fn measured_voltage(&self) -> Result<f64> {
        self.get(&MEASURED_VOLTAGE).await
    }

    /// Output 1 measured current (A).
    pub async fn measured_current(&self) -> Result<f64> {
        self.get(&MEASURED_CURRENT).await
    }

    /// `*RST`
    pub async fn reset(&self) -> Result<()> {
        self.send("*RST").await
    }

    /// `*CLS`
    pub async fn clear_status(&self) -> Result<()> {
        self.send("*CLS").await
    }

    /// Standard Event Status Enable Register.
    pub async fn event_status_enable(&self) -> Result<StandardEventStatus> {
        let raw = self.get(&EVENT_STATUS_ENABLE).await?;
        Ok(decode_register(EVENT_STATUS_ENABLE.name, raw)?)
    }

    /// Set the Standard Event Status Enable Register.
    pub async fn set_event_status_enable(&self, mask: StandardEventStatus) -> Result<()> {
        self.set(&EVENT_STATUS_ENABLE, i64::from(mask.bits())).await
    }

    /// Standard Event Status Register.
    pub async fn event_status(&self) -> Result<StandardEventStatus> {
        let raw = self.get(&EVENT_STATUS).await?;
        Ok(decode_register(EVENT_STATUS.name, raw)?)
    }

    /// Service Request Enable Register.
    pub async fn service_request_enable(&self) -> Result<StatusByte> {
        let raw = self.get(&SERVICE_REQUEST_ENABLE).await?;
        Ok(decode_register(SERVICE_REQUEST_ENABLE.name, raw)?)
    }

    /// Set the Service Request Enable Register.
    pub async fn set_service_request_enable(&self, mask: StatusByte) -> Result<()> {
        self.set(&SERVICE_REQUEST_ENABLE, i64::from(mask.bits())).await
    }

    /// Status Byte Register.
    pub async fn status_byte(&self) -> Result<StatusByte> {
        let raw = self.get(&STATUS_BYTE).await?;
        Ok(decode_register(STATUS_BYTE.name, raw)?)
    }

    /// Limit Event Status Register. Reading clears it.
    pub async fn limit_event_status(&self) -> Result<LimitEventStatus> {
        let raw = self.get(&LIMIT_EVENT_STATUS).await?;
        Ok(decode_register(LIMIT_EVENT_STATUS.name, raw)?)
    }

    /// Limit Event Status Enable Register.
    pub async fn limit_event_enable(&self) -> Result<LimitEventStatus> {
        let raw = self.get(&LIMIT_EVENT_ENABLE).await?;
        Ok(decode_register(LIMIT_EVENT_ENABLE.name, raw)?)
    }

    /// Set the Limit Event Status Enable Register.
    pub async fn set_limit_event_enable(&self, mask: LimitEventStatus) -> Result<()> {
        self.set(&LIMIT_EVENT_ENABLE, i64::from(mask.bits())).await
    }

    /// Read the status byte and fail with [`DaqError::HardwareFault`] if
    /// the fault bit is set.
    pub async fn check_fault(&self) -> Result<StatusByte> {
        let status = self.status_byte().await?;
        if status.contains(StatusByte::FAULT_BIT) {
            tracing::warn!(status = status.bits(), "PL330PD reports a hardware fault");
            return Err(DaqError::HardwareFault(format!(
                "PL330PD status byte {:#04x} has FAULT_BIT set",
                status.bits()
            ))
            .into());
        }
        Ok(status)
    }
}

#[async_trait]
impl CommandChannel for Pl330pdDriver {
    async fn send(&self, command: &str) -> Result<()> {
        self.transport.write(command).await
    }

    async fn ask(&self, command: &str) -> Result<String> {
        self.transport.query(command).await
    }
}

#[async_trait]
impl Readable for Pl330pdDriver {
    #[instrument(skip(self), err)]
    async fn read(&self) -> Result<f64> {
        self.measured_voltage().await
    }
}

#[async_trait]
impl Settable for Pl330pdDriver {
    #[instrument(skip(self, value), fields(value = %value), err)]
    async fn set_value(&self, name: &str, value: serde_json::Value) -> Result<()> {
        match name {
            "voltage" => self.set(&VOLTAGE, VOLTAGE.value_from_json(&value)?).await,
            "current" => self.set(&CURRENT, CURRENT.value_from_json(&value)?).await,
            "output_enabled" => {
                let enabled = match value.as_bool() {
                    Some(enabled) => u8::from(enabled),
                    None => OUTPUT_ENABLE.value_from_json(&value)?,
                };
                self.set(&OUTPUT_ENABLE, enabled).await
            }
            "standard_event_status_enable" => {
                let raw = EVENT_STATUS_ENABLE.value_from_json(&value)?;
                self.set(&EVENT_STATUS_ENABLE, raw).await
            }
            "service_request_enable" => {
                let raw = SERVICE_REQUEST_ENABLE.value_from_json(&value)?;
                self.set(&SERVICE_REQUEST_ENABLE, raw).await
            }
            "limit_event_status_enable" => {
                let raw = LIMIT_EVENT_ENABLE.value_from_json(&value)?;
                self.set(&LIMIT_EVENT_ENABLE, raw).await
            }
            name if VALUE_NAMES.contains(&name) => Err(DaqError::ReadOnly(name.to_string()).into()),
            _ => Err(DaqError::UnknownProperty(name.to_string()).into()),
        }
    }

    #[instrument(skip(self), err)]
    async fn get_value(&self, name: &str) -> Result<serde_json::Value> {
        match name {
            "id" => Ok(self.identify().await?.to_json()),
            "voltage" => Ok(self.voltage().await?.to_json()),
            "current" => Ok(self.current().await?.to_json()),
            "measured_voltage" => Ok(self.measured_voltage().await?.to_json()),
            "measured_current" => Ok(self.measured_current().await?.to_json()),
            "standard_event_status_enable" => Ok(flags_to_json(&self.event_status_enable().await?)),
            "standard_event_status" => Ok(flags_to_json(&self.event_status().await?)),
            "service_request_enable" => Ok(flags_to_json(&self.service_request_enable().await?)),
            "status_byte" => Ok(flags_to_json(&self.status_byte().await?)),
            "limit_event_status" => Ok(flags_to_json(&self.limit_event_status().await?)),
            "limit_event_status_enable" => Ok(flags_to_json(&self.limit_event_enable().await?)),
            "output_enabled" => Err(DaqError::WriteOnly(name.to_string()).into()),
            _ => Err(DaqError::UnknownProperty(name.to_string()).into()),
        }
    }

    fn value_names(&self) -> Vec<&'static str> {
        VALUE_NAMES.to_vec()
    }
}
