//! Philips PM 6669 Universal Frequency Counter Driver
//!
//! Reference: Philips PM 6669 Operating Manual, GPIB programming section
//!
//! Protocol Overview:
//! - Format: bare ASCII tokens (NOT SCPI), e.g. `FNC?`, `MTIME 0.2`, `X`
//! - Transport: GPIB, usually through a Prologix GPIB-USB controller
//! - Measurement lines: `<FRE|PER|WID|RPM|PWI>... <value>`, e.g. `FRE   A 1000.5`
//! - Service request: MSR mask selects which conditions assert SRQ
//!
//! Device quirks:
//! - When a query is sent while a measurement is waiting, the reply carries
//!   the measurement line as well. Those lines are moved to a backlog and the
//!   remaining lines form the reply.
//! - Replies may be padded with NUL bytes.
//! - A data byte sometimes arrives split from its status bytes, leaving an
//!   empty read; the driver simply reads again.
//!
//! # Triggered measurement
//!
//! ```rust,ignore
//! counter.set_srq_mask(MsrFlag::MEASUREMENT_READY).await?;
//! counter.set_freerun(false).await?;
//! counter.trigger().await?;
//! let hz = counter.read_measurement().await?;   // waits for SRQ
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use bitflags::bitflags;
use daq_core::capabilities::{Readable, Settable};
use daq_core::driver::{Capability, DeviceComponents, DeviceMetadata, DriverFactory};
use daq_core::error::DaqError;
use daq_core::property::{
    named_field, reply_fields, CommandChannel, CommandProperty, PropertyValue, Validator,
};
use daq_core::status::{decode, decode_register, flags_to_json};
use daq_core::transport::{connect_transport, Transport, TransportSettings};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

// =============================================================================
// Status Flags
// =============================================================================

bitflags! {
    /// Serial-poll status byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SpollStatus: u8 {
        /// A measurement result is ready
        const MEASUREMENT_READY = 1;
        /// Armed and waiting for a trigger
        const READY_FOR_TRIGGERING = 2;
        /// Measuring start enabled
        const MEASURING_START_ENABLE = 4;
        /// Measuring stop enabled
        const MEASURING_STOP_ENABLE = 8;
        /// Gate currently open
        const GATE_OPEN = 16;
        /// Programming error or hardware fault
        const ERROR = 32;
        /// Device is requesting service
        const SRQ = 64;
        /// Not used
        const UNUSED2 = 128;
    }
}

bitflags! {
    /// Service-request mask, written with `MSR`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MsrFlag: u8 {
        /// SRQ when a measurement is ready
        const MEASUREMENT_READY = 1;
        /// SRQ when ready for triggering
        const READY_FOR_TRIGGERING = 2;
        /// SRQ on measuring start enable
        const MEASURING_START_ENABLE = 4;
        /// SRQ on measuring stop enable
        const MEASURING_STOP_ENABLE = 8;
        /// SRQ on programming error
        const PROGRAMMING_ERROR = 16;
        /// SRQ on hardware fault
        const HARDWARE_FAULT = 32;
        /// SRQ on measurement time-out
        const TIME_OUT = 64;
        /// Not used
        const UNUSED = 128;
    }
}

// =============================================================================
// Measuring Function
// =============================================================================

/// Measuring function selected with the bare function mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Function {
    /// Frequency, input A
    FrequencyA,
    /// Frequency, input B
    FrequencyB,
    /// Revolutions per minute, input A
    RpmA,
    /// Period, input A
    PeriodA,
    /// Pulse width, input A
    WidthA,
    /// Pulse width (positive), input A
    PulseWidthA,
    /// Totalize (manual gate), input A
    TotalizeA,
}

impl Function {
    /// Every measuring function.
    pub const ALL: [Function; 7] = [
        Function::FrequencyA,
        Function::FrequencyB,
        Function::RpmA,
        Function::PeriodA,
        Function::WidthA,
        Function::PulseWidthA,
        Function::TotalizeA,
    ];

    /// 8-character wire mnemonic: label left-justified, channel in the last column.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Function::FrequencyA => "FREQ   A",
            Function::FrequencyB => "FREQ   B",
            Function::RpmA => "RPM    A",
            Function::PeriodA => "PER    A",
            Function::WidthA => "WIDTH  A",
            Function::PulseWidthA => "PWIDTH A",
            Function::TotalizeA => "TOTM   A",
        }
    }

    /// Parse a mnemonic, ignoring how the label and channel are spaced.
    pub fn from_mnemonic(text: &str) -> Option<Self> {
        let wanted: Vec<&str> = text.split_whitespace().collect();
        Self::ALL
            .into_iter()
            .find(|function| function.mnemonic().split_whitespace().eq(wanted.iter().copied()))
    }

    /// Unit of a measurement taken with this function.
    pub fn unit(self) -> &'static str {
        match self {
            Function::FrequencyA | Function::FrequencyB => "Hz",
            Function::RpmA => "rpm",
            Function::PeriodA | Function::WidthA | Function::PulseWidthA => "s",
            Function::TotalizeA => "counts",
        }
    }
}

impl PropertyValue for Function {
    fn to_command_arg(&self) -> String {
        self.mnemonic().to_string()
    }

    fn parse_reply(text: &str) -> Option<Self> {
        Self::from_mnemonic(text)
    }

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        let text = value.as_str()?;
        Self::from_mnemonic(text)
            .or_else(|| serde_json::from_value(serde_json::Value::String(text.to_string())).ok())
    }

    fn to_json(&self) -> serde_json::Value {
        let words: Vec<&str> = self.mnemonic().split_whitespace().collect();
        serde_json::Value::String(words.join(" "))
    }
}

// =============================================================================
// Reply Grammar
// =============================================================================

/// Three-letter prefixes of measurement lines.
pub const KEYWORDS: [&str; 5] = ["FRE", "PER", "WID", "RPM", "PWI"];

/// Numeric value of a measurement line, `None` for anything else.
///
/// A measurement line starts with one of [`KEYWORDS`] and ends in a number.
/// Function mnemonics share the prefixes (`FREQ   A`) but carry no number.
pub fn measurement_value(line: &str) -> Option<f64> {
    let line = line.trim();
    let prefix = line.get(..3)?;
    if !KEYWORDS.contains(&prefix) {
        return None;
    }
    line.split_whitespace().skip(1).last()?.parse().ok()
}

fn last_token(reply: &str) -> Option<&str> {
    reply.split_whitespace().last()
}

fn mtime_field(reply: &str) -> Option<&str> {
    named_field(reply, "MTIME")
}

fn frun_field(reply: &str) -> Option<&str> {
    named_field(reply, "FRUN")
}

fn tout_field(reply: &str) -> Option<&str> {
    named_field(reply, "TOUT")
}

/// `BUS?` replies `MSR <mask>,<other settings>`; the mask is the last token of the first field.
fn msr_field(reply: &str) -> Option<&str> {
    reply_fields(reply).next()?.split_whitespace().last()
}

/// Commands whose reply spans several lines, with the field that ends it.
const MULTILINE_REPLIES: &[(&str, &str)] = &[("MEAC?", "TOUT")];

fn reply_complete(command: &str, reply: &str) -> bool {
    MULTILINE_REPLIES
        .iter()
        .find(|(multiline, _)| *multiline == command)
        .map_or(true, |(_, last_field)| named_field(reply, last_field).is_some())
}

// =============================================================================
// Command Properties
// =============================================================================

/// Instrument identification.
pub const ID: CommandProperty<String> = CommandProperty {
    name: "id",
    description: "Instrument identification",
    get_command: Some("ID?"),
    ..CommandProperty::EMPTY
};

/// Measuring function.
pub const FUNCTION: CommandProperty<Function> = CommandProperty {
    name: "function",
    description: "Measuring function",
    get_command: Some("FNC?"),
    set_command: Some("{}"),
    validator: Validator::DiscreteSet(&Function::ALL),
    ..CommandProperty::EMPTY
};

/// Open the gate and return the current count.
pub const GATE_OPEN: CommandProperty<f64> = CommandProperty {
    name: "gate_open",
    description: "Open the gate and return the current count",
    get_command: Some("GATE OPEN"),
    extract: Some(last_token),
    ..CommandProperty::EMPTY
};

/// Close the gate and return the current count.
pub const GATE_CLOSE: CommandProperty<f64> = CommandProperty {
    name: "gate_close",
    description: "Close the gate and return the current count",
    get_command: Some("GATE CLOSE"),
    extract: Some(last_token),
    ..CommandProperty::EMPTY
};

/// Measurement time in seconds.
pub const MEASUREMENT_TIME: CommandProperty<f64> = CommandProperty {
    name: "measurement_time",
    description: "Measurement time (s)",
    get_command: Some("MEAC?"),
    set_command: Some("MTIME {}"),
    validator: Validator::Range { min: 0.0, max: 10.0 },
    extract: Some(mtime_field),
    ..CommandProperty::EMPTY
};

/// Free-run mode.
pub const FREERUN: CommandProperty<bool> = CommandProperty {
    name: "freerun",
    description: "Free-run mode",
    get_command: Some("MEAC?"),
    set_command: Some("FRUN {}"),
    validator: Validator::DiscreteSet(&[true, false]),
    map: Some(&[(true, "ON"), (false, "OFF")]),
    extract: Some(frun_field),
};

/// Measurement timeout in seconds; only meaningful when free-run is off.
pub const TIMEOUT: CommandProperty<f64> = CommandProperty {
    name: "timeout",
    description: "Measurement timeout (s), triggered mode only",
    get_command: Some("MEAC?"),
    set_command: Some("TOUT {}"),
    validator: Validator::Range { min: 0.0, max: 25.5 },
    extract: Some(tout_field),
    ..CommandProperty::EMPTY
};

/// Service-request mask.
pub const SRQ_MASK: CommandProperty<i64> = CommandProperty {
    name: "srq_mask",
    description: "Service-request mask",
    get_command: Some("BUS?"),
    set_command: Some("MSR {}"),
    validator: Validator::Range { min: 0, max: 255 },
    extract: Some(msr_field),
    ..CommandProperty::EMPTY
};

/// Raw measurement-control settings.
pub const MEAC: CommandProperty<String> = CommandProperty {
    name: "meac",
    description: "Measurement-control settings, raw",
    get_command: Some("MEAC?"),
    ..CommandProperty::EMPTY
};

const VALUE_NAMES: &[&str] = &[
    "id",
    "function",
    "gate_open",
    "gate_close",
    "measurement_time",
    "freerun",
    "timeout",
    "srq_mask",
    "meac",
];

/// Decoded `MEAC?` reply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeasurementSettings {
    /// Measurement time (s)
    pub measurement_time: f64,
    /// Free-run mode
    pub freerun: bool,
    /// Measurement timeout (s)
    pub timeout: f64,
}

impl MeasurementSettings {
    /// Decode every field of one `MEAC?` reply.
    pub fn parse(reply: &str) -> Result<Self, DaqError> {
        Ok(Self {
            measurement_time: MEASUREMENT_TIME.decode(reply)?,
            freerun: FREERUN.decode(reply)?,
            timeout: TIMEOUT.decode(reply)?,
        })
    }
}

// =============================================================================
// Pm6669Factory - DriverFactory implementation
// =============================================================================

fn default_backlog_capacity() -> usize {
    64
}

/// Configuration for the PM 6669 driver
#[derive(Debug, Clone, Deserialize)]
pub struct Pm6669Config {
    /// Bus settings; set `gpib_address` to go through a Prologix controller
    #[serde(flatten)]
    pub transport: TransportSettings,
    /// Maximum number of buffered stray measurement lines (default: 64)
    #[serde(default = "default_backlog_capacity")]
    pub backlog_capacity: usize,
    /// Delay between SRQ polls in milliseconds (default: 0)
    #[serde(default)]
    pub srq_poll_delay_ms: u64,
    /// Service-request mask written at start-up
    #[serde(default)]
    pub srq_mask: Option<u8>,
    /// Measuring function selected at start-up
    #[serde(default)]
    pub function: Option<Function>,
}

/// Factory for creating PM 6669 driver instances.
pub struct Pm6669Factory;

static PM6669_CAPABILITIES: &[Capability] = &[Capability::Readable, Capability::Settable];

impl DriverFactory for Pm6669Factory {
    fn driver_type(&self) -> &'static str {
        "philips_pm6669"
    }

    fn name(&self) -> &'static str {
        "Philips PM 6669 Frequency Counter"
    }

    fn capabilities(&self) -> &'static [Capability] {
        PM6669_CAPABILITIES
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: Pm6669Config = config.clone().try_into()?;
        cfg.transport.validate()?;
        if cfg.backlog_capacity == 0 {
            return Err(DaqError::Configuration("'backlog_capacity' must be at least 1".into()).into());
        }
        Ok(())
    }

    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>> {
        Box::pin(async move {
            let cfg: Pm6669Config = config.try_into().context("Invalid PM 6669 config")?;
            if cfg.transport.gpib_address.is_none() {
                tracing::warn!(
                    port = %cfg.transport.port,
                    "PM 6669 without a GPIB controller: triggered reads need SRQ and will fail"
                );
            }

            let transport = connect_transport(&cfg.transport, "PM 6669").await?;
            let driver = Arc::new(
                Pm6669Driver::new(transport)
                    .with_backlog_capacity(cfg.backlog_capacity)
                    .with_srq_poll_delay(Duration::from_millis(cfg.srq_poll_delay_ms)),
            );

            driver.initialize().await?;
            if let Some(mask) = cfg.srq_mask {
                driver.set_srq_mask(MsrFlag::from_bits_retain(mask)).await?;
            }
            let unit = match cfg.function {
                Some(function) => {
                    driver.set_function(function).await?;
                    function.unit()
                }
                None => driver.function().await?.unit(),
            };
            let identity = driver.identify().await.context("PM 6669: no response to ID?")?;
            tracing::info!(identity = %identity, "PM 6669 connected");

            Ok(DeviceComponents::new()
                .with_readable(driver.clone())
                .with_settable(driver)
                .with_metadata(DeviceMetadata {
                    identity: Some(identity),
                    measurement_units: Some(unit.to_string()),
                }))
        })
    }
}

// =============================================================================
// Pm6669Driver
// =============================================================================

/// Driver for the Philips PM 6669 frequency counter
///
/// Implements Readable (one triggered measurement) and Settable.
pub struct Pm6669Driver {
    transport: Arc<dyn Transport>,
    /// Stray measurement lines, oldest first
    backlog: Mutex<VecDeque<String>>,
    backlog_capacity: usize,
    /// Last free-run setting written
    freerun: AtomicBool,
    srq_poll_delay: Duration,
}

impl Pm6669Driver {
    /// Create a driver on an open transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            backlog: Mutex::new(VecDeque::new()),
            backlog_capacity: default_backlog_capacity(),
            freerun: AtomicBool::new(false),
            srq_poll_delay: Duration::ZERO,
        }
    }

    /// Bound the backlog (at least one line).
    pub fn with_backlog_capacity(mut self, capacity: usize) -> Self {
        self.backlog_capacity = capacity.max(1);
        self
    }

    /// Delay between SRQ polls while waiting for a measurement.
    pub fn with_srq_poll_delay(mut self, delay: Duration) -> Self {
        self.srq_poll_delay = delay;
        self
    }

    /// Start-up sequence: `EOI ON`, then triggered mode (`FRUN OFF`).
    pub async fn initialize(&self) -> Result<()> {
        self.send("EOI ON")
            .await
            .context("PM 6669: failed to enable EOI")?;
        self.set_freerun(false)
            .await
            .context("PM 6669: failed to leave free-run mode")?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Read loop
    // -------------------------------------------------------------------------

    /// One read transaction: NUL padding stripped, split into lines.
    ///
    /// Empty reads are retried; a silent device ends the loop through the
    /// transport's timeout.
    async fn read_lines(&self) -> Result<Vec<String>> {
        loop {
            let raw = self.transport.read().await?;
            let lines: Vec<String> = raw
                .trim_matches('\0')
                .lines()
                .map(|line| line.trim_matches(|c: char| c == '\0' || c.is_whitespace()))
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();
            if !lines.is_empty() {
                return Ok(lines);
            }
            tracing::debug!(raw = ?raw, "PM 6669: empty read, reading again");
        }
    }

    fn push_backlog(&self, line: String) {
        let mut backlog = self.backlog.lock();
        if backlog.len() >= self.backlog_capacity {
            if let Some(evicted) = backlog.pop_front() {
                tracing::warn!(evicted = %evicted, "PM 6669: backlog full, evicted oldest measurement");
            }
        }
        tracing::debug!(line = %line, "PM 6669: measurement moved to backlog");
        backlog.push_back(line);
    }

    /// Number of stray measurement lines held.
    pub fn backlog_len(&self) -> usize {
        self.backlog.lock().len()
    }

    /// Take every stray measurement line, oldest first.
    pub fn drain_backlog(&self) -> Vec<String> {
        self.backlog.lock().drain(..).collect()
    }

    /// Wait for SRQ, then read the result of the last measurement line.
    ///
    /// Earlier measurement lines of the same transaction go to the backlog.
    /// Returns `None` when no measurement line arrived.
    ///
    /// Requires the SRQ mask to include [`MsrFlag::MEASUREMENT_READY`].
    pub async fn read_measurement(&self) -> Result<Option<f64>> {
        self.transport
            .wait_for_srq(self.srq_poll_delay)
            .await
            .context("PM 6669: waiting for measurement SRQ")?;

        let mut last: Option<(String, f64)> = None;
        for line in self.read_lines().await? {
            match measurement_value(&line) {
                Some(value) => {
                    if let Some((previous, _)) = last.replace((line, value)) {
                        self.push_backlog(previous);
                    }
                }
                None => tracing::debug!(line = %line, "PM 6669: dropping non-measurement line"),
            }
        }
        Ok(last.map(|(_, value)| value))
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Serial-poll the counter.
    ///
    /// One controller round trip, outside the quirk read loop. Empty,
    /// NUL-only or unparsable replies decode to the empty set.
    pub async fn spoll(&self) -> Result<SpollStatus> {
        let reply = self.transport.query("++spoll").await?;
        let text = reply.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        if text.is_empty() {
            tracing::debug!("PM 6669: empty serial poll reply");
            return Ok(SpollStatus::empty());
        }
        match text.parse::<u8>() {
            Ok(raw) => Ok(decode(raw)),
            Err(_) => {
                tracing::warn!(reply = %reply, "PM 6669: unparsable serial poll reply");
                Ok(SpollStatus::empty())
            }
        }
    }

    /// Serial-poll and fail with [`DaqError::HardwareFault`] if ERROR is set.
    pub async fn check_status(&self) -> Result<SpollStatus> {
        let status = self.spoll().await?;
        if status.contains(SpollStatus::ERROR) {
            tracing::warn!(status = status.bits(), "PM 6669 reports an error");
            return Err(DaqError::HardwareFault(format!(
                "PM 6669 serial poll {:#04x} has ERROR set",
                status.bits()
            ))
            .into());
        }
        Ok(status)
    }

    /// Software trigger (`X`); meaningful when free-run is off.
    pub async fn trigger(&self) -> Result<()> {
        self.send("X").await
    }

    /// Reset to default settings (`DCL`).
    pub async fn reset_to_defaults(&self) -> Result<()> {
        self.send("DCL").await
    }

    /// Instrument identification string.
    pub async fn identify(&self) -> Result<String> {
        self.get(&ID).await
    }

    /// Current measuring function.
    pub async fn function(&self) -> Result<Function> {
        self.get(&FUNCTION).await
    }

    /// Select the measuring function.
    pub async fn set_function(&self, function: Function) -> Result<()> {
        self.set(&FUNCTION, function).await
    }

    /// Open the gate and return the count.
    pub async fn gate_open(&self) -> Result<f64> {
        self.get(&GATE_OPEN).await
    }

    /// Close the gate and return the count.
    pub async fn gate_close(&self) -> Result<f64> {
        self.get(&GATE_CLOSE).await
    }

    /// Measurement time, free-run and timeout from one `MEAC?` round trip.
    pub async fn measurement_settings(&self) -> Result<MeasurementSettings> {
        let reply = self.meac().await?;
        let settings = MeasurementSettings::parse(&reply)?;
        self.freerun.store(settings.freerun, Ordering::SeqCst);
        Ok(settings)
    }

    /// Measurement time (s).
    pub async fn measurement_time(&self) -> Result<f64> {
        self.get(&MEASUREMENT_TIME).await
    }

    /// Set the measurement time, 0-10 s.
    pub async fn set_measurement_time(&self, seconds: f64) -> Result<()> {
        self.set(&MEASUREMENT_TIME, seconds).await
    }

    /// Free-run mode as reported by the counter.
    pub async fn freerun(&self) -> Result<bool> {
        let on = self.get(&FREERUN).await?;
        self.freerun.store(on, Ordering::SeqCst);
        Ok(on)
    }

    /// Switch free-run mode.
    pub async fn set_freerun(&self, on: bool) -> Result<()> {
        self.set(&FREERUN, on).await?;
        self.freerun.store(on, Ordering::SeqCst);
        Ok(())
    }

    /// Last free-run setting written or read, without bus traffic.
    pub fn freerun_cached(&self) -> bool {
        self.freerun.load(Ordering::SeqCst)
    }

    /// Measurement timeout (s).
    pub async fn timeout(&self) -> Result<f64> {
        self.get(&TIMEOUT).await
    }

    /// Set the measurement timeout, 0-25.5 s.
    pub async fn set_timeout(&self, seconds: f64) -> Result<()> {
        self.set(&TIMEOUT, seconds).await
    }

    /// Service-request mask.
    pub async fn srq_mask(&self) -> Result<MsrFlag> {
        let raw = self.get(&SRQ_MASK).await?;
        Ok(decode_register(SRQ_MASK.name, raw)?)
    }

    /// Set the service-request mask.
    pub async fn set_srq_mask(&self, mask: MsrFlag) -> Result<()> {
        self.set(&SRQ_MASK, i64::from(mask.bits())).await
    }

    /// Raw `MEAC?` reply.
    pub async fn meac(&self) -> Result<String> {
        self.get(&MEAC).await
    }
}

#[async_trait]
impl CommandChannel for Pm6669Driver {
    async fn send(&self, command: &str) -> Result<()> {
        self.transport.write(command).await
    }

    /// Round trip with measurement lines filtered into the backlog.
    ///
    /// Reads until a non-measurement line arrives (and, for multi-line
    /// replies, until the closing field). No lock is held across the write
    /// and the reads.
    async fn ask(&self, command: &str) -> Result<String> {
        self.transport.write(command).await?;

        let mut reply: Vec<String> = Vec::new();
        loop {
            for line in self.read_lines().await? {
                if measurement_value(&line).is_some() {
                    self.push_backlog(line);
                } else {
                    reply.push(line);
                }
            }
            if !reply.is_empty() {
                let joined = reply.join("\n");
                if reply_complete(command, &joined) {
                    return Ok(joined);
                }
            }
        }
    }
}

#[async_trait]
impl Readable for Pm6669Driver {
    #[instrument(skip(self), err)]
    async fn read(&self) -> Result<f64> {
        if !self.freerun_cached() {
            self.trigger().await?;
        }
        self.read_measurement().await?.ok_or_else(|| {
            DaqError::Instrument("PM 6669 answered the SRQ without a measurement".into()).into()
        })
    }
}

#[async_trait]
impl Settable for Pm6669Driver {
    #[instrument(skip(self, value), fields(value = %value), err)]
    async fn set_value(&self, name: &str, value: serde_json::Value) -> Result<()> {
        match name {
            "function" => self.set_function(FUNCTION.value_from_json(&value)?).await,
            "measurement_time" => {
                self.set_measurement_time(MEASUREMENT_TIME.value_from_json(&value)?)
                    .await
            }
            "freerun" => self.set_freerun(FREERUN.value_from_json(&value)?).await,
            "timeout" => self.set_timeout(TIMEOUT.value_from_json(&value)?).await,
            "srq_mask" => {
                let raw = SRQ_MASK.value_from_json(&value)?;
                self.set(&SRQ_MASK, raw).await
            }
            name if VALUE_NAMES.contains(&name) => Err(DaqError::ReadOnly(name.to_string()).into()),
            _ => Err(DaqError::UnknownProperty(name.to_string()).into()),
        }
    }

    #[instrument(skip(self), err)]
    async fn get_value(&self, name: &str) -> Result<serde_json::Value> {
        match name {
            "id" => Ok(self.identify().await?.to_json()),
            "function" => Ok(self.function().await?.to_json()),
            "gate_open" => Ok(self.gate_open().await?.to_json()),
            "gate_close" => Ok(self.gate_close().await?.to_json()),
            "measurement_time" => Ok(self.measurement_time().await?.to_json()),
            "freerun" => Ok(self.freerun().await?.to_json()),
            "timeout" => Ok(self.timeout().await?.to_json()),
            "srq_mask" => Ok(flags_to_json(&self.srq_mask().await?)),
            "meac" => Ok(self.meac().await?.to_json()),
            _ => Err(DaqError::UnknownProperty(name.to_string()).into()),
        }
    }

    fn value_names(&self) -> Vec<&'static str> {
        VALUE_NAMES.to_vec()
    }
}
