//! Instrument Transport Abstraction
//!
//! Drivers talk to their instrument through the [`Transport`] trait: a
//! textual request/response bus with an optional service-request line.
//!
//! ```text
//! driver ──write("V1 12.5")──▶ Transport ──bytes──▶ instrument
//!        ◀──read() "V1 12.50"── Transport ◀──bytes──
//! ```
//!
//! # Implementations
//!
//! - [`SerialTransport`](crate::serial::SerialTransport): line-oriented
//!   RS-232 (or any async byte stream, including `tokio::io::duplex`)
//! - [`PrologixTransport`](crate::prologix::PrologixTransport): GPIB through
//!   a Prologix GPIB-USB controller
//! - [`MockTransport`]: scripted replies for driver tests
//!
//! Use [`connect_transport`] to open the right one from a
//! [`TransportSettings`] block.

use crate::error::{AppResult, DaqError};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

// =============================================================================
// Transport Trait
// =============================================================================

/// Textual request/response bus to a single instrument.
///
/// # Contract
/// - `write()` sends one command; the transport appends its terminator
/// - `read()` returns the next reply with the line ending removed. Replies
///   may still carry NUL padding or embedded line breaks; drivers clean up
///   device quirks themselves
/// - `read_transaction()` returns everything up to an end marker, which may
///   span several lines
/// - `wait_for_srq()` blocks until the instrument asserts SRQ. Buses without
///   a service-request line fail with [`DaqError::Unsupported`]
///
/// Timeouts are the transport's responsibility; drivers never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a command to the instrument.
    async fn write(&self, command: &str) -> Result<()>;

    /// Read the next reply from the instrument.
    async fn read(&self) -> Result<String>;

    /// Read one transaction terminated by `end_marker`, without the marker
    /// and the line ending before it.
    ///
    /// Transports without byte-level framing treat one `read()` as the
    /// whole transaction.
    async fn read_transaction(&self, end_marker: u8) -> Result<String> {
        let reply = self.read().await?;
        Ok(match reply.find(char::from(end_marker)) {
            Some(end) => reply[..end].trim_end_matches(['\r', '\n']).to_string(),
            None => reply,
        })
    }

    /// Write a command and read one reply.
    ///
    /// The two halves are not atomic; callers sharing a transport between
    /// tasks serialise their round trips themselves.
    async fn query(&self, command: &str) -> Result<String> {
        self.write(command).await?;
        self.read().await
    }

    /// Block until the instrument requests service, polling every `delay`.
    async fn wait_for_srq(&self, delay: Duration) -> Result<()>;
}

// =============================================================================
// Transport Settings
// =============================================================================

fn default_baud_rate() -> u32 {
    9600
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_terminator() -> String {
    "\n".to_string()
}

fn default_srq_timeout_ms() -> u64 {
    25_000
}

/// Connection settings shared by every driver config.
///
/// Driver configs embed this with `#[serde(flatten)]`, so a TOML block reads:
///
/// ```toml
/// port = "/dev/ttyUSB0"
/// gpib_address = 10     # present: talk through a Prologix controller
/// timeout_ms = 2000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate of the serial link
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Per-read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Terminator appended to every command
    #[serde(default = "default_terminator")]
    pub terminator: String,
    /// GPIB primary address; selects the Prologix controller transport
    #[serde(default)]
    pub gpib_address: Option<u8>,
    /// Upper bound on a single service-request wait, in milliseconds
    #[serde(default = "default_srq_timeout_ms")]
    pub srq_timeout_ms: u64,
}

impl TransportSettings {
    /// Settings for `port` with every other field at its default.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            terminator: default_terminator(),
            gpib_address: None,
            srq_timeout_ms: default_srq_timeout_ms(),
        }
    }

    /// Read timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Service-request timeout as a [`Duration`].
    pub fn srq_timeout(&self) -> Duration {
        Duration::from_millis(self.srq_timeout_ms)
    }

    /// Check the settings for values no bus would accept.
    pub fn validate(&self) -> AppResult<()> {
        if self.port.trim().is_empty() {
            return Err(DaqError::Configuration("'port' must not be empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(DaqError::Configuration("'baud_rate' must be positive".into()));
        }
        if self.timeout_ms == 0 {
            return Err(DaqError::Configuration("'timeout_ms' must be positive".into()));
        }
        if let Some(address) = self.gpib_address {
            if address > 30 {
                return Err(DaqError::Configuration(format!(
                    "GPIB address {} out of range (0-30)",
                    address
                )));
            }
        }
        Ok(())
    }
}

/// Open the transport described by `settings`.
///
/// A plain [`SerialTransport`](crate::serial::SerialTransport) is returned
/// unless `gpib_address` is set, in which case the port is treated as a
/// Prologix controller and initialised for that address.
#[cfg(feature = "serial")]
pub async fn connect_transport(
    settings: &TransportSettings,
    device_name: &str,
) -> Result<std::sync::Arc<dyn Transport>> {
    use crate::prologix::PrologixTransport;
    use crate::serial::{open_serial_async, SerialTransport};
    use anyhow::Context;

    settings.validate()?;

    let port = open_serial_async(&settings.port, settings.baud_rate, device_name).await?;
    let serial = SerialTransport::new(Box::new(port), &settings.terminator, settings.timeout());
    let stale = serial.clear_input(50).await;
    if stale > 0 {
        tracing::debug!(port = %settings.port, bytes = stale, "{}: discarded stale input", device_name);
    }

    match settings.gpib_address {
        Some(address) => {
            let prologix = PrologixTransport::new(serial, address, settings.srq_timeout());
            prologix
                .init()
                .await
                .with_context(|| format!("{}: Prologix controller setup failed", device_name))?;
            tracing::info!(port = %settings.port, address, "{} connected via Prologix", device_name);
            Ok(std::sync::Arc::new(prologix))
        }
        None => {
            tracing::info!(port = %settings.port, "{} connected via serial", device_name);
            Ok(std::sync::Arc::new(serial))
        }
    }
}

// =============================================================================
// Mock Transport
// =============================================================================

#[derive(Default)]
struct MockState {
    replies: VecDeque<String>,
    writes: Vec<String>,
    srq_waits: usize,
    srq_failure: Option<String>,
}

/// Scripted transport for driver tests.
///
/// Replies are handed out in the order they were queued; reading with an
/// empty queue fails with [`DaqError::Timeout`], the same way a silent
/// instrument would. Every write is recorded.
///
/// # Example
///
/// ```
/// use daq_core::transport::{MockTransport, Transport};
///
/// # tokio_test::block_on(async {
/// let mock = MockTransport::with_replies(["V1 12.50"]);
/// assert_eq!(mock.query("V1?").await.unwrap(), "V1 12.50");
/// assert_eq!(mock.writes(), vec!["V1?"]);
/// # });
/// ```
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    /// Create a mock with no scripted replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock pre-loaded with `replies`.
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::new();
        for reply in replies {
            mock.push_reply(reply);
        }
        mock
    }

    /// Queue one more reply.
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.state.lock().replies.push_back(reply.into());
    }

    /// Every command written so far, oldest first.
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().writes.clone()
    }

    /// Number of replies still queued.
    pub fn pending_replies(&self) -> usize {
        self.state.lock().replies.len()
    }

    /// Number of completed `wait_for_srq` calls.
    pub fn srq_waits(&self) -> usize {
        self.state.lock().srq_waits
    }

    /// Make every subsequent `wait_for_srq` fail with `message`.
    pub fn fail_srq(&self, message: impl Into<String>) {
        self.state.lock().srq_failure = Some(message.into());
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&self, command: &str) -> Result<()> {
        tracing::debug!(command, "mock write");
        self.state.lock().writes.push(command.to_string());
        Ok(())
    }

    async fn read(&self) -> Result<String> {
        let reply = self.state.lock().replies.pop_front();
        match reply {
            Some(reply) => {
                tracing::debug!(reply = ?reply, "mock read");
                Ok(reply)
            }
            None => Err(DaqError::Timeout("no scripted reply left".into()).into()),
        }
    }

    async fn wait_for_srq(&self, _delay: Duration) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(message) = &state.srq_failure {
            return Err(DaqError::Timeout(message.clone()).into());
        }
        state.srq_waits += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults_from_toml() {
        let settings: TransportSettings = toml::from_str(r#"port = "/dev/ttyUSB0""#).unwrap();
        assert_eq!(settings, TransportSettings::new("/dev/ttyUSB0"));
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.timeout(), Duration::from_millis(1000));
        assert_eq!(settings.terminator, "\n");
        assert_eq!(settings.gpib_address, None);
        assert_eq!(settings.srq_timeout(), Duration::from_secs(25));
    }

    #[test]
    fn test_settings_validate() {
        assert!(TransportSettings::new("/dev/ttyS0").validate().is_ok());
        assert!(TransportSettings::new("  ").validate().is_err());

        let mut gpib = TransportSettings::new("/dev/ttyUSB0");
        gpib.gpib_address = Some(30);
        assert!(gpib.validate().is_ok());
        gpib.gpib_address = Some(31);
        assert!(matches!(gpib.validate(), Err(DaqError::Configuration(_))));

        let mut zero_timeout = TransportSettings::new("/dev/ttyS0");
        zero_timeout.timeout_ms = 0;
        assert!(zero_timeout.validate().is_err());
    }

    #[tokio::test]
    async fn test_mock_records_and_replies() {
        let mock = MockTransport::with_replies(["first", "second"]);
        assert_eq!(mock.query("A?").await.unwrap(), "first");
        mock.write("B 1").await.unwrap();
        assert_eq!(mock.read().await.unwrap(), "second");
        assert_eq!(mock.writes(), vec!["A?", "B 1"]);
        assert_eq!(mock.pending_replies(), 0);

        let err = mock.read().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<DaqError>(), Some(DaqError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_default_read_transaction() {
        let mock = MockTransport::with_replies(["MTIME 0.20,FRUN OFF\nTOUT 25.5\r\n\u{4}", "ID?"]);
        assert_eq!(
            mock.read_transaction(0x04).await.unwrap(),
            "MTIME 0.20,FRUN OFF\nTOUT 25.5"
        );
        assert_eq!(mock.read_transaction(0x04).await.unwrap(), "ID?");
    }

    #[tokio::test]
    async fn test_mock_srq() {
        let mock = MockTransport::new();
        mock.wait_for_srq(Duration::ZERO).await.unwrap();
        mock.wait_for_srq(Duration::ZERO).await.unwrap();
        assert_eq!(mock.srq_waits(), 2);

        mock.fail_srq("no SRQ");
        assert!(mock.wait_for_srq(Duration::ZERO).await.is_err());
        assert_eq!(mock.srq_waits(), 2);
    }
}
