//! Serial Port Transport
//!
//! Line-oriented [`Transport`] over any async byte stream, plus the shared
//! types and helpers driver crates use to open real ports.
//!
//! # Feature Flag
//!
//! Opening hardware ports requires the `serial` feature (on by default):
//!
//! ```toml
//! [dependencies]
//! daq-core = { path = "../daq-core", features = ["serial"] }
//! ```
//!
//! # Types
//!
//! - [`SerialPortIO`]: Trait alias combining AsyncRead + AsyncWrite for serial ports
//! - [`DynSerial`]: Type-erased boxed serial port
//! - [`SharedPort`]: Thread-safe shared serial port with buffered reading
//! - [`SerialTransport`]: Terminated command/line reply transport
//!
//! # Example
//!
//! ```rust,ignore
//! use daq_core::serial::{open_serial_async, SerialTransport};
//!
//! let port = open_serial_async("/dev/ttyUSB0", 9600, "PL330PD").await?;
//! let transport = SerialTransport::new(Box::new(port), "\n", Duration::from_secs(1));
//! let idn = transport.query("*IDN?").await?;
//! ```

use crate::error::DaqError;
use crate::transport::Transport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

// =============================================================================
// Serial Port Trait
// =============================================================================

/// Trait alias for async serial port I/O.
///
/// Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can be used
/// as a serial port:
/// - `tokio_serial::SerialStream` (real hardware)
/// - `tokio::io::DuplexStream` (testing)
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Thread-safe shared serial port with buffered reading.
///
/// The `BufReader` wrapper lets replies be read up to their line ending.
pub type SharedPort = Arc<Mutex<BufReader<DynSerial>>>;

/// Create a SharedPort from a type-erased serial port.
pub fn wrap_shared(port: DynSerial) -> SharedPort {
    Arc::new(Mutex::new(BufReader::new(port)))
}

// =============================================================================
// Serial Port Utilities
// =============================================================================

/// Open a serial port asynchronously using spawn_blocking.
///
/// Standard settings are applied: 8N1, no flow control.
///
/// # Parameters
///
/// - `port_path`: Path to the serial port (e.g., "/dev/ttyUSB0")
/// - `baud_rate`: Baud rate (e.g., 9600, 115200)
/// - `device_name`: Human-readable device name for error messages
#[cfg(feature = "serial")]
pub async fn open_serial_async(
    port_path: &str,
    baud_rate: u32,
    device_name: &str,
) -> Result<tokio_serial::SerialStream> {
    use tokio::task::spawn_blocking;
    use tokio_serial::SerialPortBuilderExt;

    let port_path_owned = port_path.to_string();
    let device_name_owned = device_name.to_string();

    spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .context(format!(
                "Failed to open {} serial port: {}",
                device_name_owned, port_path_owned
            ))
    })
    .await
    .context("spawn_blocking for serial port opening failed")?
}

/// Drain stale data from a serial port buffer.
///
/// Reads and discards until nothing arrives within `timeout_ms`.
/// Returns the number of bytes discarded.
pub async fn drain_serial_buffer<R: AsyncRead + Unpin>(port: &mut R, timeout_ms: u64) -> usize {
    let mut discard = [0u8; 256];
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    let mut total_discarded = 0usize;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, port.read(&mut discard)).await {
            Ok(Ok(0)) => break, // EOF
            Ok(Ok(n)) => total_discarded += n,
            Ok(Err(_)) => break,
            Err(_) => break, // no more immediate data
        }
    }

    total_discarded
}

// =============================================================================
// SerialTransport
// =============================================================================

/// Line-oriented transport over a shared serial port.
///
/// Commands get the configured terminator appended. `read()` returns one
/// line (up to `\n`) with the trailing `\r\n`/`\n` removed; NUL padding and
/// other bytes are left for the driver to deal with.
pub struct SerialTransport {
    port: SharedPort,
    terminator: String,
    timeout: Duration,
}

impl SerialTransport {
    /// Wrap a serial port.
    pub fn new(port: DynSerial, terminator: &str, timeout: Duration) -> Self {
        Self::from_shared(wrap_shared(port), terminator, timeout)
    }

    /// Wrap an already shared serial port.
    pub fn from_shared(port: SharedPort, terminator: &str, timeout: Duration) -> Self {
        Self {
            port,
            terminator: terminator.to_string(),
            timeout,
        }
    }

    /// Discard anything buffered or arriving within `timeout_ms`.
    pub async fn clear_input(&self, timeout_ms: u64) -> usize {
        let mut port = self.port.lock().await;
        let buffered = port.buffer().len();
        port.consume(buffered);
        let discarded = buffered + drain_serial_buffer(port.get_mut(), timeout_ms).await;
        if discarded > 0 {
            tracing::debug!("Discarded {} stale bytes", discarded);
        }
        discarded
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write(&self, command: &str) -> Result<()> {
        let mut port = self.port.lock().await;
        let frame = format!("{}{}", command, self.terminator);
        tracing::debug!(command, "serial write");
        port.get_mut()
            .write_all(frame.as_bytes())
            .await
            .map_err(DaqError::Io)
            .with_context(|| format!("serial write of {:?} failed", command))?;
        port.get_mut().flush().await.map_err(DaqError::Io)?;
        Ok(())
    }

    async fn read(&self) -> Result<String> {
        let mut port = self.port.lock().await;
        let mut raw = Vec::new();

        match tokio::time::timeout(self.timeout, port.read_until(b'\n', &mut raw)).await {
            Ok(Ok(0)) => Err(DaqError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "serial connection closed",
            ))
            .into()),
            Ok(Ok(_)) => {
                if raw.ends_with(b"\n") {
                    raw.pop();
                    if raw.ends_with(b"\r") {
                        raw.pop();
                    }
                }
                let reply = String::from_utf8_lossy(&raw).into_owned();
                tracing::debug!(reply = ?reply, "serial read");
                Ok(reply)
            }
            Ok(Err(e)) => Err(DaqError::Io(e)).context("serial read failed"),
            Err(_) => Err(DaqError::Timeout(format!(
                "no reply within {} ms",
                self.timeout.as_millis()
            ))
            .into()),
        }
    }

    async fn read_transaction(&self, end_marker: u8) -> Result<String> {
        let mut port = self.port.lock().await;
        let mut raw = Vec::new();

        let read = port.read_until(end_marker, &mut raw);
        let marked = match tokio::time::timeout(self.timeout, read).await {
            Ok(Ok(0)) => {
                return Err(DaqError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "serial connection closed",
                ))
                .into())
            }
            Ok(Ok(_)) => raw.last() == Some(&end_marker),
            Ok(Err(e)) => return Err(DaqError::Io(e)).context("serial read failed"),
            // read_until keeps partial input in `raw`
            Err(_) if raw.is_empty() => {
                return Err(DaqError::Timeout(format!(
                    "no reply within {} ms",
                    self.timeout.as_millis()
                ))
                .into())
            }
            Err(_) => false,
        };

        if marked {
            raw.pop();
        } else {
            tracing::debug!(bytes = raw.len(), "transaction ended without end marker");
        }
        while matches!(raw.last(), Some(b'\n' | b'\r')) {
            raw.pop();
        }
        let reply = String::from_utf8_lossy(&raw).into_owned();
        tracing::debug!(reply = ?reply, "serial read transaction");
        Ok(reply)
    }

    async fn wait_for_srq(&self, _delay: Duration) -> Result<()> {
        Err(DaqError::Unsupported("a plain serial link has no service-request line".into()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport_pair() -> (tokio::io::DuplexStream, SerialTransport) {
        let (host, device) = tokio::io::duplex(256);
        let transport = SerialTransport::new(Box::new(device), "\n", Duration::from_millis(100));
        (host, transport)
    }

    #[tokio::test]
    async fn test_write_appends_terminator() {
        let (mut host, transport) = transport_pair();
        transport.write("V1 12.5").await.unwrap();

        let mut buf = vec![0u8; 16];
        let n = host.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"V1 12.5\n");
    }

    #[tokio::test]
    async fn test_read_strips_line_ending_only() {
        let (mut host, transport) = transport_pair();
        host.write_all(b"V1 12.50\r\n\0\0FRE   A 60.0\n").await.unwrap();

        assert_eq!(transport.read().await.unwrap(), "V1 12.50");
        assert_eq!(transport.read().await.unwrap(), "\0\0FRE   A 60.0");
    }

    #[tokio::test]
    async fn test_read_transaction_spans_lines() {
        let (mut host, transport) = transport_pair();
        host.write_all(b"FRE   A 10.0\nFRE   A 11.0\n\x04MTIME 0.20\n").await.unwrap();

        assert_eq!(
            transport.read_transaction(0x04).await.unwrap(),
            "FRE   A 10.0\nFRE   A 11.0"
        );
        assert_eq!(transport.read().await.unwrap(), "MTIME 0.20");
    }

    #[tokio::test]
    async fn test_read_transaction_without_marker_returns_partial_input() {
        let (mut host, transport) = transport_pair();
        host.write_all(b"ID 6669\r\n").await.unwrap();

        assert_eq!(transport.read_transaction(0x04).await.unwrap(), "ID 6669");

        let err = transport.read_transaction(0x04).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<DaqError>(), Some(DaqError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (_host, transport) = transport_pair();
        let err = transport.read().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<DaqError>(), Some(DaqError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_read_after_close() {
        let (host, transport) = transport_pair();
        drop(host);
        let err = transport.read().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<DaqError>(), Some(DaqError::Io(_))));
    }

    #[tokio::test]
    async fn test_srq_unsupported() {
        let (_host, transport) = transport_pair();
        let err = transport.wait_for_srq(Duration::ZERO).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<DaqError>(), Some(DaqError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_clear_input() {
        let (mut host, transport) = transport_pair();
        host.write_all(b"stale data 12345").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(transport.clear_input(50).await, 16);

        host.write_all(b"fresh\n").await.unwrap();
        assert_eq!(transport.read().await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_shared_port_clone() {
        let (mut host, device) = tokio::io::duplex(64);
        let port: SharedPort = wrap_shared(Box::new(device));
        let transport = SerialTransport::from_shared(port.clone(), "\r\n", Duration::from_millis(100));

        transport.write("*IDN?").await.unwrap();
        let mut buf = vec![0u8; 16];
        let n = host.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"*IDN?\r\n");
        assert_eq!(Arc::strong_count(&port), 2);
    }
}
