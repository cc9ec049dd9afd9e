//! Prologix GPIB-USB Controller Transport
//!
//! The Prologix controller shows up as a serial port. Lines starting with
//! `++` are controller commands; everything else is forwarded to the GPIB
//! device at the configured address.
//!
//! Protocol notes:
//! - `++mode 1` puts the adapter in controller mode
//! - `++auto 0` disables read-after-write, so device replies are requested
//!   explicitly with `++read eoi`
//! - `++eoi 1` asserts EOI with the last byte of every command
//! - `++eot_enable 1` / `++eot_char 4` append an ASCII EOT after the last
//!   byte of a device transaction, so one `++read eoi` is read as a whole
//!   even when it carries several lines
//! - controller queries (`++srq`, `++spoll`, `++ver`, or a setting command
//!   without argument) answer directly without `++read` and without EOT

use crate::error::DaqError;
use crate::transport::Transport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Byte the controller appends once the device asserts EOI.
pub const EOT_CHAR: u8 = 0x04;

/// Controller commands that never produce a reply.
const SILENT_COMMANDS: [&str; 8] = [
    "++clr", "++ifc", "++llo", "++loc", "++rst", "++trg", "++read", "++savecfg",
];

/// Whether the controller itself answers `command`.
fn expects_controller_reply(command: &str) -> bool {
    let mut words = command.split_whitespace();
    match words.next() {
        Some("++srq" | "++spoll" | "++ver" | "++help") => true,
        Some(name) if SILENT_COMMANDS.contains(&name) => false,
        // a setting command without argument reports the current value
        Some(name) if name.starts_with("++") => words.next().is_none(),
        _ => false,
    }
}

/// GPIB transport through a Prologix controller.
///
/// Generic over the underlying line transport so the controller protocol can
/// be exercised against a [`MockTransport`](crate::transport::MockTransport).
pub struct PrologixTransport<T> {
    inner: T,
    address: u8,
    srq_timeout: Duration,
    /// Set after a controller command whose reply arrives without `++read`.
    controller_reply_pending: AtomicBool,
}

impl<T: Transport> PrologixTransport<T> {
    /// Wrap `inner`, addressing the GPIB device at `address`.
    pub fn new(inner: T, address: u8, srq_timeout: Duration) -> Self {
        Self {
            inner,
            address,
            srq_timeout,
            controller_reply_pending: AtomicBool::new(false),
        }
    }

    /// GPIB primary address of the instrument.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Configure the controller for this instrument.
    pub async fn init(&self) -> Result<()> {
        for command in [
            "++mode 1".to_string(),
            format!("++addr {}", self.address),
            "++auto 0".to_string(),
            "++eoi 1".to_string(),
            "++eot_enable 1".to_string(),
            format!("++eot_char {}", EOT_CHAR),
        ] {
            self.inner
                .write(&command)
                .await
                .with_context(|| format!("Prologix setup command {:?} failed", command))?;
        }
        tracing::debug!(address = self.address, "Prologix controller configured");
        Ok(())
    }

    /// Whether the service-request line is currently asserted.
    pub async fn srq_asserted(&self) -> Result<bool> {
        let reply = self.inner.query("++srq").await?;
        match reply.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(DaqError::malformed("++srq", other).into()),
        }
    }
}

#[async_trait]
impl<T: Transport> Transport for PrologixTransport<T> {
    async fn write(&self, command: &str) -> Result<()> {
        self.controller_reply_pending
            .store(expects_controller_reply(command), Ordering::SeqCst);
        self.inner.write(command).await
    }

    /// A controller reply is a single line; a device reply is the whole
    /// transaction released by one `++read eoi`.
    async fn read(&self) -> Result<String> {
        if self.controller_reply_pending.swap(false, Ordering::SeqCst) {
            return self.inner.read().await;
        }
        self.inner.write("++read eoi").await?;
        self.inner.read_transaction(EOT_CHAR).await
    }

    async fn wait_for_srq(&self, delay: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.srq_timeout;
        loop {
            if self.srq_asserted().await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DaqError::Timeout(format!(
                    "GPIB device {} did not request service within {} ms",
                    self.address,
                    self.srq_timeout.as_millis()
                ))
                .into());
            }
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
