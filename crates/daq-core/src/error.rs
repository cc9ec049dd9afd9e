//! Custom error types for the instrument drivers.
//!
//! This module defines the primary error type, `DaqError`, shared by every
//! transport and driver in the workspace. Driver methods return
//! `anyhow::Result` and attach context as errors bubble up; the typed
//! variant underneath stays reachable with `downcast_ref::<DaqError>()`.
//!
//! ## Error Categories
//!
//! - **`Configuration`**: a driver or transport config that parsed but makes
//!   no sense (unknown GPIB address, empty port path).
//! - **`Io`** / **`Timeout`**: the bus itself failed or went quiet.
//! - **`InvalidValue`**, **`ReadOnly`**, **`WriteOnly`**, **`UnknownProperty`**:
//!   caller mistakes, always raised before any byte reaches the instrument.
//! - **`MalformedReply`**: the instrument answered with something the property
//!   grammar does not accept.
//! - **`HardwareFault`**: the instrument reported a fault through its status
//!   registers.

use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for transports and instrument drivers.
///
/// # Example
///
/// ```rust,ignore
/// use daq_core::error::DaqError;
///
/// match driver.set_voltage(40.0).await {
///     Err(e) if matches!(e.downcast_ref::<DaqError>(), Some(DaqError::InvalidValue { .. })) => {
///         // nothing was written to the supply
///     }
///     other => other?,
/// }
/// ```
#[derive(Error, Debug)]
pub enum DaqError {
    /// Semantic error in a driver or transport configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Underlying I/O failure on the bus.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic instrument communication failure.
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// The instrument did not answer within the allotted time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A value was rejected by the property's validator.
    ///
    /// Raised before any I/O; nothing was sent to the instrument.
    #[error("Invalid value {value} for '{property}': expected {constraint}")]
    InvalidValue {
        /// Property the value was meant for
        property: String,
        /// Offending value, rendered for display
        value: String,
        /// Human-readable description of the accepted set or range
        constraint: String,
    },

    /// Attempted to write a property that has no write command.
    #[error("Property '{0}' is read-only")]
    ReadOnly(String),

    /// Attempted to query a property that has no query command.
    #[error("Property '{0}' is write-only")]
    WriteOnly(String),

    /// The instrument reply did not match the property's grammar.
    #[error("Malformed reply for '{property}': {reply:?}")]
    MalformedReply {
        /// Property being decoded
        property: String,
        /// Raw reply text
        reply: String,
    },

    /// The instrument reported a hardware fault through its status registers.
    #[error("Hardware fault: {0}")]
    HardwareFault(String),

    /// The operation is not supported by this transport or driver.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The named property does not exist on this instrument.
    #[error("Unknown property '{0}'")]
    UnknownProperty(String),
}

impl DaqError {
    /// Build a [`DaqError::MalformedReply`].
    pub fn malformed(property: impl Into<String>, reply: impl Into<String>) -> Self {
        Self::MalformedReply {
            property: property.into(),
            reply: reply.into(),
        }
    }

    /// Whether the error was raised before any I/O took place.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidValue { .. }
                | Self::ReadOnly(_)
                | Self::WriteOnly(_)
                | Self::UnknownProperty(_)
        )
    }
}
