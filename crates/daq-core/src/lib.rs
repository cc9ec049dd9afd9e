//! `daq-core`
//!
//! Shared building blocks for the bench instrument drivers.
//!
//! ## Layers
//!
//! - **Transport** ([`transport`], [`serial`], [`prologix`]): textual
//!   request/response bus with an optional service-request line
//! - **Command properties** ([`property`]): declarative bindings of named
//!   settings to query/write commands, validators and reply grammars
//! - **Status registers** ([`status`]): integer replies decoded into
//!   `bitflags` sets without losing unknown bits
//! - **Capabilities** ([`capabilities`], [`driver`]): model-independent
//!   traits and the factory interface the registry builds drivers through
//!
//! ## Example
//!
//! ```rust,ignore
//! use daq_core::transport::{connect_transport, TransportSettings};
//!
//! let transport = connect_transport(&TransportSettings::new("/dev/ttyUSB0"), "PL330PD").await?;
//! let idn = transport.query("*IDN?").await?;
//! ```

pub mod capabilities;
pub mod driver;
pub mod error;
pub mod prologix;
pub mod property;
pub mod serial;
pub mod status;
pub mod transport;

pub use anyhow::{anyhow, Result};
pub use error::{AppResult, DaqError};
pub use property::{CommandChannel, CommandProperty, PropertyValue, Validator};
pub use transport::{MockTransport, Transport, TransportSettings};
