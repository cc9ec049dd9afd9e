//! Driver Factory and Component Types
//!
//! Drivers implement [`DriverFactory`] and are registered with a registry at
//! startup. The registry matches the `type` field of each configured
//! instrument against [`DriverFactory::driver_type`], validates the config
//! table, then builds the driver.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  registry.register_factory(Box::new(Pm6669Factory));         │
//! │  registry.register_factory(Box::new(Pl330pdFactory));        │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  DriverFactory::build(config)                                │
//! │  parses TOML, opens transport, returns DeviceComponents      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use crate::capabilities::{Readable, Settable};
use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Capability Enum (Runtime Introspection)
// =============================================================================

/// Runtime capability flags for device introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Can read scalar values (counters, supplies)
    /// Corresponds to [`crate::capabilities::Readable`]
    Readable,

    /// Has named settable parameters
    /// Corresponds to [`crate::capabilities::Settable`]
    Settable,
}

impl Capability {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Readable => "Readable",
            Self::Settable => "Settable",
        }
    }
}

// =============================================================================
// Device Components (Capability Bag)
// =============================================================================

/// Container for capability trait objects returned by drivers.
///
/// ```rust,ignore
/// let driver = Arc::new(Pl330pdDriver::new(transport));
///
/// let components = DeviceComponents::new()
///     .with_readable(driver.clone())
///     .with_settable(driver)
///     .with_metadata(DeviceMetadata { measurement_units: Some("V".into()), ..Default::default() });
/// ```
#[derive(Default, Clone)]
pub struct DeviceComponents {
    /// Readable implementation
    pub readable: Option<Arc<dyn Readable>>,
    /// Settable implementation
    pub settable: Option<Arc<dyn Settable>>,
    /// Descriptive metadata
    pub metadata: DeviceMetadata,
}

impl DeviceComponents {
    /// Create empty components
    pub fn new() -> Self {
        Self::default()
    }

    /// Capabilities actually present
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.readable.is_some() {
            caps.push(Capability::Readable);
        }
        if self.settable.is_some() {
            caps.push(Capability::Settable);
        }
        caps
    }

    /// Set Readable implementation
    pub fn with_readable(mut self, r: Arc<dyn Readable>) -> Self {
        self.readable = Some(r);
        self
    }

    /// Set Settable implementation
    pub fn with_settable(mut self, s: Arc<dyn Settable>) -> Self {
        self.settable = Some(s);
        self
    }

    /// Set device metadata
    pub fn with_metadata(mut self, metadata: DeviceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Descriptive metadata for a device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceMetadata {
    /// Identification string reported at connect time
    pub identity: Option<String>,
    /// For Readable devices: measurement units (e.g., "Hz", "V")
    pub measurement_units: Option<String>,
}

// =============================================================================
// Driver Factory Trait
// =============================================================================

/// Trait for driver factories that create device instances.
///
/// Factories are registered once at startup and live for the program's
/// lifetime, so they must be `Send + Sync + 'static` and hold no mutable
/// state across builds.
pub trait DriverFactory: Send + Sync + 'static {
    /// Driver type name used in the TOML config `type` field.
    fn driver_type(&self) -> &'static str;

    /// Human-readable name for documentation and error messages.
    fn name(&self) -> &'static str;

    /// List of capabilities this driver type provides.
    fn capabilities(&self) -> &'static [Capability] {
        &[]
    }

    /// Validate configuration without touching hardware.
    fn validate(&self, config: &toml::Value) -> Result<()>;

    /// Async instantiation of the driver.
    ///
    /// Parses the configuration, opens the transport, runs the instrument's
    /// start-up sequence and returns the implemented capabilities.
    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Constant;

    #[async_trait]
    impl Readable for Constant {
        async fn read(&self) -> Result<f64> {
            Ok(0.0)
        }
    }

    #[test]
    fn test_capability_name() {
        assert_eq!(Capability::Readable.name(), "Readable");
        assert_eq!(Capability::Settable.name(), "Settable");
    }

    #[test]
    fn test_capability_serde() {
        let json = serde_json::to_string(&Capability::Settable).unwrap();
        assert_eq!(json, "\"settable\"");
    }

    #[test]
    fn test_device_components_capabilities() {
        let empty = DeviceComponents::new();
        assert!(empty.capabilities().is_empty());

        let components = DeviceComponents::new()
            .with_readable(Arc::new(Constant))
            .with_metadata(DeviceMetadata {
                measurement_units: Some("Hz".to_string()),
                ..Default::default()
            });
        assert_eq!(components.capabilities(), vec![Capability::Readable]);
        assert_eq!(components.metadata.measurement_units.as_deref(), Some("Hz"));
    }
}
