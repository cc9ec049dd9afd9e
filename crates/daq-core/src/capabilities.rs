//! Atomic Hardware Capabilities
//!
//! Fine-grained capability traits that drivers implement for the parts of
//! the instrument a generic caller can use without knowing the model:
//!
//! - A frequency counter implements `Readable` (one triggered measurement)
//!   and `Settable` (its command properties by name)
//! - A power supply implements `Readable` (measured output voltage) and
//!   `Settable`
//!
//! Each capability trait is async (`#[async_trait]`), `Send + Sync`, and
//! returns `anyhow::Result`.

use anyhow::Result;
use async_trait::async_trait;

/// Capability: Scalar Readout
///
/// # Contract
/// - One call performs one measurement and returns it in the device's
///   natural unit (Hz, V, ...)
/// - Errors on hardware failure or timeout
#[async_trait]
pub trait Readable: Send + Sync {
    /// Read current value
    async fn read(&self) -> Result<f64>;
}

/// Capability: Named Parameters
///
/// Access to instrument properties by name with JSON values, for CLIs and
/// scripts that do not link against the concrete driver type.
///
/// # Contract
/// - Unknown names fail with `DaqError::UnknownProperty`
/// - Values are validated before anything is written
#[async_trait]
pub trait Settable: Send + Sync {
    /// Set a named parameter to a new value.
    ///
    /// # Arguments
    /// * `name` - The identifier for the parameter to set.
    /// * `value` - The new value for the parameter.
    async fn set_value(&self, name: &str, value: serde_json::Value) -> Result<()>;

    /// Get the current value of a named parameter.
    ///
    /// # Arguments
    /// * `name` - The identifier for the parameter to query.
    async fn get_value(&self, name: &str) -> Result<serde_json::Value> {
        anyhow::bail!("Get value for '{}' not supported by this device", name)
    }

    /// Names accepted by `get_value`/`set_value`.
    fn value_names(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct FixedReading(f64);

    #[async_trait]
    impl Readable for FixedReading {
        async fn read(&self) -> Result<f64> {
            Ok(self.0)
        }
    }

    struct WriteOnlyDevice;

    #[async_trait]
    impl Settable for WriteOnlyDevice {
        async fn set_value(&self, _name: &str, _value: serde_json::Value) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_readable_trait_object() {
        let device: Arc<dyn Readable> = Arc::new(FixedReading(1.5));
        assert_eq!(device.read().await.unwrap(), 1.5);
    }

    #[tokio::test]
    async fn test_settable_defaults() {
        let device = WriteOnlyDevice;
        device.set_value("x", serde_json::json!(1)).await.unwrap();
        assert!(device.get_value("x").await.is_err());
        assert!(device.value_names().is_empty());
    }
}
