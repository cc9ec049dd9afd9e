//! Driver registry
//!
//! Maps the `type` field of an instrument definition to its
//! [`DriverFactory`], then validates or builds the instrument through it.

use crate::config::InstrumentDefinition;
use anyhow::{Context, Result};
use daq_core::driver::{Capability, DeviceComponents, DriverFactory};
use daq_core::DaqError;
use std::collections::BTreeMap;

/// Introspection record for a registered factory.
#[derive(Debug, Clone, PartialEq)]
pub struct FactoryInfo {
    /// `type` value matched in configs
    pub driver_type: &'static str,
    /// Human-readable driver name
    pub name: &'static str,
    /// Capabilities the driver provides
    pub capabilities: &'static [Capability],
}

/// Registered driver factories, keyed by driver type.
#[derive(Default)]
pub struct DriverRegistry {
    factories: BTreeMap<String, Box<dyn DriverFactory>>,
}

impl DriverRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every driver shipped with instrument-ctl.
    pub fn with_builtin_drivers() -> Self {
        daq_driver_philips::link();
        daq_driver_tti::link();

        let mut registry = Self::new();
        registry.register_factory(Box::new(daq_driver_philips::Pm6669Factory));
        registry.register_factory(Box::new(daq_driver_tti::Pl330pdFactory));
        registry
    }

    /// Register a factory, returning the one it replaces.
    pub fn register_factory(
        &mut self,
        factory: Box<dyn DriverFactory>,
    ) -> Option<Box<dyn DriverFactory>> {
        let driver_type = factory.driver_type().to_string();
        tracing::debug!(
            driver_type = %driver_type,
            name = %factory.name(),
            capabilities = ?factory.capabilities(),
            "Registering driver factory"
        );
        self.factories.insert(driver_type, factory)
    }

    /// Check if a factory is registered for a driver type.
    pub fn has_factory(&self, driver_type: &str) -> bool {
        self.factories.contains_key(driver_type)
    }

    /// Registered factories, sorted by driver type.
    pub fn factories(&self) -> Vec<FactoryInfo> {
        self.factories
            .values()
            .map(|factory| FactoryInfo {
                driver_type: factory.driver_type(),
                name: factory.name(),
                capabilities: factory.capabilities(),
            })
            .collect()
    }

    fn factory_for(&self, instrument: &InstrumentDefinition) -> Result<&dyn DriverFactory> {
        self.factories
            .get(&instrument.r#type)
            .map(|factory| factory.as_ref())
            .ok_or_else(|| {
                DaqError::Configuration(format!(
                    "instrument '{}': no driver registered for type '{}'",
                    instrument.id, instrument.r#type
                ))
                .into()
            })
    }

    /// Validate an instrument's driver config without touching hardware.
    pub fn validate(&self, instrument: &InstrumentDefinition) -> Result<()> {
        self.factory_for(instrument)?
            .validate(&instrument.config)
            .with_context(|| format!("instrument '{}': invalid config", instrument.id))
    }

    /// Validate, then connect to the instrument.
    pub async fn build(&self, instrument: &InstrumentDefinition) -> Result<DeviceComponents> {
        let factory = self.factory_for(instrument)?;
        factory
            .validate(&instrument.config)
            .with_context(|| format!("instrument '{}': invalid config", instrument.id))?;

        tracing::info!(id = %instrument.id, driver = factory.name(), "Connecting instrument");
        factory
            .build(instrument.config.clone())
            .await
            .with_context(|| format!("instrument '{}': connection failed", instrument.id))
    }
}
