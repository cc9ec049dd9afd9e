//! Philips instrument drivers.
//!
//! This crate provides the driver for the PM 6669 universal frequency
//! counter, normally reached over GPIB through a Prologix controller.
//!
//! # Usage
//!
//! ```rust,ignore
//! use daq_driver_philips::Pm6669Factory;
//!
//! registry.register_factory(Box::new(Pm6669Factory));
//! ```

pub mod pm6669;

pub use pm6669::{
    Function, MeasurementSettings, MsrFlag, Pm6669Config, Pm6669Driver, Pm6669Factory,
    SpollStatus,
};

/// Force the linker to include this crate.
///
/// Call this function from main() so the factory survives dead-code
/// stripping of the final binary.
#[inline(never)]
pub fn link() {
    std::hint::black_box(std::any::TypeId::of::<Pm6669Factory>());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_does_not_panic() {
        link();
    }
}
