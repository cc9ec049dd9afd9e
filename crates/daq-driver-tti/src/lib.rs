//! TTi (Thurlby Thandar Instruments) drivers.
//!
//! This crate provides the driver for the PL330PD programmable DC power
//! supply (output 1: set points, readback, output switch and the IEEE 488.2
//! status registers).
//!
//! # Usage
//!
//! ```rust,ignore
//! use daq_driver_tti::Pl330pdFactory;
//!
//! registry.register_factory(Box::new(Pl330pdFactory));
//! ```

pub mod pl330pd;

pub use pl330pd::{
    LimitEventStatus, Pl330pdConfig, Pl330pdDriver, Pl330pdFactory, StandardEventStatus,
    StatusByte,
};

/// Force the linker to include this crate.
///
/// Call this function from main() to ensure the driver factories are
/// linked into the final binary and not stripped by the linker.
#[inline(never)]
pub fn link() {
    std::hint::black_box(std::any::TypeId::of::<Pl330pdFactory>());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_does_not_panic() {
        link();
    }
}
