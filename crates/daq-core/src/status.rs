//! Status Register Decoding
//!
//! Instruments report conditions as 8-bit registers. Drivers declare one
//! `bitflags` type per register; the helpers here turn raw replies into
//! those types and back into JSON for reporting. Bits without a name are
//! kept, so `decode(raw).bits() == raw` for every byte.

use crate::error::{AppResult, DaqError};
use bitflags::Flags;

/// Decode a raw register byte, retaining unknown bits.
pub fn decode<F: Flags<Bits = u8>>(raw: u8) -> F {
    F::from_bits_retain(raw)
}

/// Narrow an integer register reply to a byte.
pub fn register_byte(register: &str, raw: i64) -> AppResult<u8> {
    u8::try_from(raw).map_err(|_| DaqError::malformed(register, raw.to_string()))
}

/// Decode an integer register reply into flags.
pub fn decode_register<F: Flags<Bits = u8>>(register: &str, raw: i64) -> AppResult<F> {
    register_byte(register, raw).map(decode)
}

/// Names of the set flags, in declaration order.
pub fn flag_names<F: Flags>(flags: &F) -> Vec<&'static str> {
    flags.iter_names().map(|(name, _)| name).collect()
}

/// `{"raw": <byte>, "flags": [<names>]}`
pub fn flags_to_json<F: Flags<Bits = u8>>(flags: &F) -> serde_json::Value {
    serde_json::json!({
        "raw": flags.bits(),
        "flags": flag_names(flags),
    })
}
