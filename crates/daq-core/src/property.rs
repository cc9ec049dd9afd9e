//! Declarative Command Properties
//!
//! A [`CommandProperty`] binds a named instrument setting to its wire form:
//! the query command, the write template, the validator that guards writes,
//! an optional value table, and the extraction step that pulls the value out
//! of a reply. Drivers declare one constant per property and write typed
//! accessors on top:
//!
//! ```rust,ignore
//! pub const VOLTAGE: CommandProperty<f64> = CommandProperty {
//!     name: "voltage",
//!     description: "Output 1 set voltage (V)",
//!     get_command: Some("V1?"),
//!     set_command: Some("V1 {}"),
//!     validator: Validator::Range { min: 0.0, max: 32.0 },
//!     extract: Some(voltage_field),
//!     ..CommandProperty::EMPTY
//! };
//!
//! let volts = supply.get(&VOLTAGE).await?;
//! supply.set(&VOLTAGE, 12.5).await?;   // writes "V1 12.5"
//! ```
//!
//! # Data Flow
//!
//! ```text
//! set(value) ─▶ validate ─▶ map / format ─▶ fill template ─▶ send()
//!                  │
//!                  └─ InvalidValue, nothing written
//!
//! get() ─▶ ask(query) ─▶ trim ─▶ extract field ─▶ map / parse ─▶ T
//!                                     │
//!                                     └─ MalformedReply
//! ```

use crate::error::{AppResult, DaqError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt::Debug;

// =============================================================================
// Property Values
// =============================================================================

/// A value type that can travel through a [`CommandProperty`].
pub trait PropertyValue: Clone + PartialEq + PartialOrd + Debug + Send + Sync + 'static {
    /// Render the value as a command argument.
    fn to_command_arg(&self) -> String;

    /// Parse the value from (already extracted and trimmed) reply text.
    fn parse_reply(text: &str) -> Option<Self>;

    /// Convert from a JSON value supplied by a caller.
    fn from_json(value: &serde_json::Value) -> Option<Self>;

    /// Convert to JSON for reporting.
    fn to_json(&self) -> serde_json::Value;
}

impl PropertyValue for f64 {
    fn to_command_arg(&self) -> String {
        format!("{}", self)
    }

    fn parse_reply(text: &str) -> Option<Self> {
        text.parse::<f64>().ok()
    }

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        value.as_f64()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self)
    }
}

impl PropertyValue for i64 {
    fn to_command_arg(&self) -> String {
        self.to_string()
    }

    fn parse_reply(text: &str) -> Option<Self> {
        text.parse::<i64>().ok()
    }

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        value.as_i64()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self)
    }
}

impl PropertyValue for u8 {
    fn to_command_arg(&self) -> String {
        self.to_string()
    }

    fn parse_reply(text: &str) -> Option<Self> {
        text.parse::<u8>().ok()
    }

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        value.as_u64().and_then(|v| u8::try_from(v).ok())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self)
    }
}

impl PropertyValue for bool {
    fn to_command_arg(&self) -> String {
        let arg = if *self { "1" } else { "0" };
        arg.to_string()
    }

    fn parse_reply(text: &str) -> Option<Self> {
        match text.to_ascii_uppercase().as_str() {
            "1" | "ON" | "TRUE" => Some(true),
            "0" | "OFF" | "FALSE" => Some(false),
            _ => None,
        }
    }

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::Number(n) => match n.as_u64() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
            serde_json::Value::String(s) => Self::parse_reply(s.trim()),
            _ => None,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Bool(*self)
    }
}

impl PropertyValue for String {
    fn to_command_arg(&self) -> String {
        self.clone()
    }

    fn parse_reply(text: &str) -> Option<Self> {
        Some(text.to_string())
    }

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::String(self.clone())
    }
}

// =============================================================================
// Validators
// =============================================================================

/// Inclusive range check. NaN never passes.
pub fn strict_range<T: PartialOrd>(value: &T, min: &T, max: &T) -> bool {
    value >= min && value <= max
}

/// Exact membership check.
pub fn strict_discrete_set<T: PartialEq>(value: &T, set: &[T]) -> bool {
    set.iter().any(|candidate| candidate == value)
}

/// Constraint applied to a value before it is written.
#[derive(Debug, Clone, Copy)]
pub enum Validator<T: 'static> {
    /// Anything goes.
    None,
    /// Value must be one of the listed values.
    DiscreteSet(&'static [T]),
    /// Value must lie in `[min, max]`, both ends included.
    Range {
        /// Lower bound
        min: T,
        /// Upper bound
        max: T,
    },
}

impl<T: PropertyValue> Validator<T> {
    /// Check `value`, naming `property` in the error.
    pub fn check(&self, property: &str, value: &T) -> AppResult<()> {
        let accepted = match self {
            Self::None => true,
            Self::DiscreteSet(set) => strict_discrete_set(value, set),
            Self::Range { min, max } => strict_range(value, min, max),
        };
        if accepted {
            Ok(())
        } else {
            Err(DaqError::InvalidValue {
                property: property.to_string(),
                value: value.to_command_arg(),
                constraint: self.describe(),
            })
        }
    }

    /// Human-readable form of the constraint.
    pub fn describe(&self) -> String {
        match self {
            Self::None => "any value".to_string(),
            Self::DiscreteSet(set) => {
                let items: Vec<String> = set.iter().map(PropertyValue::to_command_arg).collect();
                format!("one of [{}]", items.join(", "))
            }
            Self::Range { min, max } => {
                format!("range [{}, {}]", min.to_command_arg(), max.to_command_arg())
            }
        }
    }
}

// =============================================================================
// CommandProperty
// =============================================================================

/// Pulls the value text out of a trimmed reply; `None` marks it malformed.
pub type Extractor = fn(&str) -> Option<&str>;

/// Declarative binding of a named instrument setting to its commands.
///
/// At least one of `get_command` and `set_command` is present.
#[derive(Clone, Copy)]
pub struct CommandProperty<T: 'static> {
    /// Property name, used in errors and by name-based access
    pub name: &'static str,
    /// One-line description
    pub description: &'static str,
    /// Query command; `None` makes the property write-only
    pub get_command: Option<&'static str>,
    /// Write template with one `{}` placeholder; `None` makes it read-only
    pub set_command: Option<&'static str>,
    /// Constraint checked before any write
    pub validator: Validator<T>,
    /// Bidirectional value table (value, wire text)
    pub map: Option<&'static [(T, &'static str)]>,
    /// Field extraction applied to the reply before parsing
    pub extract: Option<Extractor>,
}

impl<T: 'static> CommandProperty<T> {
    /// Base for struct-update syntax in property constants.
    pub const EMPTY: Self = Self {
        name: "",
        description: "",
        get_command: None,
        set_command: None,
        validator: Validator::None,
        map: None,
        extract: None,
    };

    /// Whether the property can be queried.
    pub fn is_readable(&self) -> bool {
        self.get_command.is_some()
    }

    /// Whether the property can be written.
    pub fn is_writable(&self) -> bool {
        self.set_command.is_some()
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl<T: PropertyValue> CommandProperty<T> {
    /// Query command, or [`DaqError::WriteOnly`].
    pub fn query_command(&self) -> AppResult<&'static str> {
        self.get_command
            .ok_or_else(|| DaqError::WriteOnly(self.name.to_string()))
    }

    /// Validate `value` and render the full write command.
    pub fn encode(&self, value: &T) -> AppResult<String> {
        let template = self
            .set_command
            .ok_or_else(|| DaqError::ReadOnly(self.name.to_string()))?;
        self.validator.check(self.name, value)?;

        let arg = match self.map {
            Some(map) => map
                .iter()
                .find(|(candidate, _)| candidate == value)
                .map(|(_, wire)| wire.to_string())
                .ok_or_else(|| DaqError::InvalidValue {
                    property: self.name.to_string(),
                    value: value.to_command_arg(),
                    constraint: "a mapped value".to_string(),
                })?,
            None => value.to_command_arg(),
        };

        Ok(template.replacen("{}", &arg, 1))
    }

    /// Convert a caller-supplied JSON value, naming the constraint on failure.
    pub fn value_from_json(&self, value: &serde_json::Value) -> AppResult<T> {
        T::from_json(value).ok_or_else(|| DaqError::InvalidValue {
            property: self.name.to_string(),
            value: value.to_string(),
            constraint: match self.validator {
                Validator::None => format!("a {}", std::any::type_name::<T>()),
                _ => self.validator.describe(),
            },
        })
    }

    /// Decode a raw reply.
    pub fn decode(&self, reply: &str) -> AppResult<T> {
        let malformed = || DaqError::malformed(self.name, reply);
        let text = reply.trim();
        let field = match self.extract {
            Some(extract) => extract(text).ok_or_else(malformed)?,
            None => text,
        }
        .trim();

        match self.map {
            Some(map) => {
                let wanted = normalize_whitespace(field);
                map.iter()
                    .find(|(_, wire)| normalize_whitespace(wire) == wanted)
                    .map(|(value, _)| value.clone())
                    .ok_or_else(malformed)
            }
            None => T::parse_reply(field).ok_or_else(malformed),
        }
    }
}

// =============================================================================
// Command Channel
// =============================================================================

/// Command round trips for a driver, with property access on top.
///
/// Drivers implement `send` and `ask` (usually by delegating to their
/// transport); `get` and `set` come for free.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Send a command that has no reply.
    async fn send(&self, command: &str) -> Result<()>;

    /// Send a command and return its reply.
    async fn ask(&self, command: &str) -> Result<String>;

    /// Query a property: one round trip, then decode.
    async fn get<T: PropertyValue>(&self, property: &CommandProperty<T>) -> Result<T> {
        let command = property.query_command()?;
        let reply = self
            .ask(command)
            .await
            .with_context(|| format!("querying '{}'", property.name))?;
        let value = property.decode(&reply)?;
        tracing::debug!(property = property.name, ?value, "property read");
        Ok(value)
    }

    /// Validate, encode and write a property. Nothing is sent if validation fails.
    async fn set<T: PropertyValue>(&self, property: &CommandProperty<T>, value: T) -> Result<()> {
        let command = property.encode(&value)?;
        tracing::debug!(property = property.name, ?value, "property write");
        self.send(&command)
            .await
            .with_context(|| format!("setting '{}'", property.name))
    }
}

/// Split a compound reply into its comma/line separated fields.
pub fn reply_fields(reply: &str) -> impl Iterator<Item = &str> {
    reply
        .split(|c: char| c == ',' || c == '\n' || c == '\r')
        .map(str::trim)
        .filter(|field| !field.is_empty())
}

/// Value text of the `NAME value` field in a compound reply.
pub fn named_field<'a>(reply: &'a str, name: &str) -> Option<&'a str> {
    reply_fields(reply).find_map(|field| {
        let rest = field.strip_prefix(name)?;
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            Some(rest.trim())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, Transport};

    const LEVEL: CommandProperty<f64> = CommandProperty {
        name: "level",
        get_command: Some("LEV?"),
        set_command: Some("LEV {}"),
        validator: Validator::Range { min: 0.0, max: 5.0 },
        extract: Some(strip_lev),
        ..CommandProperty::EMPTY
    };

    fn strip_lev(reply: &str) -> Option<&str> {
        reply.strip_prefix("LEV")
    }

    const MODE: CommandProperty<bool> = CommandProperty {
        name: "mode",
        get_command: Some("MODE?"),
        set_command: Some("MODE {}"),
        validator: Validator::DiscreteSet(&[true, false]),
        map: Some(&[(true, "ON"), (false, "OFF")]),
        ..CommandProperty::EMPTY
    };

    const NAME: CommandProperty<String> = CommandProperty {
        name: "name",
        get_command: Some("NAME?"),
        ..CommandProperty::EMPTY
    };

    const ARM: CommandProperty<u8> = CommandProperty {
        name: "arm",
        set_command: Some("ARM {}"),
        validator: Validator::DiscreteSet(&[0, 1]),
        ..CommandProperty::EMPTY
    };

    struct Channel(MockTransport);

    #[async_trait]
    impl CommandChannel for Channel {
        async fn send(&self, command: &str) -> Result<()> {
            self.0.write(command).await
        }

        async fn ask(&self, command: &str) -> Result<String> {
            self.0.query(command).await
        }
    }

    fn kind(err: &anyhow::Error) -> Option<&DaqError> {
        err.downcast_ref::<DaqError>()
    }

    #[test]
    fn test_range_boundaries() {
        assert_eq!(LEVEL.encode(&0.0).unwrap(), "LEV 0");
        assert_eq!(LEVEL.encode(&5.0).unwrap(), "LEV 5");
        assert_eq!(LEVEL.encode(&2.25).unwrap(), "LEV 2.25");
        assert!(LEVEL.encode(&-0.001).is_err());
        assert!(LEVEL.encode(&5.001).is_err());
        assert!(LEVEL.encode(&f64::NAN).is_err());
    }

    #[test]
    fn test_discrete_set_and_map() {
        assert_eq!(MODE.encode(&true).unwrap(), "MODE ON");
        assert_eq!(MODE.encode(&false).unwrap(), "MODE OFF");
        assert_eq!(ARM.encode(&1).unwrap(), "ARM 1");
        match ARM.encode(&2) {
            Err(DaqError::InvalidValue { constraint, .. }) => {
                assert_eq!(constraint, "one of [0, 1]")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_direction_errors() {
        assert!(matches!(NAME.encode(&"x".to_string()), Err(DaqError::ReadOnly(_))));
        assert!(matches!(ARM.query_command(), Err(DaqError::WriteOnly(_))));
        assert!(NAME.is_readable() && !NAME.is_writable());
        assert!(ARM.is_writable() && !ARM.is_readable());
    }

    #[test]
    fn test_decode() {
        assert_eq!(LEVEL.decode("LEV 3.5\r\n").unwrap(), 3.5);
        assert!(matches!(
            LEVEL.decode("VOLT 3.5"),
            Err(DaqError::MalformedReply { .. })
        ));
        assert!(MODE.decode("  ON ").unwrap());
        assert!(!MODE.decode("OFF").unwrap());
        assert!(MODE.decode("MAYBE").is_err());
        assert_eq!(NAME.decode(" ACME,1 \n").unwrap(), "ACME,1");
    }

    #[test]
    fn test_value_from_json() {
        assert_eq!(LEVEL.value_from_json(&serde_json::json!(2.5)).unwrap(), 2.5);
        assert!(MODE.value_from_json(&serde_json::json!("on")).unwrap());
        assert!(matches!(
            ARM.value_from_json(&serde_json::json!(300)),
            Err(DaqError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_named_field() {
        let reply = "MTIME 0.20,FRUN ON\nTOUT 25.5";
        assert_eq!(named_field(reply, "MTIME"), Some("0.20"));
        assert_eq!(named_field(reply, "FRUN"), Some("ON"));
        assert_eq!(named_field(reply, "TOUT"), Some("25.5"));
        assert_eq!(named_field(reply, "TOU"), None);
        assert_eq!(named_field(reply, "MSR"), None);
        assert_eq!(reply_fields(reply).count(), 3);
    }

    #[tokio::test]
    async fn test_channel_get_set() {
        let channel = Channel(MockTransport::with_replies(["LEV 1.25"]));
        assert_eq!(channel.get(&LEVEL).await.unwrap(), 1.25);
        channel.set(&LEVEL, 4.0).await.unwrap();
        assert_eq!(channel.0.writes(), vec!["LEV?", "LEV 4"]);
    }

    #[tokio::test]
    async fn test_rejected_set_writes_nothing() {
        let channel = Channel(MockTransport::new());
        let err = channel.set(&LEVEL, 6.0).await.unwrap_err();
        assert!(matches!(kind(&err), Some(DaqError::InvalidValue { .. })));
        let err = channel.get(&ARM).await.unwrap_err();
        assert!(matches!(kind(&err), Some(DaqError::WriteOnly(_))));
        assert!(channel.0.writes().is_empty());
    }
}
