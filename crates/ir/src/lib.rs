//! RegBridge register map model
//!
//! This crate defines the serializable description of a hardware register map as the user
//! authors it. The model is deliberately thin: bit layout, access-mode meaning and reset
//! semantics belong to the external generator library, so fields such as the access tag and
//! the bit-range specifier are carried as text and passed through unmodified.
//!
//! A map reaches the generator in exactly one canonical textual form, produced by
//! [`RegisterMapConfig::to_canonical_json`]. Uploaded files bypass this crate entirely and are
//! handed over as opaque text.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod example;

fn default_width() -> u32 {
    32
}

/// The top-level description of a register map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMapConfig {
    /// Name of the register map (used by generators for module/prefix names).
    #[serde(default)]
    pub name: String,

    /// Absolute base address of the map.
    #[serde(default)]
    pub base_address: u64,

    /// Value returned when reading an unmapped address, if the generator supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_filler: Option<u64>,

    /// Width of the data bus in bits.
    #[serde(default = "default_width")]
    pub data_width: u32,

    /// Width of the address bus in bits.
    #[serde(default = "default_width")]
    pub address_width: u32,

    /// Registers in declaration order.
    #[serde(default)]
    pub registers: Vec<Register>,
}

/// A single addressable register.
///
/// Name uniqueness within a map is enforced by the generator library, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    /// Register name (e.g. "CTRL").
    pub name: String,

    /// Offset of the register relative to the map base address.
    #[serde(default)]
    pub address: u64,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// Value of the register after reset.
    #[serde(default, rename = "reset")]
    pub reset_value: u64,

    /// Bit-fields in declaration order.
    #[serde(default)]
    pub fields: Vec<Field>,
}

/// A named bit-range within a register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field name (e.g. "EN").
    pub name: String,

    /// Bit-range specifier: a single index ("4") or an inclusive "high:low" range ("7:0").
    pub bits: String,

    /// Access-mode tag in the generator library's vocabulary ("rw", "ro", "rw1c", ...).
    pub access: String,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Optional enumerated values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enums: Vec<EnumValue>,
}

/// One named value of an enumerated field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    /// Enumerator name.
    pub name: String,

    /// Numeric value.
    pub value: u64,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A parsed bit-range specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitRange {
    /// Most significant bit (inclusive).
    pub high: u32,
    /// Least significant bit (inclusive).
    pub low: u32,
}

/// Error returned when a bit-range specifier cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitRangeError {
    /// A bound is not a decimal integer.
    #[error("invalid bit index '{0}'")]
    InvalidIndex(String),
    /// `high` is lower than `low`.
    #[error("bit range {high}:{low} is inverted")]
    Inverted {
        /// Upper bound as written.
        high: u32,
        /// Lower bound as written.
        low: u32,
    },
}

impl BitRange {
    /// Range covering a single bit.
    pub fn single(bit: u32) -> Self {
        Self {
            high: bit,
            low: bit,
        }
    }

    /// Parses "N" or "H:L".
    pub fn parse(spec: &str) -> Result<Self, BitRangeError> {
        let index = |s: &str| {
            s.trim()
                .parse::<u32>()
                .map_err(|_| BitRangeError::InvalidIndex(s.trim().to_string()))
        };

        match spec.split_once(':') {
            None => Ok(Self::single(index(spec)?)),
            Some((h, l)) => {
                let (high, low) = (index(h)?, index(l)?);
                if high < low {
                    return Err(BitRangeError::Inverted { high, low });
                }
                Ok(Self { high, low })
            }
        }
    }

    /// Number of bits covered.
    pub fn width(&self) -> u64 {
        u64::from(self.high) - u64::from(self.low) + 1
    }
}

impl fmt::Display for BitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.high == self.low {
            write!(f, "{}", self.low)
        } else {
            write!(f, "{}:{}", self.high, self.low)
        }
    }
}

impl RegisterMapConfig {
    /// Creates an empty map with the default 32-bit bus widths.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_address: 0,
            read_filler: None,
            data_width: default_width(),
            address_width: default_width(),
            registers: Vec::new(),
        }
    }

    /// Sets the base address.
    pub fn with_base_address(mut self, base_address: u64) -> Self {
        self.base_address = base_address;
        self
    }

    /// Sets the read filler value.
    pub fn with_read_filler(mut self, read_filler: u64) -> Self {
        self.read_filler = Some(read_filler);
        self
    }

    /// Appends a register.
    pub fn with_register(mut self, register: Register) -> Self {
        self.registers.push(register);
        self
    }

    /// The single textual form handed to the generator (compact JSON).
    pub fn to_canonical_json(&self) -> String {
        // Plain data with string keys; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Human-oriented form, two-space indented.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

impl Register {
    /// Creates a register at `address` with no fields.
    pub fn new(name: impl Into<String>, address: u64) -> Self {
        Self {
            name: name.into(),
            address,
            description: String::new(),
            reset_value: 0,
            fields: Vec::new(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the reset value.
    pub fn with_reset(mut self, reset_value: u64) -> Self {
        self.reset_value = reset_value;
        self
    }

    /// Appends a field.
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }
}

impl Field {
    /// Creates a field from a bit-range specifier and an access tag.
    pub fn new(
        name: impl Into<String>,
        bits: impl Into<String>,
        access: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            bits: bits.into(),
            access: access.into(),
            description: None,
            enums: Vec::new(),
        }
    }

    /// Creates a field from a parsed range.
    pub fn with_range(name: impl Into<String>, range: BitRange, access: impl Into<String>) -> Self {
        Self::new(name, range.to_string(), access)
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends an enumerated value.
    pub fn with_enum(mut self, name: impl Into<String>, value: u64) -> Self {
        self.enums.push(EnumValue {
            name: name.into(),
            value,
            description: None,
        });
        self
    }

    /// Parses the bit-range specifier.
    pub fn range(&self) -> Result<BitRange, BitRangeError> {
        BitRange::parse(&self.bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_range_parsing() {
        assert_eq!(BitRange::parse("4").unwrap(), BitRange::single(4));
        let r = BitRange::parse("7:0").unwrap();
        assert_eq!((r.high, r.low, r.width()), (7, 0, 8));
        assert_eq!(r.to_string(), "7:0");
        assert_eq!(BitRange::single(3).to_string(), "3");
        assert!(matches!(
            BitRange::parse("0:7"),
            Err(BitRangeError::Inverted { high: 0, low: 7 })
        ));
        assert!(matches!(
            BitRange::parse("a:0"),
            Err(BitRangeError::InvalidIndex(_))
        ));
    }

    #[test]
    fn test_full_u32_range_width() {
        let r = BitRange::parse("4294967295:0").unwrap();
        assert_eq!(r.width(), 1 << 32);
        assert_eq!(BitRange::single(u32::MAX).width(), 1);
    }

    #[test]
    fn test_canonical_json_shape() {
        let field = Field::new("EN", "0", "rw");
        let map = RegisterMapConfig::new("uart")
            .with_register(Register::new("CTRL", 0).with_field(field));
        let json: serde_json::Value = serde_json::from_str(&map.to_canonical_json()).unwrap();

        assert_eq!(json["name"], "uart");
        assert_eq!(json["data_width"], 32);
        assert_eq!(json["registers"][0]["name"], "CTRL");
        assert_eq!(json["registers"][0]["reset"], 0);
        assert_eq!(json["registers"][0]["fields"][0]["bits"], "0");
        // Empty optionals are omitted rather than serialized as null.
        assert!(json["registers"][0]["fields"][0].get("enums").is_none());
        assert!(json.get("read_filler").is_none());
    }

    #[test]
    fn test_minimal_upload_deserializes_with_defaults() {
        let text = concat!(
            r#"{"registers":[{"name":"CTRL","address":0,"#,
            r#""fields":[{"name":"EN","bits":"0","access":"RW"}]}]}"#,
        );
        let map: RegisterMapConfig = serde_json::from_str(text).unwrap();
        assert_eq!(map.address_width, 32);
        assert_eq!(map.registers[0].fields[0].access, "RW");
        assert_eq!(map.registers[0].fields[0].range().unwrap().width(), 1);
    }
}
