//! Fixed-width ASCII-hex encoding of MeCom fields.
//!
//! Every numeric field on the wire is uppercase hexadecimal, zero padded to
//! its field width:
//!
//! | Field        | Width | Encoding                                   |
//! |--------------|-------|--------------------------------------------|
//! | address      | 2     | `u8`                                       |
//! | sequence     | 4     | `u16`                                      |
//! | parameter id | 4     | `u16`                                      |
//! | instance     | 2     | `u8`                                       |
//! | value        | 8     | `i32` two's complement, or `f32` bits      |
//!
//! Floats are sent as their IEEE-754 binary32 bit pattern, most significant
//! byte first (`f32::to_bits` rendered as 8 hex digits). The same order is
//! used in both directions.

use tec_core::error::{TecError, TecResult};

/// Width of the parameter id and sequence fields.
pub const PARAM_ID_WIDTH: usize = 4;

/// Width of the instance field.
pub const INSTANCE_WIDTH: usize = 2;

/// Width of a 32-bit value field.
pub const VALUE_WIDTH: usize = 8;

/// How a register's 32-bit value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Signed 32-bit integer
    Int32,
    /// IEEE-754 binary32
    Float32,
}

/// A decoded 32-bit register value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Signed 32-bit integer
    Int32(i32),
    /// IEEE-754 binary32
    Float32(f32),
}

impl Value {
    /// Kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int32(_) => ValueKind::Int32,
            Self::Float32(_) => ValueKind::Float32,
        }
    }

    /// 8-digit wire encoding
    pub fn encode(&self) -> String {
        match *self {
            Self::Int32(v) => encode_int32(v),
            Self::Float32(v) => encode_float32(v),
        }
    }

    /// Decode an 8-digit payload as the given kind
    pub fn decode(kind: ValueKind, hex: &str) -> TecResult<Self> {
        match kind {
            ValueKind::Int32 => decode_int32(hex).map(Self::Int32),
            ValueKind::Float32 => decode_float32(hex).map(Self::Float32),
        }
    }

    /// Numeric value widened to `f64`
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Int32(v) => f64::from(v),
            Self::Float32(v) => f64::from(v),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int32(v) => write!(f, "{}", v),
            Self::Float32(v) => write!(f, "{}", v),
        }
    }
}

/// Two-digit device address field.
pub fn encode_address(address: u8) -> String {
    format!("{:02X}", address)
}

/// Four-digit field used for parameter ids and sequence numbers.
pub fn encode_param_id(id: u16) -> String {
    format!("{:04X}", id)
}

/// Two-digit instance field.
pub fn encode_instance(instance: u8) -> String {
    format!("{:02X}", instance)
}

/// Eight-digit two's-complement encoding of an `i32`.
pub fn encode_int32(value: i32) -> String {
    format!("{:08X}", value)
}

/// Decode an eight-digit field into an `i32` (two's complement).
pub fn decode_int32(hex: &str) -> TecResult<i32> {
    parse_u32_field(hex).map(|bits| bits as i32)
}

/// Eight-digit encoding of the IEEE-754 bit pattern of an `f32`.
pub fn encode_float32(value: f32) -> String {
    format!("{:08X}", value.to_bits())
}

/// Decode an eight-digit IEEE-754 bit pattern into an `f32`.
pub fn decode_float32(hex: &str) -> TecResult<f32> {
    parse_u32_field(hex).map(f32::from_bits)
}

/// Whether `b` belongs to the protocol's hex alphabet (no lowercase).
pub fn is_upper_hex(b: u8) -> bool {
    matches!(b, b'0'..=b'9' | b'A'..=b'F')
}

fn parse_u32_field(hex: &str) -> TecResult<u32> {
    if hex.len() != VALUE_WIDTH {
        return Err(TecError::Decode(format!(
            "expected {} hex digits, got {:?}",
            VALUE_WIDTH, hex
        )));
    }
    if !hex.bytes().all(is_upper_hex) {
        return Err(TecError::Decode(format!(
            "value {:?} is not uppercase hexadecimal",
            hex
        )));
    }
    u32::from_str_radix(hex, 16).map_err(|e| TecError::Decode(format!("{}: {:?}", e, hex)))
}
