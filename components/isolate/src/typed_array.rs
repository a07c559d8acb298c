//! Binary view kinds and element conversion.
//!
//! The storage itself lives in the heap (an ArrayBuffer object owns its
//! bytes, views point at the buffer object); this module knows how to read
//! and write individual elements for every view kind.

use crate::value::Value;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Largest ArrayBuffer the heap will allocate (2GB - 1).
pub const MAX_ARRAY_BUFFER_LENGTH: usize = 2_147_483_647;

/// Concrete binary view kind.
///
/// Resolved once when a view is created; every other component dispatches
/// on this closed set instead of inspecting prototypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewKind {
    /// 8-bit signed integer
    Int8,
    /// 8-bit unsigned integer
    Uint8,
    /// 8-bit unsigned integer (clamped)
    Uint8Clamped,
    /// 16-bit signed integer
    Int16,
    /// 16-bit unsigned integer
    Uint16,
    /// 32-bit signed integer
    Int32,
    /// 32-bit unsigned integer
    Uint32,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// 64-bit signed BigInt
    BigInt64,
    /// 64-bit unsigned BigInt
    BigUint64,
    /// Untyped DataView over arbitrary byte ranges
    DataView,
}

impl ViewKind {
    /// Every view kind, in intrinsic table order.
    pub const ALL: [ViewKind; 12] = [
        ViewKind::Int8,
        ViewKind::Uint8,
        ViewKind::Uint8Clamped,
        ViewKind::Int16,
        ViewKind::Uint16,
        ViewKind::Int32,
        ViewKind::Uint32,
        ViewKind::Float32,
        ViewKind::Float64,
        ViewKind::BigInt64,
        ViewKind::BigUint64,
        ViewKind::DataView,
    ];

    /// Position in [`ViewKind::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Get the byte size of each element for this kind (1 for DataView)
    pub fn element_width(self) -> usize {
        match self {
            ViewKind::Int8 | ViewKind::Uint8 | ViewKind::Uint8Clamped | ViewKind::DataView => 1,
            ViewKind::Int16 | ViewKind::Uint16 => 2,
            ViewKind::Int32 | ViewKind::Uint32 | ViewKind::Float32 => 4,
            ViewKind::Float64 | ViewKind::BigInt64 | ViewKind::BigUint64 => 8,
        }
    }

    /// Get the constructor name of this kind
    pub fn name(self) -> &'static str {
        match self {
            ViewKind::Int8 => "Int8Array",
            ViewKind::Uint8 => "Uint8Array",
            ViewKind::Uint8Clamped => "Uint8ClampedArray",
            ViewKind::Int16 => "Int16Array",
            ViewKind::Uint16 => "Uint16Array",
            ViewKind::Int32 => "Int32Array",
            ViewKind::Uint32 => "Uint32Array",
            ViewKind::Float32 => "Float32Array",
            ViewKind::Float64 => "Float64Array",
            ViewKind::BigInt64 => "BigInt64Array",
            ViewKind::BigUint64 => "BigUint64Array",
            ViewKind::DataView => "DataView",
        }
    }

    /// Look a kind up by constructor name.
    pub fn from_name(name: &str) -> Option<ViewKind> {
        ViewKind::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    /// Whether elements are BigInts.
    pub fn is_bigint(self) -> bool {
        matches!(self, ViewKind::BigInt64 | ViewKind::BigUint64)
    }

    /// Whether this is an indexed typed array (everything but DataView).
    pub fn is_typed_array(self) -> bool {
        self != ViewKind::DataView
    }
}

/// Reason an element write was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementError {
    /// A BigInt array was given a non-BigInt, or the reverse.
    BigIntMismatch,
    /// DataView has no indexed elements.
    NotIndexed,
}

/// Decode one element from exactly `kind.element_width()` bytes.
pub fn read_element(kind: ViewKind, bytes: &[u8]) -> Value {
    let mut raw = [0u8; 8];
    raw[..bytes.len()].copy_from_slice(bytes);
    match kind {
        ViewKind::Int8 => Value::Number(bytes[0] as i8 as f64),
        ViewKind::Uint8 | ViewKind::Uint8Clamped | ViewKind::DataView => {
            Value::Number(bytes[0] as f64)
        }
        ViewKind::Int16 => Value::Number(i16::from_ne_bytes([raw[0], raw[1]]) as f64),
        ViewKind::Uint16 => Value::Number(u16::from_ne_bytes([raw[0], raw[1]]) as f64),
        ViewKind::Int32 => {
            Value::Number(i32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64)
        }
        ViewKind::Uint32 => {
            Value::Number(u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64)
        }
        ViewKind::Float32 => {
            Value::Number(f32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64)
        }
        ViewKind::Float64 => Value::Number(f64::from_ne_bytes(raw)),
        ViewKind::BigInt64 => Value::BigInt(BigInt::from(i64::from_ne_bytes(raw))),
        ViewKind::BigUint64 => Value::BigInt(BigInt::from(u64::from_ne_bytes(raw))),
    }
}

/// Encode one element into `out`, which is `kind.element_width()` long.
pub fn write_element(kind: ViewKind, value: &Value, out: &mut [u8]) -> Result<(), ElementError> {
    if kind == ViewKind::DataView {
        return Err(ElementError::NotIndexed);
    }
    if kind.is_bigint() {
        let Value::BigInt(n) = value else {
            return Err(ElementError::BigIntMismatch);
        };
        let low = bigint_low_u64(n);
        out.copy_from_slice(&low.to_ne_bytes());
        return Ok(());
    }
    let n = to_number(value).ok_or(ElementError::BigIntMismatch)?;
    match kind {
        ViewKind::Int8 => out[0] = modulo_int(n, 8) as u8,
        ViewKind::Uint8 => out[0] = modulo_int(n, 8) as u8,
        ViewKind::Uint8Clamped => out[0] = clamp_u8(n),
        ViewKind::Int16 | ViewKind::Uint16 => {
            out.copy_from_slice(&(modulo_int(n, 16) as u16).to_ne_bytes())
        }
        ViewKind::Int32 | ViewKind::Uint32 => {
            out.copy_from_slice(&(modulo_int(n, 32) as u32).to_ne_bytes())
        }
        ViewKind::Float32 => out.copy_from_slice(&(n as f32).to_ne_bytes()),
        ViewKind::Float64 => out.copy_from_slice(&n.to_ne_bytes()),
        ViewKind::BigInt64 | ViewKind::BigUint64 | ViewKind::DataView => unreachable!(),
    }
    Ok(())
}

/// ToNumber for primitives; `None` for BigInt (mixing is a TypeError).
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Undefined => Some(f64::NAN),
        Value::Null => Some(0.0),
        Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => Some(*n),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                Some(trimmed.parse::<f64>().unwrap_or(f64::NAN))
            }
        }
        Value::BigInt(_) => None,
        Value::Object(_) => Some(f64::NAN),
    }
}

/// The low `bits` of ToInteger(n), as the modular integer conversions do.
fn modulo_int(n: f64, bits: u32) -> u64 {
    if !n.is_finite() {
        return 0;
    }
    let modulus = 2f64.powi(bits as i32);
    let wrapped = n.trunc().rem_euclid(modulus);
    wrapped as u64
}

fn clamp_u8(n: f64) -> u8 {
    if n.is_nan() || n <= 0.0 {
        0
    } else if n >= 255.0 {
        255
    } else {
        // Round half to even.
        let floor = n.floor();
        let diff = n - floor;
        let rounded = if diff > 0.5 || (diff == 0.5 && floor % 2.0 != 0.0) {
            floor + 1.0
        } else {
            floor
        };
        rounded as u8
    }
}

fn bigint_low_u64(n: &BigInt) -> u64 {
    let mask = BigInt::from(u64::MAX);
    (n & mask).to_u64().unwrap_or(0)
}
