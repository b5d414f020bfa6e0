//! Element data types with explicit byte order.
//!
//! Array and sparse payloads are kept as raw bytes in the byte order declared
//! by their [`DType`]; codecs that need individual values (JSON, CSV) go
//! through [`DType::decode`] and [`DType::encode`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while parsing or using a dtype.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DTypeError {
    #[error("invalid dtype string '{0}'")]
    InvalidFormat(String),

    #[error("unsupported dtype: {kind:?} with itemsize {itemsize}")]
    Unsupported { kind: DTypeKind, itemsize: usize },

    #[error("value {value} cannot be stored as {dtype}")]
    OutOfRange { value: String, dtype: String },
}

/// Numeric kind of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DTypeKind {
    Bool,
    Int,
    UInt,
    Float,
}

impl DTypeKind {
    fn code(&self) -> char {
        match self {
            DTypeKind::Bool => 'b',
            DTypeKind::Int => 'i',
            DTypeKind::UInt => 'u',
            DTypeKind::Float => 'f',
        }
    }
}

/// Byte order of multi-byte elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    Little,
    Big,
    NotApplicable,
}

impl Endianness {
    fn code(&self) -> char {
        match self {
            Endianness::Little => '<',
            Endianness::Big => '>',
            Endianness::NotApplicable => '|',
        }
    }
}

/// Semantic descriptor of an array element: kind, width and byte order.
///
/// Serialized in the numpy array-interface form, e.g. `<f8` or `|u1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DType {
    kind: DTypeKind,
    itemsize: usize,
    endianness: Endianness,
}

/// A single decoded element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Scalar {
    /// Convert to a JSON value. Non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match *self {
            Scalar::Bool(b) => serde_json::Value::Bool(b),
            Scalar::Int(i) => serde_json::Value::from(i),
            Scalar::UInt(u) => serde_json::Value::from(u),
            Scalar::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        }
    }

    /// Lossy view as f64, used for comparisons.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Scalar::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Scalar::Int(i) => i as f64,
            Scalar::UInt(u) => u as f64,
            Scalar::Float(f) => f,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::UInt(u) => write!(f, "{}", u),
            Scalar::Float(v) => write!(f, "{}", v),
        }
    }
}

impl DType {
    /// Create a dtype, rejecting combinations that have no element layout.
    pub fn new(kind: DTypeKind, itemsize: usize, endianness: Endianness) -> Result<Self, DTypeError> {
        let valid = match kind {
            DTypeKind::Bool => itemsize == 1,
            DTypeKind::Int | DTypeKind::UInt => matches!(itemsize, 1 | 2 | 4 | 8),
            DTypeKind::Float => matches!(itemsize, 4 | 8),
        };
        if !valid {
            return Err(DTypeError::Unsupported { kind, itemsize });
        }

        // Single-byte elements have no byte order.
        let endianness = if itemsize == 1 {
            Endianness::NotApplicable
        } else if endianness == Endianness::NotApplicable {
            Endianness::Little
        } else {
            endianness
        };

        Ok(Self {
            kind,
            itemsize,
            endianness,
        })
    }

    fn native(kind: DTypeKind, itemsize: usize) -> Self {
        let endianness = if itemsize == 1 {
            Endianness::NotApplicable
        } else {
            Endianness::Little
        };
        Self {
            kind,
            itemsize,
            endianness,
        }
    }

    pub fn bool() -> Self {
        Self::native(DTypeKind::Bool, 1)
    }

    pub fn u8() -> Self {
        Self::native(DTypeKind::UInt, 1)
    }

    pub fn u16() -> Self {
        Self::native(DTypeKind::UInt, 2)
    }

    pub fn i32() -> Self {
        Self::native(DTypeKind::Int, 4)
    }

    pub fn i64() -> Self {
        Self::native(DTypeKind::Int, 8)
    }

    pub fn f32() -> Self {
        Self::native(DTypeKind::Float, 4)
    }

    pub fn f64() -> Self {
        Self::native(DTypeKind::Float, 8)
    }

    pub fn kind(&self) -> DTypeKind {
        self.kind
    }

    pub fn itemsize(&self) -> usize {
        self.itemsize
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Same dtype with a different byte order.
    pub fn with_endianness(&self, endianness: Endianness) -> Self {
        Self::new(self.kind, self.itemsize, endianness).unwrap_or(*self)
    }

    /// Decode one element. `bytes` must be exactly `itemsize` long.
    pub fn decode(&self, bytes: &[u8]) -> Scalar {
        let mut buf = [0u8; 8];
        let n = self.itemsize.min(bytes.len()).min(8);
        buf[..n].copy_from_slice(&bytes[..n]);
        let big = self.endianness == Endianness::Big;

        match (self.kind, self.itemsize) {
            (DTypeKind::Bool, _) => Scalar::Bool(buf[0] != 0),
            (DTypeKind::UInt, 1) => Scalar::UInt(buf[0] as u64),
            (DTypeKind::Int, 1) => Scalar::Int(buf[0] as i8 as i64),
            (DTypeKind::UInt, 2) => {
                let b = [buf[0], buf[1]];
                Scalar::UInt((if big { u16::from_be_bytes(b) } else { u16::from_le_bytes(b) }) as u64)
            }
            (DTypeKind::Int, 2) => {
                let b = [buf[0], buf[1]];
                Scalar::Int((if big { i16::from_be_bytes(b) } else { i16::from_le_bytes(b) }) as i64)
            }
            (DTypeKind::UInt, 4) => {
                let b = [buf[0], buf[1], buf[2], buf[3]];
                Scalar::UInt((if big { u32::from_be_bytes(b) } else { u32::from_le_bytes(b) }) as u64)
            }
            (DTypeKind::Int, 4) => {
                let b = [buf[0], buf[1], buf[2], buf[3]];
                Scalar::Int((if big { i32::from_be_bytes(b) } else { i32::from_le_bytes(b) }) as i64)
            }
            (DTypeKind::Float, 4) => {
                let b = [buf[0], buf[1], buf[2], buf[3]];
                Scalar::Float((if big { f32::from_be_bytes(b) } else { f32::from_le_bytes(b) }) as f64)
            }
            (DTypeKind::UInt, _) => {
                Scalar::UInt(if big { u64::from_be_bytes(buf) } else { u64::from_le_bytes(buf) })
            }
            (DTypeKind::Int, _) => {
                Scalar::Int(if big { i64::from_be_bytes(buf) } else { i64::from_le_bytes(buf) })
            }
            (DTypeKind::Float, _) => {
                Scalar::Float(if big { f64::from_be_bytes(buf) } else { f64::from_le_bytes(buf) })
            }
        }
    }

    /// Encode one element and append it to `out`.
    pub fn encode(&self, value: Scalar, out: &mut Vec<u8>) -> Result<(), DTypeError> {
        let out_of_range = || DTypeError::OutOfRange {
            value: value.to_string(),
            dtype: self.to_string(),
        };
        let big = self.endianness == Endianness::Big;

        macro_rules! put {
            ($v:expr) => {{
                let v = $v;
                if big {
                    out.extend_from_slice(&v.to_be_bytes());
                } else {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }};
        }

        match (self.kind, self.itemsize) {
            (DTypeKind::Bool, _) => {
                let b = match value {
                    Scalar::Bool(b) => b,
                    Scalar::Int(i) => i != 0,
                    Scalar::UInt(u) => u != 0,
                    Scalar::Float(_) => return Err(out_of_range()),
                };
                out.push(b as u8);
            }
            (DTypeKind::Float, 4) => put!(value.as_f64() as f32),
            (DTypeKind::Float, _) => put!(value.as_f64()),
            (DTypeKind::Int, size) => {
                let i: i64 = match value {
                    Scalar::Int(i) => i,
                    Scalar::UInt(u) => i64::try_from(u).map_err(|_| out_of_range())?,
                    Scalar::Bool(b) => b as i64,
                    Scalar::Float(_) => return Err(out_of_range()),
                };
                match size {
                    1 => put!(i8::try_from(i).map_err(|_| out_of_range())?),
                    2 => put!(i16::try_from(i).map_err(|_| out_of_range())?),
                    4 => put!(i32::try_from(i).map_err(|_| out_of_range())?),
                    _ => put!(i),
                }
            }
            (DTypeKind::UInt, size) => {
                let u: u64 = match value {
                    Scalar::UInt(u) => u,
                    Scalar::Int(i) => u64::try_from(i).map_err(|_| out_of_range())?,
                    Scalar::Bool(b) => b as u64,
                    Scalar::Float(_) => return Err(out_of_range()),
                };
                match size {
                    1 => put!(u8::try_from(u).map_err(|_| out_of_range())?),
                    2 => put!(u16::try_from(u).map_err(|_| out_of_range())?),
                    4 => put!(u32::try_from(u).map_err(|_| out_of_range())?),
                    _ => put!(u),
                }
            }
        }
        Ok(())
    }

    /// Convert a JSON value into a scalar of this dtype's kind.
    pub fn scalar_from_json(&self, value: &serde_json::Value) -> Option<Scalar> {
        match self.kind {
            DTypeKind::Bool => value.as_bool().map(Scalar::Bool),
            DTypeKind::Int => value.as_i64().map(Scalar::Int),
            DTypeKind::UInt => value.as_u64().map(Scalar::UInt),
            DTypeKind::Float => {
                if value.is_null() {
                    Some(Scalar::Float(f64::NAN))
                } else {
                    value.as_f64().map(Scalar::Float)
                }
            }
        }
    }

    /// Parse a textual element (CSV cells).
    pub fn scalar_from_str(&self, text: &str) -> Option<Scalar> {
        let text = text.trim();
        match self.kind {
            DTypeKind::Bool => match text {
                "true" | "True" | "1" => Some(Scalar::Bool(true)),
                "false" | "False" | "0" => Some(Scalar::Bool(false)),
                _ => None,
            },
            DTypeKind::Int => text.parse().ok().map(Scalar::Int),
            DTypeKind::UInt => text.parse().ok().map(Scalar::UInt),
            DTypeKind::Float => text.parse().ok().map(Scalar::Float),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.endianness.code(),
            self.kind.code(),
            self.itemsize
        )
    }
}

impl FromStr for DType {
    type Err = DTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DTypeError::InvalidFormat(s.to_string());
        let mut chars = s.chars();

        let endianness = match chars.next().ok_or_else(invalid)? {
            '<' => Endianness::Little,
            '>' => Endianness::Big,
            '|' => Endianness::NotApplicable,
            '=' => Endianness::Little,
            _ => return Err(invalid()),
        };
        let kind = match chars.next().ok_or_else(invalid)? {
            'b' => DTypeKind::Bool,
            'i' => DTypeKind::Int,
            'u' => DTypeKind::UInt,
            'f' => DTypeKind::Float,
            _ => return Err(invalid()),
        };
        let itemsize: usize = chars.as_str().parse().map_err(|_| invalid())?;

        DType::new(kind, itemsize, endianness)
    }
}

impl TryFrom<String> for DType {
    type Error = DTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DType> for String {
    fn from(value: DType) -> Self {
        value.to_string()
    }
}

/// Column type of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Bool,
    Int64,
    Float64,
    Utf8,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Bool => "bool",
            ColumnType::Int64 => "int64",
            ColumnType::Float64 => "float64",
            ColumnType::Utf8 => "utf8",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(ColumnType::Bool),
            "int64" => Some(ColumnType::Int64),
            "float64" => Some(ColumnType::Float64),
            "utf8" => Some(ColumnType::Utf8),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_string_roundtrip() {
        for s in ["<f8", ">i4", "|u1", "|b1", "<u2", ">f4"] {
            let dtype: DType = s.parse().unwrap();
            assert_eq!(dtype.to_string(), s);
        }
    }

    #[test]
    fn test_single_byte_has_no_byte_order() {
        let dtype = DType::new(DTypeKind::UInt, 1, Endianness::Big).unwrap();
        assert_eq!(dtype.endianness(), Endianness::NotApplicable);
        assert_eq!(dtype.to_string(), "|u1");
    }

    #[test]
    fn test_invalid_dtype() {
        assert!("f8".parse::<DType>().is_err());
        assert!("<x8".parse::<DType>().is_err());
        assert!("<f2".parse::<DType>().is_err());
        assert!("|b2".parse::<DType>().is_err());
    }

    #[test]
    fn test_encode_decode_respects_byte_order() {
        let big = DType::new(DTypeKind::Int, 4, Endianness::Big).unwrap();
        let mut out = Vec::new();
        big.encode(Scalar::Int(1), &mut out).unwrap();
        assert_eq!(out, vec![0, 0, 0, 1]);
        assert_eq!(big.decode(&out), Scalar::Int(1));

        let little = DType::i32();
        let mut out = Vec::new();
        little.encode(Scalar::Int(-2), &mut out).unwrap();
        assert_eq!(out, (-2i32).to_le_bytes().to_vec());
        assert_eq!(little.decode(&out), Scalar::Int(-2));
    }

    #[test]
    fn test_encode_out_of_range() {
        let mut out = Vec::new();
        assert!(DType::u8().encode(Scalar::Int(300), &mut out).is_err());
        assert!(DType::u8().encode(Scalar::Int(-1), &mut out).is_err());
    }

    #[test]
    fn test_float_roundtrip() {
        let mut out = Vec::new();
        DType::f64().encode(Scalar::Float(1.5), &mut out).unwrap();
        assert_eq!(DType::f64().decode(&out), Scalar::Float(1.5));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&DType::f64()).unwrap();
        assert_eq!(json, "\"<f8\"");
        let back: DType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DType::f64());
    }

    #[test]
    fn test_column_type_names() {
        assert_eq!(ColumnType::from_name("float64"), Some(ColumnType::Float64));
        assert_eq!(ColumnType::Utf8.as_str(), "utf8");
        assert_eq!(ColumnType::from_name("decimal"), None);
    }
}
