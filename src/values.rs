//! Typed array payloads for variable writes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Element type of a variable, as stored on disk.
///
/// `Str` exists so string variables can be declared and so the compression
/// policy has a non-numeric case to act on; array payloads themselves are
/// numeric-only (see [`Values`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Str,
}

impl DType {
    /// Whether values of this type are numbers. Compression is only ever
    /// requested for numeric variables.
    pub fn is_numeric(self) -> bool {
        !matches!(self, DType::Str)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DType::I8 => "i8",
            DType::U8 => "u8",
            DType::I16 => "i16",
            DType::U16 => "u16",
            DType::I32 => "i32",
            DType::U32 => "u32",
            DType::I64 => "i64",
            DType::U64 => "u64",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::Str => "string",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A flat, type-tagged array payload.
///
/// Carries the in-memory values handed to a variable write or append. The
/// handle reconciles the payload length with the variable's declared
/// dimensions; multi-dimensional data is passed flattened in row-major
/// order, the layout the underlying library expects.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Values {
    /// The element type, used for dtype inference when a write gives no
    /// explicit one.
    pub fn dtype(&self) -> DType {
        match self {
            Values::I8(_) => DType::I8,
            Values::U8(_) => DType::U8,
            Values::I16(_) => DType::I16,
            Values::U16(_) => DType::U16,
            Values::I32(_) => DType::I32,
            Values::U32(_) => DType::U32,
            Values::I64(_) => DType::I64,
            Values::U64(_) => DType::U64,
            Values::F32(_) => DType::F32,
            Values::F64(_) => DType::F64,
        }
    }

    /// Number of elements in the payload.
    pub fn len(&self) -> usize {
        match self {
            Values::I8(v) => v.len(),
            Values::U8(v) => v.len(),
            Values::I16(v) => v.len(),
            Values::U16(v) => v.len(),
            Values::I32(v) => v.len(),
            Values::U32(v) => v.len(),
            Values::I64(v) => v.len(),
            Values::U64(v) => v.len(),
            Values::F32(v) => v.len(),
            Values::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<i8>> for Values {
    fn from(v: Vec<i8>) -> Self {
        Values::I8(v)
    }
}

impl From<Vec<u8>> for Values {
    fn from(v: Vec<u8>) -> Self {
        Values::U8(v)
    }
}

impl From<Vec<i16>> for Values {
    fn from(v: Vec<i16>) -> Self {
        Values::I16(v)
    }
}

impl From<Vec<u16>> for Values {
    fn from(v: Vec<u16>) -> Self {
        Values::U16(v)
    }
}

impl From<Vec<i32>> for Values {
    fn from(v: Vec<i32>) -> Self {
        Values::I32(v)
    }
}

impl From<Vec<u32>> for Values {
    fn from(v: Vec<u32>) -> Self {
        Values::U32(v)
    }
}

impl From<Vec<i64>> for Values {
    fn from(v: Vec<i64>) -> Self {
        Values::I64(v)
    }
}

impl From<Vec<u64>> for Values {
    fn from(v: Vec<u64>) -> Self {
        Values::U64(v)
    }
}

impl From<Vec<f32>> for Values {
    fn from(v: Vec<f32>) -> Self {
        Values::F32(v)
    }
}

impl From<Vec<f64>> for Values {
    fn from(v: Vec<f64>) -> Self {
        Values::F64(v)
    }
}
