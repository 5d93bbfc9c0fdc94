//! Attribute values and the attribute mapping.
//!
//! NetCDF attributes are dynamically typed scalars or strings. This module
//! provides the tagged value type the handle stores pending attributes in,
//! plus conversions to and from the underlying library's attribute type.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Attribute mapping, keyed by attribute name.
///
/// Sorted keys give deterministic iteration when the pending map is written
/// out at flush time.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// A single attribute value: a string or a numeric scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Str(String),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl AttrValue {
    /// Numeric view of the value, if it has one.
    ///
    /// Used when an attribute entry doubles as an encoding input (fill
    /// values arrive through the attribute map and must match the
    /// variable's element type, not the attribute's own tag).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Str(_) => None,
            AttrValue::I32(v) => Some(f64::from(*v)),
            AttrValue::I64(v) => Some(*v as f64),
            AttrValue::F32(v) => Some(f64::from(*v)),
            AttrValue::F64(v) => Some(*v),
        }
    }

    /// Integer view of the value, truncating floats.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Str(_) => None,
            AttrValue::I32(v) => Some(i64::from(*v)),
            AttrValue::I64(v) => Some(*v),
            AttrValue::F32(v) => Some(*v as i64),
            AttrValue::F64(v) => Some(*v as i64),
        }
    }

    /// Convert a value read back from the underlying library.
    ///
    /// Returns `None` for array-valued attributes, which the handle does not
    /// model (the original interface only ever stores scalars and strings).
    pub fn from_nc(value: &netcdf::AttributeValue) -> Option<Self> {
        use netcdf::AttributeValue as Nc;
        match value {
            Nc::Schar(v) => Some(AttrValue::I32(i32::from(*v))),
            Nc::Uchar(v) => Some(AttrValue::I32(i32::from(*v))),
            Nc::Short(v) => Some(AttrValue::I32(i32::from(*v))),
            Nc::Ushort(v) => Some(AttrValue::I32(i32::from(*v))),
            Nc::Int(v) => Some(AttrValue::I32(*v)),
            Nc::Uint(v) => Some(AttrValue::I64(i64::from(*v))),
            Nc::Longlong(v) => Some(AttrValue::I64(*v)),
            Nc::Ulonglong(v) => Some(AttrValue::I64(*v as i64)),
            Nc::Float(v) => Some(AttrValue::F32(*v)),
            Nc::Double(v) => Some(AttrValue::F64(*v)),
            Nc::Str(v) => Some(AttrValue::Str(v.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(v) => write!(f, "{}", v),
            AttrValue::I32(v) => write!(f, "{}", v),
            AttrValue::I64(v) => write!(f, "{}", v),
            AttrValue::F32(v) => write!(f, "{}", v),
            AttrValue::F64(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::I32(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::I64(v)
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        AttrValue::F32(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::F64(v)
    }
}

impl From<AttrValue> for netcdf::AttributeValue {
    fn from(v: AttrValue) -> Self {
        match v {
            AttrValue::Str(s) => netcdf::AttributeValue::Str(s),
            AttrValue::I32(n) => netcdf::AttributeValue::Int(n),
            AttrValue::I64(n) => netcdf::AttributeValue::Longlong(n),
            AttrValue::F32(n) => netcdf::AttributeValue::Float(n),
            AttrValue::F64(n) => netcdf::AttributeValue::Double(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_views() {
        assert_eq!(AttrValue::I32(-9999).as_f64(), Some(-9999.0));
        assert_eq!(AttrValue::F64(0.5).as_f64(), Some(0.5));
        assert_eq!(AttrValue::F32(2.5).as_i64(), Some(2));
        assert_eq!(AttrValue::Str("units".into()).as_f64(), None);
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(AttrValue::from("degC"), AttrValue::Str("degC".to_string()));
        assert_eq!(AttrValue::from(4i32), AttrValue::I32(4));
        assert_eq!(AttrValue::from(1.5f64), AttrValue::F64(1.5));
    }

    #[test]
    fn test_nc_round_trip() {
        let original = AttrValue::F64(273.15);
        let nc: netcdf::AttributeValue = original.clone().into();
        assert_eq!(AttrValue::from_nc(&nc), Some(original));

        let short = netcdf::AttributeValue::Short(-32767);
        assert_eq!(AttrValue::from_nc(&short), Some(AttrValue::I32(-32767)));
    }

    #[test]
    fn test_array_attributes_not_modeled() {
        let arr = netcdf::AttributeValue::Doubles(vec![1.0, 2.0]);
        assert_eq!(AttrValue::from_nc(&arr), None);
    }
}
