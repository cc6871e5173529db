//! Values that properties can hold.
//!
//! Property values are a tagged variant. Equality is defined per tag:
//! values of different tags never compare equal, and `Double` treats NaN as
//! equal to NaN so repeated NaN readings do not count as changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Properties of one interface, keyed by property name.
pub type PropertyMap = BTreeMap<String, Value>;

/// Properties of one object, keyed by interface name.
pub type InterfaceMap = BTreeMap<String, PropertyMap>;

/// Possible property values.
///
/// # Examples
///
/// ```
/// use mgmtbus::Value;
///
/// let reading = Value::Double(41.5);
/// assert_eq!(reading.as_f64(), Some(41.5));
/// assert_ne!(Value::Int(1), Value::UInt(1));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Byte(u8),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(String),
    ObjectPath(String),
    Array(Vec<Value>),
    Dict(BTreeMap<String, Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Byte(a), Self::Byte(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::UInt(a), Self::UInt(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::String(a), Self::String(b)) | (Self::ObjectPath(a), Self::ObjectPath(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Byte(_) | Self::Int(_) | Self::UInt(_) | Self::Double(_))
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view used for threshold comparisons.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Byte(v) => Some(f64::from(*v)),
            Self::Int(v) => Some(*v as f64),
            Self::UInt(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) | Self::ObjectPath(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the wire type signature for this value.
    #[must_use]
    pub fn signature(&self) -> String {
        match self {
            Self::Bool(_) => "b".to_string(),
            Self::Byte(_) => "y".to_string(),
            Self::Int(_) => "x".to_string(),
            Self::UInt(_) => "t".to_string(),
            Self::Double(_) => "d".to_string(),
            Self::String(_) => "s".to_string(),
            Self::ObjectPath(_) => "o".to_string(),
            Self::Array(items) => match items.first() {
                Some(first) => format!("a{}", first.signature()),
                None => "av".to_string(),
            },
            Self::Dict(_) => "a{sv}".to_string(),
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Byte(_) => "byte",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::ObjectPath(_) => "object_path",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::ObjectPath(v) => write!(f, "{v}"),
            Self::Array(v) => write!(f, "array[{}]", v.len()),
            Self::Dict(v) => write!(f, "dict[{}]", v.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Self::Byte(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality_is_per_tag() {
        assert_eq!(Value::Int(3), Value::Int(3));
        assert_ne!(Value::Int(3), Value::UInt(3));
        assert_ne!(Value::Int(3), Value::Double(3.0));
        assert_ne!(
            Value::String("/a".into()),
            Value::ObjectPath("/a".into())
        );
    }

    #[test]
    fn test_nan_equals_nan() {
        assert_eq!(Value::Double(f64::NAN), Value::Double(f64::NAN));
        assert_ne!(Value::Double(f64::NAN), Value::Double(0.0));
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::Byte(7).as_f64(), Some(7.0));
        assert_eq!(Value::Int(-2).as_i64(), Some(-2));
        assert_eq!(Value::UInt(9).as_f64(), Some(9.0));
        assert!(Value::from("x").as_f64().is_none());
        assert!(Value::Double(1.0).is_numeric());
        assert!(!Value::Bool(true).is_numeric());
    }

    #[test]
    fn test_signatures() {
        assert_eq!(Value::Int(1).signature(), "x");
        assert_eq!(Value::Array(vec![Value::from("a")]).signature(), "as");
        assert_eq!(Value::Array(vec![]).signature(), "av");
        assert_eq!(Value::Dict(BTreeMap::new()).signature(), "a{sv}");
    }

    #[test]
    fn test_value_display() {
        assert_eq!(format!("{}", Value::Bool(true)), "true");
        assert_eq!(format!("{}", Value::from("hi")), "\"hi\"");
        assert_eq!(format!("{}", Value::Array(vec![Value::Int(1)])), "array[1]");
    }

    #[test]
    fn test_value_serialization() {
        let val = Value::ObjectPath("/org/openbmc/sensors/temp".into());
        let json = serde_json::to_string(&val).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(val, back);
    }
}
