//! Field values with an explicit absence marker.
//!
//! A [`Value`] is absent, an integer, a float or text. Absence never turns
//! into zero or the empty string: numeric accessors return `Option<f64>` and
//! every consumer decides what an absent input means for its own stage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One cell of a catalog row. Serialized as `null`, a JSON number, or a string.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Absent,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn is_present(&self) -> bool {
        !self.is_absent()
    }

    /// Numeric view of the value. Absent and text values have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Absent | Value::Text(_) => None,
        }
    }

    /// Integer view. Floats convert only when they are integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Builds a float value, mapping `None` to [`Value::Absent`].
    pub fn from_option(value: Option<f64>) -> Self {
        value.map_or(Value::Absent, Value::Float)
    }

    /// Compares two values for equality as a selection test would: absent
    /// never equals anything (not even another absent value), and integers
    /// compare equal to integral floats.
    pub fn matches(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Absent, _) | (_, Value::Absent) => false,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Text(_), _) | (_, Value::Text(_)) => false,
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Absent => write!(f, "--"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Absent, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_has_no_numeric_view() {
        assert_eq!(Value::Absent.as_f64(), None);
        assert_eq!(Value::Text("0".into()).as_f64(), None);
        assert_eq!(Value::Int(0).as_f64(), Some(0.0));
    }

    #[test]
    fn test_absent_never_matches() {
        assert!(!Value::Absent.matches(&Value::Absent));
        assert!(!Value::Absent.matches(&Value::Int(0)));
        assert!(Value::Int(3).matches(&Value::Float(3.0)));
        assert!(Value::from("GALAXY").matches(&Value::from("GALAXY")));
        assert!(!Value::from("3").matches(&Value::Int(3)));
    }

    #[test]
    fn test_large_ids_match_exactly() {
        let id = Value::Int(1237648720693755918);
        assert!(id.matches(&Value::Int(1237648720693755918)));
        assert!(!id.matches(&Value::Int(1237648720693755919)));
        assert!(!Value::Int(-1).matches(&Value::Int(1237648720693755919)));
    }

    #[test]
    fn test_integral_float_to_i64() {
        assert_eq!(Value::Float(12.0).as_i64(), Some(12));
        assert_eq!(Value::Float(12.5).as_i64(), None);
    }

    #[test]
    fn test_json_forms() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, 3, 2.5, "QSO"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Absent,
                Value::Int(3),
                Value::Float(2.5),
                Value::Text("QSO".into())
            ]
        );
        assert_eq!(serde_json::to_string(&Value::Absent).unwrap(), "null");
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<f64>), Value::Absent);
        assert_eq!(Value::from(Some(1.5)), Value::Float(1.5));
    }
}
