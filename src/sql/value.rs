use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

/// A single SQL value: either a parameter bound into a statement or a cell
/// read back from a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            // Oracle NUMBER and MySQL DECIMAL aggregates arrive as floats or text
            SqlValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(f) => Some(*f),
            SqlValue::Int(i) => Some(*i as f64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Booleans as the three stores encode them: native, `NUMBER(1)` or `TINYINT(1)`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::Int(0) => Some(false),
            SqlValue::Int(1) => Some(true),
            SqlValue::Float(f) if *f == 0.0 => Some(false),
            SqlValue::Float(f) if *f == 1.0 => Some(true),
            SqlValue::Text(s) => match s.trim() {
                "t" | "true" | "TRUE" | "1" => Some(true),
                "f" | "false" | "FALSE" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            SqlValue::Date(d) => Some(*d),
            SqlValue::Timestamp(ts) => Some(ts.date()),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Date(_) => "date",
            SqlValue::Timestamp(_) => "timestamp",
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Int(i) => write!(f, "{}", i),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(s) => write!(f, "{}", s),
            SqlValue::Date(d) => write!(f, "{}", d),
            SqlValue::Timestamp(ts) => write!(f, "{}", ts),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_display() {
        assert_eq!(SqlValue::Null.to_string(), "NULL");
    }

    #[test]
    fn test_bool_from_numeric_encodings() {
        assert_eq!(SqlValue::Int(1).as_bool(), Some(true));
        assert_eq!(SqlValue::Int(0).as_bool(), Some(false));
        assert_eq!(SqlValue::Float(1.0).as_bool(), Some(true));
        assert_eq!(SqlValue::Text("t".into()).as_bool(), Some(true));
        assert_eq!(SqlValue::Int(7).as_bool(), None);
        assert_eq!(SqlValue::Null.as_bool(), None);
    }

    #[test]
    fn test_integer_from_decimal_text() {
        assert_eq!(SqlValue::Text("180".into()).as_i64(), Some(180));
        assert_eq!(SqlValue::Float(3.0).as_i64(), Some(3));
        assert_eq!(SqlValue::Float(3.5).as_i64(), None);
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<String> = None;
        assert_eq!(SqlValue::from(none), SqlValue::Null);
        assert_eq!(
            SqlValue::from(Some("x".to_string())),
            SqlValue::Text("x".into())
        );
    }
}
