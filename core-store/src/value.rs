//! Typed SQL values for dynamically shaped statements.
//!
//! The sync engine builds its SQL from field maps at runtime, so bind
//! parameters and result rows cannot use compile-time checked queries.
//! [`SqlValue`] is the closed set of shapes SQLite can hold here (BLOBs are
//! not part of the cache schema).

use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Arguments, Column, Row, TypeInfo, ValueRef};
use std::collections::HashMap;
use std::fmt;

/// One nullable SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Real(f) => Some(*f),
            SqlValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Bind this value onto a sqlx argument list.
    pub fn add_to(&self, args: &mut SqliteArguments<'_>) -> Result<(), sqlx::Error> {
        let result = match self {
            SqlValue::Null => args.add(None::<i64>),
            SqlValue::Integer(i) => args.add(*i),
            SqlValue::Real(f) => args.add(*f),
            SqlValue::Text(s) => args.add(s.clone()),
        };
        result.map_err(sqlx::Error::Encode)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(i) => write!(f, "{i}"),
            SqlValue::Real(v) => write!(f, "{v}"),
            SqlValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// A result row decoded by column name.
pub type SqlRow = HashMap<String, SqlValue>;

/// Decode a dynamically shaped row into column-name keyed values.
///
/// SQLite is dynamically typed, so the declared column affinity is resolved
/// per cell from the stored value's type.
pub fn decode_row(row: &SqliteRow) -> Result<SqlRow, sqlx::Error> {
    let mut out = HashMap::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            SqlValue::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => SqlValue::Integer(row.try_get::<i64, _>(index)?),
                "REAL" => SqlValue::Real(row.try_get::<f64, _>(index)?),
                _ => SqlValue::Text(row.try_get::<String, _>(index)?),
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_conversion() {
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(3_i64)), SqlValue::Integer(3));
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".to_string()));
    }

    #[test]
    fn accessors() {
        assert_eq!(SqlValue::Integer(5).as_i64(), Some(5));
        assert_eq!(SqlValue::Integer(5).as_f64(), Some(5.0));
        assert_eq!(SqlValue::Text("a".into()).as_i64(), None);
        assert!(SqlValue::Null.is_null());
    }
}
