//! Database-agnostic type mappings.
//!
//! This module maps database column types onto [`ValueKind`]s and decodes
//! result rows into positional [`Value`]s.
//!
//! # Architecture
//!
//! Decoding uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders extract a value of the requested kind
//!
//! Rows read through a statement are decoded into the kinds the caller
//! declared. Rows produced inside stored procedures carry no declaration, so
//! their kinds are derived from the column types.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, Value, ValueKind};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo};
use tracing::debug;

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Date,
    Timestamp,
    Binary,
    Json,
    Uuid,
    Unknown,
}

impl TypeCategory {
    /// Kind used when a column of this category is read without a declaration.
    pub fn value_kind(self) -> ValueKind {
        match self {
            TypeCategory::Integer => ValueKind::Integer,
            TypeCategory::Float | TypeCategory::Decimal => ValueKind::Decimal,
            TypeCategory::Boolean => ValueKind::Boolean,
            TypeCategory::Date => ValueKind::Date,
            TypeCategory::Timestamp => ValueKind::Timestamp,
            TypeCategory::Text
            | TypeCategory::Binary
            | TypeCategory::Json
            | TypeCategory::Uuid
            | TypeCategory::Unknown => ValueKind::Text,
        }
    }
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // Boolean - MySQL reports TINYINT(1) as BOOLEAN
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    // Integer types
    if (lower.contains("int") && lower != "interval" && lower != "point")
        || lower.contains("serial")
        || lower.contains("tiny")
    {
        return TypeCategory::Integer;
    }

    // Float types
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    // Date/Time - timestamps before dates, "datetime" contains both
    if lower.starts_with("timestamp") || lower == "datetime" {
        return TypeCategory::Timestamp;
    }
    if lower == "date" {
        return TypeCategory::Date;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "string" || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

fn column_error(idx: usize, kind: ValueKind, err: impl std::fmt::Display) -> DbError {
    DbError::access(format!("Column {} cannot be read as {}: {}", idx, kind, err))
}

fn check_width(declared: usize, available: usize) -> DbResult<()> {
    if declared > available {
        return Err(DbError::access(format!(
            "Statement returned {} columns but {} were declared",
            available, declared
        )));
    }
    Ok(())
}

// =============================================================================
// Row Decoding Trait
// =============================================================================

/// Trait for decoding database rows into positional values.
pub trait RowDecode {
    /// Decode the leading columns into the declared kinds.
    fn decode_values(&self, kinds: &[ValueKind]) -> DbResult<Vec<Value>>;

    /// Decode every column, deriving kinds from the column types.
    fn decode_dynamic(&self) -> Vec<Value>;
}

impl RowDecode for MySqlRow {
    fn decode_values(&self, kinds: &[ValueKind]) -> DbResult<Vec<Value>> {
        check_width(kinds.len(), self.len())?;
        kinds
            .iter()
            .enumerate()
            .map(|(idx, kind)| mysql::decode_column(self, idx, *kind))
            .collect()
    }

    fn decode_dynamic(&self) -> Vec<Value> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let kind = categorize_type(col.type_info().name(), DatabaseType::MySQL).value_kind();
                decode_or_null(mysql::decode_column(self, idx, kind), col.name())
            })
            .collect()
    }
}

impl RowDecode for PgRow {
    fn decode_values(&self, kinds: &[ValueKind]) -> DbResult<Vec<Value>> {
        check_width(kinds.len(), self.len())?;
        kinds
            .iter()
            .enumerate()
            .map(|(idx, kind)| postgres::decode_column(self, idx, *kind))
            .collect()
    }

    fn decode_dynamic(&self) -> Vec<Value> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let kind =
                    categorize_type(col.type_info().name(), DatabaseType::PostgreSQL).value_kind();
                decode_or_null(postgres::decode_column(self, idx, kind), col.name())
            })
            .collect()
    }
}

impl RowDecode for SqliteRow {
    fn decode_values(&self, kinds: &[ValueKind]) -> DbResult<Vec<Value>> {
        check_width(kinds.len(), self.len())?;
        kinds
            .iter()
            .enumerate()
            .map(|(idx, kind)| sqlite::decode_column(self, idx, *kind))
            .collect()
    }

    fn decode_dynamic(&self) -> Vec<Value> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let kind = categorize_type(col.type_info().name(), DatabaseType::SQLite).value_kind();
                decode_or_null(sqlite::decode_column(self, idx, kind), col.name())
            })
            .collect()
    }
}

fn decode_or_null(result: DbResult<Value>, column: &str) -> Value {
    result.unwrap_or_else(|e| {
        debug!(column = %column, error = %e, "Undecodable column read as NULL");
        Value::Null
    })
}

/// Convert a driver-reported integer key into the requested key kind.
pub(crate) fn key_value(key: i64, kind: ValueKind) -> DbResult<Value> {
    match kind {
        ValueKind::Integer => Ok(Value::Integer(key)),
        ValueKind::Decimal => Ok(Value::Decimal(key.into())),
        ValueKind::Text => Ok(Value::Text(key.to_string())),
        other => Err(DbError::access(format!(
            "Generated key {} cannot be read as {}",
            key, other
        ))),
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================
//
// Each module below decodes one column into a requested kind. MySQL and
// PostgreSQL decode through sqlx's type checks and fall back across widths;
// SQLite values are dynamically typed, so its decoder lets the engine convert.

mod mysql {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
    use rust_decimal::Decimal;

    pub fn decode_column(row: &MySqlRow, idx: usize, kind: ValueKind) -> DbResult<Value> {
        let value = match kind {
            ValueKind::Text => decode_text(row, idx).map(|v| v.map(Value::Text)),
            ValueKind::Integer => decode_integer(row, idx).map(|v| v.map(Value::Integer)),
            ValueKind::Decimal => decode_decimal(row, idx).map(|v| v.map(Value::Decimal)),
            ValueKind::Boolean => decode_boolean(row, idx).map(|v| v.map(Value::Boolean)),
            ValueKind::Date => row
                .try_get::<Option<NaiveDate>, _>(idx)
                .map(|v| v.map(Value::Date)),
            ValueKind::Timestamp => decode_timestamp(row, idx).map(|v| v.map(Value::Timestamp)),
        };
        value
            .map(Option::unwrap_or_default)
            .map_err(|e| column_error(idx, kind, e))
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> Result<Option<String>, sqlx::Error> {
        match row.try_get::<Option<String>, _>(idx) {
            Ok(v) => Ok(v),
            // User variables and binary collations come back as blobs
            Err(e) => match row.try_get::<Option<Vec<u8>>, _>(idx) {
                Ok(bytes) => Ok(bytes.map(|b| String::from_utf8_lossy(&b).into_owned())),
                Err(_) => Err(e),
            },
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Result<Option<i64>, sqlx::Error> {
        let first = match row.try_get::<Option<i64>, _>(idx) {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        // Try narrower signed types
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return Ok(v.map(i64::from));
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return Ok(v.map(i64::from));
        }
        if let Ok(v) = row.try_get::<Option<i8>, _>(idx) {
            return Ok(v.map(i64::from));
        }
        // Try unsigned types
        if let Ok(v) = row.try_get::<Option<u32>, _>(idx) {
            return Ok(v.map(i64::from));
        }
        if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
            return match v.map(i64::try_from).transpose() {
                Ok(v) => Ok(v),
                Err(e) => Err(sqlx::Error::Decode(Box::new(e))),
            };
        }
        Err(first)
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> Result<Option<Decimal>, sqlx::Error> {
        let first = match row.try_get::<Option<Decimal>, _>(idx) {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return Ok(v.and_then(|f| Decimal::try_from(f).ok()));
        }
        if let Ok(v) = decode_integer(row, idx) {
            return Ok(v.map(Decimal::from));
        }
        Err(first)
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> Result<Option<bool>, sqlx::Error> {
        match row.try_get::<Option<bool>, _>(idx) {
            Ok(v) => Ok(v),
            Err(e) => match decode_integer(row, idx) {
                Ok(v) => Ok(v.map(|i| i != 0)),
                Err(_) => Err(e),
            },
        }
    }

    fn decode_timestamp(row: &MySqlRow, idx: usize) -> Result<Option<NaiveDateTime>, sqlx::Error> {
        match row.try_get::<Option<NaiveDateTime>, _>(idx) {
            Ok(v) => Ok(v),
            Err(e) => match row.try_get::<Option<DateTime<Utc>>, _>(idx) {
                Ok(v) => Ok(v.map(|dt| dt.naive_utc())),
                Err(_) => Err(e),
            },
        }
    }
}

mod postgres {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
    use rust_decimal::Decimal;

    pub fn decode_column(row: &PgRow, idx: usize, kind: ValueKind) -> DbResult<Value> {
        let value = match kind {
            ValueKind::Text => row
                .try_get::<Option<String>, _>(idx)
                .map(|v| v.map(Value::Text)),
            ValueKind::Integer => decode_integer(row, idx).map(|v| v.map(Value::Integer)),
            ValueKind::Decimal => decode_decimal(row, idx).map(|v| v.map(Value::Decimal)),
            ValueKind::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .map(|v| v.map(Value::Boolean)),
            ValueKind::Date => row
                .try_get::<Option<NaiveDate>, _>(idx)
                .map(|v| v.map(Value::Date)),
            ValueKind::Timestamp => decode_timestamp(row, idx).map(|v| v.map(Value::Timestamp)),
        };
        value
            .map(Option::unwrap_or_default)
            .map_err(|e| column_error(idx, kind, e))
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Result<Option<i64>, sqlx::Error> {
        let first = match row.try_get::<Option<i64>, _>(idx) {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return Ok(v.map(i64::from));
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return Ok(v.map(i64::from));
        }
        Err(first)
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> Result<Option<Decimal>, sqlx::Error> {
        let first = match row.try_get::<Option<Decimal>, _>(idx) {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return Ok(v.and_then(|f| Decimal::try_from(f).ok()));
        }
        if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
            return Ok(v.and_then(|f| Decimal::try_from(f).ok()));
        }
        if let Ok(v) = decode_integer(row, idx) {
            return Ok(v.map(Decimal::from));
        }
        Err(first)
    }

    fn decode_timestamp(row: &PgRow, idx: usize) -> Result<Option<NaiveDateTime>, sqlx::Error> {
        match row.try_get::<Option<NaiveDateTime>, _>(idx) {
            Ok(v) => Ok(v),
            Err(e) => match row.try_get::<Option<DateTime<Utc>>, _>(idx) {
                Ok(v) => Ok(v.map(|dt| dt.naive_utc())),
                Err(_) => Err(e),
            },
        }
    }
}

mod sqlite {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use sqlx::ValueRef;

    pub fn decode_column(row: &SqliteRow, idx: usize, kind: ValueKind) -> DbResult<Value> {
        let value = match kind {
            ValueKind::Text => row
                .try_get_unchecked::<Option<String>, _>(idx)
                .map(|v| v.map(Value::Text)),
            ValueKind::Integer | ValueKind::Boolean => return decode_by_storage(row, idx, kind),
            ValueKind::Decimal => return decode_decimal(row, idx),
            ValueKind::Date => row
                .try_get_unchecked::<Option<NaiveDate>, _>(idx)
                .map(|v| v.map(Value::Date)),
            ValueKind::Timestamp => row
                .try_get_unchecked::<Option<NaiveDateTime>, _>(idx)
                .map(|v| v.map(Value::Timestamp)),
        };
        value
            .map(Option::unwrap_or_default)
            .map_err(|e| column_error(idx, kind, e))
    }

    /// SQLite converts any text to 0 when asked for a number, so integers and
    /// booleans are read according to the storage class of the value. Text
    /// must parse as the declared kind.
    fn decode_by_storage(row: &SqliteRow, idx: usize, kind: ValueKind) -> DbResult<Value> {
        let storage = {
            let raw = row.try_get_raw(idx).map_err(|e| column_error(idx, kind, e))?;
            if raw.is_null() {
                return Ok(Value::Null);
            }
            raw.type_info().name().to_ascii_uppercase()
        };
        match storage.as_str() {
            "INTEGER" => {
                let n = row
                    .try_get_unchecked::<i64, _>(idx)
                    .map_err(|e| column_error(idx, kind, e))?;
                Ok(match kind {
                    ValueKind::Boolean => Value::Boolean(n != 0),
                    _ => Value::Integer(n),
                })
            }
            "REAL" if kind == ValueKind::Integer => {
                let f = row
                    .try_get_unchecked::<f64, _>(idx)
                    .map_err(|e| column_error(idx, kind, e))?;
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                    Ok(Value::Integer(f as i64))
                } else {
                    Err(column_error(idx, kind, f))
                }
            }
            "TEXT" => {
                let text = row
                    .try_get_unchecked::<String, _>(idx)
                    .map_err(|e| column_error(idx, kind, e))?;
                kind.parse(&text)
                    .ok_or_else(|| column_error(idx, kind, format!("'{}'", text)))
            }
            other => Err(column_error(idx, kind, format!("value stored as {}", other))),
        }
    }

    /// Decimals are stored as text or REAL; both read back exactly through
    /// their textual form.
    fn decode_decimal(row: &SqliteRow, idx: usize) -> DbResult<Value> {
        let text = row
            .try_get_unchecked::<Option<String>, _>(idx)
            .map_err(|e| column_error(idx, ValueKind::Decimal, e))?;
        match text {
            None => Ok(Value::Null),
            Some(text) => ValueKind::Decimal
                .parse(&text)
                .ok_or_else(|| column_error(idx, ValueKind::Decimal, format!("'{}'", text))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("TINYINT", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("SERIAL", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INTERVAL", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("DECIMAL", DatabaseType::MySQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("NUMERIC", DatabaseType::PostgreSQL),
            TypeCategory::Decimal
        );
        // SQLite NUMERIC is a float
        assert_eq!(
            categorize_type("numeric", DatabaseType::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(
            categorize_type("TIMESTAMPTZ", DatabaseType::PostgreSQL),
            TypeCategory::Timestamp
        );
        assert_eq!(
            categorize_type("DATETIME", DatabaseType::MySQL),
            TypeCategory::Timestamp
        );
        assert_eq!(
            categorize_type("DATE", DatabaseType::SQLite),
            TypeCategory::Date
        );
    }

    #[test]
    fn test_category_value_kinds() {
        assert_eq!(TypeCategory::Float.value_kind(), ValueKind::Decimal);
        assert_eq!(TypeCategory::Json.value_kind(), ValueKind::Text);
        assert_eq!(
            categorize_type("BOOLEAN", DatabaseType::MySQL).value_kind(),
            ValueKind::Boolean
        );
        assert_eq!(
            categorize_type("VARCHAR", DatabaseType::PostgreSQL).value_kind(),
            ValueKind::Text
        );
    }

    #[test]
    fn test_key_value_conversion() {
        assert_eq!(key_value(7, ValueKind::Integer).unwrap(), Value::Integer(7));
        assert_eq!(
            key_value(7, ValueKind::Text).unwrap(),
            Value::Text("7".to_string())
        );
        assert!(key_value(7, ValueKind::Date).is_err());
    }

    #[test]
    fn test_check_width() {
        assert!(check_width(2, 3).is_ok());
        assert!(check_width(3, 2).is_err());
    }
}
