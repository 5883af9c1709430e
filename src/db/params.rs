//! Parameter binding utilities for database queries.
//!
//! Values are bound positionally by their declared kind. NULL binds as a
//! typed NULL of that kind so the store sees a consistent parameter type.

use crate::models::{Value, ValueKind};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Postgres, Sqlite};

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    kind: ValueKind,
    value: &'q Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => match kind {
            ValueKind::Text => query.bind(None::<String>),
            ValueKind::Integer => query.bind(None::<i64>),
            ValueKind::Decimal => query.bind(None::<Decimal>),
            ValueKind::Boolean => query.bind(None::<bool>),
            ValueKind::Date => query.bind(None::<NaiveDate>),
            ValueKind::Timestamp => query.bind(None::<NaiveDateTime>),
        },
        Value::Text(v) => query.bind(v.as_str()),
        Value::Integer(v) => query.bind(*v),
        Value::Decimal(v) => query.bind(*v),
        Value::Boolean(v) => query.bind(*v),
        Value::Date(v) => query.bind(*v),
        Value::Timestamp(v) => query.bind(*v),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    kind: ValueKind,
    value: &'q Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => match kind {
            ValueKind::Text => query.bind(None::<String>),
            ValueKind::Integer => query.bind(None::<i64>),
            ValueKind::Decimal => query.bind(None::<Decimal>),
            ValueKind::Boolean => query.bind(None::<bool>),
            ValueKind::Date => query.bind(None::<NaiveDate>),
            ValueKind::Timestamp => query.bind(None::<NaiveDateTime>),
        },
        Value::Text(v) => query.bind(v.as_str()),
        Value::Integer(v) => query.bind(*v),
        Value::Decimal(v) => query.bind(*v),
        Value::Boolean(v) => query.bind(*v),
        Value::Date(v) => query.bind(*v),
        Value::Timestamp(v) => query.bind(*v),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    kind: ValueKind,
    value: &'q Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => match kind {
            ValueKind::Text | ValueKind::Decimal => query.bind(None::<String>),
            ValueKind::Integer => query.bind(None::<i64>),
            ValueKind::Boolean => query.bind(None::<bool>),
            ValueKind::Date => query.bind(None::<NaiveDate>),
            ValueKind::Timestamp => query.bind(None::<NaiveDateTime>),
        },
        Value::Text(v) => query.bind(v.as_str()),
        Value::Integer(v) => query.bind(*v),
        // SQLite has no decimal type; text keeps the exact digits and column
        // affinity converts where the schema asks for a number
        Value::Decimal(v) => query.bind(v.to_string()),
        Value::Boolean(v) => query.bind(*v),
        Value::Date(v) => query.bind(*v),
        Value::Timestamp(v) => query.bind(*v),
    }
}
