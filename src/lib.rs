//! Transactional database access layer.
//!
//! A [`Driver`](db::Driver) acquires one connection per call from an injected
//! [`ConnectionSource`](db::ConnectionSource), hands the caller's unit of work
//! a handle of the right capability tier and guarantees commit, rollback and
//! release. SQLite, PostgreSQL and MySQL are supported through sqlx.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::Config;
pub use error::{DbError, DbResult};

/// Everything a unit of work usually needs.
pub mod prelude {
    pub use crate::db::{
        Driver, Outcome, ReadAccess, ReadWriteHandle, ReadonlyHandle, StorePool,
        TransactionControl, TransactionHandle, WriteAccess,
    };
    pub use crate::error::{DbError, DbResult};
    pub use crate::models::{
        Field, ProcedureBlock, ProcedureCall, ProcedureResult, Record, RowTable, Shape, Value,
        ValueKind,
    };
    pub use futures_util::future::BoxFuture;
}
