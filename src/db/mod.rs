//! Database access layer.
//!
//! This module provides:
//! - The relational-access seam and its sqlx-backed implementations
//! - Named connection pools
//! - Capability-tiered handles and the driver that hands them out
//! - Stored-procedure invocation
//! - Type mappings and parameter binding

pub mod backend;
pub mod connection;
pub mod driver;
pub mod handle;
pub mod params;
pub mod pool;
pub mod procedure;
pub mod types;

pub use connection::{
    BoxConnection, Connection, ConnectionSource, ParamSlot, RawCallResult, RowCallback, Statement,
    UNKNOWN_ROW_COUNT, accumulate_affected_rows,
};
pub use driver::{Driver, Outcome};
pub use handle::{
    ReadAccess, ReadWriteHandle, ReadonlyHandle, TransactionControl, TransactionHandle,
    WriteAccess,
};
pub use pool::{DbPool, StorePool, StoreSummary};
pub use procedure::BlockProcessor;
