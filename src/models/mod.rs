//! Data models for the access layer.
//!
//! This module re-exports the value, shape and result types that flow through
//! the handles.

pub mod connection;
pub mod field;
pub mod procedure;
pub mod record;
pub mod row_table;
pub mod value;

// Re-export commonly used types
pub use connection::DatabaseType;
pub use field::{Field, Shape};
pub use procedure::{ProcedureBlock, ProcedureCall, ProcedureResult};
pub use record::Record;
pub use row_table::RowTable;
pub use value::{Value, ValueKind};
