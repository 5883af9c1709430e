//! sqlx-backed implementations of the [`Connection`](crate::db::Connection)
//! seam.
//!
//! Each submodule wraps one pooled sqlx connection and tracks the session
//! state the access layer cares about: auto-commit, an open transaction and
//! the read-only flag. The modules are intentionally parallel so the
//! differences between stores stay visible.

pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mysql::MySqlSession;
pub use postgres::PgSession;
pub use sqlite::SqliteSession;

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, ProcedureBlock, Value};
use sqlx::Database;
use sqlx::pool::PoolConnection;
use tracing::warn;

/// A pooled connection plus the session state layered on top of it.
///
/// Dropping a session whose state was not restored detaches the connection
/// from its pool so nothing leaks into the next caller.
pub(crate) struct PooledSession<DB: Database> {
    conn: Option<PoolConnection<DB>>,
    db_type: DatabaseType,
    pub(crate) auto_commit: bool,
    pub(crate) in_transaction: bool,
    pub(crate) read_only: bool,
}

impl<DB: Database> PooledSession<DB> {
    pub(crate) fn new(conn: PoolConnection<DB>, db_type: DatabaseType) -> Self {
        Self {
            conn: Some(conn),
            db_type,
            auto_commit: true,
            in_transaction: false,
            read_only: false,
        }
    }

    /// The live connection, or an access error once it was detached.
    pub(crate) fn conn(&mut self) -> DbResult<&mut DB::Connection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| DbError::access("Connection has already been released"))
    }

    /// Check if the next statement has to open a transaction first.
    pub(crate) fn needs_begin(&self) -> bool {
        !self.auto_commit && !self.in_transaction
    }

    fn is_clean(&self) -> bool {
        self.auto_commit && !self.in_transaction && !self.read_only
    }

    pub(crate) fn detach(&mut self) {
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}

impl<DB: Database> Drop for PooledSession<DB> {
    fn drop(&mut self) {
        if self.conn.is_some() && !self.is_clean() {
            warn!(
                db_type = %self.db_type,
                in_transaction = self.in_transaction,
                read_only = self.read_only,
                "Connection dropped with session state still set, detaching from pool"
            );
            self.detach();
        }
    }
}

/// Convert a driver row count into the signed form used by the seam.
pub(crate) fn row_count(rows_affected: u64) -> i64 {
    i64::try_from(rows_affected).unwrap_or(i64::MAX)
}

/// Groups a multi-statement result stream into procedure blocks.
///
/// Rows accumulate until their statement completes; a statement that
/// completes without rows becomes an update count.
#[derive(Debug, Default)]
pub(crate) struct BlockCollector {
    pending: Vec<Vec<Value>>,
    blocks: Vec<ProcedureBlock>,
}

impl BlockCollector {
    pub(crate) fn push_row(&mut self, row: Vec<Value>) {
        self.pending.push(row);
    }

    pub(crate) fn finish_statement(&mut self, rows_affected: i64) {
        if self.pending.is_empty() {
            self.blocks.push(ProcedureBlock::UpdateCount(rows_affected));
        } else {
            self.blocks
                .push(ProcedureBlock::Rows(std::mem::take(&mut self.pending)));
        }
    }

    pub(crate) fn into_blocks(mut self) -> Vec<ProcedureBlock> {
        if !self.pending.is_empty() {
            self.blocks.push(ProcedureBlock::Rows(self.pending));
        }
        self.blocks
    }
}
