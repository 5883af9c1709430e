//! The relational-access seam.
//!
//! A [`ConnectionSource`] yields one live [`Connection`] per call. Handles and
//! the driver only talk to these traits, so the sqlx-backed implementations in
//! [`crate::db::backend`] can be swapped for scripted ones in tests.
//!
//! Parameters reach a connection already checked against their declared
//! kinds; implementations only bind and decode.

use crate::error::DbResult;
use crate::models::{DatabaseType, ProcedureBlock, Value, ValueKind};
use futures_util::future::BoxFuture;

/// Row count reported by drivers that cannot tell how many rows a statement
/// touched.
pub const UNKNOWN_ROW_COUNT: i64 = -1;

/// An owned, type-erased connection.
pub type BoxConnection = Box<dyn Connection>;

/// Per-row callback used by [`Connection::fetch`]; returns `false` to stop.
pub type RowCallback<'a> = dyn FnMut(Vec<Value>) -> DbResult<bool> + Send + 'a;

/// A statement with positionally bound parameters.
#[derive(Debug, Clone, Copy)]
pub struct Statement<'a> {
    pub sql: &'a str,
    pub kinds: &'a [ValueKind],
    pub params: &'a [Value],
}

impl<'a> Statement<'a> {
    pub fn new(sql: &'a str, kinds: &'a [ValueKind], params: &'a [Value]) -> Self {
        Self { sql, kinds, params }
    }

    /// Iterate `(kind, value)` pairs in binding order.
    pub fn bindings(self) -> impl Iterator<Item = (ValueKind, &'a Value)> + 'a {
        self.kinds.iter().copied().zip(self.params.iter())
    }
}

/// One positional slot of a procedure call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamSlot<'a> {
    In { kind: ValueKind, value: &'a Value },
    Out(ValueKind),
}

/// Everything a procedure call produced, before the processor sees it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCallResult {
    pub blocks: Vec<ProcedureBlock>,
    /// Output slot values, in slot order
    pub outputs: Vec<Value>,
}

/// One live connection to a store.
///
/// Auto-commit is on when a connection is handed out. With auto-commit off a
/// transaction begins lazily before the next statement and stays open until
/// [`commit`](Connection::commit) or [`rollback`](Connection::rollback).
pub trait Connection: Send {
    fn database_type(&self) -> DatabaseType;

    fn auto_commit(&self) -> bool;

    /// Check if a transaction has been opened and not yet ended.
    fn in_transaction(&self) -> bool;

    fn set_read_only(&mut self, read_only: bool) -> BoxFuture<'_, DbResult<()>>;

    /// Toggle auto-commit. Turning it back on commits an open transaction.
    fn set_auto_commit(&mut self, auto_commit: bool) -> BoxFuture<'_, DbResult<()>>;

    fn commit(&mut self) -> BoxFuture<'_, DbResult<()>>;

    fn rollback(&mut self) -> BoxFuture<'_, DbResult<()>>;

    /// Stream rows decoded into the declared column kinds. Returns the number
    /// of rows handed to `on_row`.
    fn fetch<'a>(
        &'a mut self,
        statement: Statement<'a>,
        columns: &'a [ValueKind],
        on_row: &'a mut RowCallback<'a>,
    ) -> BoxFuture<'a, DbResult<usize>>;

    /// Execute one statement. The count may be [`UNKNOWN_ROW_COUNT`].
    fn execute<'a>(&'a mut self, statement: Statement<'a>) -> BoxFuture<'a, DbResult<i64>>;

    /// Execute one statement per row, returning each row's reported count.
    fn execute_batch<'a>(
        &'a mut self,
        sql: &'a str,
        kinds: &'a [ValueKind],
        rows: &'a [Vec<Value>],
    ) -> BoxFuture<'a, DbResult<Vec<i64>>> {
        Box::pin(async move {
            let mut counts = Vec::with_capacity(rows.len());
            for row in rows {
                counts.push(self.execute(Statement::new(sql, kinds, row)).await?);
            }
            Ok(counts)
        })
    }

    /// Insert each row and collect the generated keys the driver reports.
    ///
    /// The result may hold fewer keys than rows; callers decide whether that
    /// is acceptable.
    fn insert_returning_keys<'a>(
        &'a mut self,
        sql: &'a str,
        kinds: &'a [ValueKind],
        rows: &'a [Vec<Value>],
        key_kind: ValueKind,
    ) -> BoxFuture<'a, DbResult<Vec<Value>>>;

    /// Run a procedure call over already laid-out slots.
    fn call<'a>(
        &'a mut self,
        sql: &'a str,
        slots: &'a [ParamSlot<'a>],
    ) -> BoxFuture<'a, DbResult<RawCallResult>>;

    /// Drop the connection instead of returning it to its pool.
    fn detach(self: Box<Self>);
}

/// Supplies connections, optionally scoped to a named store.
pub trait ConnectionSource: Send + Sync {
    /// Acquire a connection from the default store or from `store`.
    fn acquire<'a>(&'a self, store: Option<&'a str>) -> BoxFuture<'a, DbResult<BoxConnection>>;
}

/// Sum per-statement row counts.
///
/// A negative count (the [`UNKNOWN_ROW_COUNT`] sentinel) counts as exactly one
/// row.
pub fn accumulate_affected_rows(counts: &[i64]) -> u64 {
    counts
        .iter()
        .map(|&count| u64::try_from(count).unwrap_or(1))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_count_counts_as_one() {
        assert_eq!(accumulate_affected_rows(&[1, 1, UNKNOWN_ROW_COUNT, 2]), 5);
    }

    #[test]
    fn test_accumulate_edge_cases() {
        assert_eq!(accumulate_affected_rows(&[]), 0);
        assert_eq!(accumulate_affected_rows(&[0, 0]), 0);
        assert_eq!(accumulate_affected_rows(&[-3]), 1);
    }

    #[test]
    fn test_statement_bindings_pair_kinds_and_values() {
        let kinds = [ValueKind::Text, ValueKind::Integer];
        let params = [Value::from("a"), Value::Null];
        let statement = Statement::new("INSERT INTO t VALUES (?, ?)", &kinds, &params);
        let pairs: Vec<_> = statement.bindings().collect();
        assert_eq!(pairs[0], (ValueKind::Text, &Value::from("a")));
        assert_eq!(pairs[1], (ValueKind::Integer, &Value::Null));
    }
}
