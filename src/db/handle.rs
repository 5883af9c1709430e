//! Capability tiers handed to a unit of work.
//!
//! [`ReadAccess`] ⊂ [`WriteAccess`] ⊂ [`TransactionControl`]: each tier is a
//! strict superset of the one below. The traits are sealed and implemented
//! only by the three handle types, so a readonly unit of work cannot reach a
//! write operation at compile time.
//!
//! A handle owns exactly one live connection for the duration of one driver
//! call and is never shared between concurrent callers.

use crate::db::connection::{
    BoxConnection, Connection, RowCallback, Statement, accumulate_affected_rows,
};
use crate::db::procedure::{self, BlockProcessor};
use crate::error::{DbError, DbResult};
use crate::models::{ProcedureBlock, ProcedureCall, ProcedureResult, Record, RowTable, Value, ValueKind};
use std::future::Future;
use std::sync::Arc;

mod sealed {
    use crate::db::connection::Connection;

    pub trait Sealed {
        fn connection(&mut self) -> &mut dyn Connection;
    }
}

/// Check parameter arity and per-position kinds before anything is bound.
pub(crate) fn check_params(kinds: &[ValueKind], params: &[Value]) -> DbResult<()> {
    if kinds.len() != params.len() {
        return Err(DbError::data_shape(format!(
            "{} parameter kinds declared but {} values supplied",
            kinds.len(),
            params.len()
        )));
    }
    for (position, (kind, value)) in kinds.iter().zip(params).enumerate() {
        if !kind.is_compatible(value) {
            return Err(DbError::access(format!(
                "Parameter {} declared as {} but the value is {}",
                position,
                kind,
                value.type_name()
            )));
        }
    }
    Ok(())
}

fn check_rows(kinds: &[ValueKind], rows: &[Vec<Value>]) -> DbResult<()> {
    for (index, row) in rows.iter().enumerate() {
        check_params(kinds, row).map_err(|e| match e {
            DbError::DataShape { message } => {
                DbError::data_shape(format!("Row {}: {}", index, message))
            }
            DbError::Access { message, .. } => DbError::access(format!("Row {}: {}", index, message)),
            other => other,
        })?;
    }
    Ok(())
}

async fn fetch_checked(
    conn: &mut dyn Connection,
    statement: Statement<'_>,
    columns: &[ValueKind],
    on_row: &mut RowCallback<'_>,
) -> DbResult<usize> {
    check_params(statement.kinds, statement.params)?;
    conn.fetch(statement, columns, on_row).await
}

/// Read operations available in every mode.
pub trait ReadAccess: sealed::Sealed + Send {
    /// Read the first row into positional slots of the declared column kinds.
    fn query_row(
        &mut self,
        sql: &str,
        kinds: &[ValueKind],
        params: &[Value],
        columns: &[ValueKind],
    ) -> impl Future<Output = DbResult<Option<Vec<Value>>>> + Send {
        async move {
            let mut first = None;
            fetch_checked(
                self.connection(),
                Statement::new(sql, kinds, params),
                columns,
                &mut |row| {
                    first = Some(row);
                    Ok(false)
                },
            )
            .await?;
            Ok(first)
        }
    }

    /// Read the first row into a fresh instance of `prototype`.
    fn query_record(
        &mut self,
        sql: &str,
        kinds: &[ValueKind],
        params: &[Value],
        prototype: &Record,
    ) -> impl Future<Output = DbResult<Option<Record>>> + Send {
        async move {
            let columns = Arc::clone(prototype.shape().kinds());
            let mut first = None;
            fetch_checked(
                self.connection(),
                Statement::new(sql, kinds, params),
                &columns,
                &mut |row| {
                    let mut record = prototype.new_instance();
                    record.set_values(row)?;
                    first = Some(record);
                    Ok(false)
                },
            )
            .await?;
            Ok(first)
        }
    }

    /// Append every row to `out`. Returns the number of rows appended.
    fn query_into(
        &mut self,
        sql: &str,
        kinds: &[ValueKind],
        params: &[Value],
        columns: &[ValueKind],
        out: &mut Vec<Vec<Value>>,
    ) -> impl Future<Output = DbResult<usize>> + Send {
        async move {
            fetch_checked(
                self.connection(),
                Statement::new(sql, kinds, params),
                columns,
                &mut |row| {
                    out.push(row);
                    Ok(true)
                },
            )
            .await
        }
    }

    /// Append every row to `table`, each one cloned from the table's
    /// prototype and filled positionally.
    fn query_table(
        &mut self,
        sql: &str,
        kinds: &[ValueKind],
        params: &[Value],
        table: &mut RowTable,
    ) -> impl Future<Output = DbResult<usize>> + Send {
        async move {
            let columns = Arc::clone(table.shape().kinds());
            fetch_checked(
                self.connection(),
                Statement::new(sql, kinds, params),
                &columns,
                &mut |row| {
                    table.push_values(row)?;
                    Ok(true)
                },
            )
            .await
        }
    }

    /// Stream rows to `on_row` until it returns `false`. Returns the number of
    /// rows seen.
    fn query_each<F>(
        &mut self,
        sql: &str,
        kinds: &[ValueKind],
        params: &[Value],
        columns: &[ValueKind],
        mut on_row: F,
    ) -> impl Future<Output = DbResult<usize>> + Send
    where
        F: FnMut(&[Value]) -> bool + Send,
    {
        async move {
            fetch_checked(
                self.connection(),
                Statement::new(sql, kinds, params),
                columns,
                &mut |row| Ok(on_row(&row)),
            )
            .await
        }
    }

    /// Call a stored procedure, passing each produced block to `processor`
    /// while it returns `true`. Returns the declared scalar, if any.
    fn call_procedure<F>(
        &mut self,
        call: &ProcedureCall,
        mut processor: F,
    ) -> impl Future<Output = DbResult<Option<Value>>> + Send
    where
        F: FnMut(ProcedureBlock) -> bool + Send,
    {
        async move {
            let processor: &mut BlockProcessor<'_> = &mut processor;
            procedure::invoke(self.connection(), call, processor).await
        }
    }

    /// Call a stored procedure and collect everything it produced.
    fn call_procedure_collect(
        &mut self,
        call: &ProcedureCall,
    ) -> impl Future<Output = DbResult<ProcedureResult>> + Send {
        async move { procedure::invoke_collect(self.connection(), call).await }
    }
}

/// Write operations, available in read-write and multi-transaction modes.
///
/// Every write returns the number of rows affected. A statement whose count
/// the driver cannot report is counted as one row.
pub trait WriteAccess: ReadAccess {
    fn execute(
        &mut self,
        sql: &str,
        kinds: &[ValueKind],
        params: &[Value],
    ) -> impl Future<Output = DbResult<u64>> + Send {
        async move {
            check_params(kinds, params)?;
            let count = self
                .connection()
                .execute(Statement::new(sql, kinds, params))
                .await?;
            Ok(accumulate_affected_rows(&[count]))
        }
    }

    /// Execute with parameters taken from a record, in shape order.
    fn execute_record(
        &mut self,
        sql: &str,
        record: &Record,
    ) -> impl Future<Output = DbResult<u64>> + Send {
        async move {
            let kinds = Arc::clone(record.shape().kinds());
            self.execute(sql, &kinds, record.values()).await
        }
    }

    /// Execute once per row; each row is parallel to `kinds`.
    fn execute_batch(
        &mut self,
        sql: &str,
        kinds: &[ValueKind],
        rows: &[Vec<Value>],
    ) -> impl Future<Output = DbResult<u64>> + Send {
        async move {
            check_rows(kinds, rows)?;
            let counts = self.connection().execute_batch(sql, kinds, rows).await?;
            Ok(accumulate_affected_rows(&counts))
        }
    }

    fn execute_table(
        &mut self,
        sql: &str,
        table: &RowTable,
    ) -> impl Future<Output = DbResult<u64>> + Send {
        async move {
            let kinds = Arc::clone(table.shape().kinds());
            let rows = table.to_value_rows();
            self.execute_batch(sql, &kinds, &rows).await
        }
    }

    /// Insert one row and return its generated key.
    ///
    /// Fails unless the driver reports exactly one key.
    fn insert_with_key(
        &mut self,
        sql: &str,
        kinds: &[ValueKind],
        params: &[Value],
        key_kind: ValueKind,
    ) -> impl Future<Output = DbResult<Value>> + Send {
        async move {
            check_params(kinds, params)?;
            let rows = [params.to_vec()];
            let mut keys = self
                .connection()
                .insert_returning_keys(sql, kinds, &rows, key_kind)
                .await?;
            if keys.len() != 1 {
                return Err(DbError::data_shape(format!(
                    "Expected exactly one generated key but the driver reported {}",
                    keys.len()
                )));
            }
            Ok(keys.remove(0))
        }
    }

    /// Insert every row and return one generated key per row, in row order.
    ///
    /// Fails if the driver reports a different number of keys than rows.
    fn insert_batch_with_keys(
        &mut self,
        sql: &str,
        kinds: &[ValueKind],
        rows: &[Vec<Value>],
        key_kind: ValueKind,
    ) -> impl Future<Output = DbResult<Vec<Value>>> + Send {
        async move {
            check_rows(kinds, rows)?;
            let keys = self
                .connection()
                .insert_returning_keys(sql, kinds, rows, key_kind)
                .await?;
            if keys.len() != rows.len() {
                return Err(DbError::data_shape(format!(
                    "Expected {} generated keys but the driver reported {}",
                    rows.len(),
                    keys.len()
                )));
            }
            Ok(keys)
        }
    }

    fn insert_table_with_keys(
        &mut self,
        sql: &str,
        table: &RowTable,
        key_kind: ValueKind,
    ) -> impl Future<Output = DbResult<Vec<Value>>> + Send {
        async move {
            let kinds = Arc::clone(table.shape().kinds());
            let rows = table.to_value_rows();
            self.insert_batch_with_keys(sql, &kinds, &rows, key_kind)
                .await
        }
    }
}

/// Explicit transaction boundaries for multi-transaction mode.
pub trait TransactionControl: WriteAccess {
    /// Toggle auto-commit. Re-enabling it commits an open transaction.
    fn set_auto_commit(&mut self, auto_commit: bool) -> impl Future<Output = DbResult<()>> + Send {
        async move { self.connection().set_auto_commit(auto_commit).await }
    }

    fn auto_commit(&mut self) -> bool {
        self.connection().auto_commit()
    }

    fn commit(&mut self) -> impl Future<Output = DbResult<()>> + Send {
        async move { self.connection().commit().await }
    }

    fn rollback(&mut self) -> impl Future<Output = DbResult<()>> + Send {
        async move { self.connection().rollback().await }
    }
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name {
            conn: BoxConnection,
        }

        impl $name {
            pub(crate) fn new(conn: BoxConnection) -> Self {
                Self { conn }
            }

            pub(crate) fn into_connection(self) -> BoxConnection {
                self.conn
            }
        }

        impl sealed::Sealed for $name {
            fn connection(&mut self) -> &mut dyn Connection {
                self.conn.as_mut()
            }
        }
    };
}

handle!(
    /// Handle passed to a readonly unit of work.
    ReadonlyHandle
);
handle!(
    /// Handle passed to a read-write unit of work.
    ReadWriteHandle
);
handle!(
    /// Handle passed to a multi-transaction unit of work.
    TransactionHandle
);

impl ReadAccess for ReadonlyHandle {}

impl ReadAccess for ReadWriteHandle {}
impl WriteAccess for ReadWriteHandle {}

impl ReadAccess for TransactionHandle {}
impl WriteAccess for TransactionHandle {}
impl TransactionControl for TransactionHandle {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_params_arity_is_data_shape() {
        let result = check_params(&[ValueKind::Text], &[]);
        assert!(matches!(result, Err(DbError::DataShape { .. })));
    }

    #[test]
    fn test_check_params_kind_mismatch_names_position() {
        let result = check_params(
            &[ValueKind::Text, ValueKind::Integer],
            &[Value::from("a"), Value::from("b")],
        );
        let err = result.unwrap_err();
        assert!(matches!(err, DbError::Access { .. }));
        let message = err.to_string();
        assert!(message.contains("Parameter 1"), "{message}");
        assert!(message.contains("integer"), "{message}");
    }

    #[test]
    fn test_check_params_accepts_null_for_any_kind() {
        let kinds = [ValueKind::Date, ValueKind::Decimal];
        assert!(check_params(&kinds, &[Value::Null, Value::Null]).is_ok());
    }

    #[test]
    fn test_check_rows_reports_row_index() {
        let rows = vec![vec![Value::Integer(1)], vec![]];
        let err = check_rows(&[ValueKind::Integer], &rows).unwrap_err();
        assert!(err.to_string().contains("Row 1"));
    }
}
