//! SQLite session.
//!
//! SQLite has no stored procedures: a procedure call runs its text as a
//! statement script and surfaces every statement's result in order.

use super::{BlockCollector, PooledSession, row_count};
use crate::db::connection::{Connection, ParamSlot, RawCallResult, RowCallback, Statement};
use crate::db::params::bind_sqlite_param;
use crate::db::types::{RowDecode, key_value};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, Value, ValueKind};
use futures_util::TryStreamExt;
use futures_util::future::BoxFuture;
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Either, Executor, Sqlite};
use tracing::debug;

const DB_TYPE: DatabaseType = DatabaseType::SQLite;

pub struct SqliteSession {
    inner: PooledSession<Sqlite>,
}

impl SqliteSession {
    pub fn new(conn: PoolConnection<Sqlite>) -> Self {
        Self {
            inner: PooledSession::new(conn, DB_TYPE),
        }
    }

    async fn run_raw(&mut self, sql: &'static str) -> DbResult<()> {
        let conn = self.inner.conn()?;
        conn.execute(sql).await?;
        debug!(sql = %sql, "Session statement executed");
        Ok(())
    }

    async fn begin_if_needed(&mut self) -> DbResult<()> {
        if self.inner.needs_begin() {
            self.run_raw(DB_TYPE.begin_statement()).await?;
            self.inner.in_transaction = true;
        }
        Ok(())
    }

    async fn finish(&mut self, sql: &'static str) -> DbResult<()> {
        if self.inner.in_transaction {
            self.run_raw(sql).await?;
            self.inner.in_transaction = false;
        }
        Ok(())
    }
}

fn bind_all<'q, 'v: 'q>(
    sql: &'q str,
    params: impl Iterator<Item = (ValueKind, &'v Value)>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    params.fold(sqlx::query(sql), |query, (kind, value)| {
        bind_sqlite_param(query, kind, value)
    })
}

impl Connection for SqliteSession {
    fn database_type(&self) -> DatabaseType {
        DB_TYPE
    }

    fn auto_commit(&self) -> bool {
        self.inner.auto_commit
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction
    }

    fn set_read_only(&mut self, read_only: bool) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move {
            if self.inner.read_only != read_only {
                self.run_raw(DB_TYPE.read_only_statement(read_only)).await?;
                self.inner.read_only = read_only;
            }
            Ok(())
        })
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move {
            if auto_commit {
                self.finish("COMMIT").await?;
            }
            self.inner.auto_commit = auto_commit;
            Ok(())
        })
    }

    fn commit(&mut self) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(self.finish("COMMIT"))
    }

    fn rollback(&mut self) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(self.finish("ROLLBACK"))
    }

    fn fetch<'a>(
        &'a mut self,
        statement: Statement<'a>,
        columns: &'a [ValueKind],
        on_row: &'a mut RowCallback<'a>,
    ) -> BoxFuture<'a, DbResult<usize>> {
        Box::pin(async move {
            self.begin_if_needed().await?;
            let conn = self.inner.conn()?;
            debug!(sql = %statement.sql, params = statement.params.len(), "Executing query");

            let mut rows = if statement.params.is_empty() {
                conn.fetch(statement.sql)
            } else {
                bind_all(statement.sql, statement.bindings()).fetch(conn)
            };
            let mut seen = 0;
            while let Some(row) = rows.try_next().await? {
                seen += 1;
                if !on_row(row.decode_values(columns)?)? {
                    break;
                }
            }
            Ok(seen)
        })
    }

    fn execute<'a>(&'a mut self, statement: Statement<'a>) -> BoxFuture<'a, DbResult<i64>> {
        Box::pin(async move {
            self.begin_if_needed().await?;
            let conn = self.inner.conn()?;
            let result = if statement.params.is_empty() {
                conn.execute(statement.sql).await?
            } else {
                bind_all(statement.sql, statement.bindings())
                    .execute(conn)
                    .await?
            };
            debug!(
                sql = %statement.sql,
                params = statement.params.len(),
                rows_affected = result.rows_affected(),
                "Executed statement"
            );
            Ok(row_count(result.rows_affected()))
        })
    }

    fn insert_returning_keys<'a>(
        &'a mut self,
        sql: &'a str,
        kinds: &'a [ValueKind],
        rows: &'a [Vec<Value>],
        key_kind: ValueKind,
    ) -> BoxFuture<'a, DbResult<Vec<Value>>> {
        Box::pin(async move {
            self.begin_if_needed().await?;
            let mut keys = Vec::with_capacity(rows.len());
            for row in rows {
                let conn = self.inner.conn()?;
                let statement = Statement::new(sql, kinds, row);
                let result = bind_all(sql, statement.bindings()).execute(conn).await?;
                if result.rows_affected() > 0 {
                    keys.push(key_value(result.last_insert_rowid(), key_kind)?);
                }
            }
            debug!(sql = %sql, rows = rows.len(), keys = keys.len(), "Executed insert");
            Ok(keys)
        })
    }

    fn call<'a>(
        &'a mut self,
        sql: &'a str,
        slots: &'a [ParamSlot<'a>],
    ) -> BoxFuture<'a, DbResult<RawCallResult>> {
        Box::pin(async move {
            if slots.iter().any(|slot| matches!(slot, ParamSlot::Out(_))) {
                return Err(DbError::access(
                    "SQLite has no stored procedures; a return value cannot be declared",
                ));
            }
            self.begin_if_needed().await?;
            let conn = self.inner.conn()?;
            debug!(sql = %sql, "Executing statement script");

            let inputs = slots.iter().filter_map(|slot| match *slot {
                ParamSlot::In { kind, value } => Some((kind, value)),
                ParamSlot::Out(_) => None,
            });
            let mut results = conn.fetch_many(bind_all(sql, inputs));
            let mut collector = BlockCollector::default();
            while let Some(step) = results.try_next().await? {
                match step {
                    Either::Left(done) => collector.finish_statement(row_count(done.rows_affected())),
                    Either::Right(row) => collector.push_row(row.decode_dynamic()),
                }
            }
            Ok(RawCallResult {
                blocks: collector.into_blocks(),
                outputs: Vec::new(),
            })
        })
    }

    fn detach(mut self: Box<Self>) {
        self.inner.detach();
    }
}
