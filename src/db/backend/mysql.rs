//! MySQL session.
//!
//! Generated keys come from `LAST_INSERT_ID()`. MySQL cannot bind an OUT
//! parameter of a prepared `CALL`, so a declared output is routed through a
//! session variable and read back once the call has finished.

use super::{BlockCollector, PooledSession, row_count};
use crate::db::connection::{Connection, ParamSlot, RawCallResult, RowCallback, Statement};
use crate::db::params::bind_mysql_param;
use crate::db::types::{RowDecode, key_value};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, Value, ValueKind};
use futures_util::TryStreamExt;
use futures_util::future::BoxFuture;
use sqlx::mysql::MySqlArguments;
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::{Either, Executor, MySql};
use tracing::debug;

const DB_TYPE: DatabaseType = DatabaseType::MySQL;

const OUT_VARIABLE: &str = "@db_access_out";

pub struct MySqlSession {
    inner: PooledSession<MySql>,
}

impl MySqlSession {
    pub fn new(conn: PoolConnection<MySql>) -> Self {
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
) -> Query<'q, MySql, MySqlArguments> {
    params.fold(sqlx::query(sql), |query, (kind, value)| {
        bind_mysql_param(query, kind, value)
    })
}

/// Replace the first `?` placeholder outside quoted text with `variable`.
///
/// Returns `None` when the statement has no placeholder.
fn rewrite_first_placeholder(sql: &str, variable: &str) -> Option<String> {
    let mut quote: Option<char> = None;
    for (idx, ch) in sql.char_indices() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' | '`' => quote = Some(ch),
                '?' => {
                    let mut rewritten = String::with_capacity(sql.len() + variable.len());
                    rewritten.push_str(&sql[..idx]);
                    rewritten.push_str(variable);
                    rewritten.push_str(&sql[idx + 1..]);
                    return Some(rewritten);
                }
                _ => {}
            },
        }
    }
    None
}

impl Connection for MySqlSession {
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
                let id = result.last_insert_id();
                if result.rows_affected() > 0 && id != 0 {
                    let id = i64::try_from(id).map_err(|_| {
                        DbError::data_shape(format!("Generated key {id} does not fit a 64-bit integer"))
                    })?;
                    keys.push(key_value(id, key_kind)?);
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
            let out_kinds: Vec<ValueKind> = slots
                .iter()
                .filter_map(|slot| match *slot {
                    ParamSlot::Out(kind) => Some(kind),
                    ParamSlot::In { .. } => None,
                })
                .collect();
            if out_kinds.len() > 1 {
                return Err(DbError::access(format!(
                    "MySQL procedure calls support one output value, {} were declared",
                    out_kinds.len()
                )));
            }
            self.begin_if_needed().await?;

            let rewritten = match out_kinds.first() {
                Some(_) => {
                    self.run_raw("SET @db_access_out = NULL").await?;
                    let rewritten = rewrite_first_placeholder(sql, OUT_VARIABLE).ok_or_else(|| {
                        DbError::access(
                            "Procedure call declares a return value but has no placeholder for it",
                        )
                    })?;
                    Some(rewritten)
                }
                None => None,
            };
            let call_sql = rewritten.as_deref().unwrap_or(sql);
            debug!(sql = %call_sql, outputs = out_kinds.len(), "Calling procedure");

            let inputs = slots.iter().filter_map(|slot| match *slot {
                ParamSlot::In { kind, value } => Some((kind, value)),
                ParamSlot::Out(_) => None,
            });
            let conn = self.inner.conn()?;
            let mut collector = BlockCollector::default();
            {
                let mut results = (&mut *conn).fetch_many(bind_all(call_sql, inputs));
                while let Some(step) = results.try_next().await? {
                    match step {
                        Either::Left(done) => {
                            collector.finish_statement(row_count(done.rows_affected()))
                        }
                        Either::Right(row) => collector.push_row(row.decode_dynamic()),
                    }
                }
            }

            let mut outputs = Vec::new();
            if let Some(&kind) = out_kinds.first() {
                let row = sqlx::query("SELECT @db_access_out")
                    .fetch_one(&mut *conn)
                    .await?;
                outputs = row.decode_values(&[kind])?;
            }
            Ok(RawCallResult {
                blocks: collector.into_blocks(),
                outputs,
            })
        })
    }

    fn detach(mut self: Box<Self>) {
        self.inner.detach();
    }
}
