//! PostgreSQL session.
//!
//! Generated keys come from a `RETURNING` clause. Procedure output slots are
//! bound as typed NULL placeholders for the procedure's INOUT parameters; the
//! single row a `CALL` returns carries their values.

use super::{BlockCollector, PooledSession, row_count};
use crate::db::connection::{Connection, ParamSlot, RawCallResult, RowCallback, Statement};
use crate::db::params::bind_postgres_param;
use crate::db::types::RowDecode;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, Value, ValueKind};
use futures_util::TryStreamExt;
use futures_util::future::BoxFuture;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{Either, Executor, Postgres};
use std::borrow::Cow;
use tracing::debug;

const DB_TYPE: DatabaseType = DatabaseType::PostgreSQL;

static NULL: Value = Value::Null;

pub struct PgSession {
    inner: PooledSession<Postgres>,
}

impl PgSession {
    pub fn new(conn: PoolConnection<Postgres>) -> Self {
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
) -> Query<'q, Postgres, PgArguments> {
    params.fold(sqlx::query(sql), |query, (kind, value)| {
        bind_postgres_param(query, kind, value)
    })
}

/// Check for a `RETURNING` keyword outside quoted text and identifiers.
fn has_returning_clause(sql: &str) -> bool {
    let mut quote: Option<char> = None;
    let mut word_start: Option<usize> = None;
    for (idx, ch) in sql.char_indices().chain(std::iter::once((sql.len(), ' '))) {
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            continue;
        }
        if ch.is_alphanumeric() || ch == '_' || ch == '$' {
            word_start.get_or_insert(idx);
            continue;
        }
        if let Some(start) = word_start.take() {
            if sql[start..idx].eq_ignore_ascii_case("returning") {
                return true;
            }
        }
        if ch == '\'' || ch == '"' {
            quote = Some(ch);
        }
    }
    false
}

/// Append `RETURNING *` unless the statement already names what it returns.
fn with_returning(sql: &str) -> Cow<'_, str> {
    if has_returning_clause(sql) {
        Cow::Borrowed(sql)
    } else {
        Cow::Owned(format!(
            "{} RETURNING *",
            sql.trim_end().trim_end_matches(';')
        ))
    }
}

impl Connection for PgSession {
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
            let returning = with_returning(sql);
            let key_columns = [key_kind];
            let mut keys = Vec::with_capacity(rows.len());
            for row in rows {
                let conn = self.inner.conn()?;
                let statement = Statement::new(sql, kinds, row);
                let returned = bind_all(&returning, statement.bindings())
                    .fetch_all(conn)
                    .await?;
                for key_row in &returned {
                    keys.extend(key_row.decode_values(&key_columns)?);
                }
            }
            debug!(sql = %returning, rows = rows.len(), keys = keys.len(), "Executed insert");
            Ok(keys)
        })
    }

    fn call<'a>(
        &'a mut self,
        sql: &'a str,
        slots: &'a [ParamSlot<'a>],
    ) -> BoxFuture<'a, DbResult<RawCallResult>> {
        Box::pin(async move {
            self.begin_if_needed().await?;
            let out_kinds: Vec<ValueKind> = slots
                .iter()
                .filter_map(|slot| match *slot {
                    ParamSlot::Out(kind) => Some(kind),
                    ParamSlot::In { .. } => None,
                })
                .collect();
            let bindings = slots.iter().map(|slot| match *slot {
                ParamSlot::In { kind, value } => (kind, value),
                ParamSlot::Out(kind) => (kind, &NULL),
            });
            let query = bind_all(sql, bindings);
            let conn = self.inner.conn()?;
            debug!(sql = %sql, outputs = out_kinds.len(), "Calling procedure");

            if !out_kinds.is_empty() {
                let rows = query.fetch_all(conn).await?;
                let outputs = match rows.first() {
                    Some(row) => row.decode_values(&out_kinds)?,
                    None => {
                        return Err(DbError::access(
                            "Procedure call declared outputs but returned no output row",
                        ));
                    }
                };
                return Ok(RawCallResult {
                    blocks: Vec::new(),
                    outputs,
                });
            }

            let mut results = conn.fetch_many(query);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_returning_appends_clause() {
        assert_eq!(
            with_returning("INSERT INTO items (name) VALUES ($1);"),
            "INSERT INTO items (name) VALUES ($1) RETURNING *"
        );
    }

    #[test]
    fn test_with_returning_keeps_existing_clause() {
        let sql = "INSERT INTO items (name) VALUES ($1) RETURNING id";
        assert!(matches!(with_returning(sql), Cow::Borrowed(_)));
        let sql = "insert into items (name) values ($1)\nreturning\tid";
        assert!(matches!(with_returning(sql), Cow::Borrowed(_)));
    }

    #[test]
    fn test_returning_inside_names_and_literals_is_ignored() {
        assert_eq!(
            with_returning("INSERT INTO returning_customers (name) VALUES ($1)"),
            "INSERT INTO returning_customers (name) VALUES ($1) RETURNING *"
        );
        assert_eq!(
            with_returning("INSERT INTO notes (body) VALUES ('returning soon')"),
            "INSERT INTO notes (body) VALUES ('returning soon') RETURNING *"
        );
        assert_eq!(
            with_returning(r#"INSERT INTO "returning" (x) VALUES ($1)"#),
            r#"INSERT INTO "returning" (x) VALUES ($1) RETURNING *"#
        );
    }
}
