//! Shared test helpers.
//!
//! `ScriptedSource` hands out in-memory connections that replay a fixed
//! script and record every call, for driver behavior a real store cannot be
//! made to produce on demand.

#![allow(dead_code)]

use db_access::db::{
    BoxConnection, Connection, ConnectionSource, ParamSlot, RawCallResult, RowCallback, Statement,
};
use db_access::models::{DatabaseType, Value, ValueKind};
use db_access::{DbError, DbResult};
use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex};

/// What a scripted connection answers.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Rows returned by every fetch
    pub rows: Vec<Vec<Value>>,
    /// Counts returned by successive executes; 1 once exhausted
    pub execute_counts: Vec<i64>,
    /// Keys returned by every insert
    pub keys: Vec<Value>,
    pub call_result: RawCallResult,
    pub fail_rollback: bool,
    pub fail_commit: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.events().iter().any(|e| e == event)
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

pub struct ScriptedConnection {
    script: Script,
    journal: Journal,
    auto_commit: bool,
    in_transaction: bool,
    next_count: usize,
}

impl ScriptedConnection {
    fn begin_if_needed(&mut self) {
        if !self.auto_commit && !self.in_transaction {
            self.journal.record("begin");
            self.in_transaction = true;
        }
    }
}

impl Connection for ScriptedConnection {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn set_read_only(&mut self, read_only: bool) -> BoxFuture<'_, DbResult<()>> {
        self.journal.record(format!("read_only={read_only}"));
        Box::pin(async { Ok(()) })
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move {
            self.journal.record(format!("auto_commit={auto_commit}"));
            if auto_commit && self.in_transaction {
                self.commit().await?;
            }
            self.auto_commit = auto_commit;
            Ok(())
        })
    }

    fn commit(&mut self) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move {
            if self.script.fail_commit {
                return Err(DbError::access("commit refused"));
            }
            if self.in_transaction {
                self.journal.record("commit");
                self.in_transaction = false;
            }
            Ok(())
        })
    }

    fn rollback(&mut self) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move {
            if self.script.fail_rollback {
                self.journal.record("rollback failed");
                return Err(DbError::access("rollback refused"));
            }
            if self.in_transaction {
                self.journal.record("rollback");
                self.in_transaction = false;
            }
            Ok(())
        })
    }

    fn fetch<'a>(
        &'a mut self,
        statement: Statement<'a>,
        _columns: &'a [ValueKind],
        on_row: &'a mut RowCallback<'a>,
    ) -> BoxFuture<'a, DbResult<usize>> {
        Box::pin(async move {
            self.begin_if_needed();
            self.journal.record(format!("fetch {}", statement.sql));
            let mut seen = 0;
            for row in self.script.rows.clone() {
                seen += 1;
                if !on_row(row)? {
                    break;
                }
            }
            Ok(seen)
        })
    }

    fn execute<'a>(&'a mut self, statement: Statement<'a>) -> BoxFuture<'a, DbResult<i64>> {
        Box::pin(async move {
            self.begin_if_needed();
            self.journal.record(format!("execute {}", statement.sql));
            let count = self
                .script
                .execute_counts
                .get(self.next_count)
                .copied()
                .unwrap_or(1);
            self.next_count += 1;
            Ok(count)
        })
    }

    fn insert_returning_keys<'a>(
        &'a mut self,
        sql: &'a str,
        _kinds: &'a [ValueKind],
        rows: &'a [Vec<Value>],
        _key_kind: ValueKind,
    ) -> BoxFuture<'a, DbResult<Vec<Value>>> {
        Box::pin(async move {
            self.begin_if_needed();
            self.journal.record(format!("insert {} rows={}", sql, rows.len()));
            Ok(self.script.keys.clone())
        })
    }

    fn call<'a>(
        &'a mut self,
        sql: &'a str,
        slots: &'a [ParamSlot<'a>],
    ) -> BoxFuture<'a, DbResult<RawCallResult>> {
        Box::pin(async move {
            self.begin_if_needed();
            let layout: Vec<String> = slots
                .iter()
                .map(|slot| match slot {
                    ParamSlot::Out(kind) => format!("out:{kind}"),
                    ParamSlot::In { kind, .. } => format!("in:{kind}"),
                })
                .collect();
            self.journal
                .record(format!("call {} [{}]", sql, layout.join(", ")));
            Ok(self.script.call_result.clone())
        })
    }

    fn detach(self: Box<Self>) {
        self.journal.record("detach");
    }
}

/// Connection source handing out scripted connections.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    pub script: Script,
    pub journal: Journal,
}

impl ScriptedSource {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            journal: Journal::default(),
        }
    }
}

impl ConnectionSource for ScriptedSource {
    fn acquire<'a>(&'a self, store: Option<&'a str>) -> BoxFuture<'a, DbResult<BoxConnection>> {
        Box::pin(async move {
            self.journal
                .record(format!("acquire {}", store.unwrap_or("default")));
            let conn: BoxConnection = Box::new(ScriptedConnection {
                script: self.script.clone(),
                journal: self.journal.clone(),
                auto_commit: true,
                in_transaction: false,
                next_count: 0,
            });
            Ok(conn)
        })
    }
}

/// SQLite URL for a file inside `dir`; the file lives as long as the dir.
pub fn sqlite_url(dir: &tempfile::TempDir, name: &str) -> String {
    format!("sqlite:{}", dir.path().join(name).display())
}
