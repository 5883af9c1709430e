//! Stored-procedure call descriptions and results.

use crate::models::value::{Value, ValueKind};
use serde::Serialize;

/// A stored-procedure invocation.
///
/// `sql` is written in the store's own call syntax with one placeholder per
/// slot. When `return_kind` is set, the first placeholder is the scalar
/// output and the bound inputs follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureCall {
    pub sql: String,
    pub return_kind: Option<ValueKind>,
    pub kinds: Vec<ValueKind>,
    pub params: Vec<Value>,
}

impl ProcedureCall {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            return_kind: None,
            kinds: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Declare a scalar return value of the given kind.
    pub fn returning(mut self, kind: ValueKind) -> Self {
        self.return_kind = Some(kind);
        self
    }

    /// Append one input parameter.
    pub fn arg(mut self, kind: ValueKind, value: impl Into<Value>) -> Self {
        self.kinds.push(kind);
        self.params.push(value.into());
        self
    }
}

/// One output block produced by a statement executed inside a procedure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ProcedureBlock {
    /// A row set, positionally decoded.
    Rows(Vec<Vec<Value>>),
    /// Rows affected by a statement that produced no row set.
    UpdateCount(i64),
}

impl ProcedureBlock {
    pub fn is_rows(&self) -> bool {
        matches!(self, ProcedureBlock::Rows(_))
    }
}

/// Collected outcome of a procedure call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcedureResult {
    pub returned: Option<Value>,
    /// Lenient sum of update counts, -1 when no statement reported one
    pub affected_rows: i64,
    pub blocks: Vec<ProcedureBlock>,
}

impl ProcedureResult {
    /// Row sets only, in the order they were produced.
    pub fn row_sets(&self) -> impl Iterator<Item = &Vec<Vec<Value>>> {
        self.blocks.iter().filter_map(|b| match b {
            ProcedureBlock::Rows(rows) => Some(rows),
            ProcedureBlock::UpdateCount(_) => None,
        })
    }
}
