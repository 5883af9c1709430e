//! Homogeneous record collections.

use crate::error::{DbError, DbResult};
use crate::models::field::Shape;
use crate::models::record::Record;
use crate::models::value::{Value, ValueKind};
use std::sync::Arc;

/// Ordered, growable sequence of records sharing exactly one shape.
///
/// The value-kind vector is held once for the whole table and new rows are
/// materialized by cloning the table's prototype.
#[derive(Debug, Clone)]
pub struct RowTable {
    prototype: Record,
    rows: Vec<Record>,
}

impl RowTable {
    /// Create an empty table for a shape.
    pub fn new(shape: Arc<Shape>) -> Self {
        Self {
            prototype: Record::new(shape),
            rows: Vec::new(),
        }
    }

    /// Create an empty table whose rows are cloned from a prototype record.
    pub fn from_prototype(prototype: &Record) -> Self {
        Self {
            prototype: prototype.new_instance(),
            rows: Vec::new(),
        }
    }

    pub fn shape(&self) -> &Arc<Shape> {
        self.prototype.shape()
    }

    /// Kinds shared by every row, one per position.
    pub fn value_kinds(&self) -> &[ValueKind] {
        self.prototype.shape().kinds()
    }

    /// A fresh unset record of this table's shape; not added to the table.
    pub fn new_row(&self) -> Record {
        self.prototype.new_instance()
    }

    /// Append a record, rejecting records of a different shape.
    pub fn push(&mut self, record: Record) -> DbResult<()> {
        let ours = self.prototype.shape();
        let theirs = record.shape();
        if !Arc::ptr_eq(ours, theirs) && ours != theirs {
            return Err(DbError::data_shape(
                "Record shape does not match the row table shape",
            ));
        }
        self.rows.push(record);
        Ok(())
    }

    /// Append a row built from positional values.
    pub fn push_values(&mut self, values: Vec<Value>) -> DbResult<()> {
        let mut record = self.new_row();
        record.set_values(values)?;
        self.rows.push(record);
        Ok(())
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.rows.iter()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Positional value rows, in table order.
    pub fn to_value_rows(&self) -> Vec<Vec<Value>> {
        self.rows.iter().map(|r| r.values().to_vec()).collect()
    }
}

impl<'a> IntoIterator for &'a RowTable {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
