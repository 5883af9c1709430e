//! Fixed-shape records.
//!
//! A [`Record`] is an ordered value array bound one-to-one to a [`Shape`].
//! Storage is addressed by position; names are resolved through the shape.

use crate::error::{DbError, DbResult};
use crate::models::field::Shape;
use crate::models::value::{Value, ValueKind};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    shape: Arc<Shape>,
    values: Vec<Value>,
}

impl Record {
    /// Create a record with every position unset.
    pub fn new(shape: Arc<Shape>) -> Self {
        let values = vec![Value::Null; shape.len()];
        Self { shape, values }
    }

    /// Create a record from positional values, checking arity and kinds.
    pub fn from_values(shape: Arc<Shape>, values: Vec<Value>) -> DbResult<Self> {
        check_values(&shape, &values)?;
        Ok(Self { shape, values })
    }

    /// Fresh record of the same shape with every position unset.
    ///
    /// The prototype's current values are not copied.
    pub fn new_instance(&self) -> Self {
        Self::new(Arc::clone(&self.shape))
    }

    /// Fresh record of the same shape with field defaults applied.
    pub fn with_defaults(shape: Arc<Shape>) -> Self {
        let values = shape
            .fields()
            .iter()
            .map(|f| f.default_value.clone().unwrap_or_default())
            .collect();
        Self { shape, values }
    }

    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at a position, `None` when the position is outside the shape.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of a named field.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.shape.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Check if a position is unset.
    pub fn is_unset(&self, index: usize) -> bool {
        self.values.get(index).is_none_or(Value::is_null)
    }

    /// Set a position, rejecting values whose kind does not match the field.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> DbResult<()> {
        let value = value.into();
        let field = self.shape.field(index).ok_or_else(|| {
            DbError::data_shape(format!(
                "Position {} is outside a shape of {} fields",
                index,
                self.shape.len()
            ))
        })?;
        if !field.kind.is_compatible(&value) {
            return Err(DbError::data_shape(format!(
                "Field '{}' is {} but got a {} value",
                field.name,
                field.kind,
                value.type_name()
            )));
        }
        self.values[index] = value;
        Ok(())
    }

    /// Set a named field.
    pub fn set_by_name(&mut self, name: &str, value: impl Into<Value>) -> DbResult<()> {
        let index = self
            .shape
            .index_of(name)
            .ok_or_else(|| DbError::data_shape(format!("No field named '{}'", name)))?;
        self.set(index, value)
    }

    /// Replace all values at once, checking arity and kinds.
    pub fn set_values(&mut self, values: Vec<Value>) -> DbResult<()> {
        check_values(&self.shape, &values)?;
        self.values = values;
        Ok(())
    }

    /// Reset every position to unset.
    pub fn clear(&mut self) {
        self.values.iter_mut().for_each(|v| *v = Value::Null);
    }

    pub fn get_text(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(Value::as_text)
    }

    pub fn get_integer(&self, index: usize) -> Option<i64> {
        self.get(index).and_then(Value::as_integer)
    }

    pub fn get_decimal(&self, index: usize) -> Option<Decimal> {
        self.get(index).and_then(Value::as_decimal)
    }

    pub fn get_boolean(&self, index: usize) -> Option<bool> {
        self.get(index).and_then(Value::as_boolean)
    }

    pub fn get_date(&self, index: usize) -> Option<NaiveDate> {
        self.get(index).and_then(Value::as_date)
    }

    pub fn get_timestamp(&self, index: usize) -> Option<NaiveDateTime> {
        self.get(index).and_then(Value::as_timestamp)
    }

    /// Names of required fields that are still unset.
    pub fn missing_required(&self) -> Vec<&str> {
        self.shape
            .fields()
            .iter()
            .filter(|f| f.is_required && self.values[f.index].is_null())
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Render as a JSON object keyed by field name.
    pub fn to_json_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.shape
            .fields()
            .iter()
            .zip(&self.values)
            .map(|(field, value)| (field.name.clone(), value.to_json()))
            .collect()
    }
}

/// Check a positional value list against a kind vector.
pub(crate) fn check_kinds(kinds: &[ValueKind], values: &[Value]) -> DbResult<()> {
    if kinds.len() != values.len() {
        return Err(DbError::data_shape(format!(
            "Expected {} values but got {}",
            kinds.len(),
            values.len()
        )));
    }
    for (position, (kind, value)) in kinds.iter().zip(values).enumerate() {
        if !kind.is_compatible(value) {
            return Err(DbError::data_shape(format!(
                "Value at position {} is {} but {} was declared",
                position,
                value.type_name(),
                kind
            )));
        }
    }
    Ok(())
}

fn check_values(shape: &Shape, values: &[Value]) -> DbResult<()> {
    check_kinds(shape.kinds(), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::field::Field;

    fn person_shape() -> Arc<Shape> {
        Arc::new(
            Shape::new(vec![
                Field::new("name", 0, ValueKind::Text).required(),
                Field::new("age", 1, ValueKind::Integer).with_default(18i64),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_new_instance_is_unset_and_independent() {
        let mut prototype = Record::new(person_shape());
        prototype.set(0, "Ada").unwrap();
        prototype.set(1, 36i64).unwrap();

        let mut fresh = prototype.new_instance();
        assert_eq!(fresh.len(), 2);
        assert!(fresh.is_unset(0));
        assert!(fresh.is_unset(1));
        assert!(Arc::ptr_eq(fresh.shape(), prototype.shape()));

        fresh.set(0, "Grace").unwrap();
        assert_eq!(prototype.get_text(0), Some("Ada"));
        assert_eq!(fresh.get_text(0), Some("Grace"));
    }

    #[test]
    fn test_set_rejects_wrong_kind() {
        let mut record = Record::new(person_shape());
        let err = record.set(1, "thirty").unwrap_err();
        assert!(matches!(err, DbError::DataShape { .. }));
        assert!(record.is_unset(1));
    }

    #[test]
    fn test_set_rejects_out_of_range() {
        let mut record = Record::new(person_shape());
        assert!(record.set(2, 1i64).is_err());
    }

    #[test]
    fn test_named_access() {
        let mut record = Record::new(person_shape());
        record.set_by_name("age", 41i64).unwrap();
        assert_eq!(record.get_by_name("age"), Some(&Value::Integer(41)));
        assert!(record.set_by_name("email", "x").is_err());
    }

    #[test]
    fn test_defaults_and_required() {
        let record = Record::with_defaults(person_shape());
        assert_eq!(record.get_integer(1), Some(18));
        assert_eq!(record.missing_required(), vec!["name"]);
    }

    #[test]
    fn test_from_values_checks_arity() {
        let result = Record::from_values(person_shape(), vec![Value::from("Ada")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_to_json_map() {
        let record =
            Record::from_values(person_shape(), vec![Value::from("Ada"), Value::Integer(36)])
                .unwrap();
        let json = serde_json::Value::Object(record.to_json_map());
        assert_eq!(json, serde_json::json!({"name": "Ada", "age": 36}));
    }
}
