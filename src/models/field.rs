//! Field and row shape definitions.
//!
//! A [`Field`] binds a [`ValueKind`] to a stable ordinal position. A [`Shape`]
//! is the validated, ordinal-ordered field list shared by every record of one
//! row type.

use crate::error::{DbError, DbResult};
use crate::models::value::{Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Metadata about one positional field of a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    /// Ordinal position in the row, dense from 0
    pub index: usize,
    pub kind: ValueKind,
    /// Name of a value schema used by validation layers outside this crate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_schema: Option<String>,
    #[serde(default)]
    pub is_list: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub is_required: bool,
}

impl Field {
    /// Create a new optional, non-list field without a default.
    pub fn new(name: impl Into<String>, index: usize, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            index,
            kind,
            value_schema: None,
            is_list: false,
            default_value: None,
            is_required: false,
        }
    }

    /// Mark this field as required.
    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    /// Mark this field as holding a list.
    pub fn list(mut self) -> Self {
        self.is_list = true;
        self
    }

    /// Attach a value schema reference.
    pub fn with_value_schema(mut self, schema: impl Into<String>) -> Self {
        self.value_schema = Some(schema.into());
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Validated field list of one row type.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    fields: Vec<Field>,
    kinds: Arc<[ValueKind]>,
}

impl Shape {
    /// Build a shape, ordering fields by ordinal.
    ///
    /// Ordinals must be unique and dense (0..n-1), names non-empty and
    /// unique, and defaults compatible with their field kind.
    pub fn new(fields: impl IntoIterator<Item = Field>) -> DbResult<Self> {
        let mut fields: Vec<Field> = fields.into_iter().collect();
        if fields.is_empty() {
            return Err(DbError::data_shape("A shape needs at least one field"));
        }
        fields.sort_by_key(|f| f.index);

        let mut names = HashSet::with_capacity(fields.len());
        for (position, field) in fields.iter().enumerate() {
            if field.index != position {
                return Err(DbError::data_shape(format!(
                    "Field '{}' has ordinal {} but position {} is expected; ordinals must be unique and dense",
                    field.name, field.index, position
                )));
            }
            if field.name.trim().is_empty() {
                return Err(DbError::data_shape(format!(
                    "Field at ordinal {} has an empty name",
                    position
                )));
            }
            if !names.insert(field.name.as_str()) {
                return Err(DbError::data_shape(format!(
                    "Duplicate field name '{}'",
                    field.name
                )));
            }
            if let Some(default) = &field.default_value {
                if !field.kind.is_compatible(default) {
                    return Err(DbError::data_shape(format!(
                        "Default for field '{}' is {} but the field is {}",
                        field.name,
                        default.type_name(),
                        field.kind
                    )));
                }
            }
        }

        let kinds: Arc<[ValueKind]> = fields.iter().map(|f| f.kind).collect();
        Ok(Self { fields, kinds })
    }

    /// Build a shape from `(name, kind)` pairs, assigning ordinals in order.
    pub fn from_columns<'a>(
        columns: impl IntoIterator<Item = (&'a str, ValueKind)>,
    ) -> DbResult<Self> {
        Self::new(
            columns
                .into_iter()
                .enumerate()
                .map(|(index, (name, kind))| Field::new(name, index, kind)),
        )
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Shapes are never empty; kept for API symmetry with collections.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in ordinal order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Field at an ordinal position.
    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Ordinal of a field by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// The shared value-kind vector, one entry per ordinal.
    pub fn kinds(&self) -> &Arc<[ValueKind]> {
        &self.kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_orders_fields_by_ordinal() {
        let shape = Shape::new(vec![
            Field::new("age", 1, ValueKind::Integer),
            Field::new("name", 0, ValueKind::Text),
        ])
        .unwrap();
        assert_eq!(shape.fields()[0].name, "name");
        assert_eq!(shape.kinds().as_ref(), &[ValueKind::Text, ValueKind::Integer]);
        assert_eq!(shape.index_of("age"), Some(1));
    }

    #[test]
    fn test_shape_rejects_gap_in_ordinals() {
        let result = Shape::new(vec![
            Field::new("name", 0, ValueKind::Text),
            Field::new("age", 2, ValueKind::Integer),
        ]);
        assert!(matches!(result, Err(DbError::DataShape { .. })));
    }

    #[test]
    fn test_shape_rejects_duplicate_ordinal() {
        let result = Shape::new(vec![
            Field::new("name", 0, ValueKind::Text),
            Field::new("alias", 0, ValueKind::Text),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_shape_rejects_duplicate_name() {
        let result = Shape::from_columns([("id", ValueKind::Integer), ("id", ValueKind::Text)]);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Duplicate field name"));
    }

    #[test]
    fn test_shape_rejects_incompatible_default() {
        let result = Shape::new(vec![Field::new("age", 0, ValueKind::Integer).with_default("x")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_field_builder() {
        let field = Field::new("tags", 3, ValueKind::Text)
            .list()
            .required()
            .with_value_schema("tag");
        assert!(field.is_list);
        assert!(field.is_required);
        assert_eq!(field.value_schema.as_deref(), Some("tag"));
    }
}
