//! `DataResult`: the unit of data passed between tasks.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};
use crate::field::Field;

/// One row of a result: field name → value.
pub type Row = Map<String, Value>;

/// An immutable named table.
///
/// Every row holds exactly the declared fields, in declaration order.
/// Construction validates each value against its field type; missing
/// values become `null` and undeclared keys are dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataResult {
    name: String,
    fields: Vec<Field>,
    rows: Vec<Row>,
}

impl DataResult {
    /// Build a result from rows, validating them against `fields`.
    pub fn new(name: impl Into<String>, fields: Vec<Field>, rows: Vec<Row>) -> Result<Self> {
        let name = name.into();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| project_row(&name, &fields, index, row))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { name, fields, rows })
    }

    /// Build a result from caller-supplied JSON records.
    ///
    /// Each record must be a JSON object.
    pub fn from_records(
        name: impl Into<String>,
        fields: Vec<Field>,
        records: Vec<Value>,
    ) -> Result<Self> {
        let name = name.into();
        let rows = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| match record {
                Value::Object(row) => Ok(row),
                _ => Err(SchemaError::NotAnObject {
                    result: name.clone(),
                    row: index,
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(name, fields, rows)
    }

    /// A result with a schema and no rows.
    pub fn empty(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Project the rows to plain records for final output.
    pub fn output(&self) -> Vec<Row> {
        self.rows.clone()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Same data under another name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Keep at most the first `len` rows.
    pub fn truncated(mut self, len: usize) -> Self {
        self.rows.truncate(len);
        self
    }
}

fn project_row(result: &str, fields: &[Field], index: usize, mut row: Row) -> Result<Row> {
    let mut projected = Map::with_capacity(fields.len());
    for field in fields {
        let value = row.get_mut(&field.name).map(Value::take).unwrap_or(Value::Null);
        if !field.field_type.accepts(&value) {
            return Err(SchemaError::TypeMismatch {
                result: result.to_string(),
                row: index,
                field: field.name.clone(),
                expected: field.field_type.clone(),
                found: describe(&value),
            });
        }
        projected.insert(field.name.clone(), value);
    }
    Ok(projected)
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(n) => format!("number {}", n),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

/// Union of several schemas, first declaration of a name wins.
pub fn union_fields<'a>(schemas: impl IntoIterator<Item = &'a [Field]>) -> Vec<Field> {
    let mut fields: Vec<Field> = Vec::new();
    for schema in schemas {
        for field in schema {
            if !fields.iter().any(|f| f.name == field.name) {
                fields.push(field.clone());
            }
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;
    use serde_json::json;

    fn item_fields() -> Vec<Field> {
        vec![
            Field::new("item_id", FieldType::Str),
            Field::new("score", FieldType::Double),
        ]
    }

    #[test]
    fn test_from_records_projects_to_declared_fields() {
        let result = DataResult::from_records(
            "recall",
            item_fields(),
            vec![
                json!({"score": 0.5, "item_id": "a", "extra": true}),
                json!({"item_id": "b"}),
            ],
        )
        .unwrap();

        assert_eq!(result.len(), 2);
        let first: Vec<&String> = result.rows()[0].keys().collect();
        assert_eq!(first, vec!["item_id", "score"]);
        assert_eq!(result.rows()[1]["score"], Value::Null);
    }

    #[test]
    fn test_type_mismatch_is_reported_not_coerced() {
        let err = DataResult::from_records(
            "recall",
            item_fields(),
            vec![json!({"item_id": "a", "score": "high"})],
        )
        .unwrap_err();

        match err {
            SchemaError::TypeMismatch { field, row, .. } => {
                assert_eq!(field, "score");
                assert_eq!(row, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_object_record_is_rejected() {
        let err = DataResult::from_records("recall", item_fields(), vec![json!(["a"])]).unwrap_err();
        assert_eq!(
            err,
            SchemaError::NotAnObject {
                result: "recall".to_string(),
                row: 0
            }
        );
    }

    #[test]
    fn test_union_fields_keeps_first_declaration() {
        let a = vec![Field::new("id", FieldType::Str), Field::new("x", FieldType::Int32)];
        let b = vec![Field::new("x", FieldType::Double), Field::new("y", FieldType::Bool)];
        let merged = union_fields([a.as_slice(), b.as_slice()]);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[1].field_type, FieldType::Int32);
        assert_eq!(merged[2].name, "y");
    }
}
