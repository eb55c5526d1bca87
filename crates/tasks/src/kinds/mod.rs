//! Task implementations, one module per kind, plus the table helpers
//! they share.

pub mod algo_transform;
pub mod experiment;
pub mod feature;
pub mod layer;
pub mod scene;
pub mod service;
pub mod source;

pub use algo_transform::AlgoTransformTask;
pub use experiment::{ExperimentTask, RankStage};
pub use feature::FeatureTask;
pub use layer::LayerTask;
pub use scene::SceneTask;
pub use service::ServiceTask;
pub use source::SourceTask;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use records::{DataResult, Field, Row, union_fields};
use serde_json::Value;

use crate::error::{TaskError, TaskResult};

/// Comparable string form of a scalar value; `None` for null and
/// containers.
pub fn value_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Stack the rows of several results under the union of their schemas.
pub fn concat_results(name: &str, results: &[Arc<DataResult>]) -> TaskResult<DataResult> {
    let fields = union_fields(results.iter().map(|r| r.fields()));
    let rows: Vec<Row> = results.iter().flat_map(|r| r.rows().iter().cloned()).collect();
    DataResult::new(name, fields, rows).map_err(|e| TaskError::schema(name, e))
}

/// Left-join every other result onto the first by `key`.
///
/// Rows of the first result are kept in order. For each other result the
/// first row with an equal key contributes the columns the row does not
/// have yet.
pub fn join_results(name: &str, key: &str, results: &[Arc<DataResult>]) -> TaskResult<DataResult> {
    let Some((base, others)) = results.split_first() else {
        return Ok(DataResult::empty(name, Vec::new()));
    };

    let indexes: Vec<HashMap<String, &Row>> = others
        .iter()
        .map(|other| {
            let mut index = HashMap::new();
            for row in other.rows() {
                if let Some(k) = row.get(key).and_then(value_key) {
                    index.entry(k).or_insert(row);
                }
            }
            index
        })
        .collect();

    let rows: Vec<Row> = base
        .rows()
        .iter()
        .map(|row| {
            let mut joined = row.clone();
            if let Some(k) = row.get(key).and_then(value_key) {
                for index in &indexes {
                    if let Some(matched) = index.get(&k) {
                        for (column, value) in matched.iter() {
                            if !joined.contains_key(column) {
                                joined.insert(column.clone(), value.clone());
                            }
                        }
                    }
                }
            }
            joined
        })
        .collect();

    let fields = union_fields(results.iter().map(|r| r.fields()));
    DataResult::new(name, fields, rows).map_err(|e| TaskError::schema(name, e))
}

/// Restrict a result to declared columns; no columns means keep all.
pub fn project(name: &str, columns: &[Field], result: DataResult) -> TaskResult<DataResult> {
    if columns.is_empty() {
        return Ok(result.renamed(name));
    }
    DataResult::new(name, columns.to_vec(), result.into_rows())
        .map_err(|e| TaskError::schema(name, e))
}

/// Stable sort on a numeric column; rows without a number go last.
pub fn sort_rows_by(rows: &mut [Row], column: &str, desc: bool) {
    rows.sort_by(|a, b| {
        let x = a.get(column).and_then(Value::as_f64);
        let y = b.get(column).and_then(Value::as_f64);
        match (x, y) {
            (Some(x), Some(y)) => {
                let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
                if desc { ord.reverse() } else { ord }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use records::FieldType;
    use serde_json::json;

    #[test]
    fn test_concat_keeps_order_and_unions_schema() {
        let a = result("a", &[("id", FieldType::Str)], vec![json!({"id": "1"})]);
        let b = result(
            "b",
            &[("id", FieldType::Str), ("score", FieldType::Double)],
            vec![json!({"id": "2", "score": 0.5})],
        );

        let merged = concat_results("m", &[a, b]).unwrap();
        assert_eq!(merged.name(), "m");
        assert_eq!(merged.fields().len(), 2);
        assert_eq!(merged.rows()[0]["id"], "1");
        assert_eq!(merged.rows()[0]["score"], Value::Null);
        assert_eq!(merged.rows()[1]["score"], 0.5);
    }

    #[test]
    fn test_concat_of_nothing_is_empty() {
        let merged = concat_results("m", &[]).unwrap();
        assert!(merged.is_empty());
        assert!(merged.fields().is_empty());
    }

    #[test]
    fn test_join_is_left_and_first_match_wins() {
        let items = result(
            "items",
            &[("item_id", FieldType::Str)],
            vec![json!({"item_id": "a"}), json!({"item_id": "b"})],
        );
        let stats = result(
            "stats",
            &[("item_id", FieldType::Str), ("ctr", FieldType::Double)],
            vec![
                json!({"item_id": "a", "ctr": 0.1}),
                json!({"item_id": "a", "ctr": 0.9}),
            ],
        );

        let joined = join_results("j", "item_id", &[items, stats]).unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.rows()[0]["ctr"], 0.1);
        assert_eq!(joined.rows()[1]["ctr"], Value::Null);
    }

    #[test]
    fn test_sort_puts_missing_last() {
        let mut rows = vec![
            row(json!({"s": 1.0})),
            row(json!({})),
            row(json!({"s": 3})),
            row(json!({"s": 2.0})),
        ];
        sort_rows_by(&mut rows, "s", true);
        let order: Vec<Option<f64>> = rows.iter().map(|r| r.get("s").and_then(Value::as_f64)).collect();
        assert_eq!(order, vec![Some(3.0), Some(2.0), Some(1.0), None]);

        sort_rows_by(&mut rows, "s", false);
        assert_eq!(rows[0]["s"], 1.0);
        assert!(rows[3].get("s").is_none());
    }

    #[test]
    fn test_project_validates_declared_columns() {
        let source = result(
            "s",
            &[("id", FieldType::Str), ("extra", FieldType::Int32)],
            vec![json!({"id": "1", "extra": 3})],
        );
        let projected = project(
            "p",
            &[Field::new("id", FieldType::Str)],
            (*source).clone(),
        )
        .unwrap();
        assert_eq!(projected.fields().len(), 1);
        assert!(projected.rows()[0].get("extra").is_none());
    }
}
