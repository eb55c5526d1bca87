//! Derived columns over a feature table.
//!
//! ## Algorithm
//! 1. Fetch the feature inputs, then the nested transforms
//! 2. Merge them like a feature does (join or stack)
//! 3. Apply the field actions to every row in parallel; an action may
//!    read columns derived by earlier actions
//! 4. Project to the declared columns

use std::sync::Arc;

use async_trait::async_trait;
use rayon::prelude::*;
use records::{DataResult, Field, FieldType, Row};
use serde_json::{Number, Value};
use task_config::{ActionFunc, AlgoTransformConfig, FieldAction, TaskKind};

use super::feature::merge_inputs;
use super::{project, value_key};
use crate::context::RequestContext;
use crate::error::{TaskError, TaskResult};
use crate::executor::Executor;
use crate::traits::Task;

const DEFAULT_SEPARATOR: &str = "_";

pub struct AlgoTransformTask {
    name: String,
    inputs: Vec<String>,
    join: Option<String>,
    actions: Vec<FieldAction>,
    columns: Vec<Field>,
}

impl AlgoTransformTask {
    pub fn new(config: &AlgoTransformConfig) -> Self {
        Self {
            name: config.name.clone(),
            inputs: config
                .feature
                .iter()
                .chain(&config.algo_transform)
                .cloned()
                .collect(),
            join: config.join.clone(),
            actions: config.actions.clone(),
            columns: config.columns.clone(),
        }
    }

    fn derive(&self, merged: DataResult) -> TaskResult<DataResult> {
        if self.actions.is_empty() {
            return Ok(merged);
        }

        let mut fields = merged.fields().to_vec();
        for action in &self.actions {
            let field = Field::new(action.name.clone(), action.field_type.clone());
            match fields.iter_mut().find(|f| f.name == action.name) {
                Some(existing) => *existing = field,
                None => fields.push(field),
            }
        }

        let rows: Vec<Row> = merged
            .rows()
            .par_iter()
            .map(|row| -> Result<Row, String> {
                let mut row = row.clone();
                for action in &self.actions {
                    let value = apply_action(action, &row)?;
                    row.insert(action.name.clone(), value);
                }
                Ok(row)
            })
            .collect::<Result<Vec<Row>, String>>()
            .map_err(|reason| TaskError::execution_failed(&self.name, reason))?;

        DataResult::new(self.name.clone(), fields, rows).map_err(|e| TaskError::schema(&self.name, e))
    }
}

/// Compute one derived value from a row.
///
/// Integer targets are summed exactly when every input and weight is
/// integral; otherwise the float total is rounded. A total that does not
/// fit the target type is an error, never a wrapped or clamped value.
pub fn apply_action(action: &FieldAction, row: &Row) -> Result<Value, String> {
    let number = |name: &String| row.get(name).filter(|v| v.is_number());

    match action.func {
        ActionFunc::Copy => Ok(action
            .fields
            .first()
            .and_then(|name| row.get(name))
            .cloned()
            .unwrap_or(Value::Null)),
        ActionFunc::Sum => {
            let terms: Vec<(&Value, f64)> =
                action.fields.iter().filter_map(number).map(|v| (v, 1.0)).collect();
            combine(action, &terms)
        }
        ActionFunc::WeightedSum => {
            let terms: Vec<(&Value, f64)> = action
                .fields
                .iter()
                .zip(&action.weights)
                .filter_map(|(name, weight)| number(name).map(|v| (v, *weight)))
                .collect();
            combine(action, &terms)
        }
        ActionFunc::Concat => {
            let separator = action.separator.as_deref().unwrap_or(DEFAULT_SEPARATOR);
            let parts: Vec<String> = action
                .fields
                .iter()
                .filter_map(|name| row.get(name).and_then(value_key))
                .collect();
            Ok(Value::String(parts.join(separator)))
        }
    }
}

fn combine(action: &FieldAction, terms: &[(&Value, f64)]) -> Result<Value, String> {
    let float_total = || -> f64 {
        terms
            .iter()
            .map(|(value, weight)| value.as_f64().unwrap_or(0.0) * weight)
            .sum()
    };

    match action.field_type {
        FieldType::Int32 | FieldType::Int64 => {
            let total = match exact_total(terms) {
                Some(total) => total.ok_or_else(|| format!("{} overflows int64", action.name))?,
                None => rounded(float_total())
                    .ok_or_else(|| format!("{} overflows int64", action.name))?,
            };
            if action.field_type == FieldType::Int32 && i32::try_from(total).is_err() {
                return Err(format!("{} = {} overflows int32", action.name, total));
            }
            Ok(Value::from(total))
        }
        _ => Ok(Number::from_f64(float_total())
            .map(Value::Number)
            .unwrap_or(Value::Null)),
    }
}

/// Exact integer total, or `None` when some value or weight is not
/// integral. `Some(None)` means the total overflowed.
fn exact_total(terms: &[(&Value, f64)]) -> Option<Option<i64>> {
    let mut total: i64 = 0;
    for (value, weight) in terms {
        let value = value.as_i64()?;
        if weight.fract() != 0.0 || weight.abs() >= I64_BOUND {
            return None;
        }
        match value
            .checked_mul(*weight as i64)
            .and_then(|term| total.checked_add(term))
        {
            Some(next) => total = next,
            None => return Some(None),
        }
    }
    Some(Some(total))
}

fn rounded(value: f64) -> Option<i64> {
    let value = value.round();
    (value.is_finite() && value >= -I64_BOUND && value < I64_BOUND).then_some(value as i64)
}

/// 2^63 as a float: the first magnitude outside `i64`.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

#[async_trait]
impl Task for AlgoTransformTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::DataService
    }

    async fn execute(
        &self,
        _input: &[Arc<DataResult>],
        ctx: &RequestContext,
        exec: &Executor,
    ) -> TaskResult<Vec<Arc<DataResult>>> {
        let inputs = exec.fetch_all(&self.inputs, ctx).await?;
        let merged = merge_inputs(&self.name, self.join.as_deref(), &inputs)?;
        let derived = self.derive(merged)?;
        Ok(vec![Arc::new(project(&self.name, &self.columns, derived)?)])
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{executor, row};
    use super::*;
    use serde_json::{Map, json};

    fn action(func: ActionFunc, field_type: FieldType, fields: &[&str]) -> FieldAction {
        FieldAction {
            name: "out".to_string(),
            field_type,
            func,
            fields: fields.iter().map(|s| s.to_string()).collect(),
            weights: Vec::new(),
            separator: None,
        }
    }

    #[test]
    fn test_actions() {
        let r = row(json!({"a": 1, "b": 2.5, "s": "x", "n": null}));

        let copy = action(ActionFunc::Copy, FieldType::Str, &["s"]);
        assert_eq!(apply_action(&copy, &r).unwrap(), "x");

        let sum = action(ActionFunc::Sum, FieldType::Double, &["a", "b", "n"]);
        assert_eq!(apply_action(&sum, &r).unwrap(), 3.5);

        let int_sum = action(ActionFunc::Sum, FieldType::Int64, &["a", "b"]);
        assert_eq!(apply_action(&int_sum, &r).unwrap(), 4);

        let mut weighted = action(ActionFunc::WeightedSum, FieldType::Double, &["a", "b"]);
        weighted.weights = vec![2.0, 0.5];
        assert_eq!(apply_action(&weighted, &r).unwrap(), 3.25);

        let mut concat = action(ActionFunc::Concat, FieldType::Str, &["s", "a", "n"]);
        concat.separator = Some("-".to_string());
        assert_eq!(apply_action(&concat, &r).unwrap(), "x-1");
    }

    #[test]
    fn test_integer_sums_are_exact() {
        let big = 9_007_199_254_740_993_i64; // 2^53 + 1
        let r = row(json!({"a": big, "b": 0, "c": 2}));

        let sum = action(ActionFunc::Sum, FieldType::Int64, &["a", "b"]);
        assert_eq!(apply_action(&sum, &r).unwrap(), json!(big));

        let mut weighted = action(ActionFunc::WeightedSum, FieldType::Int64, &["a", "c"]);
        weighted.weights = vec![1.0, 3.0];
        assert_eq!(apply_action(&weighted, &r).unwrap(), json!(big + 6));
    }

    #[test]
    fn test_integer_overflow_is_an_error() {
        let r = row(json!({"a": i64::MAX, "b": 1, "x": 2_000_000_000, "y": 2_000_000_000}));

        let sum = action(ActionFunc::Sum, FieldType::Int64, &["a", "b"]);
        assert!(apply_action(&sum, &r).unwrap_err().contains("int64"));

        let narrow = action(ActionFunc::Sum, FieldType::Int32, &["x", "y"]);
        assert!(apply_action(&narrow, &r).unwrap_err().contains("int32"));

        let wide = action(ActionFunc::Sum, FieldType::Int64, &["x", "y"]);
        assert_eq!(apply_action(&wide, &r).unwrap(), json!(4_000_000_000_i64));
    }

    const FLOW: &str = r#"
sources:
  - name: items
    columns: [{ name: item_id, type: str }, { name: ctr, type: double }, { name: cvr, type: double }]
    rows:
      - { item_id: a, ctr: 0.2, cvr: 0.1 }
      - { item_id: b, ctr: 0.4, cvr: 0.3 }
features:
  - name: item_feature
    from: [items]
algoTransforms:
  - name: blended
    feature: [item_feature]
    actions:
      - { name: blend, type: double, func: weightedSum, fields: [ctr, cvr], weights: [0.5, 0.5] }
      - { name: key, type: str, func: concat, fields: [item_id, blend], separator: ":" }
  - name: outer
    algoTransform: [blended]
    columns: [{ name: item_id, type: str }, { name: blend, type: double }]
"#;

    #[tokio::test]
    async fn test_actions_chain_and_nested_transform_projects() {
        let exec = executor(FLOW);
        let ctx = RequestContext::new(Map::new());

        let blended = exec.fetch("blended", &ctx).await.unwrap();
        let blend = blended.rows()[1]["blend"].as_f64().unwrap();
        assert!((blend - 0.35).abs() < 1e-9);
        assert!(blended.rows()[0]["key"].as_str().unwrap().starts_with("a:"));

        let outer = exec.fetch("outer", &ctx).await.unwrap();
        assert_eq!(outer.fields().len(), 2);
        assert_eq!(outer.len(), 2);
        // the nested transform was memoized, not recomputed
        assert!(ctx.cached("blended").is_some());
    }

    const OVERFLOW_FLOW: &str = r#"
sources:
  - name: counts
    columns: [{ name: a, type: int32 }, { name: b, type: int32 }]
    rows:
      - { a: 2000000000, b: 2000000000 }
algoTransforms:
  - name: totals
    feature: [counts]
    actions:
      - { name: total, type: int32, func: sum, fields: [a, b] }
"#;

    #[tokio::test]
    async fn test_out_of_range_total_fails_the_task() {
        let exec = executor(OVERFLOW_FLOW);
        let ctx = RequestContext::new(Map::new());

        match exec.fetch("totals", &ctx).await {
            Err(TaskError::TaskExecutionFailed { task, reason }) => {
                assert_eq!(task, "totals");
                assert!(reason.contains("total"), "{reason}");
                assert!(reason.contains("int32"), "{reason}");
            }
            other => panic!("expected an execution failure, got {other:?}"),
        }
    }
}
