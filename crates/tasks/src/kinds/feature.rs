//! Feature assembly from several data services.

use std::sync::Arc;

use async_trait::async_trait;
use records::{DataResult, Field};
use task_config::{FeatureConfig, TaskKind};

use super::{concat_results, join_results, project};
use crate::context::RequestContext;
use crate::error::TaskResult;
use crate::executor::Executor;
use crate::traits::Task;

/// Pulls its inputs and merges them into one table.
///
/// With `join` set the inputs are left-joined onto the first one by that
/// column; otherwise their rows are stacked.
pub struct FeatureTask {
    name: String,
    from: Vec<String>,
    join: Option<String>,
    columns: Vec<Field>,
}

impl FeatureTask {
    pub fn new(config: &FeatureConfig) -> Self {
        Self {
            name: config.name.clone(),
            from: config.from.clone(),
            join: config.join.clone(),
            columns: config.columns.clone(),
        }
    }
}

/// Merge step shared with algo transforms.
pub(crate) fn merge_inputs(
    name: &str,
    join: Option<&str>,
    inputs: &[Arc<DataResult>],
) -> TaskResult<DataResult> {
    match join {
        Some(key) => join_results(name, key, inputs),
        None => concat_results(name, inputs),
    }
}

#[async_trait]
impl Task for FeatureTask {
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
        let inputs = exec.fetch_all(&self.from, ctx).await?;
        let merged = merge_inputs(&self.name, self.join.as_deref(), &inputs)?;
        Ok(vec![Arc::new(project(&self.name, &self.columns, merged)?)])
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::executor;
    use super::*;
    use serde_json::{Map, Value};

    const FLOW: &str = r#"
sources:
  - name: items
    columns: [{ name: item_id, type: str }, { name: title, type: str }]
    rows:
      - { item_id: a, title: Alpha }
      - { item_id: b, title: Beta }
  - name: stats
    columns: [{ name: item_id, type: str }, { name: clicks, type: int64 }]
    rows:
      - { item_id: b, clicks: 12 }
features:
  - name: item_feature
    from: [items, stats]
    join: item_id
  - name: stacked
    from: [items, stats]
    columns: [{ name: item_id, type: str }]
"#;

    #[tokio::test]
    async fn test_join_enriches_first_input() {
        let exec = executor(FLOW);
        let ctx = RequestContext::new(Map::new());

        let result = exec.fetch("item_feature", &ctx).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.rows()[0]["clicks"], Value::Null);
        assert_eq!(result.rows()[1]["clicks"], 12);
        assert_eq!(result.rows()[1]["title"], "Beta");
    }

    #[tokio::test]
    async fn test_stack_and_project() {
        let exec = executor(FLOW);
        let ctx = RequestContext::new(Map::new());

        let result = exec.fetch("stacked", &ctx).await.unwrap();
        let ids: Vec<&Value> = result.rows().iter().map(|r| &r["item_id"]).collect();
        assert_eq!(ids, vec!["a", "b", "b"]);
        assert_eq!(result.fields().len(), 1);
    }
}
