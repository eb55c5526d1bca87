//! A/B layers.

use std::sync::Arc;

use async_trait::async_trait;
use records::DataResult;
use task_config::{LayerConfig, TaskKind};
use tracing::debug;

use crate::bucketizer::{Bucketizer, HashBucketizer};
use crate::context::RequestContext;
use crate::error::TaskResult;
use crate::executor::Executor;
use crate::traits::Task;

/// Routes each request to exactly one of its experiments.
pub struct LayerTask {
    name: String,
    bucketizer: Box<dyn Bucketizer>,
}

impl LayerTask {
    pub fn new(name: impl Into<String>, bucketizer: Box<dyn Bucketizer>) -> Self {
        Self {
            name: name.into(),
            bucketizer,
        }
    }

    pub fn from_config(config: &LayerConfig) -> Self {
        Self::new(config.name.clone(), Box::new(HashBucketizer::from_config(config)))
    }
}

#[async_trait]
impl Task for LayerTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Layer
    }

    async fn execute(
        &self,
        input: &[Arc<DataResult>],
        ctx: &RequestContext,
        exec: &Executor,
    ) -> TaskResult<Vec<Arc<DataResult>>> {
        let experiment = self.bucketizer.to_bucket(ctx)?;
        debug!("Layer {} selected experiment {}", self.name, experiment);
        exec.run(&experiment, input, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::executor;
    use super::*;
    use crate::error::TaskError;
    use serde_json::Map;

    const FLOW: &str = r#"
sources:
  - name: a_items
    columns: [{ name: item_id, type: str }]
    rows: [{ item_id: from_a }]
  - name: b_items
    columns: [{ name: item_id, type: str }]
    rows: [{ item_id: from_b }]
services:
  - name: a_recall
    tasks: [a_items]
  - name: b_recall
    tasks: [b_items]
experiments:
  - name: exp_a
    chain: [a_recall]
  - name: exp_b
    chain: [b_recall]
layers:
  - name: home
    experiments:
      - { name: exp_a, ratio: 0.5 }
      - { name: exp_b, ratio: 0.5 }
  - name: off
    experiments:
      - { name: exp_a, ratio: 0 }
"#;

    #[tokio::test]
    async fn test_same_subject_same_arm() {
        let exec = executor(FLOW);
        let mut picked = Vec::new();
        for _ in 0..3 {
            let ctx = RequestContext::new(Map::new()).with_id("user-17");
            let outputs = exec.run("home", &[], &ctx).await.unwrap();
            picked.push(outputs[0].rows()[0]["item_id"].clone());
        }
        assert!(picked.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_both_arms_receive_traffic() {
        let exec = executor(FLOW);
        let mut seen = std::collections::HashSet::new();
        for i in 0..64 {
            let ctx = RequestContext::new(Map::new()).with_id(format!("user-{i}"));
            let outputs = exec.run("home", &[], &ctx).await.unwrap();
            seen.insert(outputs[0].rows()[0]["item_id"].to_string());
        }
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn test_zero_weights_fail_at_request_time() {
        let exec = executor(FLOW);
        let ctx = RequestContext::new(Map::new()).with_id("u1");
        let err = exec.run("off", &[], &ctx).await.unwrap_err();
        assert!(matches!(err, TaskError::InvalidBucketConfig(_)));
    }
}
