//! Strategy variants.
//!
//! An experiment runs its service chain in order, each service consuming
//! the previous one's output. With a rank stage the final candidates are
//! scored by a model, sorted by score and truncated.

use std::sync::Arc;

use async_trait::async_trait;
use records::{DataResult, Field, FieldType};
use serde_json::{Number, Value};
use task_config::{ExperimentConfig, RankConfig, TaskKind};
use tracing::debug;

use super::{concat_results, sort_rows_by};
use crate::context::RequestContext;
use crate::error::{TaskError, TaskResult};
use crate::executor::Executor;
use crate::traits::{Scorer, Task};

/// Model ranking applied after the chain.
pub struct RankStage {
    model: String,
    features: Vec<String>,
    score_field: String,
    limit: Option<usize>,
    scorer: Arc<dyn Scorer>,
}

impl RankStage {
    pub fn new(config: &RankConfig, scorer: Arc<dyn Scorer>) -> Self {
        Self {
            model: config.model.clone(),
            features: config.features.clone(),
            score_field: config.score_field.clone(),
            limit: config.limit,
            scorer,
        }
    }

    async fn rank(&self, name: &str, candidates: DataResult, ctx: &RequestContext) -> TaskResult<DataResult> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let scores = self
            .scorer
            .score(&self.model, ctx.id(), &self.features, candidates.rows())
            .await
            .map_err(|e| TaskError::Scoring {
                model: self.model.clone(),
                reason: format!("{:#}", e),
            })?;
        if scores.len() != candidates.len() {
            return Err(TaskError::Scoring {
                model: self.model.clone(),
                reason: format!("{} scores for {} candidates", scores.len(), candidates.len()),
            });
        }
        debug!("Model {} scored {} candidates", self.model, scores.len());

        let mut fields = candidates.fields().to_vec();
        if !fields.iter().any(|f| f.name == self.score_field) {
            fields.push(Field::new(self.score_field.clone(), FieldType::Double));
        }
        let mut rows = candidates.into_rows();
        for (row, score) in rows.iter_mut().zip(scores) {
            let value = Number::from_f64(f64::from(score))
                .map(Value::Number)
                .unwrap_or(Value::Null);
            row.insert(self.score_field.clone(), value);
        }
        sort_rows_by(&mut rows, &self.score_field, true);
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        DataResult::new(name, fields, rows).map_err(|e| TaskError::schema(name, e))
    }
}

pub struct ExperimentTask {
    name: String,
    chain: Vec<String>,
    rank: Option<RankStage>,
}

impl ExperimentTask {
    pub fn new(config: &ExperimentConfig, rank: Option<RankStage>) -> Self {
        Self {
            name: config.name.clone(),
            chain: config.chain.clone(),
            rank,
        }
    }
}

#[async_trait]
impl Task for ExperimentTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Experiment
    }

    async fn execute(
        &self,
        input: &[Arc<DataResult>],
        ctx: &RequestContext,
        exec: &Executor,
    ) -> TaskResult<Vec<Arc<DataResult>>> {
        let outputs = exec.run_chain(&self.chain, input, ctx).await?;
        let Some(rank) = &self.rank else {
            return Ok(outputs);
        };
        let candidates = concat_results(&self.name, &outputs)?;
        let ranked = rank.rank(&self.name, candidates, ctx).await?;
        Ok(vec![Arc::new(ranked)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TaskRegistry;
    use records::Row;
    use serde_json::Map;
    use task_config::ConfigGraph;

    /// Scores each row by its `ctr` feature.
    struct CtrScorer;

    #[async_trait]
    impl Scorer for CtrScorer {
        async fn score(
            &self,
            _model: &str,
            _subject: Option<&str>,
            features: &[String],
            rows: &[Row],
        ) -> anyhow::Result<Vec<f32>> {
            Ok(rows
                .iter()
                .map(|r| r.get(&features[0]).and_then(Value::as_f64).unwrap_or(0.0) as f32)
                .collect())
        }
    }

    struct BrokenScorer;

    #[async_trait]
    impl Scorer for BrokenScorer {
        async fn score(&self, _: &str, _: Option<&str>, _: &[String], _: &[Row]) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0])
        }
    }

    const FLOW: &str = r#"
sources:
  - name: items
    columns: [{ name: item_id, type: str }, { name: ctr, type: double }]
    rows:
      - { item_id: a, ctr: 0.1 }
      - { item_id: b, ctr: 0.8 }
      - { item_id: c, ctr: 0.5 }
services:
  - name: recall
    tasks: [items]
  - name: top2
    limit: 2
experiments:
  - name: plain
    chain: [recall, top2]
  - name: ranked
    chain: [recall]
    rank: { model: ctr_model, features: [ctr], limit: 2 }
"#;

    fn executor_with(scorer: Arc<dyn Scorer>) -> Executor {
        let graph = Arc::new(ConfigGraph::from_yaml_str(FLOW).unwrap());
        let registry = TaskRegistry::builder(graph)
            .with_scorer("ctr_model", scorer)
            .build()
            .unwrap();
        Executor::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_chain_threads_frontier() {
        let exec = executor_with(Arc::new(CtrScorer));
        let ctx = RequestContext::new(Map::new());

        let outputs = exec.run("plain", &[], &ctx).await.unwrap();
        let rows: Vec<Row> = outputs.iter().flat_map(|r| r.output()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["item_id"], "a");
    }

    #[tokio::test]
    async fn test_rank_sorts_by_model_score() {
        let exec = executor_with(Arc::new(CtrScorer));
        let ctx = RequestContext::new(Map::new());

        let outputs = exec.run("ranked", &[], &ctx).await.unwrap();
        assert_eq!(outputs.len(), 1);
        let ids: Vec<&Value> = outputs[0].rows().iter().map(|r| &r["item_id"]).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(outputs[0].field("score").is_some());
        let top = &outputs[0].rows()[0];
        assert!((top["score"].as_f64().unwrap() - 0.8).abs() < 1e-6);
        assert_eq!(top["ctr"], 0.8);
    }

    #[tokio::test]
    async fn test_short_score_vector_is_an_error() {
        let exec = executor_with(Arc::new(BrokenScorer));
        let ctx = RequestContext::new(Map::new());

        let err = exec.run("ranked", &[], &ctx).await.unwrap_err();
        assert!(matches!(err, TaskError::Scoring { .. }));
    }
}
