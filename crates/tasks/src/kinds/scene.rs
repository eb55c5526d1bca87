//! Scenes: the entry point of a product surface.

use std::sync::Arc;

use async_trait::async_trait;
use records::{DataResult, Field};
use task_config::{SceneConfig, TaskKind};

use super::{concat_results, project};
use crate::context::RequestContext;
use crate::error::TaskResult;
use crate::executor::Executor;
use crate::traits::Task;

/// Runs its chain of layers, experiments and services in order and
/// merges the final frontier into one result.
pub struct SceneTask {
    name: String,
    chain: Vec<String>,
    columns: Vec<Field>,
    limit: Option<usize>,
}

impl SceneTask {
    pub fn new(config: &SceneConfig) -> Self {
        Self {
            name: config.name.clone(),
            chain: config.chain.clone(),
            columns: config.columns.clone(),
            limit: config.limit,
        }
    }

    async fn recommend(
        &self,
        input: &[Arc<DataResult>],
        ctx: &RequestContext,
        exec: &Executor,
    ) -> TaskResult<Arc<DataResult>> {
        let outputs = exec.run_chain(&self.chain, input, ctx).await?;
        let merged = project(&self.name, &self.columns, concat_results(&self.name, &outputs)?)?;
        let result = match self.limit {
            Some(limit) => merged.truncated(limit),
            None => merged,
        };
        Ok(Arc::new(result))
    }
}

#[async_trait]
impl Task for SceneTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Scene
    }

    async fn execute(
        &self,
        input: &[Arc<DataResult>],
        ctx: &RequestContext,
        exec: &Executor,
    ) -> TaskResult<Vec<Arc<DataResult>>> {
        Ok(vec![self.recommend(input, ctx, exec).await?])
    }

    async fn process(&self, ctx: &RequestContext, exec: &Executor) -> TaskResult<Arc<DataResult>> {
        self.recommend(&[], ctx, exec).await
    }
}
