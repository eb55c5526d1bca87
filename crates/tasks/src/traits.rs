//! Seams of the execution engine.
//!
//! - `Task`: one executable unit of the graph
//! - `DataSource`: where a source task gets its rows
//! - `Scorer`: the model behind an experiment's rank stage
//!
//! ## Design Note
//! All three are `Send + Sync` trait objects so one registry can be
//! shared by every request handler.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use records::{DataResult, Field, Row};
use task_config::TaskKind;

use crate::context::RequestContext;
use crate::error::TaskResult;
use crate::executor::Executor;
use crate::kinds::concat_results;

/// One executable unit of the task graph.
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> TaskKind;

    /// Run against an input frontier.
    ///
    /// The frontier is the output of the previous stage; the returned
    /// results become the next stage's frontier. Data the task declares
    /// as dependencies is pulled through `exec.fetch`.
    async fn execute(
        &self,
        input: &[Arc<DataResult>],
        ctx: &RequestContext,
        exec: &Executor,
    ) -> TaskResult<Vec<Arc<DataResult>>>;

    /// Produce this task's result on its own, without an upstream stage.
    async fn process(&self, ctx: &RequestContext, exec: &Executor) -> TaskResult<Arc<DataResult>> {
        let mut outputs = self.execute(&[], ctx, exec).await?;
        if outputs.len() == 1 {
            if let Some(only) = outputs.pop() {
                return Ok(only);
            }
        }
        Ok(Arc::new(concat_results(self.name(), &outputs)?))
    }
}

/// Filter passed down to a data source.
#[derive(Debug, Clone, Copy)]
pub struct SourceQuery<'a> {
    pub source: &'a str,
    pub fields: &'a [Field],
    /// Column and the value it must equal
    pub filter: Option<(&'a str, &'a str)>,
}

/// Backend that supplies the rows of a source task.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, query: SourceQuery<'_>) -> Result<Vec<Row>>;
}

/// Model that scores candidate rows.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// One score per row, in row order.
    async fn score(
        &self,
        model: &str,
        subject: Option<&str>,
        features: &[String],
        rows: &[Row],
    ) -> Result<Vec<f32>>;
}
