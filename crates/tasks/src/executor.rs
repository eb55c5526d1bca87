//! Drives tasks for one request.
//!
//! ## Algorithm
//! - `run`: look a task up, execute it against a frontier under the
//!   per-task timeout
//! - `process`: run a task's primary capability under the same timeout
//! - `run_stage`: run sibling tasks concurrently on the same frontier and
//!   concatenate their outputs in declaration order
//! - `run_chain`: run tasks one after another, each consuming the output
//!   of the previous one
//! - `fetch`: produce one data result, memoized per request so a shared
//!   dependency is computed once

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use records::DataResult;
use tracing::{debug, info, instrument};

use crate::context::RequestContext;
use crate::error::{TaskError, TaskResult};
use crate::registry::TaskRegistry;
use crate::traits::Task;

/// Default upper bound on one task execution.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone)]
pub struct Executor {
    registry: Arc<TaskRegistry>,
    task_timeout: Duration,
}

impl Executor {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self {
            registry,
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, task_timeout: Duration) -> Self {
        self.task_timeout = task_timeout;
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn task_timeout(&self) -> Duration {
        self.task_timeout
    }

    /// Execute one task against `input`.
    #[instrument(skip(self, input, ctx), fields(input = input.len()))]
    pub async fn run(
        &self,
        name: &str,
        input: &[Arc<DataResult>],
        ctx: &RequestContext,
    ) -> TaskResult<Vec<Arc<DataResult>>> {
        let task = self
            .registry
            .get(name)
            .ok_or_else(|| TaskError::TaskNotFound(name.to_string()))?;

        let start = Instant::now();
        let outputs = tokio::time::timeout(self.task_timeout, task.execute(input, ctx, self))
            .await
            .map_err(|_| TaskError::TaskTimeout {
                task: name.to_string(),
                timeout_ms: self.task_timeout.as_millis() as u64,
            })??;

        let records: usize = outputs.iter().map(|r| r.len()).sum();
        debug!(
            "Task {} produced {} results ({} records) in {:?}",
            name,
            outputs.len(),
            records,
            start.elapsed()
        );
        if ctx.debug() {
            for output in &outputs {
                info!(
                    task = name,
                    result = output.name(),
                    records = output.len(),
                    "stage output: {:?}",
                    output.rows()
                );
            }
        }
        Ok(outputs)
    }

    /// Run the primary capability of `task`, bounded by the task timeout.
    pub async fn process(&self, task: &dyn Task, ctx: &RequestContext) -> TaskResult<Arc<DataResult>> {
        let start = Instant::now();
        let result = tokio::time::timeout(self.task_timeout, task.process(ctx, self))
            .await
            .map_err(|_| TaskError::TaskTimeout {
                task: task.name().to_string(),
                timeout_ms: self.task_timeout.as_millis() as u64,
            })??;
        debug!(
            "Task {} processed {} records in {:?}",
            task.name(),
            result.len(),
            start.elapsed()
        );
        Ok(result)
    }

    /// Execute sibling tasks concurrently on the same frontier.
    ///
    /// Outputs are concatenated in the order of `names`, not in completion
    /// order. The first failure aborts the stage.
    pub async fn run_stage(
        &self,
        names: &[String],
        input: &[Arc<DataResult>],
        ctx: &RequestContext,
    ) -> TaskResult<Vec<Arc<DataResult>>> {
        let runs = names.iter().map(|name| self.run(name, input, ctx));
        let outputs = try_join_all(runs).await?;
        Ok(outputs.into_iter().flatten().collect())
    }

    /// Execute tasks sequentially, threading the frontier through them.
    pub async fn run_chain(
        &self,
        names: &[String],
        input: &[Arc<DataResult>],
        ctx: &RequestContext,
    ) -> TaskResult<Vec<Arc<DataResult>>> {
        let mut frontier = input.to_vec();
        for name in names {
            frontier = self.run(name, &frontier, ctx).await?;
        }
        Ok(frontier)
    }

    /// The data result of `name`, computed at most once per request.
    ///
    /// Results seeded into the context by the caller are returned as is.
    pub async fn fetch(&self, name: &str, ctx: &RequestContext) -> TaskResult<Arc<DataResult>> {
        let slot = ctx.slot(name);
        let result = slot
            .get_or_try_init(|| async {
                let task = self
                    .registry
                    .get(name)
                    .ok_or_else(|| TaskError::TaskNotFound(name.to_string()))?;
                let result = tokio::time::timeout(self.task_timeout, task.process(ctx, self))
                    .await
                    .map_err(|_| TaskError::TaskTimeout {
                        task: name.to_string(),
                        timeout_ms: self.task_timeout.as_millis() as u64,
                    })??;
                debug!("Fetched {} ({} records)", name, result.len());
                Ok::<_, TaskError>(result)
            })
            .await?;
        Ok(Arc::clone(result))
    }

    /// Fetch several data results concurrently, in the order of `names`.
    pub async fn fetch_all(
        &self,
        names: &[String],
        ctx: &RequestContext,
    ) -> TaskResult<Vec<Arc<DataResult>>> {
        try_join_all(names.iter().map(|name| self.fetch(name, ctx))).await
    }
}
