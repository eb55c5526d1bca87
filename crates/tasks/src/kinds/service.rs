//! Recall and merge services.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use records::{DataResult, Field};
use task_config::{ServiceConfig, TaskKind};

use super::{concat_results, project, sort_rows_by, value_key};
use crate::context::RequestContext;
use crate::error::{TaskError, TaskResult};
use crate::executor::Executor;
use crate::traits::Task;

/// Merges the incoming frontier with the data tasks it pulls, then
/// dedups, orders and truncates.
pub struct ServiceTask {
    name: String,
    tasks: Vec<String>,
    columns: Vec<Field>,
    dedup_by: Option<String>,
    order_by: Option<String>,
    desc: bool,
    limit: Option<usize>,
}

impl ServiceTask {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            name: config.name.clone(),
            tasks: config.tasks.clone(),
            columns: config.columns.clone(),
            dedup_by: config.dedup_by.clone(),
            order_by: config.order_by.clone(),
            desc: config.desc,
            limit: config.limit,
        }
    }
}

#[async_trait]
impl Task for ServiceTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Service
    }

    async fn execute(
        &self,
        input: &[Arc<DataResult>],
        ctx: &RequestContext,
        exec: &Executor,
    ) -> TaskResult<Vec<Arc<DataResult>>> {
        let fetched = exec.fetch_all(&self.tasks, ctx).await?;
        let all: Vec<Arc<DataResult>> = input.iter().cloned().chain(fetched).collect();
        let merged = concat_results(&self.name, &all)?;

        let fields = merged.fields().to_vec();
        let mut rows = merged.into_rows();
        if let Some(key) = &self.dedup_by {
            let mut seen = HashSet::new();
            rows.retain(|row| match row.get(key).and_then(value_key) {
                Some(k) => seen.insert(k),
                None => true,
            });
        }
        if let Some(column) = &self.order_by {
            sort_rows_by(&mut rows, column, self.desc);
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }

        let result = DataResult::new(self.name.clone(), fields, rows)
            .map_err(|e| TaskError::schema(&self.name, e))?;
        Ok(vec![Arc::new(project(&self.name, &self.columns, result)?)])
    }
}
