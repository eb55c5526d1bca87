//! Leaf data tables.

use std::sync::Arc;

use async_trait::async_trait;
use records::{DataResult, Field};
use task_config::{SourceConfig, SourceFilter, TaskKind};
use tracing::debug;

use crate::context::RequestContext;
use crate::error::{TaskError, TaskResult};
use crate::executor::Executor;
use crate::traits::{DataSource, SourceQuery, Task};

/// Reads rows from a `DataSource` and types them with the declared
/// columns.
pub struct SourceTask {
    name: String,
    columns: Vec<Field>,
    filter: Option<SourceFilter>,
    source: Arc<dyn DataSource>,
}

impl SourceTask {
    pub fn new(config: &SourceConfig, source: Arc<dyn DataSource>) -> Self {
        Self {
            name: config.name.clone(),
            columns: config.columns.clone(),
            filter: config.filter.clone(),
            source,
        }
    }
}

#[async_trait]
impl Task for SourceTask {
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
        _exec: &Executor,
    ) -> TaskResult<Vec<Arc<DataResult>>> {
        let wanted = match &self.filter {
            None => None,
            Some(filter) => match ctx.lookup_str(&filter.param) {
                Some(value) => Some((filter.column.as_str(), value)),
                None => {
                    debug!(
                        "Source {} has no value for filter param {}, returning no rows",
                        self.name, filter.param
                    );
                    return Ok(vec![Arc::new(DataResult::empty(
                        self.name.clone(),
                        self.columns.clone(),
                    ))]);
                }
            },
        };

        let query = SourceQuery {
            source: &self.name,
            fields: &self.columns,
            filter: wanted.as_ref().map(|(column, value)| (*column, value.as_str())),
        };
        let rows = self
            .source
            .fetch(query)
            .await
            .map_err(|e| TaskError::Source {
                source_name: self.name.clone(),
                reason: format!("{:#}", e),
            })?;

        let result = DataResult::new(self.name.clone(), self.columns.clone(), rows)
            .map_err(|e| TaskError::schema(&self.name, e))?;
        Ok(vec![Arc::new(result)])
    }
}
