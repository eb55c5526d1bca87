//! # Execution Core
//!
//! The three public operations of the service:
//! 1. `invoke_task`: run one task, with caller-supplied dependency data
//! 2. `recommend`: run a stage of pre-tasks, then a target task on their
//!    output
//! 3. `recommend_scene`: run a scene for one subject id
//!
//! Every failure is turned into a failure `Envelope` here; nothing below
//! this layer knows about envelopes, and nothing above it sees errors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use records::{DataResult, Envelope, Row};
use serde_json::{Map, Value};
use task_config::TaskKind;
use tasks::{Executor, RequestContext, TaskError, TaskRegistry, TaskResult};
use tracing::{info, warn};

/// Parameter naming the tasks that run before the target of `recommend`.
pub const PRE_TASKS_PARAM: &str = "preTasks";

/// Main entry point for request handling. Cheap to share behind an `Arc`.
pub struct ExecutionCore {
    executor: Executor,
}

impl ExecutionCore {
    pub fn new(registry: Arc<TaskRegistry>, task_timeout: Duration) -> Self {
        Self {
            executor: Executor::new(registry).with_timeout(task_timeout),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        self.executor.registry()
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Run a single task.
    ///
    /// Dependencies supplied in `params` under their task name (a list of
    /// records) are used instead of computing them.
    pub async fn invoke_task(&self, task: &str, params: Map<String, Value>) -> Envelope {
        let start = Instant::now();
        match self.try_invoke_task(task, params).await {
            Ok(records) => {
                info!(
                    "Task {} returned {} records in {:.2?}",
                    task,
                    records.len(),
                    start.elapsed()
                );
                Envelope::success(records)
            }
            Err(e) => failure(task, e),
        }
    }

    async fn try_invoke_task(&self, task: &str, params: Map<String, Value>) -> TaskResult<Vec<Row>> {
        let registry = self.registry();
        if !registry.contains(task) {
            return Err(TaskError::TaskNotFound(task.to_string()));
        }

        let ctx = RequestContext::new(params);
        let dependencies = registry.graph().rely_services(task).unwrap_or_default();
        self.seed_dependencies(task, dependencies, &ctx)?;

        let outputs = self.executor.run(task, &[], &ctx).await?;
        if outputs.is_empty() {
            return Err(TaskError::TaskExecutionFailed {
                task: task.to_string(),
                reason: "taskService execute fail!".to_string(),
            });
        }
        Ok(records_of(&outputs))
    }

    /// Check every dependency up front, then seed the caller's data.
    ///
    /// Nothing runs if any dependency is malformed or unsatisfiable.
    fn seed_dependencies(
        &self,
        task: &str,
        dependencies: &[String],
        ctx: &RequestContext,
    ) -> TaskResult<()> {
        let registry = self.registry();
        let missing = |dependency: &str, reason: String| TaskError::MissingDependencyData {
            task: task.to_string(),
            dependency: dependency.to_string(),
            reason,
        };

        let mut supplied = Vec::new();
        for dependency in dependencies {
            match ctx.param(dependency) {
                Some(Value::Array(records)) => {
                    let columns = registry
                        .graph()
                        .lookup(dependency)
                        .map(|definition| definition.columns().to_vec())
                        .unwrap_or_default();
                    let result = DataResult::from_records(dependency.clone(), columns, records.clone())
                        .map_err(|e| missing(dependency, e.to_string()))?;
                    supplied.push(result);
                }
                Some(_) => {
                    return Err(missing(dependency, "expected a list of records".to_string()));
                }
                None if registry.contains(dependency) => {}
                None => {
                    return Err(missing(
                        dependency,
                        "no data supplied and no local source".to_string(),
                    ));
                }
            }
        }

        for result in supplied {
            let name = result.name().to_string();
            ctx.seed(name, result);
        }
        Ok(())
    }

    /// Run the `preTasks` stage, then the target on everything it produced.
    ///
    /// Pre-tasks run concurrently on an empty frontier. The payload holds
    /// the pre-task records followed by the target's.
    pub async fn recommend(&self, task: &str, params: Map<String, Value>) -> Envelope {
        let start = Instant::now();
        match self.try_recommend(task, params).await {
            Ok(records) => {
                info!(
                    "Pipeline {} returned {} records in {:.2?}",
                    task,
                    records.len(),
                    start.elapsed()
                );
                Envelope::success(records)
            }
            Err(e) => failure(task, e),
        }
    }

    async fn try_recommend(&self, task: &str, params: Map<String, Value>) -> TaskResult<Vec<Row>> {
        let pre_tasks = pre_tasks(task, &params)?;
        for name in pre_tasks.iter().map(String::as_str).chain([task]) {
            if !self.registry().contains(name) {
                return Err(TaskError::TaskNotFound(name.to_string()));
            }
        }

        let ctx = RequestContext::new(params);
        let produced = self.executor.run_stage(&pre_tasks, &[], &ctx).await?;
        let target = self
            .executor
            .run_stage(&[task.to_string()], &produced, &ctx)
            .await?;

        if produced.is_empty() && target.is_empty() {
            return Err(TaskError::TaskExecutionFailed {
                task: task.to_string(),
                reason: "no task in the pipeline produced output".to_string(),
            });
        }
        let mut records = records_of(&produced);
        records.extend(records_of(&target));
        Ok(records)
    }

    /// Recommend for one subject in a scene.
    ///
    /// Records without an `id` of their own carry the subject id.
    pub async fn recommend_scene(&self, scene: &str, id: &str, params: Map<String, Value>) -> Envelope {
        let start = Instant::now();
        match self.try_recommend_scene(scene, id, params).await {
            Ok(records) => {
                info!(
                    "Scene {} returned {} records for {} in {:.2?}",
                    scene,
                    records.len(),
                    id,
                    start.elapsed()
                );
                Envelope::success_with_id(records, id)
            }
            Err(e) => failure(scene, e),
        }
    }

    async fn try_recommend_scene(
        &self,
        scene: &str,
        id: &str,
        params: Map<String, Value>,
    ) -> TaskResult<Vec<Row>> {
        let instance = self
            .registry()
            .get_by_kind(TaskKind::Scene, scene)
            .ok_or_else(|| TaskError::SceneNotFound(scene.to_string()))?;
        if id.trim().is_empty() {
            return Err(TaskError::MissingSubjectId(scene.to_string()));
        }

        let ctx = RequestContext::new(params).with_id(id);
        let result = self.executor.process(instance.as_ref(), &ctx).await?;

        let mut records = result.output();
        for record in &mut records {
            if record.get("id").is_none_or(Value::is_null) {
                record.insert("id".to_string(), Value::String(id.to_string()));
            }
        }
        Ok(records)
    }
}

/// Names listed under `preTasks`, which must be a list of strings.
fn pre_tasks(task: &str, params: &Map<String, Value>) -> TaskResult<Vec<String>> {
    let malformed = || TaskError::MissingDependencyData {
        task: task.to_string(),
        dependency: PRE_TASKS_PARAM.to_string(),
        reason: "expected a list of task names".to_string(),
    };
    match params.get(PRE_TASKS_PARAM) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(names)) => names
            .iter()
            .map(|name| name.as_str().map(str::to_string).ok_or_else(malformed))
            .collect(),
        Some(_) => Err(malformed()),
    }
}

fn records_of(results: &[Arc<DataResult>]) -> Vec<Row> {
    results.iter().flat_map(|result| result.output()).collect()
}

fn failure(name: &str, error: TaskError) -> Envelope {
    warn!("Request for {} failed: {}", name, error);
    Envelope::failure(error.to_string())
}
