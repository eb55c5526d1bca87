//! Task registry: one executable instance per configured task.
//!
//! Built once at startup from a validated `ConfigGraph` and shared
//! read-only by every request.
//!
//! ## Usage
//! ```ignore
//! let registry = TaskRegistry::builder(graph)
//!     .with_source("user_history", Arc::new(history_store))
//!     .with_scorer("ctr_model", Arc::new(scorer))
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ml_client::MLScorerClient;
use task_config::{ConfigGraph, TaskKind, TaskSpec};
use tracing::{debug, info, warn};

use crate::error::{TaskError, TaskResult};
use crate::kinds::{
    AlgoTransformTask, ExperimentTask, FeatureTask, LayerTask, RankStage, SceneTask, ServiceTask,
    SourceTask,
};
use crate::source::MemorySource;
use crate::traits::{DataSource, Scorer, Task};

pub struct TaskRegistry {
    graph: Arc<ConfigGraph>,
    tasks: HashMap<String, Arc<dyn Task>>,
}

impl TaskRegistry {
    pub fn builder(graph: Arc<ConfigGraph>) -> TaskRegistryBuilder {
        TaskRegistryBuilder {
            graph,
            sources: HashMap::new(),
            scorers: HashMap::new(),
            overrides: HashMap::new(),
        }
    }

    /// Registry with only what the configuration itself provides.
    pub fn from_graph(graph: Arc<ConfigGraph>) -> TaskResult<Self> {
        Self::builder(graph).build()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(name).cloned()
    }

    /// Instance of `name` if it is registered under `kind`.
    pub fn get_by_kind(&self, kind: TaskKind, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks
            .get(name)
            .filter(|task| task.kind() == kind)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered names of one kind, in declaration order.
    pub fn names_of(&self, kind: TaskKind) -> Vec<&str> {
        self.graph
            .names_of(kind)
            .into_iter()
            .filter(|name| self.tasks.contains_key(*name))
            .collect()
    }

    pub fn graph(&self) -> &ConfigGraph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

pub struct TaskRegistryBuilder {
    graph: Arc<ConfigGraph>,
    sources: HashMap<String, Arc<dyn DataSource>>,
    scorers: HashMap<String, Arc<dyn Scorer>>,
    overrides: HashMap<String, Arc<dyn Task>>,
}

impl TaskRegistryBuilder {
    /// Back a source task with an external data source.
    pub fn with_source(mut self, name: impl Into<String>, source: Arc<dyn DataSource>) -> Self {
        self.sources.insert(name.into(), source);
        self
    }

    /// Use `scorer` for every rank stage naming `model`.
    pub fn with_scorer(mut self, model: impl Into<String>, scorer: Arc<dyn Scorer>) -> Self {
        self.scorers.insert(model.into(), scorer);
        self
    }

    /// Replace the built-in implementation of a configured task.
    pub fn with_task(mut self, task: Arc<dyn Task>) -> Self {
        self.overrides.insert(task.name().to_string(), task);
        self
    }

    /// Instantiate every configured task.
    ///
    /// Sources with neither inline rows nor a registered data source stay
    /// unregistered: their data can only come from the caller.
    pub fn build(mut self) -> TaskResult<TaskRegistry> {
        let graph = Arc::clone(&self.graph);
        let mut tasks: HashMap<String, Arc<dyn Task>> = HashMap::with_capacity(graph.len());

        for (name, task) in &self.overrides {
            let definition = graph
                .lookup(name)
                .ok_or_else(|| TaskError::Registry(format!("task {} is not configured", name)))?;
            if definition.kind() != task.kind() {
                return Err(TaskError::Registry(format!(
                    "task {} is configured as {}, not {}",
                    name,
                    definition.kind(),
                    task.kind()
                )));
            }
        }

        for definition in graph.definitions() {
            let name = definition.name();
            if let Some(task) = self.overrides.remove(name) {
                debug!("Using custom implementation for {}", name);
                tasks.insert(name.to_string(), task);
                continue;
            }

            let task: Arc<dyn Task> = match definition.spec() {
                TaskSpec::Source(config) => {
                    let source = match (self.sources.get(name), &config.rows) {
                        (Some(source), _) => Arc::clone(source),
                        (None, Some(rows)) => Arc::new(MemorySource::new(rows.clone())),
                        (None, None) => {
                            debug!("Source {} is external, data must be supplied per request", name);
                            continue;
                        }
                    };
                    Arc::new(SourceTask::new(config, source))
                }
                TaskSpec::Feature(config) => Arc::new(FeatureTask::new(config)),
                TaskSpec::AlgoTransform(config) => Arc::new(AlgoTransformTask::new(config)),
                TaskSpec::Service(config) => Arc::new(ServiceTask::new(config)),
                TaskSpec::Experiment(config) => {
                    let rank = match &config.rank {
                        Some(rank) => {
                            let scorer = self.scorer(&graph, &rank.model).map_err(|reason| {
                                TaskError::Registry(format!("experiment {}: {}", name, reason))
                            })?;
                            Some(RankStage::new(rank, scorer))
                        }
                        None => None,
                    };
                    Arc::new(ExperimentTask::new(config, rank))
                }
                TaskSpec::Layer(config) => Arc::new(LayerTask::from_config(config)),
                TaskSpec::Scene(config) => Arc::new(SceneTask::new(config)),
            };
            tasks.insert(name.to_string(), task);
        }

        for name in self.sources.keys() {
            if !tasks.contains_key(name) {
                warn!("Data source {} does not back any configured source", name);
            }
        }

        info!(
            "Task registry built: {} of {} tasks instantiated",
            tasks.len(),
            graph.len()
        );
        Ok(TaskRegistry { graph, tasks })
    }

    /// Scorer for a model: a registered one, else a lazy gRPC client to
    /// the configured address. Clients are shared between experiments.
    fn scorer(&mut self, graph: &ConfigGraph, model: &str) -> Result<Arc<dyn Scorer>, String> {
        if let Some(scorer) = self.scorers.get(model) {
            return Ok(Arc::clone(scorer));
        }
        let config = graph
            .model(model)
            .ok_or_else(|| format!("model {} is not configured", model))?;
        let client = MLScorerClient::connect_lazy(
            config.address.clone(),
            config.timeout_ms.map(Duration::from_millis),
        )
        .map_err(|e| e.to_string())?;
        let scorer: Arc<dyn Scorer> = Arc::new(client);
        self.scorers.insert(model.to_string(), Arc::clone(&scorer));
        Ok(scorer)
    }
}
