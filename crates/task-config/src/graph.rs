//! The validated, immutable configuration graph.
//!
//! Built once at startup from a task-flow file:
//! 1. Normalize every section into `TaskDefinition`s
//! 2. Reject duplicate names and dangling or ill-typed references
//! 3. Check each definition for internal consistency
//! 4. Resolve every task's leaf sources (this is where cycles surface)

use std::collections::HashMap;
use std::path::Path;

use records::{DataResult, FieldType};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};
use crate::parser;
use crate::resolver;
use crate::types::{ActionFunc, ModelConfig, TaskDefinition, TaskFlowFile, TaskKind, TaskSpec};

/// Process-wide task graph, read-only after construction.
#[derive(Debug, Default)]
pub struct ConfigGraph {
    tasks: HashMap<String, TaskDefinition>,
    /// Task names in declaration order
    order: Vec<String>,
    models: HashMap<String, ModelConfig>,
    /// Task name → flattened leaf sources
    rely_services: HashMap<String, Vec<String>>,
}

impl ConfigGraph {
    /// Load and validate a task-flow file.
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading task flow from {}", path.display());
        Self::from_task_flow(parser::read_task_flow(path)?)
    }

    /// Parse and validate task-flow YAML.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Self::from_task_flow(parser::parse_task_flow(text)?)
    }

    /// Validate a parsed task-flow file and precompute dependency tables.
    pub fn from_task_flow(file: TaskFlowFile) -> Result<Self> {
        let (definitions, models) = file.into_parts();

        let mut graph = ConfigGraph::default();
        for definition in definitions {
            let name = definition.name().to_string();
            if graph.tasks.contains_key(&name) {
                return Err(ConfigError::DuplicateTask(name));
            }
            graph.order.push(name.clone());
            graph.tasks.insert(name, definition);
        }
        for model in models {
            if graph.models.contains_key(&model.name) {
                return Err(ConfigError::DuplicateModel(model.name));
            }
            graph.models.insert(model.name.clone(), model);
        }

        for definition in graph.definitions() {
            validate_definition(definition)?;
            graph.validate_references(definition)?;
        }

        let mut rely_services = HashMap::with_capacity(graph.order.len());
        for name in &graph.order {
            let leaves = resolver::resolve(&graph, name)?;
            debug!("Task {} relies on {:?}", name, leaves);
            rely_services.insert(name.clone(), leaves);
        }
        graph.rely_services = rely_services;

        info!(
            "Task flow loaded: {} tasks, {} models",
            graph.order.len(),
            graph.models.len()
        );
        Ok(graph)
    }

    /// Build a graph without validation or precomputation.
    #[cfg(test)]
    pub(crate) fn unchecked(definitions: Vec<TaskDefinition>) -> Self {
        let mut graph = ConfigGraph::default();
        for definition in definitions {
            graph.order.push(definition.name().to_string());
            graph.tasks.insert(definition.name().to_string(), definition);
        }
        graph
    }

    pub fn lookup(&self, name: &str) -> Option<&TaskDefinition> {
        self.tasks.get(name)
    }

    pub fn direct_dependencies(&self, name: &str) -> Option<&[String]> {
        self.lookup(name).map(TaskDefinition::dependencies)
    }

    /// Flattened leaf sources of `name`, computed at load time.
    pub fn rely_services(&self, name: &str) -> Option<&[String]> {
        self.rely_services.get(name).map(Vec::as_slice)
    }

    /// All definitions in declaration order.
    pub fn definitions(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.order.iter().filter_map(|name| self.tasks.get(name))
    }

    pub fn names_of(&self, kind: TaskKind) -> Vec<&str> {
        self.definitions()
            .filter(|d| d.kind() == kind)
            .map(TaskDefinition::name)
            .collect()
    }

    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn validate_references(&self, definition: &TaskDefinition) -> Result<()> {
        let is_data_service = |spec: &TaskSpec| {
            matches!(
                spec,
                TaskSpec::Source(_) | TaskSpec::Feature(_) | TaskSpec::AlgoTransform(_)
            )
        };

        match definition.spec() {
            TaskSpec::Source(_) => Ok(()),
            TaskSpec::Feature(f) => {
                self.check_references(definition, &f.from, "a data service", is_data_service)
            }
            TaskSpec::AlgoTransform(a) => {
                self.check_references(definition, &a.feature, "a source or feature", |spec| {
                    matches!(spec, TaskSpec::Source(_) | TaskSpec::Feature(_))
                })?;
                self.check_references(definition, &a.algo_transform, "an algo transform", |spec| {
                    matches!(spec, TaskSpec::AlgoTransform(_))
                })
            }
            TaskSpec::Service(s) => {
                self.check_references(definition, &s.tasks, "a data service", is_data_service)
            }
            TaskSpec::Experiment(e) => self.check_references(definition, &e.chain, "a service", |spec| {
                matches!(spec, TaskSpec::Service(_))
            }),
            TaskSpec::Layer(l) => {
                let arms: Vec<String> = l.experiments.iter().map(|arm| arm.name.clone()).collect();
                self.check_references(definition, &arms, "an experiment", |spec| {
                    matches!(spec, TaskSpec::Experiment(_))
                })
            }
            TaskSpec::Scene(s) => self.check_references(
                definition,
                &s.chain,
                "a layer, experiment or service",
                |spec| {
                    matches!(
                        spec,
                        TaskSpec::Layer(_) | TaskSpec::Experiment(_) | TaskSpec::Service(_)
                    )
                },
            ),
        }
    }

    fn check_references(
        &self,
        definition: &TaskDefinition,
        references: &[String],
        expected: &str,
        allowed: impl Fn(&TaskSpec) -> bool,
    ) -> Result<()> {
        for reference in references {
            let upstream = self
                .lookup(reference)
                .ok_or_else(|| ConfigError::UnknownReference {
                    task: definition.name().to_string(),
                    reference: reference.clone(),
                })?;
            if !allowed(upstream.spec()) {
                return Err(ConfigError::InvalidReference {
                    task: definition.name().to_string(),
                    reference: reference.clone(),
                    expected: expected.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn validate_definition(definition: &TaskDefinition) -> Result<()> {
    let invalid = |reason: String| ConfigError::InvalidTask {
        task: definition.name().to_string(),
        reason,
    };

    match definition.spec() {
        TaskSpec::Source(s) => {
            if s.columns.is_empty() {
                return Err(invalid("a source must declare its columns".to_string()));
            }
            if let Some(filter) = &s.filter {
                if !s.columns.iter().any(|c| c.name == filter.column) {
                    return Err(invalid(format!(
                        "filter column {} is not a declared column",
                        filter.column
                    )));
                }
            }
            if let Some(rows) = &s.rows {
                DataResult::new(s.name.clone(), s.columns.clone(), rows.clone())
                    .map_err(|e| invalid(e.to_string()))?;
            }
        }
        TaskSpec::Feature(f) => {
            if f.from.is_empty() {
                return Err(invalid("a feature needs at least one input".to_string()));
            }
        }
        TaskSpec::AlgoTransform(a) => {
            if a.feature.is_empty() && a.algo_transform.is_empty() {
                return Err(invalid("an algo transform needs at least one input".to_string()));
            }
            for action in &a.actions {
                if action.fields.is_empty() {
                    return Err(invalid(format!("action {} has no input fields", action.name)));
                }
                match action.func {
                    ActionFunc::Copy if action.fields.len() != 1 => {
                        return Err(invalid(format!("copy action {} takes one field", action.name)));
                    }
                    ActionFunc::Sum | ActionFunc::WeightedSum if !action.field_type.is_numeric() => {
                        return Err(invalid(format!(
                            "action {} must produce a numeric type, not {}",
                            action.name, action.field_type
                        )));
                    }
                    ActionFunc::WeightedSum if action.weights.len() != action.fields.len() => {
                        return Err(invalid(format!(
                            "action {} has {} weights for {} fields",
                            action.name,
                            action.weights.len(),
                            action.fields.len()
                        )));
                    }
                    ActionFunc::Concat if action.field_type != FieldType::Str => {
                        return Err(invalid(format!("concat action {} must produce str", action.name)));
                    }
                    _ => {}
                }
            }
        }
        TaskSpec::Service(_) => {}
        TaskSpec::Experiment(e) => {
            if e.chain.is_empty() {
                return Err(invalid("an experiment needs a service chain".to_string()));
            }
            if let Some(rank) = &e.rank {
                if rank.features.is_empty() {
                    return Err(invalid("rank needs at least one feature".to_string()));
                }
            }
        }
        TaskSpec::Layer(l) => {
            if l.experiments.is_empty() {
                return Err(invalid("a layer needs at least one experiment".to_string()));
            }
            if let Some(arm) = l
                .experiments
                .iter()
                .find(|arm| !arm.ratio.is_finite() || arm.ratio < 0.0)
            {
                return Err(invalid(format!(
                    "experiment {} has invalid ratio {}",
                    arm.name, arm.ratio
                )));
            }
        }
        TaskSpec::Scene(s) => {
            if s.chain.is_empty() {
                return Err(invalid("a scene needs a chain".to_string()));
            }
        }
    }
    Ok(())
}
