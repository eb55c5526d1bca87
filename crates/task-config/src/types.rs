//! Task definitions as they appear in a task-flow file.
//!
//! One YAML file declares every task of the service, grouped by section.
//! Names are global: a feature and a layer may not share a name.

use records::{Field, FieldType, Row};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Task kinds
// =============================================================================

/// The five dispatch kinds.
///
/// Sources, features and algo-transforms are all `DataService`s: they
/// produce a single table and pull their own inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    DataService,
    Service,
    Experiment,
    Layer,
    Scene,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::DataService => "DataService",
            TaskKind::Service => "Service",
            TaskKind::Experiment => "Experiment",
            TaskKind::Layer => "Layer",
            TaskKind::Scene => "Scene",
        };
        f.write_str(name)
    }
}

// =============================================================================
// File layout
// =============================================================================

/// Top-level layout of a task-flow file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskFlowFile {
    pub sources: Vec<SourceConfig>,
    pub features: Vec<FeatureConfig>,
    pub algo_transforms: Vec<AlgoTransformConfig>,
    pub services: Vec<ServiceConfig>,
    pub experiments: Vec<ExperimentConfig>,
    pub layers: Vec<LayerConfig>,
    pub scenes: Vec<SceneConfig>,
    pub models: Vec<ModelConfig>,
}

// =============================================================================
// DataService definitions
// =============================================================================

/// Leaf data table.
///
/// Without `rows` the source is external: its data has to be supplied by
/// the caller or by a `DataSource` registered at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub name: String,
    pub columns: Vec<Field>,
    #[serde(default)]
    pub rows: Option<Vec<Row>>,
    #[serde(default)]
    pub filter: Option<SourceFilter>,
}

/// Keep rows whose `column` equals the request value named `param`.
///
/// `param: id` reads the subject id bound to the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFilter {
    pub column: String,
    pub param: String,
}

/// Assembles one table from several data services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureConfig {
    pub name: String,
    pub from: Vec<String>,
    #[serde(default)]
    pub join: Option<String>,
    #[serde(default)]
    pub columns: Vec<Field>,
}

/// A feature table plus derived columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgoTransformConfig {
    pub name: String,
    #[serde(default)]
    pub feature: Vec<String>,
    #[serde(default)]
    pub algo_transform: Vec<String>,
    #[serde(default)]
    pub join: Option<String>,
    #[serde(default)]
    pub actions: Vec<FieldAction>,
    #[serde(default)]
    pub columns: Vec<Field>,
}

/// Derives column `name` from `fields` of the same row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldAction {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub func: ActionFunc,
    pub fields: Vec<String>,
    #[serde(default)]
    pub weights: Vec<f64>,
    #[serde(default)]
    pub separator: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionFunc {
    Copy,
    Sum,
    WeightedSum,
    Concat,
}

// =============================================================================
// Recommendation definitions
// =============================================================================

/// Merges its input frontier with the tables it pulls, then dedups,
/// orders and truncates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub columns: Vec<Field>,
    #[serde(default)]
    pub dedup_by: Option<String>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default = "default_true")]
    pub desc: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// One strategy variant: a chain of services plus optional model ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentConfig {
    pub name: String,
    pub chain: Vec<String>,
    #[serde(default)]
    pub rank: Option<RankConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankConfig {
    pub model: String,
    pub features: Vec<String>,
    #[serde(default = "default_score_field")]
    pub score_field: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// A/B decision point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfig {
    pub name: String,
    #[serde(default)]
    pub bucketizer: BucketizerConfig,
    pub experiments: Vec<ExperimentArm>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketizerConfig {
    #[serde(default)]
    pub kind: BucketizerKind,
    #[serde(default = "default_true")]
    pub salt_with_layer: bool,
}

impl Default for BucketizerConfig {
    fn default() -> Self {
        Self {
            kind: BucketizerKind::default(),
            salt_with_layer: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketizerKind {
    #[default]
    Hash,
}

/// One arm of a layer and its traffic weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentArm {
    pub name: String,
    pub ratio: f64,
}

/// Top-level entry point of a product surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneConfig {
    pub name: String,
    pub chain: Vec<String>,
    #[serde(default)]
    pub columns: Vec<Field>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Remote scoring model reachable over gRPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_score_field() -> String {
    "score".to_string()
}

// =============================================================================
// Normalized definitions
// =============================================================================

/// Kind-specific part of a definition.
#[derive(Debug, Clone)]
pub enum TaskSpec {
    Source(SourceConfig),
    Feature(FeatureConfig),
    AlgoTransform(AlgoTransformConfig),
    Service(ServiceConfig),
    Experiment(ExperimentConfig),
    Layer(LayerConfig),
    Scene(SceneConfig),
}

/// Immutable definition of one task, owned by the `ConfigGraph`.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    name: String,
    spec: TaskSpec,
    dependencies: Vec<String>,
}

impl TaskDefinition {
    pub fn new(spec: TaskSpec) -> Self {
        let (name, dependencies) = match &spec {
            TaskSpec::Source(s) => (s.name.clone(), Vec::new()),
            TaskSpec::Feature(f) => (f.name.clone(), f.from.clone()),
            TaskSpec::AlgoTransform(a) => (
                a.name.clone(),
                a.feature.iter().chain(&a.algo_transform).cloned().collect(),
            ),
            TaskSpec::Service(s) => (s.name.clone(), s.tasks.clone()),
            TaskSpec::Experiment(e) => (e.name.clone(), e.chain.clone()),
            TaskSpec::Layer(l) => (
                l.name.clone(),
                l.experiments.iter().map(|arm| arm.name.clone()).collect(),
            ),
            TaskSpec::Scene(s) => (s.name.clone(), s.chain.clone()),
        };
        Self {
            name,
            spec,
            dependencies,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    pub fn kind(&self) -> TaskKind {
        match self.spec {
            TaskSpec::Source(_) | TaskSpec::Feature(_) | TaskSpec::AlgoTransform(_) => {
                TaskKind::DataService
            }
            TaskSpec::Service(_) => TaskKind::Service,
            TaskSpec::Experiment(_) => TaskKind::Experiment,
            TaskSpec::Layer(_) => TaskKind::Layer,
            TaskSpec::Scene(_) => TaskKind::Scene,
        }
    }

    /// Declared columns; empty when the task derives its schema from inputs.
    pub fn columns(&self) -> &[Field] {
        match &self.spec {
            TaskSpec::Source(s) => &s.columns,
            TaskSpec::Feature(f) => &f.columns,
            TaskSpec::AlgoTransform(a) => &a.columns,
            TaskSpec::Service(s) => &s.columns,
            TaskSpec::Scene(s) => &s.columns,
            TaskSpec::Experiment(_) | TaskSpec::Layer(_) => &[],
        }
    }

    /// Directly declared dependency names, in declaration order.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Sources are the leaves of every dependency walk.
    pub fn is_leaf(&self) -> bool {
        matches!(self.spec, TaskSpec::Source(_))
    }
}

impl TaskFlowFile {
    /// Split the file into task definitions and model declarations.
    pub fn into_parts(self) -> (Vec<TaskDefinition>, Vec<ModelConfig>) {
        let TaskFlowFile {
            sources,
            features,
            algo_transforms,
            services,
            experiments,
            layers,
            scenes,
            models,
        } = self;

        let definitions = sources
            .into_iter()
            .map(TaskSpec::Source)
            .chain(features.into_iter().map(TaskSpec::Feature))
            .chain(algo_transforms.into_iter().map(TaskSpec::AlgoTransform))
            .chain(services.into_iter().map(TaskSpec::Service))
            .chain(experiments.into_iter().map(TaskSpec::Experiment))
            .chain(layers.into_iter().map(TaskSpec::Layer))
            .chain(scenes.into_iter().map(TaskSpec::Scene))
            .map(TaskDefinition::new)
            .collect();
        (definitions, models)
    }
}
