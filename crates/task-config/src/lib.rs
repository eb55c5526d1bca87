//! # Task Config Crate
//!
//! This crate loads the task-flow configuration and turns it into the
//! immutable graph the serving engine runs against.
//!
//! ## Main Components
//!
//! - **types**: task definitions as declared in YAML (`TaskDefinition`, `TaskKind`)
//! - **parser**: read task-flow files
//! - **graph**: the validated `ConfigGraph` with its precomputed dependency table
//! - **resolver**: flatten a task's dependencies down to leaf data sources
//! - **error**: error types for loading and validation
//!
//! ## Example Usage
//!
//! ```ignore
//! use task_config::ConfigGraph;
//! use std::path::Path;
//!
//! let graph = ConfigGraph::load(Path::new("config/taskflow.yaml"))?;
//!
//! let definition = graph.lookup("rank_input").unwrap();
//! let leaves = graph.rely_services("rank_input").unwrap();
//! println!("{} needs {:?}", definition.name(), leaves);
//! ```

pub mod error;
pub mod graph;
pub mod parser;
pub mod resolver;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{ConfigError, Result};
pub use graph::ConfigGraph;
pub use resolver::resolve;
pub use types::{
    ActionFunc, AlgoTransformConfig, BucketizerConfig, BucketizerKind, ExperimentArm,
    ExperimentConfig, FeatureConfig, FieldAction, LayerConfig, ModelConfig, RankConfig,
    SceneConfig, ServiceConfig, SourceConfig, SourceFilter, TaskDefinition, TaskFlowFile,
    TaskKind, TaskSpec,
};
