//! Error types for loading and validating a task-flow configuration.

use thiserror::Error;

/// Errors raised while building the configuration graph.
///
/// All of these are startup-time failures; a graph that was built
/// successfully never produces them again.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Task-flow file could not be read
    #[error("Failed to read task flow file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Task-flow file is not valid YAML for the expected layout
    #[error("Failed to parse task flow: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Two definitions share a name (names are global across sections)
    #[error("Duplicate task name: {0}")]
    DuplicateTask(String),

    /// Two model declarations share a name
    #[error("Duplicate model name: {0}")]
    DuplicateModel(String),

    /// A definition refers to a name that is not defined anywhere
    #[error("Task {task} references unknown task {reference}")]
    UnknownReference { task: String, reference: String },

    /// A definition refers to a task of a kind it cannot consume
    #[error("Task {task} cannot use {reference}: expected {expected}")]
    InvalidReference {
        task: String,
        reference: String,
        expected: String,
    },

    /// Lookup of a name that is not in the graph
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// Dependency declarations loop back onto themselves
    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    /// A definition is internally inconsistent
    #[error("Invalid task {task}: {reason}")]
    InvalidTask { task: String, reason: String },
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, ConfigError>;
