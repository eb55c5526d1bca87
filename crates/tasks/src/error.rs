//! Error taxonomy of the execution engine.
//!
//! Every variant is converted to a failure envelope at the operation
//! boundary; none of them reaches the transport as a fault.

use records::SchemaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task {0} is not exist")]
    TaskNotFound(String),

    #[error("scene:{0} is not support!")]
    SceneNotFound(String),

    /// Declared dependency absent or malformed in caller input
    #[error("task {task} need depend data {dependency}: {reason}")]
    MissingDependencyData {
        task: String,
        dependency: String,
        reason: String,
    },

    #[error("scene:{0} recommend need id, eg:userId!")]
    MissingSubjectId(String),

    #[error("invalid bucket config: {0}")]
    InvalidBucketConfig(String),

    /// A task ran but produced no usable result
    #[error("task {task} execute fail: {reason}")]
    TaskExecutionFailed { task: String, reason: String },

    #[error("task {task} timed out after {timeout_ms} ms")]
    TaskTimeout { task: String, timeout_ms: u64 },

    /// Data did not match the schema declared for it
    #[error("task {task}: {source}")]
    Schema {
        task: String,
        #[source]
        source: SchemaError,
    },

    #[error("data source {source_name} failed: {reason}")]
    Source { source_name: String, reason: String },

    #[error("model {model} failed: {reason}")]
    Scoring { model: String, reason: String },

    /// Registry could not be assembled from the configuration
    #[error("registry: {0}")]
    Registry(String),
}

impl TaskError {
    pub(crate) fn schema(task: &str, source: SchemaError) -> Self {
        TaskError::Schema {
            task: task.to_string(),
            source,
        }
    }

    pub(crate) fn execution_failed(task: &str, reason: impl Into<String>) -> Self {
        TaskError::TaskExecutionFailed {
            task: task.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results in this crate
pub type TaskResult<T> = std::result::Result<T, TaskError>;
