//! Reading task-flow files.

use std::fs;
use std::path::Path;

use crate::error::{ConfigError, Result};
use crate::types::TaskFlowFile;

/// Parse a task-flow document from YAML text.
pub fn parse_task_flow(text: &str) -> Result<TaskFlowFile> {
    Ok(serde_yaml::from_str(text)?)
}

/// Read and parse a task-flow file from disk.
pub fn read_task_flow(path: &Path) -> Result<TaskFlowFile> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_task_flow(&text)
}
