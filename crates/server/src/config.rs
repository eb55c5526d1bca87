//! Server configuration.
//!
//! Read from a YAML file; every key is optional.
//!
//! ```yaml
//! host: 0.0.0.0
//! port: 8080
//! taskTimeoutMs: 3000
//! taskFlow: config/taskflow.yaml
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on a single task execution
    pub task_timeout_ms: u64,
    /// Task-flow file describing every task of the service
    pub task_flow: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            task_timeout_ms: 3000,
            task_flow: PathBuf::from("config/taskflow.yaml"),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read server config {}", path.display()))?;
        Self::from_yaml_str(&text)
            .with_context(|| format!("Failed to parse server config {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        // An empty file is a valid, all-defaults config
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_use_defaults() {
        let config = ServerConfig::from_yaml_str("port: 9000\n").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.task_timeout(), Duration::from_secs(3));
        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(ServerConfig::from_yaml_str("").unwrap(), ServerConfig::default());
    }

    #[test]
    fn test_camel_case_keys() {
        let config =
            ServerConfig::from_yaml_str("taskTimeoutMs: 250\ntaskFlow: flows/home.yaml\n").unwrap();
        assert_eq!(config.task_timeout_ms, 250);
        assert_eq!(config.task_flow, PathBuf::from("flows/home.yaml"));
    }

    #[test]
    fn test_bad_yaml_is_an_error() {
        assert!(ServerConfig::from_yaml_str("port: [1, 2]").is_err());
    }
}
