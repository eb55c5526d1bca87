//! Server crate for the recflow recommendation service.
//!
//! Hosts the execution core (the three public operations), its HTTP
//! routes and the server configuration.

pub mod config;
pub mod http;
pub mod orchestrator;

use std::sync::Arc;

use anyhow::{Context, Result};
use task_config::ConfigGraph;
use tasks::TaskRegistry;
use tracing::info;

pub use config::ServerConfig;
pub use http::{router, serve};
pub use orchestrator::{ExecutionCore, PRE_TASKS_PARAM};

/// Load the task flow named by `config` and assemble the execution core.
///
/// Fails on any configuration error, including dependency cycles, so a
/// bad task flow never reaches request handling.
pub fn build_core(config: &ServerConfig) -> Result<ExecutionCore> {
    let graph = ConfigGraph::load(&config.task_flow)
        .with_context(|| format!("Failed to load task flow {}", config.task_flow.display()))?;
    let registry = TaskRegistry::from_graph(Arc::new(graph)).context("Failed to build task registry")?;
    info!(
        "Execution core ready: {} tasks, timeout {:?}",
        registry.len(),
        config.task_timeout()
    );
    Ok(ExecutionCore::new(Arc::new(registry), config.task_timeout()))
}
