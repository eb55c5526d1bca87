//! recflow HTTP server.
//!
//! Loads the server config and the task flow, then serves the
//! recommendation routes until Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use server::{ServerConfig, build_core, serve};

#[derive(Parser)]
#[command(name = "recflow-server")]
#[command(about = "Serve recommendation task flows over HTTP", long_about = None)]
struct Args {
    /// Server config file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Task-flow file, overrides the config
    #[arg(long)]
    task_flow: Option<PathBuf>,

    /// Port, overrides the config
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(task_flow) = args.task_flow {
        config.task_flow = task_flow;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    info!("Starting recflow server with {:?}", config);
    let core = Arc::new(build_core(&config)?);
    serve(core, &config.bind_addr()).await
}
