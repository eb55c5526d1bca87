use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use records::Envelope;
use serde_json::{Map, Value};
use server::{build_core, serve, ExecutionCore, ServerConfig, PRE_TASKS_PARAM};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use task_config::{resolve, ConfigGraph, TaskKind, TaskSpec};
use tasks::HashBucketizer;
use tokio::sync::Semaphore;

/// recflow - configuration-driven recommendation task engine
#[derive(Parser)]
#[command(name = "recflow")]
#[command(about = "Run and inspect recommendation task flows", long_about = None)]
struct Cli {
    /// Server config file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Task-flow file, overrides the config
    #[arg(short, long)]
    task_flow: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the task flow over HTTP
    Serve {
        /// Port to listen on, overrides the config
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run a single task
    Get {
        task: String,

        /// Request parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },

    /// Run pre-tasks, then a target task on their output
    Recommend {
        task: String,

        /// Comma-separated pre-task names
        #[arg(long, value_delimiter = ',')]
        pre_tasks: Vec<String>,

        /// Request parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },

    /// Recommend for one subject in a scene
    Scene {
        scene: String,
        id: String,

        /// Request parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },

    /// List configured tasks by kind
    List,

    /// Show the dependencies of a task
    Deps { task: String },

    /// Show which experiment of a layer a subject lands in
    Bucket { layer: String, id: String },

    /// Run a benchmark against a scene
    Benchmark {
        scene: String,

        /// Number of requests to make
        #[arg(long, default_value = "100")]
        requests: usize,

        /// Number of concurrent requests
        #[arg(long, default_value = "10")]
        concurrent: usize,

        /// Random subject ids are drawn from 1..=users
        #[arg(long, default_value = "10000")]
        users: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(task_flow) = cli.task_flow {
        config.task_flow = task_flow;
    }

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            let core = Arc::new(load_core(&config)?);
            serve(core, &config.bind_addr()).await?;
        }
        Commands::Get { task, params } => {
            let core = load_core(&config)?;
            let envelope = core.invoke_task(&task, parse_params(&params)?).await;
            print_envelope(&envelope);
        }
        Commands::Recommend {
            task,
            pre_tasks,
            params,
        } => {
            let core = load_core(&config)?;
            let mut params = parse_params(&params)?;
            if !pre_tasks.is_empty() {
                params.insert(PRE_TASKS_PARAM.to_string(), Value::from(pre_tasks));
            }
            let envelope = core.recommend(&task, params).await;
            print_envelope(&envelope);
        }
        Commands::Scene { scene, id, params } => {
            let core = load_core(&config)?;
            let envelope = core.recommend_scene(&scene, &id, parse_params(&params)?).await;
            print_envelope(&envelope);
        }
        Commands::List => handle_list(&load_graph(&config)?),
        Commands::Deps { task } => handle_deps(&load_graph(&config)?, &task)?,
        Commands::Bucket { layer, id } => handle_bucket(&load_graph(&config)?, &layer, &id)?,
        Commands::Benchmark {
            scene,
            requests,
            concurrent,
            users,
        } => {
            let core = Arc::new(load_core(&config)?);
            handle_benchmark(core, scene, requests, concurrent, users).await?;
        }
    }

    Ok(())
}

fn load_graph(config: &ServerConfig) -> Result<ConfigGraph> {
    ConfigGraph::load(&config.task_flow)
        .with_context(|| format!("Failed to load task flow {}", config.task_flow.display()))
}

fn load_core(config: &ServerConfig) -> Result<ExecutionCore> {
    let start = Instant::now();
    let core = build_core(config)?;
    println!(
        "{} Loaded {} tasks from {} in {:?}",
        "✓".green(),
        core.registry().len(),
        config.task_flow.display(),
        start.elapsed()
    );
    Ok(core)
}

fn parse_params(text: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(text).context("Failed to parse --params")? {
        Value::Object(params) => Ok(params),
        other => bail!("--params must be a JSON object, got {}", other),
    }
}

/// Handle the 'list' command
fn handle_list(graph: &ConfigGraph) {
    for kind in [
        TaskKind::DataService,
        TaskKind::Service,
        TaskKind::Experiment,
        TaskKind::Layer,
        TaskKind::Scene,
    ] {
        let names = graph.names_of(kind);
        if names.is_empty() {
            continue;
        }
        println!("{}", format!("{} ({})", kind, names.len()).bold().blue());
        for name in names {
            println!("  {} {}", "•".green(), name);
        }
    }
}

/// Handle the 'deps' command
fn handle_deps(graph: &ConfigGraph, task: &str) -> Result<()> {
    let definition = graph
        .lookup(task)
        .ok_or_else(|| anyhow!("Task {} is not configured", task))?;

    println!("{}", format!("{} [{}]", task, definition.kind()).bold().blue());
    println!("{}Direct: {}", "• ".green(), join_or_none(definition.dependencies()));
    let leaves = resolve(graph, task)?;
    println!("{}Leaf sources: {}", "• ".cyan(), join_or_none(&leaves));
    for leaf in &leaves {
        let external = matches!(
            graph.lookup(leaf).map(|d| d.spec()),
            Some(TaskSpec::Source(source)) if source.rows.is_none()
        );
        if external {
            println!("  {} {} must be supplied by the caller", "!".yellow(), leaf);
        }
    }
    Ok(())
}

/// Handle the 'bucket' command
fn handle_bucket(graph: &ConfigGraph, layer: &str, id: &str) -> Result<()> {
    let config = match graph.lookup(layer).map(|d| d.spec()) {
        Some(TaskSpec::Layer(config)) => config,
        _ => bail!("{} is not a configured layer", layer),
    };
    let bucketizer = HashBucketizer::from_config(config);
    let experiment = bucketizer.assign(id)?;
    println!(
        "Subject {} in layer {} → {}",
        id.bold(),
        layer,
        experiment.green()
    );
    Ok(())
}

/// Handle the 'benchmark' command
async fn handle_benchmark(
    core: Arc<ExecutionCore>,
    scene: String,
    requests: usize,
    concurrent: usize,
    users: u32,
) -> Result<()> {
    if requests == 0 {
        bail!("--requests must be at least 1");
    }
    let permits = Arc::new(Semaphore::new(concurrent.max(1)));
    let scene = Arc::new(scene);

    let wall = Instant::now();
    let mut handles = Vec::with_capacity(requests);
    for _ in 0..requests {
        let id = (rand::random::<u32>() % users.max(1) + 1).to_string();
        let core = Arc::clone(&core);
        let scene = Arc::clone(&scene);
        let permits = Arc::clone(&permits);
        handles.push(tokio::spawn(async move {
            let _permit = permits.acquire_owned().await?;
            let start = Instant::now();
            let envelope = core.recommend_scene(&scene, &id, Map::new()).await;
            Ok::<_, anyhow::Error>((start.elapsed(), envelope.is_success()))
        }));
    }

    let mut timings = Vec::with_capacity(requests);
    let mut failures = 0;
    for handle in handles {
        let (elapsed, ok) = handle.await??;
        timings.push(elapsed);
        if !ok {
            failures += 1;
        }
    }
    let total_time = wall.elapsed();

    timings.sort();
    let avg_latency = timings.iter().sum::<Duration>() / timings.len() as u32;
    let percentile = |p: f64| timings[((timings.len() as f64 * p) as usize).min(timings.len() - 1)];

    println!("{}", "Benchmark results:".bold().blue());
    println!("Requests: {} ({} failed)", requests, failures);
    println!("Total time: {:?}", total_time);
    println!("Average latency: {:?}", avg_latency);
    println!("P50 latency: {:?}", percentile(0.50));
    println!("P95 latency: {:?}", percentile(0.95));
    println!("P99 latency: {:?}", percentile(0.99));
    println!(
        "Throughput: {:.2} requests/second",
        requests as f64 / total_time.as_secs_f64()
    );

    Ok(())
}

fn join_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

/// Helper function to format and print an envelope
fn print_envelope(envelope: &Envelope) {
    if !envelope.is_success() {
        println!("{} {}", "✗".red(), envelope.msg().red());
        return;
    }

    let header = match envelope.id() {
        Some(id) => format!("{} records for {}:", envelope.data().len(), id),
        None => format!("{} records:", envelope.data().len()),
    };
    println!("{}", header.bold().blue());
    for (rank, record) in envelope.data().iter().enumerate() {
        println!(
            "{}. {}",
            (rank + 1).to_string().green(),
            Value::Object(record.clone())
        );
    }
}
