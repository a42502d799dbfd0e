//! stackd — the StackGrid daemon.
//!
//! Single binary that wires the graph store, the container runtime and
//! the compose tooling into the engine, then serves the change-feed and
//! logs endpoints.
//!
//! # Usage
//!
//! ```text
//! stackd run --config /etc/stackd.toml --port 80
//! ```

mod daemon;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use stackgrid_core::StackConfig;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,stackd=debug,stackgrid=debug";

#[derive(Parser)]
#[command(name = "stackd", about = "StackGrid daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon.
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// TOML configuration file. Every key is optional.
    #[arg(long, env = "STACKD_CONFIG")]
    config: Option<PathBuf>,

    /// SPARQL endpoint of the graph store.
    #[arg(long, env = "MU_SPARQL_ENDPOINT")]
    sparql_endpoint: Option<String>,

    /// Graph holding the managed resources.
    #[arg(long, env = "MU_APPLICATION_GRAPH")]
    graph: Option<String>,

    /// Base IRI of repository, pipeline and service resources.
    #[arg(long)]
    base_resource: Option<String>,

    /// Directory holding one checkout per pipeline.
    #[arg(long)]
    projects_root: Option<PathBuf>,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value = "80")]
    port: u16,
}

impl RunArgs {
    /// The configuration file (or defaults) with command-line overrides
    /// applied.
    fn load_config(&self) -> anyhow::Result<StackConfig> {
        let mut config = match &self.config {
            Some(path) => StackConfig::from_file(path)?,
            None => StackConfig::default(),
        };
        if let Some(endpoint) = &self.sparql_endpoint {
            config.store.endpoint = endpoint.clone();
        }
        if let Some(graph) = &self.graph {
            config.store.graph = graph.clone();
        }
        if let Some(base) = &self.base_resource {
            config.resources.base = base.clone();
        }
        if let Some(root) = &self.projects_root {
            config.projects.root = root.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run(args) => {
            let config = args.load_config()?;
            daemon::run(config, args.port).await
        }
    }
}
