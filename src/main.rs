//! kube-mcp: Kubernetes tools over MCP stdio.
//!
//! Reads newline-delimited JSON-RPC on stdin and writes responses on stdout.
//! Logs go to stderr.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use kube_mcp_core::mcp::McpServer;
use kube_mcp_core::observability::init_tracing;
use kube_mcp_core::{Config, Dispatcher, KubeCluster};

#[derive(Debug, Parser)]
#[command(name = "kube-mcp", version, about = "Kubernetes cluster tools over MCP stdio")]
struct Cli {
    /// JSON configuration file.
    #[arg(long, env = "KUBE_MCP_CONFIG")]
    config: Option<PathBuf>,

    /// Kubeconfig file; in-cluster or default kubeconfig when unset.
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context.
    #[arg(long, env = "KUBE_MCP_CONTEXT")]
    context: Option<String>,

    /// Reject every tool that modifies the cluster.
    #[arg(long, env = "KUBE_MCP_READ_ONLY")]
    read_only: bool,

    /// Print the configuration JSON Schema and exit.
    #[arg(long)]
    print_config_schema: bool,
}

impl Cli {
    fn load_config(&self) -> kube_mcp_core::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if self.kubeconfig.is_some() {
            config.cluster.kubeconfig = self.kubeconfig.clone();
        }
        if self.context.is_some() {
            config.cluster.context = self.context.clone();
        }
        if self.read_only {
            config.access.read_only = true;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.print_config_schema {
        println!("{}", serde_json::to_string_pretty(&Config::json_schema())?);
        return Ok(());
    }

    let config = cli.load_config()?;
    init_tracing(&config.observability);

    let cluster = KubeCluster::connect(&config.cluster).await?;
    tracing::info!(
        "kube-mcp {} starting (read_only={})",
        env!("CARGO_PKG_VERSION"),
        config.access.read_only
    );

    let dispatcher = Arc::new(Dispatcher::new(Arc::new(cluster), config)?);
    let server = McpServer::new(dispatcher);

    tokio::select! {
        result = server.serve_stdio() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            server.shutdown();
        }
    }

    Ok(())
}
