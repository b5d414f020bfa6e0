//! Tree API Server
//!
//! Serves metadata, sliced data and search over a configured node tree.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use adapters::AdapterRegistry;
use tree_api::config::ServiceConfig;
use tree_api::state::AppState;

/// Tree API Server
#[derive(Parser, Debug)]
#[command(name = "tree-api")]
#[command(about = "Metadata, slicing and search over a tree of structured datasets")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:8000", env = "TREE_LISTEN_ADDR")]
    listen: String,

    /// Configuration file
    #[arg(short, long, default_value = "config/tree.yaml", env = "TREE_CONFIG")]
    config: String,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Number of worker threads
    #[arg(long, env = "TREE_WORKER_THREADS")]
    worker_threads: Option<usize>,

    /// Include backend error detail in responses
    #[arg(long, env = "TREE_DEBUG_ERRORS")]
    debug_errors: bool,
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    }

    let runtime = runtime_builder
        .build()
        .context("Failed to create Tokio runtime")?;

    runtime.block_on(run_server(args))
}

async fn run_server(args: Args) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .json()
        .init();

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    info!(config = %args.config, "Starting tree API server");

    let config = match ServiceConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            return Err(e);
        }
    };

    let registry = AdapterRegistry::with_builtins();
    info!(families = ?registry.families(), "Adapter registry ready");
    let service = config.build_service(&registry)?;

    let state = Arc::new(
        AppState::new(service)
            .with_debug_errors(args.debug_errors)
            .with_prometheus(prometheus_handle),
    );
    let app = tree_api::router(state);

    let addr: SocketAddr = args
        .listen
        .parse()
        .with_context(|| format!("Invalid listen address: {}", args.listen))?;
    info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
