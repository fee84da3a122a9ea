//! Hydro API service.
//!
//! Serves river gauge readings, waterway overlays and station history
//! backed by a shared cache.

use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use acquisition::AcquisitionConfig;
use hydro_api::{build_router, AppState, CacheBackend, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "hydro-api")]
#[command(about = "River gauge and waterway data API")]
struct Args {
    /// Listen address
    #[arg(short, long, env = "HYDRO_LISTEN_ADDR", default_value = "0.0.0.0:8090")]
    listen: String,

    /// Log filter, e.g. "info" or "acquisition=debug,info"
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,

    /// Cache store
    #[arg(long, env = "HYDRO_CACHE_BACKEND", value_enum, default_value = "redis")]
    cache_backend: CacheBackend,

    /// Redis URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://localhost:6379")]
    redis_url: String,

    /// Entry limit for the in-memory cache
    #[arg(long, env = "HYDRO_MEMORY_CACHE_ENTRIES", default_value = "10000")]
    memory_cache_entries: usize,

    /// Directory holding stations.yaml and risk.yaml
    #[arg(long, env = "HYDRO_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Number of tokio worker threads (default: number of CPU cores)
    #[arg(long)]
    worker_threads: Option<usize>,

    /// Disable the Prometheus recorder
    #[arg(long)]
    no_metrics: bool,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    } else if let Some(threads) = env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
    {
        runtime_builder.worker_threads(threads);
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    let prometheus_handle = if args.no_metrics {
        None
    } else {
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        info!("Prometheus metrics exporter initialized");
        Some(handle)
    };

    let server = ServerConfig {
        cache_backend: args.cache_backend,
        redis_url: args.redis_url,
        memory_cache_entries: args.memory_cache_entries,
        config_dir: args.config_dir,
    };
    let acquisition = AcquisitionConfig::from_env();
    info!(
        grid = %format!("{}x{}", acquisition.grid_rows, acquisition.grid_cols),
        retry_attempts = acquisition.retry_attempts,
        "Starting hydro API server"
    );

    let state = Arc::new(AppState::from_config(&server, acquisition, prometheus_handle).await?);
    let app = build_router(state);

    let addr: SocketAddr = args.listen.parse()?;
    info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
