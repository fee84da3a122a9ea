//! Application state for the hydro API.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::ValueEnum;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{info, warn};

use acquisition::{AcquisitionConfig, HydroDataService, RiskClassifier, RiskConfig};
use providers::{OverpassClient, StationRegistry, UsgsClient};
use storage::{MemoryStore, RedisStore, TieredCache};

/// Which store backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheBackend {
    Redis,
    Memory,
    /// No cache; every request goes upstream.
    None,
}

/// Startup settings not covered by [`AcquisitionConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub cache_backend: CacheBackend,
    pub redis_url: String,
    pub memory_cache_entries: usize,
    /// Directory holding `stations.yaml` and `risk.yaml`.
    pub config_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cache_backend: CacheBackend::Redis,
            redis_url: "redis://localhost:6379".to_string(),
            memory_cache_entries: 10_000,
            config_dir: PathBuf::from("config"),
        }
    }
}

/// Shared application state.
pub struct AppState {
    /// The data layer every handler calls into.
    pub service: HydroDataService,

    /// Prometheus exporter, absent when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(service: HydroDataService, metrics: Option<PrometheusHandle>) -> Self {
        Self { service, metrics }
    }

    /// Build the production state: real upstream clients, the configured
    /// cache store and the YAML registries from `config_dir`.
    pub async fn from_config(
        server: &ServerConfig,
        acquisition: AcquisitionConfig,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self> {
        let cache = connect_cache(server).await;

        let telemetry = Arc::new(UsgsClient::new(
            acquisition.telemetry_endpoint.clone(),
            acquisition.area_fetch_timeout,
        )?);
        let geometry = Arc::new(OverpassClient::new(
            acquisition.geometry_endpoint.clone(),
            acquisition.area_fetch_timeout,
        )?);

        let registry = load_registry(&server.config_dir)?;
        let classifier = RiskClassifier::new(load_risk_config(&server.config_dir)?);

        info!(
            cache = cache.backend(),
            stations_with_thresholds = registry.len(),
            telemetry = %acquisition.telemetry_endpoint,
            geometry = %acquisition.geometry_endpoint,
            "Hydro data service configured"
        );

        let service = HydroDataService::new(
            acquisition,
            cache,
            telemetry,
            geometry,
            Arc::new(registry),
            classifier,
        );
        Ok(Self::new(service, metrics))
    }
}

/// Open the configured store. An unreachable Redis leaves the cache
/// disabled rather than failing startup.
async fn connect_cache(server: &ServerConfig) -> TieredCache {
    match server.cache_backend {
        CacheBackend::Redis => match RedisStore::connect(&server.redis_url).await {
            Ok(store) => {
                info!(url = %server.redis_url, "Connected to Redis");
                TieredCache::new(Arc::new(store))
            }
            Err(e) => {
                warn!(error = %e, "Redis unavailable, running with cache disabled");
                TieredCache::disabled()
            }
        },
        CacheBackend::Memory => {
            info!(entries = server.memory_cache_entries, "Using in-memory cache");
            TieredCache::new(Arc::new(MemoryStore::new(server.memory_cache_entries)))
        }
        CacheBackend::None => {
            warn!("Cache disabled by configuration");
            TieredCache::disabled()
        }
    }
}

fn load_registry(config_dir: &Path) -> Result<StationRegistry> {
    let path = config_dir.join("stations.yaml");
    if !path.exists() {
        warn!(path = ?path, "No station registry found, stage thresholds unavailable");
        return Ok(StationRegistry::empty());
    }
    StationRegistry::load(&path)
}

fn load_risk_config(config_dir: &Path) -> Result<RiskConfig> {
    let path = config_dir.join("risk.yaml");
    if !path.exists() {
        warn!(path = ?path, "No risk config found, using default bands");
        return Ok(RiskConfig::default());
    }
    RiskConfig::load(&path)
}
