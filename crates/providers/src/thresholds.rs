//! Official stage thresholds per gauge.
//!
//! Thresholds come from a YAML registry (`stations.yaml`) listing NWS flood
//! stages for the gauges that have them:
//!
//! ```yaml
//! stations:
//!   - site_code: "05568500"
//!     name: "Illinois River at Kingston Mines, IL"
//!     thresholds:
//!       action_stage: 14.0
//!       flood_stage: 16.0
//!       moderate_flood_stage: 20.0
//!       major_flood_stage: 24.0
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use hydro_common::StageThresholds;

use crate::error::UpstreamResult;

/// Source of stage thresholds. `Ok(None)` means the station has none.
#[async_trait]
pub trait ThresholdSource: Send + Sync {
    async fn thresholds(&self, station_id: &str) -> UpstreamResult<Option<StageThresholds>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub site_code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub thresholds: Option<StageThresholds>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    stations: Vec<RegistryEntry>,
}

/// In-memory registry of gauges and their thresholds.
#[derive(Debug, Clone, Default)]
pub struct StationRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl StationRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the registry from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read station registry from {:?}", path.as_ref()))?;
        let registry = Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse station registry from {:?}", path.as_ref()))?;
        info!(
            path = ?path.as_ref(),
            stations = registry.len(),
            "Loaded station registry"
        );
        Ok(registry)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: RegistryFile = serde_yaml::from_str(content)?;
        Self::from_entries(file.stations)
    }

    pub fn from_entries(entries: Vec<RegistryEntry>) -> Result<Self> {
        let mut map = HashMap::with_capacity(entries.len());
        for entry in entries {
            anyhow::ensure!(!entry.site_code.is_empty(), "Station site_code cannot be empty");
            if let Some(t) = &entry.thresholds {
                validate_thresholds(&entry.site_code, t)?;
            }
            anyhow::ensure!(
                !map.contains_key(&entry.site_code),
                "Duplicate station {} in registry",
                entry.site_code
            );
            map.insert(entry.site_code.clone(), entry);
        }
        Ok(Self { entries: map })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, station_id: &str) -> Option<&RegistryEntry> {
        self.entries.get(station_id)
    }
}

fn validate_thresholds(site_code: &str, t: &StageThresholds) -> Result<()> {
    let stages = [
        t.action_stage,
        t.flood_stage,
        t.moderate_flood_stage,
        t.major_flood_stage,
    ];
    anyhow::ensure!(
        stages.iter().all(|s| s.is_finite()),
        "Station {} has non-finite thresholds",
        site_code
    );
    anyhow::ensure!(
        stages.windows(2).all(|w| w[0] <= w[1]),
        "Station {} thresholds must ascend: action <= flood <= moderate <= major",
        site_code
    );
    anyhow::ensure!(
        t.flood_stage > 0.0,
        "Station {} flood stage must be positive",
        site_code
    );
    Ok(())
}

#[async_trait]
impl ThresholdSource for StationRegistry {
    async fn thresholds(&self, station_id: &str) -> UpstreamResult<Option<StageThresholds>> {
        Ok(self.get(station_id).and_then(|e| e.thresholds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const REGISTRY: &str = r#"
stations:
  - site_code: "05568500"
    name: "Illinois River at Kingston Mines, IL"
    thresholds:
      action_stage: 14.0
      flood_stage: 16.0
      moderate_flood_stage: 20.0
      major_flood_stage: 24.0
  - site_code: "05567500"
    name: "Illinois River at Peoria, IL"
"#;

    #[tokio::test]
    async fn test_lookup() {
        let registry = StationRegistry::from_yaml_str(REGISTRY).unwrap();
        assert_eq!(registry.len(), 2);

        let t = registry.thresholds("05568500").await.unwrap().unwrap();
        assert_eq!(t.flood_stage, 16.0);

        assert!(registry.thresholds("05567500").await.unwrap().is_none());
        assert!(registry.thresholds("00000000").await.unwrap().is_none());
    }

    #[test]
    fn test_rejects_descending_stages() {
        let yaml = r#"
stations:
  - site_code: "1"
    thresholds:
      action_stage: 20.0
      flood_stage: 16.0
      moderate_flood_stage: 22.0
      major_flood_stage: 24.0
"#;
        assert!(StationRegistry::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_rejects_duplicates() {
        let yaml = "stations:\n  - site_code: \"1\"\n  - site_code: \"1\"\n";
        assert!(StationRegistry::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(REGISTRY.as_bytes()).unwrap();
        let registry = StationRegistry::load(file.path()).unwrap();
        assert!(registry.get("05568500").is_some());
    }
}
