//! Qualitative flood risk from a reading.
//!
//! Gauges with official stage thresholds are classified by the ratio of the
//! reading to flood stage. Everything else falls back to per-parameter
//! heuristic bands, which can be tuned through `risk.yaml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use hydro_common::{ParameterKind, RiskLevel, StageThresholds};

/// Ratio of reading to flood stage at or above which risk is extreme.
pub const EXTREME_RATIO: f64 = 1.2;
/// At or above flood stage.
pub const HIGH_RATIO: f64 = 1.0;
pub const MODERATE_RATIO: f64 = 0.8;
pub const NORMAL_RATIO: f64 = 0.5;

/// Gage height bands, feet.
pub const GAGE_HEIGHT_BANDS: RiskBands = RiskBands {
    low_below: 2.0,
    normal_below: 10.0,
    moderate_below: 15.0,
    high_below: 20.0,
};

/// Discharge bands, cubic feet per second.
pub const DISCHARGE_BANDS: RiskBands = RiskBands {
    low_below: 100.0,
    normal_below: 5_000.0,
    moderate_below: 20_000.0,
    high_below: 50_000.0,
};

/// Reservoir storage bands, acre-feet.
pub const RESERVOIR_STORAGE_BANDS: RiskBands = RiskBands {
    low_below: 1_000.0,
    normal_below: 50_000.0,
    moderate_below: 200_000.0,
    high_below: 500_000.0,
};

/// Upper bounds of each level for one parameter; values at or above
/// `high_below` are extreme.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskBands {
    pub low_below: f64,
    pub normal_below: f64,
    pub moderate_below: f64,
    pub high_below: f64,
}

impl RiskBands {
    pub fn level(&self, value: f64) -> RiskLevel {
        if value < self.low_below {
            RiskLevel::Low
        } else if value < self.normal_below {
            RiskLevel::Normal
        } else if value < self.moderate_below {
            RiskLevel::Moderate
        } else if value < self.high_below {
            RiskLevel::High
        } else {
            RiskLevel::Extreme
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let bounds = [
            self.low_below,
            self.normal_below,
            self.moderate_below,
            self.high_below,
        ];
        anyhow::ensure!(
            bounds.iter().all(|b| b.is_finite()) && bounds.windows(2).all(|w| w[0] <= w[1]),
            "Risk bands for {} must be finite and ascending",
            name
        );
        Ok(())
    }
}

/// Heuristic bands per parameter kind. A kind without bands classifies as
/// unknown unless the station has thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub gage_height: Option<RiskBands>,
    pub discharge: Option<RiskBands>,
    pub reservoir_storage: Option<RiskBands>,
    pub lake_elevation: Option<RiskBands>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            gage_height: Some(GAGE_HEIGHT_BANDS),
            discharge: Some(DISCHARGE_BANDS),
            reservoir_storage: Some(RESERVOIR_STORAGE_BANDS),
            lake_elevation: None,
        }
    }
}

impl RiskConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read risk config from {:?}", path.as_ref()))?;
        let config: RiskConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse risk config from {:?}", path.as_ref()))?;
        config.validate()?;
        info!(path = ?path.as_ref(), "Loaded risk bands");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let named = [
            ("gage_height", &self.gage_height),
            ("discharge", &self.discharge),
            ("reservoir_storage", &self.reservoir_storage),
            ("lake_elevation", &self.lake_elevation),
        ];
        for (name, bands) in named {
            if let Some(bands) = bands {
                bands.validate(name)?;
            }
        }
        Ok(())
    }

    pub fn bands_for(&self, kind: ParameterKind) -> Option<&RiskBands> {
        match kind {
            ParameterKind::GageHeight => self.gage_height.as_ref(),
            ParameterKind::Discharge => self.discharge.as_ref(),
            ParameterKind::ReservoirStorage => self.reservoir_storage.as_ref(),
            ParameterKind::LakeElevation => self.lake_elevation.as_ref(),
            ParameterKind::Other => None,
        }
    }
}

/// Stateless classifier over a fixed band configuration.
#[derive(Debug, Clone, Default)]
pub struct RiskClassifier {
    config: RiskConfig,
}

impl RiskClassifier {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Risk level of `reading` for a series of `kind`.
    ///
    /// Stage thresholds are in feet of stage, so they apply to gage height
    /// series only.
    pub fn classify(
        &self,
        reading: Option<f64>,
        kind: ParameterKind,
        thresholds: Option<&StageThresholds>,
    ) -> RiskLevel {
        let Some(value) = reading.filter(|v| v.is_finite()) else {
            return RiskLevel::Unknown;
        };

        if kind == ParameterKind::GageHeight {
            let usable = thresholds.filter(|t| t.flood_stage.is_finite() && t.flood_stage > 0.0);
            if let Some(t) = usable {
                return classify_by_ratio(value / t.flood_stage);
            }
        }

        self.config
            .bands_for(kind)
            .map(|bands| bands.level(value))
            .unwrap_or(RiskLevel::Unknown)
    }
}

/// Level for a reading-to-flood-stage ratio.
pub fn classify_by_ratio(ratio: f64) -> RiskLevel {
    if ratio >= EXTREME_RATIO {
        RiskLevel::Extreme
    } else if ratio >= HIGH_RATIO {
        RiskLevel::High
    } else if ratio >= MODERATE_RATIO {
        RiskLevel::Moderate
    } else if ratio >= NORMAL_RATIO {
        RiskLevel::Normal
    } else {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINGSTON_MINES: StageThresholds = StageThresholds {
        action_stage: 14.0,
        flood_stage: 16.0,
        moderate_flood_stage: 20.0,
        major_flood_stage: 24.0,
    };

    #[test]
    fn test_ratio_bands() {
        let c = RiskClassifier::default();
        let gh = ParameterKind::GageHeight;
        let t = Some(&KINGSTON_MINES);
        assert_eq!(c.classify(Some(19.2), gh, t), RiskLevel::Extreme);
        assert_eq!(c.classify(Some(16.0), gh, t), RiskLevel::High);
        assert_eq!(c.classify(Some(12.8), gh, t), RiskLevel::Moderate);
        assert_eq!(c.classify(Some(8.0), gh, t), RiskLevel::Normal);
        assert_eq!(c.classify(Some(7.9), gh, t), RiskLevel::Low);
    }

    #[test]
    fn test_missing_reading_is_unknown() {
        let c = RiskClassifier::default();
        assert_eq!(
            c.classify(None, ParameterKind::GageHeight, Some(&KINGSTON_MINES)),
            RiskLevel::Unknown
        );
        assert_eq!(
            c.classify(Some(f64::NAN), ParameterKind::Discharge, None),
            RiskLevel::Unknown
        );
    }

    #[test]
    fn test_heuristic_fallback_per_kind() {
        let c = RiskClassifier::default();
        assert_eq!(c.classify(Some(12.0), ParameterKind::GageHeight, None), RiskLevel::Moderate);
        assert_eq!(c.classify(Some(12.0), ParameterKind::Discharge, None), RiskLevel::Low);
        assert_eq!(c.classify(Some(12.0), ParameterKind::Other, None), RiskLevel::Unknown);
        assert_eq!(c.classify(Some(600.0), ParameterKind::LakeElevation, None), RiskLevel::Unknown);
    }

    #[test]
    fn test_thresholds_ignored_for_discharge() {
        let c = RiskClassifier::default();
        assert_eq!(
            c.classify(Some(20.0), ParameterKind::Discharge, Some(&KINGSTON_MINES)),
            RiskLevel::Low
        );
    }

    #[test]
    fn test_risk_yaml_overrides() {
        let yaml = r#"
discharge:
  low_below: 1.0
  normal_below: 2.0
  moderate_below: 3.0
  high_below: 4.0
"#;
        let config: RiskConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        let c = RiskClassifier::new(config);
        assert_eq!(c.classify(Some(3.5), ParameterKind::Discharge, None), RiskLevel::High);
        // unspecified kinds keep their compiled-in bands
        assert_eq!(c.classify(Some(12.0), ParameterKind::GageHeight, None), RiskLevel::Moderate);
    }

    #[test]
    fn test_descending_bands_rejected() {
        let config = RiskConfig {
            discharge: Some(RiskBands {
                low_below: 10.0,
                normal_below: 5.0,
                moderate_below: 20.0,
                high_below: 30.0,
            }),
            ..RiskConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
