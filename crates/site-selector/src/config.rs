//! Selector configuration
//!
//! Immutable after load and shared via `Arc`. Every section defaults
//! independently, so a JSON file only needs to name what it overrides.

use crate::evaluators::EvaluatorConfig;
use crate::scorer::ScoringMode;
use crate::{Factor, Result, ScoreBreakdown, SelectorError};
use orbital_mechanics::ConstellationModel;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Base grid spacing when the caller gives no hint (degrees, ~1.1 km)
pub const DEFAULT_BASE_RESOLUTION_DEG: f64 = 0.010000000;

/// Hard cap on generated candidates
pub const DEFAULT_MAX_CANDIDATES: usize = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub grid: GridConfig,
    pub orchestrator: OrchestratorConfig,
    pub scoring: ScoringConfig,
    pub evaluators: EvaluatorConfig,
    pub constellation: ConstellationModel,
}

impl SelectorConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading selector config from {:?}", path);

        let file = File::open(path)?;
        let config: SelectorConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        self.orchestrator.validate()?;
        self.scoring.validate()?;
        self.evaluators.validate()?;
        self.constellation.validate()?;
        Ok(())
    }
}

/// Area threshold (deg², inclusive) above which the base resolution is multiplied
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolutionTier {
    pub min_area_sq_deg: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub base_resolution_deg: f64,
    pub max_candidates: usize,
    pub tiers: Vec<ResolutionTier>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            base_resolution_deg: DEFAULT_BASE_RESOLUTION_DEG,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            tiers: vec![
                ResolutionTier {
                    min_area_sq_deg: 100.0,
                    multiplier: 50.0,
                },
                ResolutionTier {
                    min_area_sq_deg: 25.0,
                    multiplier: 20.0,
                },
                ResolutionTier {
                    min_area_sq_deg: 4.0,
                    multiplier: 10.0,
                },
            ],
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.base_resolution_deg.is_finite() || self.base_resolution_deg <= 0.0 {
            return Err(SelectorError::Config(format!(
                "grid.base_resolution_deg must be positive, got {}",
                self.base_resolution_deg
            )));
        }
        if self.max_candidates == 0 {
            return Err(SelectorError::Config(
                "grid.max_candidates must be at least 1".to_string(),
            ));
        }
        if self
            .tiers
            .iter()
            .any(|t| !t.multiplier.is_finite() || t.multiplier < 1.0 || t.min_area_sq_deg < 0.0)
        {
            return Err(SelectorError::Config(
                "grid tiers need multipliers >= 1 and non-negative areas".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Candidates scored per request before stride sampling kicks in
    pub analysis_cap: usize,
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    pub deadline_ms: u64,
    /// Upper bound accepted for a request's max_sites
    pub max_sites_limit: usize,
    pub default_max_sites: usize,
    pub default_min_score: f64,
    pub mode: ScoringMode,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            analysis_cap: 100,
            batch_size: 10,
            batch_pause_ms: 100,
            deadline_ms: 60_000,
            max_sites_limit: 100,
            default_max_sites: 10,
            default_min_score: 0.0,
            mode: ScoringMode::Fast,
        }
    }
}

impl OrchestratorConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.analysis_cap == 0 || self.batch_size == 0 {
            return Err(SelectorError::Config(
                "orchestrator.analysis_cap and batch_size must be at least 1".to_string(),
            ));
        }
        if self.deadline_ms == 0 {
            return Err(SelectorError::Config(
                "orchestrator.deadline_ms must be positive".to_string(),
            ));
        }
        if self.default_max_sites == 0 || self.default_max_sites > self.max_sites_limit {
            return Err(SelectorError::Config(format!(
                "orchestrator.default_max_sites must be within 1..={}",
                self.max_sites_limit
            )));
        }
        if !(0.0..=1.0).contains(&self.default_min_score) {
            return Err(SelectorError::Config(
                "orchestrator.default_min_score must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Per-evaluator budget in full mode
    pub evaluator_timeout_ms: u64,
    /// Per-evaluator budget in fast mode
    pub fast_timeout_ms: u64,
    /// Budget for one whole site; on expiry the site falls back
    pub site_timeout_ms: u64,
    /// Factors evaluated live in fast mode
    pub fast_factors: Vec<Factor>,
    /// Scores used in fast mode for factors outside `fast_factors`
    pub fast_constants: ScoreBreakdown,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            evaluator_timeout_ms: 2000,
            fast_timeout_ms: 500,
            site_timeout_ms: 10_000,
            fast_factors: vec![Factor::Backhaul, Factor::Population, Factor::Interference],
            fast_constants: ScoreBreakdown {
                backhaul: 0.5,
                population: 0.5,
                elevation: 0.75,
                interference: 0.7,
                land: 0.8,
                orbital_pass: 0.6,
                market_demand: 0.5,
            },
        }
    }
}

impl ScoringConfig {
    pub fn evaluator_timeout(&self, mode: ScoringMode) -> Duration {
        match mode {
            ScoringMode::Fast => Duration::from_millis(self.fast_timeout_ms),
            ScoringMode::Full => Duration::from_millis(self.evaluator_timeout_ms),
        }
    }

    pub fn site_timeout(&self) -> Duration {
        Duration::from_millis(self.site_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.evaluator_timeout_ms == 0 || self.fast_timeout_ms == 0 || self.site_timeout_ms == 0 {
            return Err(SelectorError::Config("scoring timeouts must be positive".to_string()));
        }
        for factor in Factor::ALL {
            let value = self.fast_constants.get(factor);
            if !(0.0..=1.0).contains(&value) {
                return Err(SelectorError::Config(format!(
                    "scoring.fast_constants.{} must be within [0, 1], got {}",
                    factor, value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = SelectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.orchestrator.analysis_cap, 100);
        assert_eq!(config.orchestrator.batch_size, 10);
        assert_eq!(config.grid.max_candidates, 1000);
        assert_eq!(config.scoring.fast_factors.len(), 3);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"orchestrator": {{"batch_size": 4, "mode": "full"}}, "grid": {{"max_candidates": 500}}}}"#
        )
        .unwrap();

        let config = SelectorConfig::from_path(file.path()).unwrap();
        assert_eq!(config.orchestrator.batch_size, 4);
        assert_eq!(config.orchestrator.mode, ScoringMode::Full);
        assert_eq!(config.orchestrator.analysis_cap, 100);
        assert_eq!(config.grid.max_candidates, 500);
        assert_eq!(config.grid.tiers.len(), 3);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"grid": {{"base_resolution_deg": -1.0}}}}"#).unwrap();

        let err = SelectorConfig::from_path(file.path()).unwrap_err();
        assert!(matches!(err, SelectorError::Config(_)));
    }

    #[test]
    fn test_timeouts_by_mode() {
        let scoring = ScoringConfig::default();
        assert_eq!(scoring.evaluator_timeout(ScoringMode::Fast), Duration::from_millis(500));
        assert_eq!(scoring.evaluator_timeout(ScoringMode::Full), Duration::from_secs(2));
    }
}
