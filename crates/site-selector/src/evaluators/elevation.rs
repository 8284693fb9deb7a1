//! Elevation suitability
//!
//! Full marks inside the optimal band, linear penalty below and above it,
//! never under the floor. The default score is the score of a reference
//! elevation rather than a constant.

use super::{Evaluation, FactorEvaluator};
use crate::collaborators::{CollaboratorError, CollaboratorResult, ElevationService};
use crate::{Factor, GeoPoint};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationParams {
    pub optimal_min_m: f64,
    pub optimal_max_m: f64,
    /// Metres below the band over which the score falls by 1.0
    pub low_falloff_m: f64,
    /// Metres above the band over which the score falls by 1.0
    pub high_falloff_m: f64,
    pub floor: f64,
    pub reference_elevation_m: f64,
}

impl Default for ElevationParams {
    fn default() -> Self {
        Self {
            optimal_min_m: 100.0,
            optimal_max_m: 800.0,
            low_falloff_m: 500.0,
            high_falloff_m: 2000.0,
            floor: 0.1,
            reference_elevation_m: 50.0,
        }
    }
}

pub fn elevation_score(elevation_m: f64, params: &ElevationParams) -> f64 {
    let raw = if elevation_m < params.optimal_min_m {
        1.0 - (params.optimal_min_m - elevation_m) / params.low_falloff_m
    } else if elevation_m > params.optimal_max_m {
        1.0 - (elevation_m - params.optimal_max_m) / params.high_falloff_m
    } else {
        1.0
    };
    raw.max(params.floor).min(1.0)
}

pub struct ElevationEvaluator {
    params: ElevationParams,
    elevation: Arc<dyn ElevationService>,
}

impl ElevationEvaluator {
    pub fn new(params: ElevationParams, elevation: Arc<dyn ElevationService>) -> Self {
        Self { params, elevation }
    }
}

#[async_trait]
impl FactorEvaluator for ElevationEvaluator {
    fn factor(&self) -> Factor {
        Factor::Elevation
    }

    fn default_score(&self) -> f64 {
        elevation_score(self.params.reference_elevation_m, &self.params)
    }

    async fn evaluate(&self, point: GeoPoint) -> CollaboratorResult<Evaluation> {
        let elevation = self.elevation.elevation_m(point).await?;
        if !elevation.is_finite() {
            return Err(CollaboratorError::InvalidData(format!("elevation {}", elevation)));
        }
        Ok(Evaluation::score(elevation_score(elevation, &self.params)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::testing::FixedElevation;

    #[test]
    fn test_band_and_penalties() {
        let params = ElevationParams::default();
        assert_eq!(elevation_score(100.0, &params), 1.0);
        assert_eq!(elevation_score(450.0, &params), 1.0);
        assert_eq!(elevation_score(800.0, &params), 1.0);
        assert!((elevation_score(50.0, &params) - 0.9).abs() < 1e-12);
        assert!((elevation_score(1800.0, &params) - 0.5).abs() < 1e-12);
        assert_eq!(elevation_score(-400.0, &params), 0.1);
        assert_eq!(elevation_score(9000.0, &params), 0.1);
    }

    #[tokio::test]
    async fn test_evaluate() {
        let evaluator = ElevationEvaluator::new(ElevationParams::default(), Arc::new(FixedElevation(1500.0)));
        let eval = evaluator.evaluate(GeoPoint::new(148.3, -36.4)).await.unwrap();
        assert!((eval.score - 0.65).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_nan_elevation_is_invalid() {
        let evaluator = ElevationEvaluator::new(ElevationParams::default(), Arc::new(FixedElevation(f64::NAN)));
        assert!(evaluator.evaluate(GeoPoint::new(148.3, -36.4)).await.is_err());
    }
}
