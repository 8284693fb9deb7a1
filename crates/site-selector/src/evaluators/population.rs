//! Population proximity
//!
//! Density maps onto a monotone step table: the highest step whose threshold
//! the density reaches wins, anything below the lowest step gets the floor.

use super::{Evaluation, FactorEvaluator};
use crate::collaborators::{CollaboratorError, CollaboratorResult, PopulationDemand};
use crate::{Factor, GeoPoint};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityStep {
    pub min_density_per_km2: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationParams {
    pub steps: Vec<DensityStep>,
    pub floor: f64,
    pub default_score: f64,
}

impl Default for PopulationParams {
    fn default() -> Self {
        let table = [
            (1000.0, 0.95),
            (500.0, 0.85),
            (250.0, 0.75),
            (100.0, 0.65),
            (25.0, 0.55),
            (5.0, 0.45),
            (1.0, 0.35),
        ];
        Self {
            steps: table
                .iter()
                .map(|&(min_density_per_km2, score)| DensityStep {
                    min_density_per_km2,
                    score,
                })
                .collect(),
            floor: 0.3,
            default_score: 0.5,
        }
    }
}

pub fn population_score(density_per_km2: f64, params: &PopulationParams) -> f64 {
    params
        .steps
        .iter()
        .filter(|s| density_per_km2 >= s.min_density_per_km2)
        .map(|s| s.score)
        .fold(params.floor, f64::max)
}

pub struct PopulationEvaluator {
    params: PopulationParams,
    population: Arc<dyn PopulationDemand>,
}

impl PopulationEvaluator {
    pub fn new(params: PopulationParams, population: Arc<dyn PopulationDemand>) -> Self {
        Self { params, population }
    }
}

#[async_trait]
impl FactorEvaluator for PopulationEvaluator {
    fn factor(&self) -> Factor {
        Factor::Population
    }

    fn default_score(&self) -> f64 {
        self.params.default_score
    }

    async fn evaluate(&self, point: GeoPoint) -> CollaboratorResult<Evaluation> {
        let density = self.population.density_per_km2(point).await?;
        if !density.is_finite() || density < 0.0 {
            return Err(CollaboratorError::InvalidData(format!(
                "population density {}",
                density
            )));
        }
        Ok(Evaluation::score(population_score(density, &self.params)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::testing::{FixedDensity, Offline};

    #[test]
    fn test_step_table() {
        let params = PopulationParams::default();
        assert_eq!(population_score(0.0, &params), 0.3);
        assert_eq!(population_score(1.0, &params), 0.35);
        assert_eq!(population_score(30.0, &params), 0.55);
        assert_eq!(population_score(999.0, &params), 0.85);
        assert_eq!(population_score(5000.0, &params), 0.95);
    }

    #[test]
    fn test_monotone() {
        let params = PopulationParams::default();
        let mut last = 0.0;
        for density in [0.0, 0.5, 2.0, 10.0, 50.0, 150.0, 300.0, 700.0, 2000.0] {
            let score = population_score(density, &params);
            assert!(score >= last);
            last = score;
        }
    }

    #[tokio::test]
    async fn test_negative_density_is_invalid() {
        let evaluator = PopulationEvaluator::new(PopulationParams::default(), Arc::new(FixedDensity(-3.0)));
        let err = evaluator.evaluate(GeoPoint::new(151.0, -33.8)).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_offline_errors() {
        let evaluator = PopulationEvaluator::new(PopulationParams::default(), Arc::new(Offline));
        assert!(evaluator.evaluate(GeoPoint::new(151.0, -33.8)).await.is_err());
    }
}
