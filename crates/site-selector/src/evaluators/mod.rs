//! Factor evaluators
//!
//! One evaluator per scoring factor. Each maps a point to a score in [0, 1]
//! using the collaborators, is stateless, and carries the default score the
//! site scorer substitutes when it fails or runs out of time.

use crate::collaborators::{CollaboratorResult, Collaborators};
use crate::{Factor, GeoPoint, Result, SelectorError};
use async_trait::async_trait;
use orbital_mechanics::ConstellationModel;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod backhaul;
pub mod elevation;
pub mod interference;
pub mod land;
pub mod market;
pub mod orbital;
pub mod population;

pub use backhaul::{BackhaulEvaluator, BackhaulParams};
pub use elevation::{ElevationEvaluator, ElevationParams};
pub use interference::{InterferenceEvaluator, InterferenceParams};
pub use land::{LandEvaluator, LandParams};
pub use market::{MarketDemandEvaluator, MarketParams};
pub use orbital::{OrbitalMetrics, OrbitalPassEvaluator, OrbitalParams};
pub use population::{PopulationEvaluator, PopulationParams};

/// Result of one factor evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub score: f64,
    /// Pass and link detail, orbital evaluator only
    pub orbital: Option<OrbitalMetrics>,
}

impl Evaluation {
    pub fn score(score: f64) -> Self {
        Self {
            score: crate::clamp_unit(score),
            orbital: None,
        }
    }
}

#[async_trait]
pub trait FactorEvaluator: Send + Sync {
    fn factor(&self) -> Factor;

    /// Score used when evaluation fails or times out
    fn default_score(&self) -> f64;

    fn default_evaluation(&self) -> Evaluation {
        Evaluation::score(self.default_score())
    }

    async fn evaluate(&self, point: GeoPoint) -> CollaboratorResult<Evaluation>;
}

/// Tunables for every evaluator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub backhaul: BackhaulParams,
    pub population: PopulationParams,
    pub elevation: ElevationParams,
    pub interference: InterferenceParams,
    pub land: LandParams,
    pub orbital: OrbitalParams,
    pub market: MarketParams,
}

impl EvaluatorConfig {
    pub fn validate(&self) -> Result<()> {
        let defaults = [
            (Factor::Backhaul, self.backhaul.default_score),
            (Factor::Population, self.population.default_score),
            (Factor::Interference, self.interference.default_score),
            (Factor::Land, self.land.default_score),
            (Factor::OrbitalPass, self.orbital.default_score),
            (Factor::MarketDemand, self.market.default_score),
        ];
        for (factor, score) in defaults {
            unit_interval(&format!("evaluators.{}.default_score", factor), score)?;
        }

        positive("evaluators.backhaul.max_distance_km", self.backhaul.max_distance_km)?;
        non_negative("evaluators.backhaul.decay", self.backhaul.decay)?;

        unit_interval("evaluators.population.floor", self.population.floor)?;
        for step in &self.population.steps {
            non_negative("evaluators.population.steps.min_density_per_km2", step.min_density_per_km2)?;
            unit_interval("evaluators.population.steps.score", step.score)?;
        }

        let elevation = &self.elevation;
        if !elevation.optimal_min_m.is_finite() || !elevation.optimal_max_m.is_finite() {
            return Err(SelectorError::Config(
                "evaluators.elevation optimal band must be finite".to_string(),
            ));
        }
        if elevation.optimal_min_m > elevation.optimal_max_m {
            return Err(SelectorError::Config(
                "evaluators.elevation optimal band is inverted".to_string(),
            ));
        }
        positive("evaluators.elevation.low_falloff_m", elevation.low_falloff_m)?;
        positive("evaluators.elevation.high_falloff_m", elevation.high_falloff_m)?;
        unit_interval("evaluators.elevation.floor", elevation.floor)?;
        if !elevation.reference_elevation_m.is_finite() {
            return Err(SelectorError::Config(
                "evaluators.elevation.reference_elevation_m must be finite".to_string(),
            ));
        }

        let interference = &self.interference;
        positive("evaluators.interference.radius_km", interference.radius_km)?;
        non_negative("evaluators.interference.default_power_w", interference.default_power_w)?;
        positive("evaluators.interference.min_distance_km", interference.min_distance_km)?;
        positive("evaluators.interference.half_load", interference.half_load)?;
        non_negative("evaluators.interference.count_penalty", interference.count_penalty)?;
        unit_interval("evaluators.interference.floor", interference.floor)?;

        let land = &self.land;
        for score in land.category_scores.values() {
            unit_interval("evaluators.land.category_scores", *score)?;
        }
        for multiplier in land.exclusion_multipliers.values() {
            unit_interval("evaluators.land.exclusion_multipliers", *multiplier)?;
        }
        unit_interval("evaluators.land.unknown_category_score", land.unknown_category_score)?;
        unit_interval("evaluators.land.unknown_exclusion_multiplier", land.unknown_exclusion_multiplier)?;

        let orbital = &self.orbital;
        positive("evaluators.orbital.target_daily_passes", orbital.target_daily_passes)?;
        positive("evaluators.orbital.target_pass_duration_min", orbital.target_pass_duration_min)?;
        non_negative("evaluators.orbital.coverage_weight", orbital.coverage_weight)?;
        non_negative("evaluators.orbital.link_weight", orbital.link_weight)?;
        non_negative("evaluators.orbital.terrain_weight", orbital.terrain_weight)?;
        positive("evaluators.orbital.terrain_sample_distance_km", orbital.terrain_sample_distance_km)?;
        positive("evaluators.orbital.obstruction_threshold_deg", orbital.obstruction_threshold_deg)?;
        unit_interval("evaluators.orbital.default_terrain_score", orbital.default_terrain_score)?;

        let market = &self.market;
        if market.rings_km.is_empty() || market.samples_per_ring == 0 {
            return Err(SelectorError::Config(
                "evaluators.market needs at least one ring and one sample".to_string(),
            ));
        }
        for ring in &market.rings_km {
            positive("evaluators.market.rings_km", *ring)?;
        }
        positive("evaluators.market.decay_km", market.decay_km)?;
        non_negative("evaluators.market.penetration", market.penetration)?;
        positive("evaluators.market.revenue_scale", market.revenue_scale)?;
        positive("evaluators.market.competition_radius_km", market.competition_radius_km)?;
        positive("evaluators.market.competition_half_count", market.competition_half_count)?;
        unit_interval("evaluators.market.min_competition_factor", market.min_competition_factor)?;
        Ok(())
    }
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SelectorError::Config(format!("{} must be within [0, 1], got {}", name, value)))
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SelectorError::Config(format!("{} must be positive, got {}", name, value)))
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SelectorError::Config(format!("{} must not be negative, got {}", name, value)))
    }
}

/// The seven evaluators wired to one set of collaborators
#[derive(Clone)]
pub struct EvaluatorSet {
    evaluators: Vec<Arc<dyn FactorEvaluator>>,
}

impl EvaluatorSet {
    pub fn new(config: &EvaluatorConfig, constellation: &ConstellationModel, collaborators: &Collaborators) -> Self {
        let evaluators: Vec<Arc<dyn FactorEvaluator>> = vec![
            Arc::new(BackhaulEvaluator::new(
                config.backhaul.clone(),
                Arc::clone(&collaborators.spatial),
            )),
            Arc::new(PopulationEvaluator::new(
                config.population.clone(),
                Arc::clone(&collaborators.population),
            )),
            Arc::new(ElevationEvaluator::new(
                config.elevation.clone(),
                Arc::clone(&collaborators.elevation),
            )),
            Arc::new(InterferenceEvaluator::new(
                config.interference.clone(),
                Arc::clone(&collaborators.spatial),
            )),
            Arc::new(LandEvaluator::new(
                config.land.clone(),
                Arc::clone(&collaborators.land_use),
            )),
            Arc::new(OrbitalPassEvaluator::new(
                config.orbital.clone(),
                constellation.clone(),
                Arc::clone(&collaborators.elevation),
            )),
            Arc::new(MarketDemandEvaluator::new(
                config.market.clone(),
                Arc::clone(&collaborators.population),
                Arc::clone(&collaborators.spatial),
            )),
        ];
        Self { evaluators }
    }

    /// Replace or add the evaluator for its factor
    pub fn with_evaluator(mut self, evaluator: Arc<dyn FactorEvaluator>) -> Self {
        self.evaluators.retain(|e| e.factor() != evaluator.factor());
        self.evaluators.push(evaluator);
        self
    }

    pub fn get(&self, factor: Factor) -> Option<&Arc<dyn FactorEvaluator>> {
        self.evaluators.iter().find(|e| e.factor() == factor)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn FactorEvaluator>> {
        self.evaluators.iter()
    }
}
