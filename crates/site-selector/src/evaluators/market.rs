//! Market demand
//!
//! Population is sampled on rings around the site and averaged with distance
//! decay. The resulting addressable subscriber estimate saturates into a
//! revenue score, which is then discounted by nearby competing ground stations.

use super::{Evaluation, FactorEvaluator};
use crate::collaborators::{CollaboratorError, CollaboratorResult, FeatureKind, PopulationDemand, SpatialIndex};
use crate::{destination_point, Factor, GeoPoint};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketParams {
    pub rings_km: Vec<f64>,
    pub samples_per_ring: usize,
    pub decay_km: f64,
    /// Share of the population within the outer ring that subscribes
    pub penetration: f64,
    /// Subscribers at which revenue reaches 1 − 1/e
    pub revenue_scale: f64,
    pub competition_radius_km: f64,
    /// Competitor count that halves the market
    pub competition_half_count: f64,
    pub min_competition_factor: f64,
    pub default_score: f64,
}

impl Default for MarketParams {
    fn default() -> Self {
        Self {
            rings_km: vec![10.0, 25.0, 50.0],
            samples_per_ring: 4,
            decay_km: 25.0,
            penetration: 0.002,
            revenue_scale: 1000.0,
            competition_radius_km: 50.0,
            competition_half_count: 5.0,
            min_competition_factor: 0.4,
            default_score: 0.3,
        }
    }
}

/// Saturating revenue score for an addressable subscriber count
pub fn revenue_score(subscribers: f64, params: &MarketParams) -> f64 {
    if subscribers <= 0.0 || params.revenue_scale <= 0.0 {
        return 0.0;
    }
    1.0 - (-subscribers / params.revenue_scale).exp()
}

/// Market share left after `competitors` nearby stations
pub fn competition_factor(competitors: usize, params: &MarketParams) -> f64 {
    let n = competitors as f64;
    let factor = params.competition_half_count / (params.competition_half_count + n);
    factor.max(params.min_competition_factor).min(1.0)
}

pub struct MarketDemandEvaluator {
    params: MarketParams,
    population: Arc<dyn PopulationDemand>,
    spatial: Arc<dyn SpatialIndex>,
}

impl MarketDemandEvaluator {
    pub fn new(params: MarketParams, population: Arc<dyn PopulationDemand>, spatial: Arc<dyn SpatialIndex>) -> Self {
        Self {
            params,
            population,
            spatial,
        }
    }

    fn sample_points(&self, point: GeoPoint) -> Vec<(f64, GeoPoint)> {
        let per_ring = self.params.samples_per_ring.max(1);
        let step = 360.0 / per_ring as f64;

        self.params
            .rings_km
            .iter()
            .enumerate()
            .flat_map(|(ring, &radius)| {
                // Stagger rings so samples do not line up along the same bearings
                let offset = ring as f64 * step / 2.0;
                (0..per_ring).map(move |i| (radius, destination_point(point, offset + i as f64 * step, radius)))
            })
            .collect()
    }

    /// Decay-weighted mean density over the ring samples
    async fn weighted_density(&self, point: GeoPoint) -> CollaboratorResult<f64> {
        let samples = self.sample_points(point);
        let lookups = samples.iter().map(|(radius, sample)| {
            let radius = *radius;
            let sample = *sample;
            async move { (radius, self.population.density_per_km2(sample).await) }
        });

        let mut weighted = 0.0;
        let mut weight_total = 0.0;
        let mut failures = 0;
        let mut last_error = None;

        for (radius, result) in join_all(lookups).await {
            match result {
                Ok(density) if density.is_finite() && density >= 0.0 => {
                    let w = (-radius / self.params.decay_km).exp();
                    weighted += w * density;
                    weight_total += w;
                }
                Ok(density) => {
                    failures += 1;
                    last_error = Some(CollaboratorError::InvalidData(format!("population density {}", density)));
                }
                Err(e) => {
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if weight_total <= 0.0 {
            return Err(last_error.unwrap_or_else(|| {
                CollaboratorError::NoData {
                    longitude: point.longitude,
                    latitude: point.latitude,
                }
            }));
        }
        if failures > 0 {
            debug!("{} of {} demand samples failed", failures, samples.len());
        }
        Ok(weighted / weight_total)
    }
}

#[async_trait]
impl FactorEvaluator for MarketDemandEvaluator {
    fn factor(&self) -> Factor {
        Factor::MarketDemand
    }

    fn default_score(&self) -> f64 {
        self.params.default_score
    }

    async fn evaluate(&self, point: GeoPoint) -> CollaboratorResult<Evaluation> {
        let density = self.weighted_density(point).await?;

        let outer_km = self.params.rings_km.iter().copied().fold(0.0, f64::max);
        let subscribers = density * PI * outer_km * outer_km * self.params.penetration;

        let competitors = match self
            .spatial
            .within(point, FeatureKind::GroundStation, self.params.competition_radius_km)
            .await
        {
            Ok(hits) => hits.len(),
            Err(e) => {
                warn!("Competition lookup failed, assuming none: {}", e);
                0
            }
        };

        let score = revenue_score(subscribers, &self.params) * competition_factor(competitors, &self.params);
        debug!(
            "Market: {:.0} subscribers, {} competitors, score {:.3}",
            subscribers, competitors, score
        );
        Ok(Evaluation::score(score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemorySpatialIndex;
    use crate::evaluators::testing::{feature, FixedDensity, Offline};

    /// Dense to the west of 151.0, empty to the east
    struct Coastline;

    #[async_trait]
    impl PopulationDemand for Coastline {
        async fn density_per_km2(&self, point: GeoPoint) -> CollaboratorResult<f64> {
            if point.longitude < 151.0 {
                Ok(400.0)
            } else {
                Err(CollaboratorError::NoData {
                    longitude: point.longitude,
                    latitude: point.latitude,
                })
            }
        }
    }

    fn evaluator(population: Arc<dyn PopulationDemand>, index: InMemorySpatialIndex) -> MarketDemandEvaluator {
        MarketDemandEvaluator::new(MarketParams::default(), population, Arc::new(index))
    }

    #[test]
    fn test_sample_layout() {
        let e = evaluator(Arc::new(Offline), InMemorySpatialIndex::default());
        let origin = GeoPoint::new(149.0, -34.0);
        let samples = e.sample_points(origin);
        assert_eq!(samples.len(), 12);
        for (radius, sample) in samples {
            assert!((origin.distance_km(&sample) - radius).abs() < 0.01);
        }
    }

    #[test]
    fn test_competition_factor() {
        let params = MarketParams::default();
        assert_eq!(competition_factor(0, &params), 1.0);
        assert!((competition_factor(5, &params) - 0.5).abs() < 1e-12);
        assert_eq!(competition_factor(100, &params), 0.4);
    }

    #[tokio::test]
    async fn test_dense_market_beats_sparse() {
        let city = evaluator(Arc::new(FixedDensity(1500.0)), InMemorySpatialIndex::default())
            .evaluate(GeoPoint::new(151.0, -33.8))
            .await
            .unwrap();
        let outback = evaluator(Arc::new(FixedDensity(0.5)), InMemorySpatialIndex::default())
            .evaluate(GeoPoint::new(133.9, -25.5))
            .await
            .unwrap();
        assert!(city.score > 0.9);
        assert!(outback.score < 0.05);
    }

    #[tokio::test]
    async fn test_competitors_discount() {
        let index = InMemorySpatialIndex::new(
            (0..5)
                .map(|i| feature(&format!("gs{}", i), FeatureKind::GroundStation, 151.0 + i as f64 * 0.01, -33.8, None))
                .collect(),
        );
        let open = evaluator(Arc::new(FixedDensity(1500.0)), InMemorySpatialIndex::default())
            .evaluate(GeoPoint::new(151.0, -33.8))
            .await
            .unwrap();
        let crowded = evaluator(Arc::new(FixedDensity(1500.0)), index)
            .evaluate(GeoPoint::new(151.0, -33.8))
            .await
            .unwrap();
        assert!((crowded.score - open.score * 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_partial_samples_still_score() {
        let eval = evaluator(Arc::new(Coastline), InMemorySpatialIndex::default())
            .evaluate(GeoPoint::new(151.0, -33.8))
            .await
            .unwrap();
        assert!(eval.score > 0.0);
    }

    #[tokio::test]
    async fn test_all_samples_failing_is_error() {
        let result = evaluator(Arc::new(Offline), InMemorySpatialIndex::default())
            .evaluate(GeoPoint::new(151.0, -33.8))
            .await;
        assert!(matches!(result, Err(CollaboratorError::Unavailable(_))));
    }
}
