//! Orbital-pass quality
//!
//! ```text
//! coverage = Σ_shell sats · (0.5·min(1, passes/P) + 0.25·min(1, dur/D) + 0.25·el_max/90) / Σ sats
//! link     = margin score at the mid elevation of each visible shell, satellite-weighted
//! terrain  = horizon obstruction from 8 compass samples around the site
//! score    = 0.5·coverage + 0.3·link + 0.2·terrain
//! ```
//!
//! Terrain sampling is the only collaborator call. When it fails the terrain
//! term falls back to a default and the metrics are flagged as degraded.

use super::{Evaluation, FactorEvaluator};
use crate::collaborators::{CollaboratorResult, ElevationService};
use crate::{destination_point, Factor, GeoPoint};
use async_trait::async_trait;
use futures::future::join_all;
use orbital_mechanics::link_budget::{link_margin_db, margin_score};
use orbital_mechanics::passes::shell_pass_metrics;
use orbital_mechanics::{ConstellationModel, ShellPassMetrics};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitalParams {
    /// Daily passes per shell that earn full pass-count credit
    pub target_daily_passes: f64,
    /// Mean pass duration (minutes) that earns full duration credit
    pub target_pass_duration_min: f64,
    pub coverage_weight: f64,
    pub link_weight: f64,
    pub terrain_weight: f64,
    pub terrain_sample_distance_km: f64,
    /// Horizon angle at which terrain starts to block low passes
    pub obstruction_threshold_deg: f64,
    pub default_terrain_score: f64,
    pub default_score: f64,
}

impl Default for OrbitalParams {
    fn default() -> Self {
        Self {
            target_daily_passes: 400.0,
            target_pass_duration_min: 6.0,
            coverage_weight: 0.5,
            link_weight: 0.3,
            terrain_weight: 0.2,
            terrain_sample_distance_km: 5.0,
            obstruction_threshold_deg: 5.0,
            default_terrain_score: 0.8,
            default_score: 0.5,
        }
    }
}

/// Pass, link and terrain detail behind an orbital-pass score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitalMetrics {
    pub constellation: String,
    pub shells: Vec<ShellPassMetrics>,
    pub daily_passes: f64,
    pub avg_pass_duration_min: f64,
    pub max_elevation_deg: f64,
    pub coverage_score: f64,
    pub link_margin_db: Option<f64>,
    pub link_score: f64,
    pub horizon_angle_deg: Option<f64>,
    pub terrain_score: f64,
    /// Some inputs were substituted with defaults
    pub degraded: bool,
}

impl OrbitalMetrics {
    /// Payload attached to a defaulted orbital-pass factor
    pub fn degraded_default(constellation: &str, params: &OrbitalParams) -> Self {
        Self {
            constellation: constellation.to_string(),
            shells: Vec::new(),
            daily_passes: 0.0,
            avg_pass_duration_min: 0.0,
            max_elevation_deg: 0.0,
            coverage_score: params.default_score,
            link_margin_db: None,
            link_score: params.default_score,
            horizon_angle_deg: None,
            terrain_score: params.default_terrain_score,
            degraded: true,
        }
    }
}

/// Coverage efficiency of a single shell
pub fn shell_coverage_score(metrics: &ShellPassMetrics, params: &OrbitalParams) -> f64 {
    let passes = (metrics.daily_passes / params.target_daily_passes).min(1.0);
    let duration = (metrics.avg_pass_duration_min / params.target_pass_duration_min).min(1.0);
    let elevation = (metrics.max_elevation_deg / 90.0).clamp(0.0, 1.0);
    0.5 * passes + 0.25 * duration + 0.25 * elevation
}

/// Terrain score from the highest horizon angle around the site
pub fn terrain_score(horizon_deg: f64, min_elevation_deg: f64, params: &OrbitalParams) -> f64 {
    let threshold = params.obstruction_threshold_deg;
    if horizon_deg <= 0.0 {
        1.0
    } else if horizon_deg <= threshold {
        1.0 - 0.5 * horizon_deg / threshold
    } else if min_elevation_deg > threshold {
        (0.5 * (min_elevation_deg - horizon_deg) / (min_elevation_deg - threshold)).max(0.0)
    } else {
        0.0
    }
}

pub struct OrbitalPassEvaluator {
    params: OrbitalParams,
    constellation: ConstellationModel,
    elevation: Arc<dyn ElevationService>,
}

impl OrbitalPassEvaluator {
    pub fn new(params: OrbitalParams, constellation: ConstellationModel, elevation: Arc<dyn ElevationService>) -> Self {
        Self {
            params,
            constellation,
            elevation,
        }
    }

    /// Geometry-only metrics; terrain left at its default
    pub fn geometry(&self, latitude: f64) -> OrbitalMetrics {
        let min_el = self.constellation.min_elevation_deg;
        let shells: Vec<ShellPassMetrics> = self
            .constellation
            .shells
            .iter()
            .map(|s| shell_pass_metrics(s, latitude, min_el))
            .collect();

        let mut sats_total = 0.0;
        let mut coverage_sum = 0.0;
        let mut visible_sats = 0.0;
        let mut link_sum = 0.0;
        let mut duration_sum = 0.0;
        let mut best_margin: Option<f64> = None;

        for (shell, metrics) in self.constellation.shells.iter().zip(&shells) {
            let sats = shell.satellites as f64;
            sats_total += sats;
            coverage_sum += sats * shell_coverage_score(metrics, &self.params);

            if metrics.visible {
                let mid_elevation = (min_el + metrics.max_elevation_deg) / 2.0;
                let margin = link_margin_db(mid_elevation, shell.altitude_km, latitude, &self.constellation.link);
                link_sum += sats * margin_score(margin, &self.constellation.link);
                duration_sum += metrics.daily_passes * metrics.avg_pass_duration_min;
                visible_sats += sats;
                best_margin = Some(best_margin.map_or(margin, |m: f64| m.max(margin)));
            }
        }

        let daily_passes: f64 = shells.iter().map(|m| m.daily_passes).sum();
        let max_elevation_deg = shells
            .iter()
            .filter(|m| m.visible)
            .map(|m| m.max_elevation_deg)
            .fold(0.0, f64::max);

        OrbitalMetrics {
            constellation: self.constellation.name.clone(),
            daily_passes,
            avg_pass_duration_min: if daily_passes > 0.0 { duration_sum / daily_passes } else { 0.0 },
            max_elevation_deg,
            coverage_score: if sats_total > 0.0 { coverage_sum / sats_total } else { 0.0 },
            link_margin_db: best_margin,
            link_score: if visible_sats > 0.0 { link_sum / visible_sats } else { 0.0 },
            horizon_angle_deg: None,
            terrain_score: self.params.default_terrain_score,
            degraded: false,
            shells,
        }
    }

    /// Highest horizon angle seen from the site; None when no sample resolved
    async fn horizon_angle_deg(&self, point: GeoPoint) -> Option<f64> {
        let site = match self.elevation.elevation_m(point).await {
            Ok(e) if e.is_finite() => e,
            Ok(_) => return None,
            Err(e) => {
                warn!("Terrain sampling skipped: {}", e);
                return None;
            }
        };

        let distance_km = self.params.terrain_sample_distance_km;
        let samples = (0..8).map(|i| {
            let sample = destination_point(point, i as f64 * 45.0, distance_km);
            async move { self.elevation.elevation_m(sample).await }
        });

        join_all(samples)
            .await
            .into_iter()
            .filter_map(|r| r.ok())
            .filter(|e| e.is_finite())
            .map(|e| ((e - site) / (distance_km * 1000.0)).atan().to_degrees())
            .reduce(f64::max)
    }

    fn combine(&self, metrics: &OrbitalMetrics) -> f64 {
        let p = &self.params;
        let total = p.coverage_weight + p.link_weight + p.terrain_weight;
        if total <= 0.0 {
            return p.default_score;
        }
        (p.coverage_weight * metrics.coverage_score
            + p.link_weight * metrics.link_score
            + p.terrain_weight * metrics.terrain_score)
            / total
    }
}

#[async_trait]
impl FactorEvaluator for OrbitalPassEvaluator {
    fn factor(&self) -> Factor {
        Factor::OrbitalPass
    }

    fn default_score(&self) -> f64 {
        self.params.default_score
    }

    fn default_evaluation(&self) -> Evaluation {
        Evaluation {
            score: self.params.default_score,
            orbital: Some(OrbitalMetrics::degraded_default(&self.constellation.name, &self.params)),
        }
    }

    async fn evaluate(&self, point: GeoPoint) -> CollaboratorResult<Evaluation> {
        let mut metrics = self.geometry(point.latitude);

        match self.horizon_angle_deg(point).await {
            Some(horizon) => {
                metrics.horizon_angle_deg = Some(horizon);
                metrics.terrain_score = terrain_score(horizon, self.constellation.min_elevation_deg, &self.params);
            }
            None => metrics.degraded = true,
        }

        let score = crate::clamp_unit(self.combine(&metrics));
        Ok(Evaluation {
            score,
            orbital: Some(metrics),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::testing::{FixedElevation, Offline};
    use crate::collaborators::{CollaboratorError, CollaboratorResult};

    fn evaluator(elevation: Arc<dyn ElevationService>) -> OrbitalPassEvaluator {
        OrbitalPassEvaluator::new(OrbitalParams::default(), ConstellationModel::default(), elevation)
    }

    /// Flat plain with a ridge to the north
    struct Ridge;

    #[async_trait]
    impl ElevationService for Ridge {
        async fn elevation_m(&self, point: GeoPoint) -> CollaboratorResult<f64> {
            if point.latitude > -33.85 {
                Ok(600.0)
            } else {
                Ok(100.0)
            }
        }
    }

    /// Only the site itself resolves
    struct SiteOnly;

    #[async_trait]
    impl ElevationService for SiteOnly {
        async fn elevation_m(&self, point: GeoPoint) -> CollaboratorResult<f64> {
            if (point.latitude + 33.87).abs() < 1e-9 {
                Ok(100.0)
            } else {
                Err(CollaboratorError::NoData {
                    longitude: point.longitude,
                    latitude: point.latitude,
                })
            }
        }
    }

    #[test]
    fn test_terrain_score_curve() {
        let params = OrbitalParams::default();
        assert_eq!(terrain_score(-1.0, 25.0, &params), 1.0);
        assert!((terrain_score(5.0, 25.0, &params) - 0.5).abs() < 1e-12);
        assert!((terrain_score(15.0, 25.0, &params) - 0.25).abs() < 1e-12);
        assert_eq!(terrain_score(30.0, 25.0, &params), 0.0);
    }

    #[tokio::test]
    async fn test_mid_latitude_site() {
        let eval = evaluator(Arc::new(FixedElevation(100.0)))
            .evaluate(GeoPoint::new(151.21, -33.87))
            .await
            .unwrap();

        let metrics = eval.orbital.unwrap();
        assert!(!metrics.degraded);
        assert_eq!(metrics.shells.len(), 4);
        assert_eq!(metrics.horizon_angle_deg, Some(0.0));
        assert_eq!(metrics.terrain_score, 1.0);
        assert!(metrics.daily_passes > 100.0);
        assert!(metrics.link_score > 0.0);
        assert!(eval.score > 0.5 && eval.score <= 1.0);
    }

    #[tokio::test]
    async fn test_ridge_obstructs_horizon() {
        let flat = evaluator(Arc::new(FixedElevation(100.0)))
            .evaluate(GeoPoint::new(151.21, -33.87))
            .await
            .unwrap();
        let ridge = evaluator(Arc::new(Ridge))
            .evaluate(GeoPoint::new(151.21, -33.87))
            .await
            .unwrap();

        let metrics = ridge.orbital.unwrap();
        assert!(metrics.horizon_angle_deg.unwrap() > 5.0);
        assert!(metrics.terrain_score < 0.5);
        assert!(ridge.score < flat.score);
    }

    #[tokio::test]
    async fn test_terrain_failure_is_degraded_not_error() {
        let eval = evaluator(Arc::new(Offline))
            .evaluate(GeoPoint::new(151.21, -33.87))
            .await
            .unwrap();
        let metrics = eval.orbital.unwrap();
        assert!(metrics.degraded);
        assert_eq!(metrics.terrain_score, 0.8);
        assert!((0.0..=1.0).contains(&eval.score));

        let partial = evaluator(Arc::new(SiteOnly))
            .evaluate(GeoPoint::new(151.21, -33.87))
            .await
            .unwrap();
        assert!(partial.orbital.unwrap().degraded);
    }

    #[test]
    fn test_default_evaluation_carries_metrics() {
        let eval = evaluator(Arc::new(Offline)).default_evaluation();
        assert_eq!(eval.score, 0.5);
        let metrics = eval.orbital.unwrap();
        assert!(metrics.degraded);
        assert_eq!(metrics.constellation, "leo-broadband");
    }

    #[test]
    fn test_coverage_weaker_near_pole() {
        let e = evaluator(Arc::new(Offline));
        let mid = e.geometry(-33.87);
        let south = e.geometry(-85.0);
        assert!(south.coverage_score < mid.coverage_score);
    }
}
