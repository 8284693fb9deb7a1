//! Backhaul proximity
//!
//! Normalised exponential decay on the distance to the nearest backhaul
//! feature: 1.0 on top of it, 0.0 at `max_distance_km` and beyond.

use super::{Evaluation, FactorEvaluator};
use crate::collaborators::{CollaboratorResult, FeatureKind, SpatialIndex};
use crate::{Factor, GeoPoint};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackhaulParams {
    pub max_distance_km: f64,
    /// Decay rate over the normalised distance d / max
    pub decay: f64,
    pub default_score: f64,
}

impl Default for BackhaulParams {
    fn default() -> Self {
        Self {
            max_distance_km: 50.0,
            decay: 3.0,
            default_score: 0.5,
        }
    }
}

/// (e^(−k·d/max) − e^(−k)) / (1 − e^(−k))
pub fn backhaul_score(distance_km: f64, params: &BackhaulParams) -> f64 {
    if !distance_km.is_finite() || distance_km >= params.max_distance_km {
        return 0.0;
    }
    let d = distance_km.max(0.0) / params.max_distance_km;
    if params.decay <= 0.0 {
        return 1.0 - d;
    }
    let floor = (-params.decay).exp();
    ((-params.decay * d).exp() - floor) / (1.0 - floor)
}

pub struct BackhaulEvaluator {
    params: BackhaulParams,
    spatial: Arc<dyn SpatialIndex>,
}

impl BackhaulEvaluator {
    pub fn new(params: BackhaulParams, spatial: Arc<dyn SpatialIndex>) -> Self {
        Self { params, spatial }
    }
}

#[async_trait]
impl FactorEvaluator for BackhaulEvaluator {
    fn factor(&self) -> Factor {
        Factor::Backhaul
    }

    fn default_score(&self) -> f64 {
        self.params.default_score
    }

    async fn evaluate(&self, point: GeoPoint) -> CollaboratorResult<Evaluation> {
        let nearest = self.spatial.nearest(point, FeatureKind::Backhaul, 1).await?;

        let score = match nearest.first() {
            Some(hit) => {
                debug!("Nearest backhaul {} at {:.1} km", hit.feature.id, hit.distance_km);
                backhaul_score(hit.distance_km, &self.params)
            }
            None => 0.0,
        };
        Ok(Evaluation::score(score))
    }
}
