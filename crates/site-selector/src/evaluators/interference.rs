//! RF interference (inverted)
//!
//! ```text
//! load  = Σ power_w / max(d_km, min_distance_km)     (emitters within radius)
//! score = half_load / (half_load + load) − count_penalty · n
//! ```

use super::{Evaluation, FactorEvaluator};
use crate::collaborators::{CollaboratorResult, FeatureKind, SpatialIndex};
use crate::{Factor, GeoPoint};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterferenceParams {
    pub radius_km: f64,
    /// Power assumed for emitters without a recorded value
    pub default_power_w: f64,
    pub min_distance_km: f64,
    /// Load (W/km) at which the base score halves
    pub half_load: f64,
    pub count_penalty: f64,
    pub floor: f64,
    pub default_score: f64,
}

impl Default for InterferenceParams {
    fn default() -> Self {
        Self {
            radius_km: 10.0,
            default_power_w: 20.0,
            min_distance_km: 0.5,
            half_load: 200.0,
            count_penalty: 0.01,
            floor: 0.15,
            default_score: 0.7,
        }
    }
}

/// Score from (distance_km, power_w) pairs of nearby emitters
pub fn interference_score(emitters: &[(f64, f64)], params: &InterferenceParams) -> f64 {
    if emitters.is_empty() {
        return 1.0;
    }
    let load: f64 = emitters
        .iter()
        .map(|(distance, power)| power.max(0.0) / distance.max(params.min_distance_km))
        .sum();
    let base = params.half_load / (params.half_load + load);
    let penalised = base - params.count_penalty * emitters.len() as f64;
    penalised.max(params.floor).min(1.0)
}

pub struct InterferenceEvaluator {
    params: InterferenceParams,
    spatial: Arc<dyn SpatialIndex>,
}

impl InterferenceEvaluator {
    pub fn new(params: InterferenceParams, spatial: Arc<dyn SpatialIndex>) -> Self {
        Self { params, spatial }
    }
}

#[async_trait]
impl FactorEvaluator for InterferenceEvaluator {
    fn factor(&self) -> Factor {
        Factor::Interference
    }

    fn default_score(&self) -> f64 {
        self.params.default_score
    }

    async fn evaluate(&self, point: GeoPoint) -> CollaboratorResult<Evaluation> {
        let hits = self
            .spatial
            .within(point, FeatureKind::Emitter, self.params.radius_km)
            .await?;

        let emitters: Vec<(f64, f64)> = hits
            .iter()
            .map(|h| (h.distance_km, h.feature.power_w.unwrap_or(self.params.default_power_w)))
            .collect();

        let score = interference_score(&emitters, &self.params);
        debug!("{} emitters within {} km, score {:.3}", emitters.len(), self.params.radius_km, score);
        Ok(Evaluation::score(score))
    }
}
