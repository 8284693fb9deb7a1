//! Land availability
//!
//! Category score from the land classifier, multiplied by one factor per
//! regulatory exclusion flag.

use super::{Evaluation, FactorEvaluator};
use crate::collaborators::{CollaboratorResult, LandClassifier, LandUse};
use crate::{Factor, GeoPoint};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandParams {
    pub category_scores: HashMap<String, f64>,
    pub unknown_category_score: f64,
    pub exclusion_multipliers: HashMap<String, f64>,
    pub unknown_exclusion_multiplier: f64,
    pub default_score: f64,
}

impl Default for LandParams {
    fn default() -> Self {
        let categories = [
            ("rural", 0.95),
            ("agricultural", 0.85),
            ("industrial", 0.8),
            ("commercial", 0.6),
            ("forest", 0.5),
            ("residential", 0.45),
            ("urban", 0.35),
            ("transport", 0.2),
            ("defence", 0.1),
            ("protected", 0.1),
            ("water", 0.0),
        ];
        let exclusions = [
            ("airport", 0.1),
            ("military", 0.1),
            ("national_park", 0.2),
            ("heritage", 0.5),
            ("flood_zone", 0.6),
        ];
        Self {
            category_scores: categories.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            unknown_category_score: 0.6,
            exclusion_multipliers: exclusions.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            unknown_exclusion_multiplier: 0.5,
            default_score: 0.8,
        }
    }
}

pub fn land_score(land_use: &LandUse, params: &LandParams) -> f64 {
    let category = land_use.category.trim().to_lowercase();
    let base = params
        .category_scores
        .get(&category)
        .copied()
        .unwrap_or(params.unknown_category_score);

    let multiplier: f64 = land_use
        .exclusion_flags
        .iter()
        .map(|flag| {
            params
                .exclusion_multipliers
                .get(&flag.trim().to_lowercase())
                .copied()
                .unwrap_or(params.unknown_exclusion_multiplier)
        })
        .product();

    crate::clamp_unit(base * multiplier)
}

pub struct LandEvaluator {
    params: LandParams,
    classifier: Arc<dyn LandClassifier>,
}

impl LandEvaluator {
    pub fn new(params: LandParams, classifier: Arc<dyn LandClassifier>) -> Self {
        Self { params, classifier }
    }
}

#[async_trait]
impl FactorEvaluator for LandEvaluator {
    fn factor(&self) -> Factor {
        Factor::Land
    }

    fn default_score(&self) -> f64 {
        self.params.default_score
    }

    async fn evaluate(&self, point: GeoPoint) -> CollaboratorResult<Evaluation> {
        let land_use = self.classifier.classify(point).await?;
        Ok(Evaluation::score(land_score(&land_use, &self.params)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::testing::FixedLandUse;

    fn land(category: &str, flags: &[&str]) -> LandUse {
        LandUse {
            category: category.to_string(),
            exclusion_flags: flags.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn test_categories() {
        let params = LandParams::default();
        assert_eq!(land_score(&land("rural", &[]), &params), 0.95);
        assert_eq!(land_score(&land("Urban", &[]), &params), 0.35);
        assert_eq!(land_score(&land("water", &[]), &params), 0.0);
        assert_eq!(land_score(&land("quarry", &[]), &params), 0.6);
    }

    #[test]
    fn test_exclusions_multiply() {
        let params = LandParams::default();
        let park = land_score(&land("protected", &["national_park"]), &params);
        assert!((park - 0.02).abs() < 1e-12);

        let flood = land_score(&land("agricultural", &["flood_zone", "heritage"]), &params);
        assert!((flood - 0.85 * 0.6 * 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_airport_scores_low() {
        let evaluator = LandEvaluator::new(LandParams::default(), Arc::new(FixedLandUse("transport", &["airport"])));
        let eval = evaluator.evaluate(GeoPoint::new(151.17, -33.94)).await.unwrap();
        assert!(eval.score < 0.05);
    }
}
