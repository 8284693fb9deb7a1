//! Site scoring
//!
//! Runs the factor evaluators for one candidate concurrently, each raced
//! against its own timeout, and folds the results into a weighted total:
//!
//! ```text
//! total = round₃( Σ score_f × ŵ_f )        ŵ = weights / Σ weights
//! ```
//!
//! Fast mode evaluates a configurable subset under a tight budget and holds
//! the remaining factors at calibrated constants. Scoring always produces a
//! site: failed or timed-out factors take their evaluator's default, and a
//! site whose whole budget expires becomes a fallback site.

use crate::collaborators::Collaborators;
use crate::config::{ScoringConfig, SelectorConfig};
use crate::evaluators::{Evaluation, EvaluatorSet, FactorEvaluator, OrbitalMetrics};
use crate::regions::RegionTable;
use crate::{clamp_unit, round_to, Candidate, Factor, GeoPoint, ScoreBreakdown, SelectorError, WeightVector};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Live subset of factors under a short budget
    #[default]
    Fast,
    /// All seven factors
    Full,
}

impl fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringMode::Fast => f.write_str("fast"),
            ScoringMode::Full => f.write_str("full"),
        }
    }
}

impl FromStr for ScoringMode {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(ScoringMode::Fast),
            "full" => Ok(ScoringMode::Full),
            other => Err(SelectorError::Config(format!("unknown scoring mode: {}", other))),
        }
    }
}

/// How a factor's score was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorStatus {
    Evaluated,
    TimedOut,
    Failed,
    /// Calibrated fast-mode constant
    Fixed,
}

impl FactorStatus {
    pub fn is_default(&self) -> bool {
        matches!(self, FactorStatus::TimedOut | FactorStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorOutcome {
    pub factor: Factor,
    pub score: f64,
    pub status: FactorStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteStatus {
    Complete,
    /// Some factors fell back to their defaults
    Degraded,
    /// No factor could be evaluated; every score is a default
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSite {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub scores: ScoreBreakdown,
    pub total_score: f64,
    pub reasoning: String,
    pub weights_used: WeightVector,
    pub status: SiteStatus,
    pub mode: ScoringMode,
    pub factors: Vec<FactorOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orbital_metrics: Option<OrbitalMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl ScoredSite {
    pub fn is_fallback(&self) -> bool {
        self.status == SiteStatus::Fallback
    }
}

#[derive(Clone)]
pub struct SiteScorer {
    scoring: ScoringConfig,
    evaluators: EvaluatorSet,
    regions: Arc<RegionTable>,
}

impl SiteScorer {
    pub fn new(config: &SelectorConfig, collaborators: &Collaborators, regions: Arc<RegionTable>) -> Self {
        let evaluators = EvaluatorSet::new(&config.evaluators, &config.constellation, collaborators);
        Self::from_parts(config.scoring.clone(), evaluators, regions)
    }

    pub fn from_parts(scoring: ScoringConfig, evaluators: EvaluatorSet, regions: Arc<RegionTable>) -> Self {
        Self {
            scoring,
            evaluators,
            regions,
        }
    }

    fn is_live(&self, factor: Factor, mode: ScoringMode) -> bool {
        match mode {
            ScoringMode::Full => true,
            ScoringMode::Fast => self.scoring.fast_factors.contains(&factor),
        }
    }

    /// Score one candidate; never fails
    pub async fn score(&self, candidate: &Candidate, weights: &WeightVector, mode: ScoringMode) -> ScoredSite {
        match timeout(self.scoring.site_timeout(), self.score_factors(candidate, weights, mode)).await {
            Ok(site) => site,
            Err(_) => {
                warn!("Scoring {} exceeded {:?}, using fallback", candidate.id, self.scoring.site_timeout());
                self.fallback(candidate, weights, mode, "site scoring timed out")
            }
        }
    }

    async fn score_factors(&self, candidate: &Candidate, weights: &WeightVector, mode: ScoringMode) -> ScoredSite {
        let point = candidate.point();
        let budget = self.scoring.evaluator_timeout(mode);

        let live: Vec<&Arc<dyn FactorEvaluator>> = self
            .evaluators
            .iter()
            .filter(|e| self.is_live(e.factor(), mode))
            .collect();

        let results = join_all(live.iter().map(|e| run_evaluator(e, point, budget))).await;

        let mut scores = self.scoring.fast_constants;
        let mut factors: Vec<FactorOutcome> = Factor::ALL
            .iter()
            .map(|&factor| FactorOutcome {
                factor,
                score: self.scoring.fast_constants.get(factor),
                status: FactorStatus::Fixed,
                detail: None,
            })
            .collect();
        let mut orbital_metrics = None;

        for (outcome, orbital) in results {
            scores.set(outcome.factor, outcome.score);
            if orbital.is_some() {
                orbital_metrics = orbital;
            }
            if let Some(slot) = factors.iter_mut().find(|f| f.factor == outcome.factor) {
                *slot = outcome;
            }
        }

        let evaluated = factors.iter().filter(|f| f.status == FactorStatus::Evaluated).count();
        let defaulted = factors.iter().filter(|f| f.status.is_default()).count();
        let status = if !live.is_empty() && evaluated == 0 {
            SiteStatus::Fallback
        } else if defaulted > 0 {
            SiteStatus::Degraded
        } else {
            SiteStatus::Complete
        };

        let site = self.assemble(candidate, scores, weights, mode, status, factors, orbital_metrics, None);
        debug!("{} scored {:.3} ({:?})", site.candidate.id, site.total_score, site.status);
        site
    }

    /// Default-score site used when scoring cannot complete
    pub fn fallback(&self, candidate: &Candidate, weights: &WeightVector, mode: ScoringMode, reason: &str) -> ScoredSite {
        let mut scores = self.scoring.fast_constants;
        let mut orbital_metrics = None;

        let factors = Factor::ALL
            .iter()
            .map(|&factor| {
                let evaluator = self.evaluators.get(factor).filter(|_| self.is_live(factor, mode));
                match evaluator {
                    Some(e) => {
                        let eval = e.default_evaluation();
                        scores.set(factor, eval.score);
                        if eval.orbital.is_some() {
                            orbital_metrics = eval.orbital;
                        }
                        FactorOutcome {
                            factor,
                            score: eval.score,
                            status: FactorStatus::Failed,
                            detail: Some(reason.to_string()),
                        }
                    }
                    None => FactorOutcome {
                        factor,
                        score: scores.get(factor),
                        status: FactorStatus::Fixed,
                        detail: None,
                    },
                }
            })
            .collect();

        self.assemble(
            candidate,
            scores,
            weights,
            mode,
            SiteStatus::Fallback,
            factors,
            orbital_metrics,
            Some(reason),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        candidate: &Candidate,
        scores: ScoreBreakdown,
        weights: &WeightVector,
        mode: ScoringMode,
        status: SiteStatus,
        factors: Vec<FactorOutcome>,
        orbital_metrics: Option<OrbitalMetrics>,
        fallback_reason: Option<&str>,
    ) -> ScoredSite {
        let weights_used = weights.normalized();
        let total_score = round_to(clamp_unit(scores.weighted_total(&weights_used)), 3);
        let reasoning = match fallback_reason {
            Some(reason) => format!(
                "{} Scoring unavailable ({}); default estimates used.",
                overall_band(total_score),
                reason
            ),
            None => build_reasoning(&scores, total_score, &factors),
        };

        ScoredSite {
            region: self.regions.state_at(candidate.point()).map(str::to_string),
            candidate: candidate.clone(),
            scores,
            total_score,
            reasoning,
            weights_used,
            status,
            mode,
            factors,
            orbital_metrics,
        }
    }
}

/// Race one evaluator against its budget; always resolves
async fn run_evaluator(
    evaluator: &Arc<dyn FactorEvaluator>,
    point: GeoPoint,
    budget: Duration,
) -> (FactorOutcome, Option<OrbitalMetrics>) {
    let factor = evaluator.factor();
    let (evaluation, status, detail) = match timeout(budget, evaluator.evaluate(point)).await {
        Ok(Ok(evaluation)) => (evaluation, FactorStatus::Evaluated, None),
        Ok(Err(e)) => {
            warn!("{} evaluation failed at ({:.4}, {:.4}): {}", factor, point.longitude, point.latitude, e);
            (evaluator.default_evaluation(), FactorStatus::Failed, Some(e.to_string()))
        }
        Err(_) => {
            warn!("{} evaluation timed out after {:?}", factor, budget);
            (
                evaluator.default_evaluation(),
                FactorStatus::TimedOut,
                Some(format!("timed out after {} ms", budget.as_millis())),
            )
        }
    };

    let Evaluation { score, orbital } = evaluation;
    (
        FactorOutcome {
            factor,
            score: clamp_unit(score),
            status,
            detail,
        },
        orbital,
    )
}

fn factor_phrase(factor: Factor, score: f64) -> Option<&'static str> {
    let (high, low) = match factor {
        Factor::Backhaul => (
            "Excellent backhaul access nearby",
            "Limited backhaul infrastructure; new fibre or microwave links may be needed",
        ),
        Factor::Population => ("Close to a major population centre", "Remote from population centres"),
        Factor::Elevation => ("Elevation within the optimal range", "Elevation outside the preferred range"),
        Factor::Interference => ("Low RF interference environment", "Significant RF interference from nearby emitters"),
        Factor::Land => (
            "Land use compatible with development",
            "Land use or regulatory constraints limit development",
        ),
        Factor::OrbitalPass => ("Strong satellite visibility and link quality", "Limited satellite visibility"),
        Factor::MarketDemand => ("Strong local market demand", "Limited local market demand"),
    };
    if score > 0.8 {
        Some(high)
    } else if score < 0.5 {
        Some(low)
    } else {
        None
    }
}

pub fn overall_band(total_score: f64) -> &'static str {
    if total_score >= 0.8 {
        "Excellent overall suitability."
    } else if total_score >= 0.6 {
        "Good overall suitability."
    } else if total_score >= 0.4 {
        "Moderate overall suitability."
    } else {
        "Limited overall suitability."
    }
}

fn build_reasoning(scores: &ScoreBreakdown, total_score: f64, factors: &[FactorOutcome]) -> String {
    let mut parts = vec![overall_band(total_score).to_string()];

    for outcome in factors.iter().filter(|f| f.status != FactorStatus::Fixed) {
        if let Some(phrase) = factor_phrase(outcome.factor, scores.get(outcome.factor)) {
            parts.push(format!("{}.", phrase));
        }
    }

    let defaulted: Vec<&str> = factors
        .iter()
        .filter(|f| f.status.is_default())
        .map(|f| f.factor.name())
        .collect();
    if !defaulted.is_empty() {
        parts.push(format!("Estimated values used for: {}.", defaulted.join(", ")));
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{CollaboratorError, CollaboratorResult, InMemorySpatialIndex};
    use async_trait::async_trait;
    use proptest::prelude::*;

    struct Scripted {
        factor: Factor,
        score: f64,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl FactorEvaluator for Scripted {
        fn factor(&self) -> Factor {
            self.factor
        }

        fn default_score(&self) -> f64 {
            0.42
        }

        async fn evaluate(&self, _point: GeoPoint) -> CollaboratorResult<Evaluation> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(CollaboratorError::Unavailable("scripted".to_string()));
            }
            Ok(Evaluation::score(self.score))
        }
    }

    fn scripted(factor: Factor, score: f64, delay_ms: u64, fail: bool) -> Arc<dyn FactorEvaluator> {
        Arc::new(Scripted {
            factor,
            score,
            delay: Duration::from_millis(delay_ms),
            fail,
        })
    }

    fn scorer_with(evaluators: Vec<Arc<dyn FactorEvaluator>>, scoring: ScoringConfig) -> SiteScorer {
        let regions = Arc::new(RegionTable::australia());
        let collaborators = Collaborators::regional(Arc::clone(&regions), InMemorySpatialIndex::default());
        let config = SelectorConfig::default();
        let mut set = EvaluatorSet::new(&config.evaluators, &config.constellation, &collaborators);
        for e in evaluators {
            set = set.with_evaluator(e);
        }
        SiteScorer::from_parts(scoring, set, regions)
    }

    fn all_scripted(score: f64) -> Vec<Arc<dyn FactorEvaluator>> {
        Factor::ALL.iter().map(|&f| scripted(f, score, 0, false)).collect()
    }

    fn parramatta() -> Candidate {
        Candidate::at(GeoPoint::new(151.0, -33.8))
    }

    #[tokio::test]
    async fn test_full_mode_total_is_weighted_sum() {
        let scorer = scorer_with(all_scripted(0.6), ScoringConfig::default());
        let site = scorer.score(&parramatta(), &WeightVector::default(), ScoringMode::Full).await;

        assert_eq!(site.status, SiteStatus::Complete);
        assert!((site.total_score - 0.6).abs() < 1e-3);
        assert!(site.factors.iter().all(|f| f.status == FactorStatus::Evaluated));
        assert_eq!(site.region.as_deref(), Some("New South Wales"));
        assert!(site.reasoning.starts_with("Good overall suitability."));
    }

    #[tokio::test]
    async fn test_fast_mode_holds_constants() {
        let scorer = scorer_with(all_scripted(1.0), ScoringConfig::default());
        let site = scorer.score(&parramatta(), &WeightVector::default(), ScoringMode::Fast).await;

        assert_eq!(site.status, SiteStatus::Complete);
        assert_eq!(site.scores.backhaul, 1.0);
        assert_eq!(site.scores.population, 1.0);
        assert_eq!(site.scores.interference, 1.0);
        assert_eq!(site.scores.elevation, 0.75);
        assert_eq!(site.scores.land, 0.8);
        assert_eq!(site.scores.orbital_pass, 0.6);
        assert_eq!(site.scores.market_demand, 0.5);

        let fixed = site.factors.iter().filter(|f| f.status == FactorStatus::Fixed).count();
        assert_eq!(fixed, 4);
    }

    #[tokio::test]
    async fn test_timed_out_factor_uses_default() {
        let mut evaluators = all_scripted(0.9);
        evaluators.push(scripted(Factor::Land, 0.9, 2_000, false));
        let scoring = ScoringConfig {
            evaluator_timeout_ms: 50,
            ..ScoringConfig::default()
        };
        let scorer = scorer_with(evaluators, scoring);
        let site = scorer.score(&parramatta(), &WeightVector::default(), ScoringMode::Full).await;

        assert_eq!(site.status, SiteStatus::Degraded);
        assert_eq!(site.scores.land, 0.42);
        let land = site.factors.iter().find(|f| f.factor == Factor::Land).unwrap();
        assert_eq!(land.status, FactorStatus::TimedOut);
        assert!(site.reasoning.contains("Estimated values used for: land."));
    }

    #[tokio::test]
    async fn test_all_failures_produce_fallback_site() {
        let evaluators = Factor::ALL.iter().map(|&f| scripted(f, 0.9, 0, true)).collect();
        let scorer = scorer_with(evaluators, ScoringConfig::default());
        let candidate = parramatta();
        let weights = WeightVector::default();

        let site = scorer.score(&candidate, &weights, ScoringMode::Full).await;
        let fallback = scorer.fallback(&candidate, &weights, ScoringMode::Full, "test");

        assert_eq!(site.status, SiteStatus::Fallback);
        assert_eq!(site.scores, fallback.scores);
        assert_eq!(site.total_score, fallback.total_score);
        assert!((site.total_score - 0.42).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_site_timeout_falls_back() {
        let evaluators = Factor::ALL.iter().map(|&f| scripted(f, 0.9, 2_000, false)).collect();
        let scoring = ScoringConfig {
            evaluator_timeout_ms: 5_000,
            site_timeout_ms: 50,
            ..ScoringConfig::default()
        };
        let scorer = scorer_with(evaluators, scoring);
        let site = scorer.score(&parramatta(), &WeightVector::default(), ScoringMode::Full).await;

        assert!(site.is_fallback());
        assert!(site.reasoning.contains("site scoring timed out"));
    }

    #[tokio::test]
    async fn test_weights_are_normalised() {
        let scorer = scorer_with(all_scripted(1.0), ScoringConfig::default());
        let weights = WeightVector {
            backhaul: 0.3,
            ..WeightVector::default()
        };
        let site = scorer.score(&parramatta(), &weights, ScoringMode::Full).await;

        assert!((site.weights_used.sum() - 1.0).abs() < 1e-9);
        assert_eq!(site.total_score, 1.0);
    }

    #[tokio::test]
    async fn test_regional_scoring_is_idempotent() {
        let regions = Arc::new(RegionTable::australia());
        let collaborators = Collaborators::regional(Arc::clone(&regions), InMemorySpatialIndex::default());
        let scorer = SiteScorer::new(&SelectorConfig::default(), &collaborators, regions);

        let first = scorer.score(&parramatta(), &WeightVector::default(), ScoringMode::Full).await;
        let second = scorer.score(&parramatta(), &WeightVector::default(), ScoringMode::Full).await;

        assert_eq!(first, second);
        assert!(first.orbital_metrics.is_some());
        assert!((0.0..=1.0).contains(&first.total_score));
        for factor in Factor::ALL {
            assert!((0.0..=1.0).contains(&first.scores.get(factor)));
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Full".parse::<ScoringMode>().unwrap(), ScoringMode::Full);
        assert_eq!("fast".parse::<ScoringMode>().unwrap(), ScoringMode::Fast);
        assert!("slow".parse::<ScoringMode>().is_err());
    }

    #[test]
    fn test_reasoning_bands() {
        assert!(overall_band(0.85).starts_with("Excellent"));
        assert!(overall_band(0.6).starts_with("Good"));
        assert!(overall_band(0.45).starts_with("Moderate"));
        assert!(overall_band(0.1).starts_with("Limited"));
    }

    fn regional_scorer() -> SiteScorer {
        let regions = Arc::new(RegionTable::australia());
        let collaborators = Collaborators::regional(Arc::clone(&regions), InMemorySpatialIndex::default());
        SiteScorer::new(&SelectorConfig::default(), &collaborators, regions)
    }

    fn weights_from(raw: &[f64], target_sum: f64) -> WeightVector {
        let sum: f64 = raw.iter().sum();
        let w: Vec<f64> = raw.iter().map(|v| v / sum * target_sum).collect();
        WeightVector {
            backhaul: w[0],
            population: w[1],
            elevation: w[2],
            interference: w[3],
            land: w[4],
            orbital_pass: w[5],
            market_demand: w[6],
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_total_matches_weighted_scores(
            lon in 112.9f64..153.7,
            lat in -43.7f64..-10.6,
            raw in proptest::collection::vec(0.1f64..1.0, 7),
            target_sum in 0.9f64..=1.1,
        ) {
            let weights = weights_from(&raw, target_sum);
            let scorer = regional_scorer();
            let candidate = Candidate::at(GeoPoint::new(lon, lat));
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

            for mode in [ScoringMode::Fast, ScoringMode::Full] {
                let site = runtime.block_on(scorer.score(&candidate, &weights, mode));

                prop_assert!((0.0..=1.0).contains(&site.total_score));
                for factor in Factor::ALL {
                    prop_assert!((0.0..=1.0).contains(&site.scores.get(factor)));
                }
                prop_assert!((site.weights_used.sum() - 1.0).abs() < 1e-9);

                let expected: f64 = Factor::ALL
                    .iter()
                    .map(|&f| site.scores.get(f) * site.weights_used.get(f))
                    .sum();
                prop_assert!((site.total_score - round_to(expected, 3)).abs() <= 5e-4);
            }
        }
    }
}
