//! Batch analysis orchestrator
//!
//! Validates a request, generates the candidate grid, down-samples it to the
//! analysis cap with a fixed stride, and scores candidates in sequential
//! batches of concurrently spawned tasks. The whole run sits under a
//! deadline: on expiry the sites scored so far are ranked and returned.

use crate::collaborators::Collaborators;
use crate::config::{OrchestratorConfig, SelectorConfig};
use crate::grid::{GridGenerator, GridPlan};
use crate::land::LandFilter;
use crate::regions::RegionTable;
use crate::scorer::{ScoredSite, ScoringMode, SiteScorer, SiteStatus};
use crate::{BoundingBox, Candidate, GeoPoint, Result, SelectorError, WeightVector};
use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const NO_SITES_MESSAGE: &str = "No sites met the minimum score threshold";
pub const NO_LAND_MESSAGE: &str = "No land candidates inside the bounding box";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(alias = "boundingBox", alias = "bbox")]
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub weights: WeightVector,
    #[serde(default, alias = "maxSites")]
    pub max_sites: Option<usize>,
    #[serde(default, alias = "minScore")]
    pub min_score: Option<f64>,
    /// Base grid resolution hint (degrees)
    #[serde(default, alias = "gridResolution")]
    pub grid_resolution: Option<f64>,
    #[serde(default)]
    pub mode: Option<ScoringMode>,
    #[serde(default, alias = "deadlineMs")]
    pub deadline_ms: Option<u64>,
}

impl AnalysisRequest {
    pub fn new(bounding_box: BoundingBox) -> Self {
        Self {
            bounding_box,
            weights: WeightVector::default(),
            max_sites: None,
            min_score: None,
            grid_resolution: None,
            mode: None,
            deadline_ms: None,
        }
    }

    pub fn with_weights(mut self, weights: WeightVector) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_max_sites(mut self, max_sites: usize) -> Self {
        self.max_sites = Some(max_sites);
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_grid_resolution(mut self, resolution_deg: f64) -> Self {
        self.grid_resolution = Some(resolution_deg);
        self
    }

    pub fn with_mode(mut self, mode: ScoringMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }

    /// Reject malformed requests before any work starts
    pub fn validate(&self, limits: &OrchestratorConfig) -> Result<()> {
        self.bounding_box.validate()?;
        self.weights.validate()?;

        if let Some(max_sites) = self.max_sites {
            if max_sites == 0 || max_sites > limits.max_sites_limit {
                return Err(SelectorError::MaxSitesOutOfRange {
                    value: max_sites,
                    limit: limits.max_sites_limit,
                });
            }
        }
        if let Some(min_score) = self.min_score {
            if !min_score.is_finite() || !(0.0..=1.0).contains(&min_score) {
                return Err(SelectorError::MinScoreOutOfRange(min_score));
            }
        }
        if let Some(resolution) = self.grid_resolution {
            if !resolution.is_finite() || resolution <= 0.0 {
                return Err(SelectorError::InvalidResolution(resolution));
            }
        }
        Ok(())
    }
}

/// Run bookkeeping returned alongside the ranked sites
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub analysis_id: String,
    pub generated_at: String,
    pub bounding_box: BoundingBox,
    pub mode: ScoringMode,
    pub grid: GridPlan,
    pub candidates_generated: usize,
    pub candidates_sampled: usize,
    pub sample_stride: usize,
    pub sites_scored: usize,
    pub fallback_sites: usize,
    pub degraded_sites: usize,
    pub sites_returned: usize,
    pub batches_completed: usize,
    pub batches_total: usize,
    pub deadline_exceeded: bool,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub sites: Vec<ScoredSite>,
    pub summary: AnalysisSummary,
}

/// Every `stride`-th candidate, stride = ⌈n / cap⌉
pub fn sample_by_stride(candidates: Vec<Candidate>, cap: usize) -> (Vec<Candidate>, usize) {
    if cap == 0 || candidates.len() <= cap {
        return (candidates, 1);
    }
    let stride = candidates.len().div_ceil(cap);
    let sampled = candidates.into_iter().step_by(stride).collect();
    (sampled, stride)
}

/// Descending total score, ties broken by id
pub fn rank_sites(sites: &mut [ScoredSite]) {
    sites.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.candidate.id.cmp(&b.candidate.id))
    });
}

pub struct SiteSelector {
    config: Arc<SelectorConfig>,
    regions: Arc<RegionTable>,
    grid: GridGenerator,
    scorer: Arc<SiteScorer>,
}

impl SiteSelector {
    pub fn new(config: SelectorConfig, regions: Arc<RegionTable>, collaborators: Collaborators) -> Result<Self> {
        let scorer = SiteScorer::new(&config, &collaborators, Arc::clone(&regions));
        Self::with_scorer(config, regions, scorer)
    }

    /// Orchestrate around a pre-built scorer
    pub fn with_scorer(config: SelectorConfig, regions: Arc<RegionTable>, scorer: SiteScorer) -> Result<Self> {
        config.validate()?;
        regions.validate()?;

        let grid = GridGenerator::new(config.grid.clone(), LandFilter::new(Arc::clone(&regions)));
        info!(
            "Site selector ready: {} batch x {}, cap {}, {} constellation",
            config.orchestrator.batch_size,
            config.orchestrator.analysis_cap,
            config.grid.max_candidates,
            config.constellation.name
        );

        Ok(Self {
            config: Arc::new(config),
            regions,
            grid,
            scorer: Arc::new(scorer),
        })
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        let orchestrator = &self.config.orchestrator;
        request.validate(orchestrator)?;

        let started = Instant::now();
        let deadline = started
            + request
                .deadline_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| orchestrator.deadline());
        let mode = request.mode.unwrap_or(orchestrator.mode);
        let max_sites = request.max_sites.unwrap_or(orchestrator.default_max_sites);
        let min_score = request.min_score.unwrap_or(orchestrator.default_min_score);
        let weights = request.weights;
        let bbox = request.bounding_box;

        info!(
            "Analysis: bbox [{}, {}, {}, {}], mode {}, max {} sites, min score {:.2}",
            bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat, mode, max_sites, min_score
        );

        let base_resolution = request.grid_resolution.unwrap_or(self.config.grid.base_resolution_deg);
        let grid = self.grid.generate(&bbox, base_resolution)?;
        let generated = grid.candidates.len();

        let (candidates, stride) = sample_by_stride(grid.candidates, orchestrator.analysis_cap);
        if stride > 1 {
            info!("Sampled {} of {} candidates (stride {})", candidates.len(), generated, stride);
        }

        let batch_size = orchestrator.batch_size.max(1);
        let batches_total = candidates.len().div_ceil(batch_size);
        let mut scored: Vec<ScoredSite> = Vec::with_capacity(candidates.len());
        let mut batches_completed = 0;
        let mut deadline_exceeded = false;

        for (index, batch) in candidates.chunks(batch_size).enumerate() {
            if index > 0 {
                // Pause between batches, still bounded by the deadline
                if timeout_at(deadline, sleep(orchestrator.batch_pause())).await.is_err() {
                    deadline_exceeded = true;
                    break;
                }
            }
            if Instant::now() >= deadline {
                deadline_exceeded = true;
                break;
            }

            if !self.run_batch(batch, weights, mode, deadline, &mut scored).await {
                deadline_exceeded = true;
                break;
            }
            batches_completed += 1;
            debug!("Batch {}/{} done, {} sites scored", index + 1, batches_total, scored.len());
        }

        if deadline_exceeded {
            warn!(
                "Analysis deadline reached after {}/{} batches; ranking {} scored sites",
                batches_completed,
                batches_total,
                scored.len()
            );
        }

        let sites_scored = scored.len();
        let fallback_sites = scored.iter().filter(|s| s.status == SiteStatus::Fallback).count();
        let degraded_sites = scored.iter().filter(|s| s.status == SiteStatus::Degraded).count();

        let mut sites: Vec<ScoredSite> = scored.into_iter().filter(|s| s.total_score >= min_score).collect();
        rank_sites(&mut sites);
        sites.truncate(max_sites);

        let message = if generated == 0 {
            Some(NO_LAND_MESSAGE.to_string())
        } else if sites.is_empty() {
            Some(NO_SITES_MESSAGE.to_string())
        } else if deadline_exceeded {
            Some(format!(
                "Deadline reached after {} of {} candidates; partial ranking returned",
                sites_scored,
                candidates.len()
            ))
        } else {
            None
        };

        let summary = AnalysisSummary {
            analysis_id: Uuid::new_v4().to_string(),
            generated_at: Utc::now().to_rfc3339(),
            bounding_box: bbox,
            mode,
            grid: grid.plan,
            candidates_generated: generated,
            candidates_sampled: candidates.len(),
            sample_stride: stride,
            sites_scored,
            fallback_sites,
            degraded_sites,
            sites_returned: sites.len(),
            batches_completed,
            batches_total,
            deadline_exceeded,
            elapsed_ms: started.elapsed().as_millis() as u64,
            message,
        };

        info!(
            "Analysis {} complete: {} scored, {} returned, {} fallback, {} ms",
            summary.analysis_id, summary.sites_scored, summary.sites_returned, summary.fallback_sites, summary.elapsed_ms
        );

        Ok(AnalysisResult { sites, summary })
    }

    /// Score one batch concurrently; false when the deadline cut it short
    async fn run_batch(
        &self,
        batch: &[Candidate],
        weights: WeightVector,
        mode: ScoringMode,
        deadline: Instant,
        scored: &mut Vec<ScoredSite>,
    ) -> bool {
        let mut tasks = JoinSet::new();
        for candidate in batch {
            let scorer = Arc::clone(&self.scorer);
            let candidate = candidate.clone();
            tasks.spawn(async move {
                let outcome = AssertUnwindSafe(scorer.score(&candidate, &weights, mode))
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(site) => site,
                    Err(_) => {
                        warn!("Scoring task for {} panicked, using fallback", candidate.id);
                        scorer.fallback(&candidate, &weights, mode, "scoring task panicked")
                    }
                }
            });
        }

        let collect = async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(site) => scored.push(site),
                    Err(e) => warn!("Scoring task aborted: {}", e),
                }
            }
        };

        if timeout_at(deadline, collect).await.is_err() {
            tasks.abort_all();
            return false;
        }
        true
    }

    /// Full-mode deep analysis of a single point
    pub async fn score_site(&self, point: GeoPoint, weights: Option<WeightVector>) -> Result<ScoredSite> {
        if !point.is_valid() {
            return Err(SelectorError::InvalidCoordinates(point.longitude, point.latitude));
        }
        let weights = weights.unwrap_or_default();
        weights.validate()?;

        let candidate = Candidate::at(point);
        let outcome = AssertUnwindSafe(self.scorer.score(&candidate, &weights, ScoringMode::Full))
            .catch_unwind()
            .await;
        Ok(match outcome {
            Ok(site) => site,
            Err(_) => {
                warn!("Scoring {} panicked, using fallback", candidate.id);
                self.scorer
                    .fallback(&candidate, &weights, ScoringMode::Full, "scoring task panicked")
            }
        })
    }
}
