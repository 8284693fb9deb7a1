//! External data collaborators
//!
//! The evaluators only see these traits. Regional implementations backed by
//! the `RegionTable` and an in-memory feature index let the pipeline run
//! without external services; production deployments can swap in a spatial
//! database or elevation API behind the same traits.

use crate::regions::RegionTable;
use crate::GeoPoint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("No data at ({longitude}, {latitude})")]
    NoData { longitude: f64, latitude: f64 },
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Infrastructure classes held by the spatial index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Fibre, exchanges, POPs and other backhaul access points
    Backhaul,
    /// Licensed RF transmitters such as mobile base stations
    Emitter,
    /// Existing ground stations and teleports
    GroundStation,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureKind::Backhaul => "backhaul",
            FeatureKind::Emitter => "emitter",
            FeatureKind::GroundStation => "ground_station",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub name: String,
    pub kind: FeatureKind,
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub technology: Option<String>,
    /// Transmit power (emitters only)
    #[serde(default)]
    pub power_w: Option<f64>,
    #[serde(default)]
    pub site_type: Option<String>,
}

impl Feature {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.longitude, self.latitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureHit {
    pub distance_km: f64,
    pub feature: Feature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandUse {
    pub category: String,
    #[serde(default)]
    pub exclusion_flags: Vec<String>,
}

#[async_trait]
pub trait SpatialIndex: Send + Sync {
    /// Up to `k` features of `kind`, nearest first
    async fn nearest(&self, point: GeoPoint, kind: FeatureKind, k: usize) -> CollaboratorResult<Vec<FeatureHit>>;

    /// Features of `kind` within `radius_km`, nearest first
    async fn within(&self, point: GeoPoint, kind: FeatureKind, radius_km: f64) -> CollaboratorResult<Vec<FeatureHit>>;
}

#[async_trait]
pub trait ElevationService: Send + Sync {
    async fn elevation_m(&self, point: GeoPoint) -> CollaboratorResult<f64>;
}

#[async_trait]
pub trait PopulationDemand: Send + Sync {
    async fn density_per_km2(&self, point: GeoPoint) -> CollaboratorResult<f64>;
}

#[async_trait]
pub trait LandClassifier: Send + Sync {
    async fn classify(&self, point: GeoPoint) -> CollaboratorResult<LandUse>;
}

/// Handles to every collaborator, cheap to clone into tasks
#[derive(Clone)]
pub struct Collaborators {
    pub spatial: Arc<dyn SpatialIndex>,
    pub elevation: Arc<dyn ElevationService>,
    pub population: Arc<dyn PopulationDemand>,
    pub land_use: Arc<dyn LandClassifier>,
}

impl Collaborators {
    /// Region-table models plus an in-memory feature index
    pub fn regional(regions: Arc<RegionTable>, index: InMemorySpatialIndex) -> Self {
        Self {
            spatial: Arc::new(index),
            elevation: Arc::new(RegionalElevationModel::new(Arc::clone(&regions))),
            population: Arc::new(RegionalDemandModel::new(Arc::clone(&regions))),
            land_use: Arc::new(RegionalLandClassifier::new(regions)),
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Linear-scan index over loaded features
#[derive(Debug, Clone, Default)]
pub struct InMemorySpatialIndex {
    features: Vec<Feature>,
}

impl InMemorySpatialIndex {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn count(&self, kind: FeatureKind) -> usize {
        self.features.iter().filter(|f| f.kind == kind).count()
    }

    fn hits(&self, point: GeoPoint, kind: FeatureKind) -> Vec<FeatureHit> {
        let mut hits: Vec<FeatureHit> = self
            .features
            .iter()
            .filter(|f| f.kind == kind)
            .map(|f| FeatureHit {
                distance_km: point.distance_km(&f.point()),
                feature: f.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.feature.id.cmp(&b.feature.id))
        });
        hits
    }
}

#[async_trait]
impl SpatialIndex for InMemorySpatialIndex {
    async fn nearest(&self, point: GeoPoint, kind: FeatureKind, k: usize) -> CollaboratorResult<Vec<FeatureHit>> {
        let mut hits = self.hits(point, kind);
        hits.truncate(k);
        Ok(hits)
    }

    async fn within(&self, point: GeoPoint, kind: FeatureKind, radius_km: f64) -> CollaboratorResult<Vec<FeatureHit>> {
        let mut hits = self.hits(point, kind);
        hits.retain(|h| h.distance_km <= radius_km);
        Ok(hits)
    }
}

/// Terrain-zone lookup with a regional default
#[derive(Debug, Clone)]
pub struct RegionalElevationModel {
    regions: Arc<RegionTable>,
}

impl RegionalElevationModel {
    pub fn new(regions: Arc<RegionTable>) -> Self {
        Self { regions }
    }
}

#[async_trait]
impl ElevationService for RegionalElevationModel {
    async fn elevation_m(&self, point: GeoPoint) -> CollaboratorResult<f64> {
        if !point.is_valid() {
            return Err(CollaboratorError::NoData {
                longitude: point.longitude,
                latitude: point.latitude,
            });
        }
        Ok(self
            .regions
            .terrain_at(point)
            .map(|z| z.elevation_m)
            .unwrap_or(self.regions.default_elevation_m))
    }
}

/// Rural baseline plus Gaussian city peaks
#[derive(Debug, Clone)]
pub struct RegionalDemandModel {
    regions: Arc<RegionTable>,
}

impl RegionalDemandModel {
    pub fn new(regions: Arc<RegionTable>) -> Self {
        Self { regions }
    }
}

#[async_trait]
impl PopulationDemand for RegionalDemandModel {
    async fn density_per_km2(&self, point: GeoPoint) -> CollaboratorResult<f64> {
        if !point.is_valid() {
            return Err(CollaboratorError::NoData {
                longitude: point.longitude,
                latitude: point.latitude,
            });
        }
        Ok(self.regions.density_at(point))
    }
}

/// Land-use zones, water bodies and the default category
#[derive(Debug, Clone)]
pub struct RegionalLandClassifier {
    regions: Arc<RegionTable>,
}

impl RegionalLandClassifier {
    pub fn new(regions: Arc<RegionTable>) -> Self {
        Self { regions }
    }
}

#[async_trait]
impl LandClassifier for RegionalLandClassifier {
    async fn classify(&self, point: GeoPoint) -> CollaboratorResult<LandUse> {
        if self.regions.water_body_at(point).is_some() {
            return Ok(LandUse {
                category: "water".to_string(),
                exclusion_flags: Vec::new(),
            });
        }

        Ok(match self.regions.land_use_at(point) {
            Some(zone) => LandUse {
                category: zone.category.clone(),
                exclusion_flags: zone.exclusion_flags.clone(),
            },
            None => LandUse {
                category: self.regions.default_category.clone(),
                exclusion_flags: Vec::new(),
            },
        })
    }
}
