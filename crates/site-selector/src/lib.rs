//! Ground Station Site Selector
//!
//! Generates a land-filtered candidate grid over a bounding box, scores every
//! candidate against seven weighted factors and returns a ranked shortlist.
//!
//! # Scoring Model (7-Factor)
//!
//! ```text
//! Score(site) = w₁·B + w₂·P + w₃·E + w₄·I + w₅·L + w₆·O + w₇·M
//! ```
//!
//! | Factor | Default weight | Description |
//! |--------|----------------|-------------|
//! | B      | 0.20           | Backhaul proximity |
//! | P      | 0.15           | Population proximity |
//! | E      | 0.15           | Elevation / terrain |
//! | I      | 0.15           | RF interference (inverted) |
//! | L      | 0.15           | Land availability |
//! | O      | 0.10           | Orbital-pass quality |
//! | M      | 0.10           | Market demand |
//!
//! # Pipeline
//!
//! ```text
//! bbox → grid (adaptive resolution, land filter, cap)
//!      → stride sampling → batches → SiteScorer → 7 evaluators (concurrent)
//!      → min-score filter → rank → truncate
//! ```

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use thiserror::Error;

pub mod collaborators;
pub mod config;
pub mod evaluators;
pub mod grid;
pub mod land;
pub mod loader;
pub mod regions;
pub mod scorer;
pub mod selector;

pub use collaborators::{Collaborators, Feature, FeatureKind, InMemorySpatialIndex};
pub use config::SelectorConfig;
pub use regions::RegionTable;
pub use scorer::{ScoredSite, ScoringMode, SiteScorer, SiteStatus};
pub use selector::{AnalysisRequest, AnalysisResult, SiteSelector};

/// Mean Earth radius for great-circle distances (km)
pub const EARTH_RADIUS_KM: f64 = 6371.000000000;

/// Accepted deviation of the weight sum from 1.0 (inclusive)
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.100000000;

#[derive(Error, Debug)]
pub enum SelectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),
    #[error("Invalid coordinates: ({0}, {1})")]
    InvalidCoordinates(f64, f64),
    #[error("Weight for {factor} out of range [0, 1]: {value}")]
    WeightOutOfRange { factor: Factor, value: f64 },
    #[error("Weights must sum to 1.0 ± {tolerance}, got {sum:.3}")]
    WeightSum { sum: f64, tolerance: f64 },
    #[error("max_sites must be between 1 and {limit}, got {value}")]
    MaxSitesOutOfRange { value: usize, limit: usize },
    #[error("min_score must be within [0, 1], got {0}")]
    MinScoreOutOfRange(f64),
    #[error("Grid resolution must be a positive number of degrees, got {0}")]
    InvalidResolution(f64),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Orbital model error: {0}")]
    Orbital(#[from] orbital_mechanics::OrbitalError),
}

impl SelectorError {
    /// Rejections caused by the caller's request rather than the environment
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidBoundingBox(_)
                | Self::InvalidCoordinates(..)
                | Self::WeightOutOfRange { .. }
                | Self::WeightSum { .. }
                | Self::MaxSitesOutOfRange { .. }
                | Self::MinScoreOutOfRange(_)
                | Self::InvalidResolution(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SelectorError>;

/// Scoring dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    Backhaul,
    Population,
    Elevation,
    Interference,
    Land,
    OrbitalPass,
    MarketDemand,
}

impl Factor {
    pub const ALL: [Factor; 7] = [
        Factor::Backhaul,
        Factor::Population,
        Factor::Elevation,
        Factor::Interference,
        Factor::Land,
        Factor::OrbitalPass,
        Factor::MarketDemand,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Factor::Backhaul => "backhaul",
            Factor::Population => "population",
            Factor::Elevation => "elevation",
            Factor::Interference => "interference",
            Factor::Land => "land",
            Factor::OrbitalPass => "orbital_pass",
            Factor::MarketDemand => "market_demand",
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// WGS84 point, degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self { longitude, latitude }
    }

    pub fn is_valid(&self) -> bool {
        self.longitude.is_finite()
            && self.latitude.is_finite()
            && (-180.0..=180.0).contains(&self.longitude)
            && (-90.0..=90.0).contains(&self.latitude)
    }

    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Analysis universe for one request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(alias = "minLon")]
    pub min_lon: f64,
    #[serde(alias = "minLat")]
    pub min_lat: f64,
    #[serde(alias = "maxLon")]
    pub max_lon: f64,
    #[serde(alias = "maxLat")]
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self> {
        let bbox = Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// `[min_lon, min_lat, max_lon, max_lat]`
    pub fn from_array(coords: [f64; 4]) -> Result<Self> {
        Self::new(coords[0], coords[1], coords[2], coords[3])
    }

    pub fn validate(&self) -> Result<()> {
        let values = [self.min_lon, self.min_lat, self.max_lon, self.max_lat];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SelectorError::InvalidBoundingBox(
                "coordinates must be finite".to_string(),
            ));
        }
        if !(-180.0..=180.0).contains(&self.min_lon) || !(-180.0..=180.0).contains(&self.max_lon) {
            return Err(SelectorError::InvalidBoundingBox(format!(
                "longitude outside [-180, 180]: {} .. {}",
                self.min_lon, self.max_lon
            )));
        }
        if !(-90.0..=90.0).contains(&self.min_lat) || !(-90.0..=90.0).contains(&self.max_lat) {
            return Err(SelectorError::InvalidBoundingBox(format!(
                "latitude outside [-90, 90]: {} .. {}",
                self.min_lat, self.max_lat
            )));
        }
        if self.min_lon >= self.max_lon {
            return Err(SelectorError::InvalidBoundingBox(format!(
                "min_lon {} must be less than max_lon {}",
                self.min_lon, self.max_lon
            )));
        }
        if self.min_lat >= self.max_lat {
            return Err(SelectorError::InvalidBoundingBox(format!(
                "min_lat {} must be less than max_lat {}",
                self.min_lat, self.max_lat
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        (self.max_lon - self.min_lon).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.max_lat - self.min_lat).max(0.0)
    }

    /// Area in squared degrees
    pub fn area_sq_deg(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.min_lon..=self.max_lon).contains(&point.longitude)
            && (self.min_lat..=self.max_lat).contains(&point.latitude)
    }
}

/// One grid point considered for scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub longitude: f64,
    pub latitude: f64,
}

impl Candidate {
    /// Candidate whose id is derived from coordinates rounded to 4 decimals
    pub fn at(point: GeoPoint) -> Self {
        Self {
            id: candidate_id(point),
            longitude: point.longitude,
            latitude: point.latitude,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.longitude, self.latitude)
    }
}

/// Deterministic id for a lattice point (~11 m precision)
pub fn candidate_id(point: GeoPoint) -> String {
    // +0.0 folds -0.0 so both round to the same id
    format!(
        "site_{:.4}_{:.4}",
        round_to(point.latitude, 4) + 0.0,
        round_to(point.longitude, 4) + 0.0
    )
}

/// Caller-supplied importance of each factor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub backhaul: f64,
    pub population: f64,
    pub elevation: f64,
    pub interference: f64,
    pub land: f64,
    #[serde(alias = "orbitalPass")]
    pub orbital_pass: f64,
    #[serde(alias = "marketDemand")]
    pub market_demand: f64,
}

impl Default for WeightVector {
    fn default() -> Self {
        Self {
            backhaul: 0.200000000,
            population: 0.150000000,
            elevation: 0.150000000,
            interference: 0.150000000,
            land: 0.150000000,
            orbital_pass: 0.100000000,
            market_demand: 0.100000000,
        }
    }
}

impl WeightVector {
    pub fn get(&self, factor: Factor) -> f64 {
        match factor {
            Factor::Backhaul => self.backhaul,
            Factor::Population => self.population,
            Factor::Elevation => self.elevation,
            Factor::Interference => self.interference,
            Factor::Land => self.land,
            Factor::OrbitalPass => self.orbital_pass,
            Factor::MarketDemand => self.market_demand,
        }
    }

    pub fn sum(&self) -> f64 {
        Factor::ALL.iter().map(|f| self.get(*f)).sum()
    }

    /// Each weight in [0, 1] and the sum within ±0.1 of 1.0
    pub fn validate(&self) -> Result<()> {
        for factor in Factor::ALL {
            let value = self.get(factor);
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(SelectorError::WeightOutOfRange { factor, value });
            }
        }

        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE + 1e-9 {
            return Err(SelectorError::WeightSum {
                sum,
                tolerance: WEIGHT_SUM_TOLERANCE,
            });
        }
        Ok(())
    }

    /// Rescale so the weights sum to exactly 1.0
    pub fn normalized(&self) -> Self {
        let sum = self.sum();
        if sum <= 0.0 || !sum.is_finite() {
            return *self;
        }
        Self {
            backhaul: self.backhaul / sum,
            population: self.population / sum,
            elevation: self.elevation / sum,
            interference: self.interference / sum,
            land: self.land / sum,
            orbital_pass: self.orbital_pass / sum,
            market_demand: self.market_demand / sum,
        }
    }
}

/// One score per factor, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub backhaul: f64,
    pub population: f64,
    pub elevation: f64,
    pub interference: f64,
    pub land: f64,
    pub orbital_pass: f64,
    pub market_demand: f64,
}

impl ScoreBreakdown {
    pub fn uniform(score: f64) -> Self {
        Self {
            backhaul: score,
            population: score,
            elevation: score,
            interference: score,
            land: score,
            orbital_pass: score,
            market_demand: score,
        }
    }

    pub fn get(&self, factor: Factor) -> f64 {
        match factor {
            Factor::Backhaul => self.backhaul,
            Factor::Population => self.population,
            Factor::Elevation => self.elevation,
            Factor::Interference => self.interference,
            Factor::Land => self.land,
            Factor::OrbitalPass => self.orbital_pass,
            Factor::MarketDemand => self.market_demand,
        }
    }

    pub fn set(&mut self, factor: Factor, score: f64) {
        let slot = match factor {
            Factor::Backhaul => &mut self.backhaul,
            Factor::Population => &mut self.population,
            Factor::Elevation => &mut self.elevation,
            Factor::Interference => &mut self.interference,
            Factor::Land => &mut self.land,
            Factor::OrbitalPass => &mut self.orbital_pass,
            Factor::MarketDemand => &mut self.market_demand,
        };
        *slot = score;
    }

    /// Σ score_i × weight_i
    pub fn weighted_total(&self, weights: &WeightVector) -> f64 {
        Factor::ALL
            .iter()
            .map(|f| self.get(*f) * weights.get(*f))
            .sum()
    }
}

/// Clamp a raw score into [0, 1]; non-finite values become 0
pub fn clamp_unit(score: f64) -> f64 {
    if !score.is_finite() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Haversine distance between two points in km (9 decimal precision)
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1 * PI / 180.000000000;
    let lat2_rad = lat2 * PI / 180.000000000;
    let dlat = (lat2 - lat1) * PI / 180.000000000;
    let dlon = (lon2 - lon1) * PI / 180.000000000;

    let a = (dlat / 2.000000000).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.000000000).sin().powi(2);
    let c = 2.000000000 * a.sqrt().atan2((1.000000000 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Point reached travelling `distance_km` from `origin` on initial `bearing_deg`
pub fn destination_point(origin: GeoPoint, bearing_deg: f64, distance_km: f64) -> GeoPoint {
    let delta = distance_km / EARTH_RADIUS_KM;
    let theta = bearing_deg.to_radians();
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    let longitude = (lon2.to_degrees() + 540.0) % 360.0 - 180.0;
    GeoPoint::new(longitude, lat2.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine() {
        // Sydney to Melbourne: ~714 km
        let dist = haversine_km(-33.868800000, 151.209300000, -37.813600000, 144.963100000);
        assert!((dist - 714.000000000).abs() < 10.000000000);

        // Same point: 0 km
        let dist = haversine_km(0.000000000, 0.000000000, 0.000000000, 0.000000000);
        assert!(dist.abs() < 0.001000000);
    }

    #[test]
    fn test_destination_point_round_trip_distance() {
        let origin = GeoPoint::new(151.2093, -33.8688);
        for bearing in [0.0, 45.0, 90.0, 180.0, 270.0] {
            let dest = destination_point(origin, bearing, 25.0);
            assert!((origin.distance_km(&dest) - 25.0).abs() < 0.01);
        }
        let north = destination_point(origin, 0.0, 111.0);
        assert!(north.latitude > origin.latitude);
    }

    #[test]
    fn test_bounding_box_validation() {
        assert!(BoundingBox::new(150.0, -35.0, 152.0, -33.0).is_ok());
        assert!(BoundingBox::new(152.0, -35.0, 150.0, -33.0).is_err());
        assert!(BoundingBox::new(150.0, -33.0, 152.0, -33.0).is_err());
        assert!(BoundingBox::new(150.0, -95.0, 152.0, -33.0).is_err());
        assert!(BoundingBox::new(f64::NAN, -35.0, 152.0, -33.0).is_err());

        let bbox = BoundingBox::from_array([150.0, -35.0, 152.0, -33.0]).unwrap();
        assert!((bbox.area_sq_deg() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_weight_tolerance_boundary() {
        let mut weights = WeightVector::default();
        assert!(weights.validate().is_ok());

        // 1.05 total accepted
        weights.backhaul = 0.25;
        assert!((weights.sum() - 1.05).abs() < 1e-9);
        assert!(weights.validate().is_ok());

        // 1.25 total rejected
        weights.backhaul = 0.45;
        assert!(matches!(weights.validate(), Err(SelectorError::WeightSum { .. })));

        // 0.85 total rejected
        weights.backhaul = 0.05;
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_weight_out_of_range() {
        let weights = WeightVector {
            land: -0.1,
            ..WeightVector::default()
        };
        assert!(matches!(
            weights.validate(),
            Err(SelectorError::WeightOutOfRange { factor: Factor::Land, .. })
        ));
    }

    #[test]
    fn test_normalized_weights_sum_to_one() {
        let weights = WeightVector {
            backhaul: 0.25,
            ..WeightVector::default()
        };
        let normalized = weights.normalized();
        assert!((normalized.sum() - 1.0).abs() < 1e-12);
        assert!(normalized.backhaul > normalized.population);
    }

    #[test]
    fn test_candidate_id_is_deterministic() {
        let a = Candidate::at(GeoPoint::new(150.100000001, -34.2));
        let b = Candidate::at(GeoPoint::new(150.1, -34.200000002));
        assert_eq!(a.id, b.id);
        assert_eq!(a.id, "site_-34.2000_150.1000");
    }

    #[test]
    fn test_weighted_total() {
        let scores = ScoreBreakdown::uniform(0.5);
        let total = scores.weighted_total(&WeightVector::default());
        assert!((total - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_weight_vector_accepts_camel_case() {
        let json = r#"{"backhaul":0.2,"population":0.15,"elevation":0.15,"interference":0.15,
            "land":0.15,"orbitalPass":0.1,"marketDemand":0.1}"#;
        let weights: WeightVector = serde_json::from_str(json).unwrap();
        assert_eq!(weights, WeightVector::default());
    }
}
