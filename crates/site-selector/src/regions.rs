//! Data-driven regional tables
//!
//! Everything geographic that the land filter and the regional collaborator
//! models need (operating envelope, water bodies, state boxes, land-use zones,
//! airports, population centres, terrain zones) lives in one `RegionTable`
//! loaded at startup. The built-in table covers the Australian operating region.

use crate::{GeoPoint, Result, SelectorError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Axis-aligned box or simple polygon in lon/lat degrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Box {
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    },
    /// Vertices as `[lon, lat]`, implicitly closed
    Polygon { points: Vec<[f64; 2]> },
}

impl Shape {
    pub fn rect(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Shape::Box {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    pub fn polygon(points: &[[f64; 2]]) -> Self {
        Shape::Polygon {
            points: points.to_vec(),
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        match self {
            Shape::Box {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            } => {
                point.longitude >= *min_lon
                    && point.longitude <= *max_lon
                    && point.latitude >= *min_lat
                    && point.latitude <= *max_lat
            }
            Shape::Polygon { points } => point_in_polygon(point, points),
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        match self {
            Shape::Box {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            } if min_lon >= max_lon || min_lat >= max_lat => Err(SelectorError::Config(format!(
                "region {} has an empty box",
                name
            ))),
            Shape::Polygon { points } if points.len() < 3 => Err(SelectorError::Config(format!(
                "region {} polygon needs at least 3 points",
                name
            ))),
            _ => Ok(()),
        }
    }
}

/// Ray casting point-in-polygon test
pub fn point_in_polygon(point: GeoPoint, polygon: &[[f64; 2]]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let (x, y) = (point.longitude, point.latitude);
    let mut inside = false;
    let mut j = polygon.len() - 1;

    for i in 0..polygon.len() {
        let [xi, yi] = polygon[i];
        let [xj, yj] = polygon[j];
        if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }

    inside
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedArea {
    pub name: String,
    pub shape: Shape,
}

/// Land-use zone, optionally carrying regulatory exclusion flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandUseZone {
    pub name: String,
    pub shape: Shape,
    pub category: String,
    #[serde(default)]
    pub exclusion_flags: Vec<String>,
}

/// Gaussian population peak around a city centre
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationCentre {
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
    pub peak_density_per_km2: f64,
    pub radius_km: f64,
}

impl PopulationCentre {
    pub fn density_at(&self, point: GeoPoint) -> f64 {
        let d = point.distance_km(&GeoPoint::new(self.longitude, self.latitude));
        self.peak_density_per_km2 * (-(d / self.radius_km).powi(2)).exp()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainZone {
    pub name: String,
    pub shape: Shape,
    pub elevation_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionTable {
    pub name: String,
    pub operating_envelope: Shape,
    pub water_bodies: Vec<NamedArea>,
    /// First match wins, so nested areas go before the areas that contain them
    pub states: Vec<NamedArea>,
    /// First match wins
    pub land_use: Vec<LandUseZone>,
    pub population_centres: Vec<PopulationCentre>,
    /// First match wins
    pub terrain: Vec<TerrainZone>,
    pub default_category: String,
    pub rural_density_per_km2: f64,
    pub default_elevation_m: f64,
}

impl Default for RegionTable {
    fn default() -> Self {
        Self::australia()
    }
}

impl RegionTable {
    /// Load a region table from JSON; missing sections fall back to the built-in table
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading region table from {:?}", path);

        let file = File::open(path)?;
        let table: RegionTable = serde_json::from_reader(BufReader::new(file))?;
        table.validate()?;

        info!(
            "Region table {}: {} water bodies, {} land-use zones, {} population centres",
            table.name,
            table.water_bodies.len(),
            table.land_use.len(),
            table.population_centres.len()
        );

        Ok(table)
    }

    pub fn validate(&self) -> Result<()> {
        self.operating_envelope.validate(&self.name)?;
        for area in self.water_bodies.iter().chain(self.states.iter()) {
            area.shape.validate(&area.name)?;
        }
        for zone in &self.land_use {
            zone.shape.validate(&zone.name)?;
        }
        for zone in &self.terrain {
            zone.shape.validate(&zone.name)?;
        }
        for centre in &self.population_centres {
            if centre.radius_km <= 0.0 || centre.peak_density_per_km2 < 0.0 {
                return Err(SelectorError::Config(format!(
                    "population centre {} needs a positive radius and non-negative density",
                    centre.name
                )));
            }
        }
        Ok(())
    }

    pub fn in_envelope(&self, point: GeoPoint) -> bool {
        self.operating_envelope.contains(point)
    }

    pub fn water_body_at(&self, point: GeoPoint) -> Option<&NamedArea> {
        self.water_bodies.iter().find(|w| w.shape.contains(point))
    }

    pub fn state_at(&self, point: GeoPoint) -> Option<&str> {
        self.states
            .iter()
            .find(|s| s.shape.contains(point))
            .map(|s| s.name.as_str())
    }

    pub fn land_use_at(&self, point: GeoPoint) -> Option<&LandUseZone> {
        self.land_use.iter().find(|z| z.shape.contains(point))
    }

    pub fn terrain_at(&self, point: GeoPoint) -> Option<&TerrainZone> {
        self.terrain.iter().find(|z| z.shape.contains(point))
    }

    /// Rural baseline plus the contribution of every population centre
    pub fn density_at(&self, point: GeoPoint) -> f64 {
        self.rural_density_per_km2
            + self
                .population_centres
                .iter()
                .map(|c| c.density_at(point))
                .sum::<f64>()
    }

    /// Mainland Australia and Tasmania
    pub fn australia() -> Self {
        Self {
            name: "australia".to_string(),
            operating_envelope: Shape::rect(112.9, -43.7, 153.7, -10.6),
            water_bodies: australian_water_bodies(),
            states: australian_states(),
            land_use: australian_land_use(),
            population_centres: australian_population_centres(),
            terrain: australian_terrain(),
            default_category: "rural".to_string(),
            rural_density_per_km2: 3.0,
            default_elevation_m: 250.0,
        }
    }
}

fn area(name: &str, shape: Shape) -> NamedArea {
    NamedArea {
        name: name.to_string(),
        shape,
    }
}

fn zone(name: &str, shape: Shape, category: &str, flags: &[&str]) -> LandUseZone {
    LandUseZone {
        name: name.to_string(),
        shape,
        category: category.to_string(),
        exclusion_flags: flags.iter().map(|f| f.to_string()).collect(),
    }
}

fn centre(name: &str, longitude: f64, latitude: f64, peak: f64, radius_km: f64) -> PopulationCentre {
    PopulationCentre {
        name: name.to_string(),
        longitude,
        latitude,
        peak_density_per_km2: peak,
        radius_km,
    }
}

fn terrain(name: &str, shape: Shape, elevation_m: f64) -> TerrainZone {
    TerrainZone {
        name: name.to_string(),
        shape,
        elevation_m,
    }
}

fn australian_water_bodies() -> Vec<NamedArea> {
    vec![
        area(
            "Tasman Sea (NSW coast)",
            Shape::polygon(&[
                [153.7, -28.1],
                [153.1, -30.3],
                [152.5, -32.0],
                [151.8, -32.9],
                [151.35, -33.6],
                [151.25, -34.0],
                [150.95, -34.5],
                [150.5, -35.5],
                [150.1, -36.5],
                [149.95, -37.5],
                [148.0, -37.9],
                [148.0, -39.0],
                [155.0, -39.0],
                [155.0, -28.1],
            ]),
        ),
        area(
            "Coral Sea",
            Shape::polygon(&[
                [153.7, -28.1],
                [155.0, -28.1],
                [155.0, -10.6],
                [142.8, -10.6],
                [143.5, -14.0],
                [145.4, -15.0],
                [146.3, -18.8],
                [148.8, -20.3],
                [150.8, -22.6],
                [151.8, -24.0],
                [153.2, -25.0],
                [153.6, -27.0],
            ]),
        ),
        area("Gulf of Carpentaria", Shape::rect(136.8, -17.0, 141.4, -11.5)),
        area("Arafura Sea", Shape::rect(129.0, -11.5, 136.8, -10.6)),
        area(
            "Indian Ocean (WA coast)",
            Shape::polygon(&[
                [112.9, -10.6],
                [129.0, -10.6],
                [129.0, -14.8],
                [125.0, -14.5],
                [122.2, -17.0],
                [119.0, -20.0],
                [114.0, -21.8],
                [113.4, -24.5],
                [114.6, -28.7],
                [115.0, -31.5],
                [115.6, -33.5],
                [114.9, -34.4],
                [117.5, -35.2],
                [117.5, -43.7],
                [112.9, -43.7],
            ]),
        ),
        area(
            "Great Australian Bight",
            Shape::polygon(&[
                [117.5, -35.2],
                [123.5, -34.0],
                [126.0, -32.3],
                [129.0, -31.7],
                [131.5, -31.5],
                [133.5, -32.2],
                [135.0, -33.8],
                [135.9, -34.9],
                [136.5, -36.0],
                [136.5, -43.7],
                [117.5, -43.7],
            ]),
        ),
        area("Southern Ocean (SA/VIC coast)", Shape::rect(136.5, -43.7, 143.5, -38.9)),
        area("Bass Strait", Shape::rect(143.5, -40.7, 148.0, -39.2)),
        area("Tasman Sea (TAS coast)", Shape::rect(148.5, -43.7, 153.7, -39.0)),
    ]
}

fn australian_states() -> Vec<NamedArea> {
    vec![
        area("Australian Capital Territory", Shape::rect(148.76, -35.92, 149.4, -35.12)),
        area("Tasmania", Shape::rect(143.8, -43.7, 148.5, -39.5)),
        area(
            "Victoria",
            Shape::polygon(&[
                [141.0, -34.0],
                [142.0, -34.2],
                [144.0, -36.0],
                [147.0, -36.0],
                [148.2, -36.8],
                [150.0, -37.5],
                [150.0, -39.2],
                [141.0, -39.2],
            ]),
        ),
        area("New South Wales", Shape::rect(141.0, -37.5, 153.7, -28.2)),
        area("Queensland", Shape::rect(138.0, -29.2, 153.7, -10.6)),
        area("South Australia", Shape::rect(129.0, -38.1, 141.0, -26.0)),
        area("Northern Territory", Shape::rect(129.0, -26.0, 138.0, -10.6)),
        area("Western Australia", Shape::rect(112.9, -35.2, 129.0, -13.7)),
    ]
}

fn australian_land_use() -> Vec<LandUseZone> {
    vec![
        // Airports and defence first so they win over the surrounding urban boxes
        zone("Sydney Airport", Shape::rect(151.15, -33.97, 151.20, -33.92), "transport", &["airport"]),
        zone("Western Sydney Airport", Shape::rect(150.69, -33.91, 150.75, -33.86), "transport", &["airport"]),
        zone("Melbourne Airport", Shape::rect(144.81, -37.70, 144.87, -37.64), "transport", &["airport"]),
        zone("Brisbane Airport", Shape::rect(153.09, -27.41, 153.15, -27.36), "transport", &["airport"]),
        zone("Canberra Airport", Shape::rect(149.18, -35.32, 149.21, -35.29), "transport", &["airport"]),
        zone("RAAF Base Richmond", Shape::rect(150.75, -33.62, 150.80, -33.58), "defence", &["military"]),
        zone("RAAF Base Williamtown", Shape::rect(151.82, -32.82, 151.86, -32.78), "defence", &["military", "airport"]),
        zone("Royal National Park", Shape::rect(151.0, -34.2, 151.15, -34.05), "protected", &["national_park"]),
        zone("Blue Mountains National Park", Shape::rect(150.2, -34.1, 150.6, -33.5), "protected", &["national_park"]),
        zone("Morton National Park", Shape::rect(150.0, -35.4, 150.5, -34.8), "protected", &["national_park"]),
        zone("Kosciuszko National Park", Shape::rect(148.2, -36.7, 148.8, -35.6), "protected", &["national_park"]),
        zone("Sydney metropolitan", Shape::rect(150.85, -34.05, 151.3, -33.65), "urban", &[]),
        zone("Melbourne metropolitan", Shape::rect(144.75, -38.0, 145.25, -37.65), "urban", &[]),
        zone("Brisbane metropolitan", Shape::rect(152.9, -27.6, 153.15, -27.35), "urban", &[]),
        zone("Canberra", Shape::rect(149.0, -35.45, 149.2, -35.15), "urban", &[]),
        zone("Wollongong", Shape::rect(150.8, -34.5, 150.95, -34.35), "residential", &[]),
        zone("Newcastle", Shape::rect(151.6, -33.0, 151.8, -32.85), "residential", &[]),
        zone("Hawkesbury floodplain", Shape::rect(150.75, -33.65, 150.95, -33.5), "agricultural", &["flood_zone"]),
        zone("Riverina", Shape::rect(145.0, -35.5, 148.0, -34.0), "agricultural", &[]),
        zone("Darling Downs", Shape::rect(150.5, -28.2, 152.0, -27.0), "agricultural", &[]),
        zone("Hunter Valley", Shape::rect(150.8, -32.8, 151.5, -32.3), "agricultural", &[]),
    ]
}

fn australian_population_centres() -> Vec<PopulationCentre> {
    vec![
        centre("Sydney", 151.21, -33.87, 3000.0, 40.0),
        centre("Melbourne", 144.96, -37.81, 2500.0, 40.0),
        centre("Brisbane", 153.03, -27.47, 2000.0, 30.0),
        centre("Perth", 115.86, -31.95, 1500.0, 30.0),
        centre("Adelaide", 138.60, -34.93, 1400.0, 25.0),
        centre("Canberra", 149.13, -35.28, 1000.0, 15.0),
        centre("Newcastle", 151.78, -32.93, 1200.0, 15.0),
        centre("Wollongong", 150.89, -34.42, 1000.0, 12.0),
        centre("Gold Coast", 153.40, -28.00, 1200.0, 20.0),
        centre("Geelong", 144.36, -38.15, 700.0, 10.0),
        centre("Hobart", 147.33, -42.88, 800.0, 12.0),
        centre("Townsville", 146.80, -19.26, 600.0, 12.0),
        centre("Cairns", 145.77, -16.92, 500.0, 10.0),
        centre("Darwin", 130.84, -12.46, 600.0, 12.0),
    ]
}

fn australian_terrain() -> Vec<TerrainZone> {
    vec![
        terrain("Sydney basin", Shape::rect(150.6, -34.2, 151.35, -33.5), 60.0),
        terrain("Snowy Mountains", Shape::rect(148.0, -37.0, 149.0, -35.5), 1500.0),
        terrain("Victorian Alps", Shape::rect(146.0, -37.6, 148.0, -36.4), 1200.0),
        terrain("Blue Mountains / Southern Tablelands", Shape::rect(149.5, -35.0, 150.6, -32.5), 850.0),
        terrain("New England Tablelands", Shape::rect(151.0, -31.5, 152.3, -29.0), 1000.0),
        terrain("Tasmanian Central Highlands", Shape::rect(145.8, -42.3, 147.0, -41.5), 900.0),
        terrain("Nullarbor Plain", Shape::rect(125.0, -32.0, 132.0, -30.0), 120.0),
        terrain("Lake Eyre Basin", Shape::rect(136.0, -30.0, 140.0, -26.0), 10.0),
    ]
}
