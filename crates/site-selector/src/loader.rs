//! Infrastructure data loading
//!
//! Two sources feed the in-memory spatial index:
//! - carrier mobile-site CSV exports (`RFNSA ID`, `Latitude`, `Longitude` and
//!   one `Y`-flagged column per frequency band), loaded as RF emitters
//! - generic JSON feature files (backhaul points, emitters, ground stations)

use crate::collaborators::{Feature, FeatureKind};
use crate::{Result, SelectorError};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Bounds accepted for carrier site coordinates
const AU_MIN_LAT: f64 = -50.000000000;
const AU_MAX_LAT: f64 = -10.000000000;
const AU_MIN_LON: f64 = 110.000000000;
const AU_MAX_LON: f64 = 160.000000000;

/// Validate latitude is in valid range
fn is_valid_latitude(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && lat.is_finite()
}

/// Validate longitude is in valid range
fn is_valid_longitude(lon: f64) -> bool {
    (-180.0..=180.0).contains(&lon) && lon.is_finite()
}

fn in_australian_bounds(lat: f64, lon: f64) -> bool {
    (AU_MIN_LAT..=AU_MAX_LAT).contains(&lat) && (AU_MIN_LON..=AU_MAX_LON).contains(&lon)
}

/// Sanitize ID (alphanumeric, dash, underscore only)
fn sanitize_id(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .take(128)
        .collect()
}

/// Sanitize name (allow more chars but still limit)
fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || " -_.,()&'/".contains(*c))
        .take(256)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Carrier {
    Optus,
    Telstra,
    Tpg,
}

impl Carrier {
    /// Band columns present in the carrier's site export
    pub fn band_columns(&self) -> &'static [&'static str] {
        match self {
            Carrier::Optus => &[
                "NBIoT700", "UMTS900", "UMTS2100", "LTE700", "LTE900", "LTE1800", "LTE2100", "LTE2300",
                "LTE2600", "NR900", "NR2100", "NR2300", "NR3500", "NR26000",
            ],
            Carrier::Telstra => &[
                "GSM900", "IoT700", "WCDMA850", "WCDMA2100", "LTE700", "LTE850", "LTE900", "LTE1800",
                "LTE2100", "LTE2600", "NR700", "NR850", "NR2100", "NR2600", "NR3600", "NR26000",
            ],
            Carrier::Tpg => &[
                "NBIoT850", "LTE700", "LTE850", "LTE1800", "LTE2100", "NR700", "NR1800", "NR2100",
                "NR3600", "NR26000",
            ],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Carrier::Optus => "Optus",
            Carrier::Telstra => "Telstra",
            Carrier::Tpg => "TPG",
        }
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Carrier {
    type Err = SelectorError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "optus" => Ok(Carrier::Optus),
            "telstra" => Ok(Carrier::Telstra),
            "tpg" => Ok(Carrier::Tpg),
            other => Err(SelectorError::Config(format!("unknown carrier: {}", other))),
        }
    }
}

/// Primary radio generation of a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Technology {
    #[serde(rename = "5G")]
    FiveG,
    #[serde(rename = "4G/LTE")]
    Lte,
    #[serde(rename = "3G")]
    ThreeG,
    #[serde(rename = "2G")]
    TwoG,
    Unknown,
}

impl Technology {
    pub fn label(&self) -> &'static str {
        match self {
            Technology::FiveG => "5G",
            Technology::Lte => "4G/LTE",
            Technology::ThreeG => "3G",
            Technology::TwoG => "2G",
            Technology::Unknown => "Unknown",
        }
    }

    /// Typical sector transmit power (W)
    pub fn typical_power_w(&self) -> f64 {
        match self {
            Technology::FiveG => 40.0,
            Technology::Lte => 20.0,
            Technology::ThreeG => 20.0,
            Technology::TwoG => 15.0,
            Technology::Unknown => 20.0,
        }
    }
}

/// Newest generation among the active bands
pub fn determine_technology(bands: &[String]) -> Technology {
    if bands.iter().any(|b| b.contains("NR")) {
        Technology::FiveG
    } else if bands.iter().any(|b| b.contains("LTE")) {
        Technology::Lte
    } else if bands.iter().any(|b| b.contains("UMTS") || b.contains("WCDMA")) {
        Technology::ThreeG
    } else if bands.iter().any(|b| b.contains("GSM")) {
        Technology::TwoG
    } else {
        Technology::Unknown
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobileSite {
    pub site_id: String,
    pub carrier: Carrier,
    pub site_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub frequency_bands: Vec<String>,
    pub technology: Technology,
    /// "Co-funded" or "Standard"
    pub site_type: String,
}

impl MobileSite {
    pub fn into_feature(self) -> Feature {
        Feature {
            id: format!("{}-{}", self.carrier.name().to_lowercase(), self.site_id),
            name: self.site_name,
            kind: FeatureKind::Emitter,
            longitude: self.longitude,
            latitude: self.latitude,
            carrier: Some(self.carrier.name().to_string()),
            technology: Some(self.technology.label().to_string()),
            power_w: Some(self.technology.typical_power_w()),
            site_type: Some(self.site_type),
        }
    }
}

/// Column positions resolved from the CSV header
struct SiteColumns {
    id: usize,
    latitude: usize,
    longitude: usize,
    bands: Vec<(usize, &'static str)>,
    co_funded: Option<usize>,
    co_program: Option<usize>,
}

impl SiteColumns {
    fn resolve(headers: &StringRecord, carrier: Carrier) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| {
                SelectorError::Config(format!("{} site file is missing the {:?} column", carrier, name))
            })
        };

        Ok(Self {
            id: require("RFNSA ID")?,
            latitude: require("Latitude")?,
            longitude: require("Longitude")?,
            bands: carrier
                .band_columns()
                .iter()
                .filter_map(|band| find(band).map(|i| (i, *band)))
                .collect(),
            co_funded: find("Co_funded"),
            co_program: find("Co_contribution_program"),
        })
    }
}

fn parse_site(record: &StringRecord, columns: &SiteColumns, carrier: Carrier) -> Option<MobileSite> {
    let raw_id = record.get(columns.id)?.trim();
    let site_id = sanitize_id(raw_id);
    if site_id.is_empty() {
        return None;
    }

    let latitude: f64 = record.get(columns.latitude)?.trim().parse().ok()?;
    let longitude: f64 = record.get(columns.longitude)?.trim().parse().ok()?;
    if !in_australian_bounds(latitude, longitude) {
        warn!(
            "Skipping {} site {} with invalid coordinates: {}, {}",
            carrier, site_id, latitude, longitude
        );
        return None;
    }

    let frequency_bands: Vec<String> = columns
        .bands
        .iter()
        .filter(|(i, _)| record.get(*i).is_some_and(|v| v.trim().eq_ignore_ascii_case("y")))
        .map(|(_, band)| band.to_string())
        .collect();
    let technology = determine_technology(&frequency_bands);

    let mut site_name = format!("{} Site {}", carrier, site_id);
    let co_funded = columns
        .co_funded
        .and_then(|i| record.get(i))
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("y"));
    if co_funded {
        if let Some(program) = columns.co_program.and_then(|i| record.get(i)) {
            site_name = format!("{} ({})", site_name, program.trim());
        }
    }

    Some(MobileSite {
        site_id,
        carrier,
        site_name: sanitize_name(&site_name),
        latitude,
        longitude,
        frequency_bands,
        technology,
        site_type: if co_funded { "Co-funded" } else { "Standard" }.to_string(),
    })
}

/// Load one carrier's mobile-site CSV export
pub fn load_mobile_sites(path: impl AsRef<Path>, carrier: Carrier) -> Result<Vec<MobileSite>> {
    let path = path.as_ref();
    info!("Loading {} mobile sites from {:?}", carrier, path);

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::Headers)
        .from_path(path)?;
    let columns = SiteColumns::resolve(reader.headers()?, carrier)?;

    let mut sites = Vec::new();
    let mut skipped = 0;

    for (row, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Error reading row {} of {} sites: {}", row, carrier, e);
                skipped += 1;
                continue;
            }
        };
        match parse_site(&record, &columns, carrier) {
            Some(site) => sites.push(site),
            None => skipped += 1,
        }
    }

    info!("Loaded {} {} sites ({} skipped)", sites.len(), carrier, skipped);
    Ok(sites)
}

/// Raw feature from JSON
#[derive(Debug, Deserialize)]
struct RawFeature {
    id: Option<String>,
    name: Option<String>,
    kind: FeatureKind,
    latitude: Option<f64>,
    longitude: Option<f64>,
    carrier: Option<String>,
    technology: Option<String>,
    power_w: Option<f64>,
    site_type: Option<String>,
}

/// Load features from a JSON array or a `{"features": [...]}` object
pub fn load_features(path: impl AsRef<Path>) -> Result<Vec<Feature>> {
    let path = path.as_ref();
    info!("Loading features from {:?}", path);

    let file = File::open(path)?;
    let raw: serde_json::Value = serde_json::from_reader(BufReader::new(file))?;

    let items: Vec<RawFeature> = if let Some(features) = raw.get("features") {
        serde_json::from_value(features.clone())?
    } else if raw.is_array() {
        serde_json::from_value(raw)?
    } else {
        return Err(SelectorError::Config(format!(
            "{:?} is neither a feature array nor an object with a features field",
            path
        )));
    };

    let mut features = Vec::new();
    let mut skipped = 0;

    for (i, item) in items.into_iter().enumerate() {
        let (latitude, longitude) = match (item.latitude, item.longitude) {
            (Some(lat), Some(lon)) if is_valid_latitude(lat) && is_valid_longitude(lon) => (lat, lon),
            _ => {
                skipped += 1;
                continue;
            }
        };

        let id = sanitize_id(&item.id.unwrap_or_else(|| format!("{}-{}", item.kind, i)));
        let name = sanitize_name(&item.name.unwrap_or_else(|| id.clone()));

        features.push(Feature {
            id,
            name,
            kind: item.kind,
            longitude,
            latitude,
            carrier: item.carrier,
            technology: item.technology,
            power_w: item.power_w.filter(|p| p.is_finite() && *p >= 0.0),
            site_type: item.site_type,
        });
    }

    info!(
        "Loaded {} features ({} skipped for missing coords)",
        features.len(),
        skipped
    );

    Ok(features)
}

/// Load and merge every feature source
pub fn load_all_features<P: AsRef<Path>>(feature_files: &[P], mobile_sites: &[(Carrier, P)]) -> Result<Vec<Feature>> {
    let mut all = Vec::new();

    for path in feature_files {
        all.extend(load_features(path)?);
    }
    for (carrier, path) in mobile_sites {
        all.extend(
            load_mobile_sites(path, *carrier)?
                .into_iter()
                .map(MobileSite::into_feature),
        );
    }

    info!("Total features: {}", all.len());
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_determine_technology() {
        let bands = |b: &[&str]| b.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(determine_technology(&bands(&["LTE700", "NR3500"])), Technology::FiveG);
        assert_eq!(determine_technology(&bands(&["LTE700"])), Technology::Lte);
        assert_eq!(determine_technology(&bands(&["WCDMA850"])), Technology::ThreeG);
        assert_eq!(determine_technology(&bands(&["UMTS900"])), Technology::ThreeG);
        assert_eq!(determine_technology(&bands(&["GSM900"])), Technology::TwoG);
        assert_eq!(determine_technology(&bands(&["NBIoT700"])), Technology::Unknown);
        assert_eq!(determine_technology(&[]), Technology::Unknown);
    }

    #[test]
    fn test_load_telstra_sites() {
        let csv = "RFNSA ID,Latitude,Longitude,GSM900,LTE700,NR3600,Co_funded,Co_contribution_program\n\
                   2000001,-33.87,151.21,Y,Y,N,N,\n\
                   2000002,-35.5,149.1,,y,Y,Y,Mobile Black Spot\n\
                   2000003,51.5,-0.12,Y,,,N,\n\
                   2000004,not-a-number,150.0,Y,,,N,\n";
        let file = write_temp(csv);

        let sites = load_mobile_sites(file.path(), Carrier::Telstra).unwrap();
        assert_eq!(sites.len(), 2);

        assert_eq!(sites[0].site_name, "Telstra Site 2000001");
        assert_eq!(sites[0].technology, Technology::Lte);
        assert_eq!(sites[0].frequency_bands, vec!["GSM900", "LTE700"]);
        assert_eq!(sites[0].site_type, "Standard");

        assert_eq!(sites[1].technology, Technology::FiveG);
        assert_eq!(sites[1].site_type, "Co-funded");
        assert_eq!(sites[1].site_name, "Telstra Site 2000002 (Mobile Black Spot)");
    }

    #[test]
    fn test_missing_required_column() {
        let file = write_temp("Site,Latitude,Longitude\n1,-33.0,151.0\n");
        let err = load_mobile_sites(file.path(), Carrier::Optus).unwrap_err();
        assert!(matches!(err, SelectorError::Config(_)));
    }

    #[test]
    fn test_mobile_site_feature() {
        let csv = "RFNSA ID,Latitude,Longitude,LTE700,NR2100\n3000001,-27.47,153.03,Y,Y\n";
        let file = write_temp(csv);
        let feature = load_mobile_sites(file.path(), Carrier::Tpg)
            .unwrap()
            .remove(0)
            .into_feature();

        assert_eq!(feature.id, "tpg-3000001");
        assert_eq!(feature.kind, FeatureKind::Emitter);
        assert_eq!(feature.power_w, Some(40.0));
        assert_eq!(feature.technology.as_deref(), Some("5G"));
    }

    #[test]
    fn test_load_features_both_layouts() {
        let array = write_temp(
            r#"[
                {"id": "pop-syd", "name": "Sydney POP", "kind": "backhaul", "latitude": -33.87, "longitude": 151.2},
                {"id": "no-coords", "kind": "backhaul"}
            ]"#,
        );
        let features = load_features(array.path()).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].kind, FeatureKind::Backhaul);

        let object = write_temp(
            r#"{"features": [{"kind": "ground_station", "latitude": -35.4, "longitude": 148.98}]}"#,
        );
        let features = load_features(object.path()).unwrap();
        assert_eq!(features[0].id, "ground_station-0");
    }

    #[test]
    fn test_load_all_features() {
        let json = write_temp(r#"[{"id": "gs", "kind": "ground_station", "latitude": -31.8, "longitude": 115.9}]"#);
        let csv = write_temp("RFNSA ID,Latitude,Longitude,LTE700\n1,-33.0,151.0,Y\n");

        let all = load_all_features(&[json.path()], &[(Carrier::Optus, csv.path())]).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|f| f.kind == FeatureKind::Emitter));
    }

    #[test]
    fn test_carrier_parse() {
        assert_eq!("TPG".parse::<Carrier>().unwrap(), Carrier::Tpg);
        assert!("vodafone".parse::<Carrier>().is_err());
    }
}
