//! Orbital Mechanics Library
//!
//! Constellation geometry as seen from a fixed ground point: orbital shells,
//! pass statistics, RF link budgets and elevation geometry. Used by the site selector
//! to rate how well a candidate location is served by a broadband constellation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod link_budget;
pub mod passes;

pub use link_budget::{LinkBudgetBreakdown, LinkBudgetParams};
pub use passes::ShellPassMetrics;

/// Equatorial Earth radius (km)
pub const EARTH_RADIUS_KM: f64 = 6378.137;
/// Standard gravitational parameter of Earth (km³/s²)
pub const EARTH_MU_KM3_S2: f64 = 398600.4418;
pub const SECONDS_PER_DAY: f64 = 86400.0;

#[derive(Error, Debug)]
pub enum OrbitalError {
    #[error("Invalid shell {name}: {reason}")]
    InvalidShell { name: String, reason: String },
    #[error("Invalid constellation: {0}")]
    InvalidConstellation(String),
}

pub type Result<T> = std::result::Result<T, OrbitalError>;

/// One orbital shell of a constellation (common altitude and inclination)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrbitalShell {
    pub name: String,
    pub altitude_km: f64,
    pub inclination_deg: f64,
    pub satellites: u32,
    pub planes: u32,
}

impl OrbitalShell {
    pub fn new(name: &str, altitude_km: f64, inclination_deg: f64, satellites: u32, planes: u32) -> Self {
        Self {
            name: name.to_string(),
            altitude_km,
            inclination_deg,
            satellites,
            planes,
        }
    }

    pub fn orbital_radius_km(&self) -> f64 {
        EARTH_RADIUS_KM + self.altitude_km
    }

    /// Keplerian period of a circular orbit (s)
    pub fn period_s(&self) -> f64 {
        2.0 * std::f64::consts::PI * (self.orbital_radius_km().powi(3) / EARTH_MU_KM3_S2).sqrt()
    }

    pub fn revolutions_per_day(&self) -> f64 {
        SECONDS_PER_DAY / self.period_s()
    }

    /// Inclination folded into [0, 90] so retrograde shells reach the same latitudes
    pub fn effective_inclination_deg(&self) -> f64 {
        if self.inclination_deg > 90.0 {
            180.0 - self.inclination_deg
        } else {
            self.inclination_deg
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| OrbitalError::InvalidShell {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if !self.altitude_km.is_finite() || self.altitude_km <= 0.0 {
            return Err(invalid("altitude must be positive"));
        }
        if !(0.0..=180.0).contains(&self.inclination_deg) {
            return Err(invalid("inclination must be within [0, 180] degrees"));
        }
        if self.satellites == 0 || self.planes == 0 {
            return Err(invalid("satellite and plane counts must be non-zero"));
        }
        if self.planes > self.satellites {
            return Err(invalid("more planes than satellites"));
        }
        Ok(())
    }
}

/// Immutable constellation description shared by every orbital-pass evaluation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConstellationModel {
    pub name: String,
    pub shells: Vec<OrbitalShell>,
    /// Minimum usable elevation angle for a ground terminal
    pub min_elevation_deg: f64,
    pub link: LinkBudgetParams,
}

impl Default for ConstellationModel {
    fn default() -> Self {
        Self::leo_broadband()
    }
}

impl ConstellationModel {
    /// Four-shell Ku-band LEO broadband constellation
    pub fn leo_broadband() -> Self {
        Self {
            name: "leo-broadband".to_string(),
            shells: vec![
                OrbitalShell::new("shell-1", 550.0, 53.0, 1584, 72),
                OrbitalShell::new("shell-2", 540.0, 53.2, 1584, 72),
                OrbitalShell::new("shell-3", 570.0, 70.0, 720, 36),
                OrbitalShell::new("polar", 560.0, 97.6, 348, 6),
            ],
            min_elevation_deg: 25.0,
            link: LinkBudgetParams::default(),
        }
    }

    pub fn total_satellites(&self) -> u32 {
        self.shells.iter().map(|s| s.satellites).sum()
    }

    pub fn validate(&self) -> Result<()> {
        if self.shells.is_empty() {
            return Err(OrbitalError::InvalidConstellation(format!(
                "{} has no orbital shells",
                self.name
            )));
        }
        if !(0.0..90.0).contains(&self.min_elevation_deg) {
            return Err(OrbitalError::InvalidConstellation(format!(
                "minimum elevation {} outside [0, 90)",
                self.min_elevation_deg
            )));
        }
        for shell in &self.shells {
            shell.validate()?;
        }
        self.link.validate()
    }
}

pub mod transforms {
    use super::*;
    use nalgebra::Vector3;

    /// Elevation (deg) of a satellite whose sub-point is `central_angle_rad`
    /// away from the observer, on a spherical Earth
    pub fn elevation_from_central_angle_deg(central_angle_rad: f64, orbital_radius_km: f64) -> f64 {
        let station = Vector3::new(EARTH_RADIUS_KM, 0.0, 0.0);
        let satellite = Vector3::new(
            orbital_radius_km * central_angle_rad.cos(),
            orbital_radius_km * central_angle_rad.sin(),
            0.0,
        );

        let line_of_sight = satellite - station;
        let range = line_of_sight.norm();
        if range <= f64::EPSILON {
            return 90.0;
        }

        (line_of_sight.dot(&station.normalize()) / range)
            .clamp(-1.0, 1.0)
            .asin()
            .to_degrees()
    }

    /// Slant range (km) to a satellite at `altitude_km` seen at `elevation_deg`
    pub fn slant_range_km(elevation_deg: f64, altitude_km: f64) -> f64 {
        let earth_r = EARTH_RADIUS_KM;
        let sat_r = earth_r + altitude_km;
        let sin_el = elevation_deg.to_radians().sin();

        let range = -earth_r * sin_el
            + ((earth_r * sin_el).powi(2) + sat_r.powi(2) - earth_r.powi(2)).sqrt();

        range.max(altitude_km)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leo_period() {
        let shell = OrbitalShell::new("test", 550.0, 53.0, 100, 10);
        let minutes = shell.period_s() / 60.0;
        assert!((minutes - 95.6).abs() < 1.0, "period was {} min", minutes);
        assert!(shell.revolutions_per_day() > 15.0);
    }

    #[test]
    fn test_retrograde_inclination_folds() {
        let polar = OrbitalShell::new("polar", 560.0, 97.6, 348, 6);
        assert!((polar.effective_inclination_deg() - 82.4).abs() < 1e-9);
    }

    #[test]
    fn test_default_constellation_is_valid() {
        let model = ConstellationModel::default();
        assert!(model.validate().is_ok());
        assert_eq!(model.total_satellites(), 4236);
    }

    #[test]
    fn test_invalid_shell_rejected() {
        let mut model = ConstellationModel::default();
        model.shells.push(OrbitalShell::new("broken", -10.0, 53.0, 10, 2));
        assert!(model.validate().is_err());

        let empty = ConstellationModel {
            shells: Vec::new(),
            ..ConstellationModel::default()
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_overhead_elevation() {
        let el = transforms::elevation_from_central_angle_deg(0.0, EARTH_RADIUS_KM + 550.0);
        assert!((el - 90.0).abs() < 1e-6);

        let far = transforms::elevation_from_central_angle_deg(0.5, EARTH_RADIUS_KM + 550.0);
        assert!(far < 0.0, "sub-point 3200 km away is below the horizon: {}", far);
    }

    #[test]
    fn test_slant_range() {
        let zenith = transforms::slant_range_km(90.0, 550.0);
        assert!((zenith - 550.0).abs() < 1.0);

        let low = transforms::slant_range_km(25.0, 550.0);
        assert!(low > zenith, "low elevation = longer range");
    }
}
