//! RF Link Budget Calculator
//!
//! Downlink margin for a Ku-band user/gateway terminal. Accounts for:
//! - Free space path loss at the slant range
//! - Atmospheric absorption (air-mass scaled from zenith)
//! - Rain/weather fade margin by climate band
//! - Elevation angle effects

use crate::{transforms, OrbitalError, Result};
use serde::{Deserialize, Serialize};

/// Terminal and satellite parameters for the downlink budget
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinkBudgetParams {
    pub frequency_ghz: f64,
    pub satellite_eirp_dbw: f64,
    pub ground_antenna_gain_dbi: f64,
    /// Minimum received carrier power for the target modcod (dBW)
    pub rx_threshold_dbw: f64,
    pub zenith_atmospheric_loss_db: f64,
    /// Fade margin for |lat| < 23.5°
    pub tropical_weather_margin_db: f64,
    /// Fade margin for 23.5° ≤ |lat| < 60°
    pub temperate_weather_margin_db: f64,
    /// Fade margin for |lat| ≥ 60°
    pub polar_weather_margin_db: f64,
    /// Margin that earns a full link score
    pub target_margin_db: f64,
}

impl Default for LinkBudgetParams {
    fn default() -> Self {
        Self {
            frequency_ghz: 12.0,
            satellite_eirp_dbw: 36.0,
            ground_antenna_gain_dbi: 35.0,
            rx_threshold_dbw: -118.0,
            zenith_atmospheric_loss_db: 0.3,
            tropical_weather_margin_db: 4.0,
            temperate_weather_margin_db: 2.0,
            polar_weather_margin_db: 1.0,
            target_margin_db: 20.0,
        }
    }
}

impl LinkBudgetParams {
    pub fn validate(&self) -> Result<()> {
        if !self.frequency_ghz.is_finite() || self.frequency_ghz <= 0.0 {
            return Err(OrbitalError::InvalidConstellation(format!(
                "link frequency must be positive, got {}",
                self.frequency_ghz
            )));
        }
        if !self.target_margin_db.is_finite() || self.target_margin_db <= 0.0 {
            return Err(OrbitalError::InvalidConstellation(format!(
                "target link margin must be positive, got {}",
                self.target_margin_db
            )));
        }
        Ok(())
    }
}

/// Free space path loss in dB (range in km, frequency in GHz)
pub fn free_space_path_loss_db(range_km: f64, frequency_ghz: f64) -> f64 {
    92.45 + 20.0 * range_km.max(1e-3).log10() + 20.0 * frequency_ghz.log10()
}

/// Atmospheric absorption loss
pub fn atmospheric_loss_db(elevation_deg: f64, zenith_loss_db: f64) -> f64 {
    // Air mass approximation (Kasten-Young)
    let zenith_deg = 90.0 - elevation_deg.clamp(0.0, 90.0);
    let zenith_rad = zenith_deg.to_radians();

    let air_mass = 1.0 / (zenith_rad.cos() + 0.50572 * (96.07995 - zenith_deg).powf(-1.6364));

    zenith_loss_db * air_mass
}

/// Weather fade margin by climate band
pub fn weather_margin_db(latitude_deg: f64, params: &LinkBudgetParams) -> f64 {
    let abs_lat = latitude_deg.abs();
    if abs_lat < 23.5 {
        params.tropical_weather_margin_db
    } else if abs_lat < 60.0 {
        params.temperate_weather_margin_db
    } else {
        params.polar_weather_margin_db
    }
}

/// Link margin in dB; strongly negative below the horizon
pub fn link_margin_db(
    elevation_deg: f64,
    altitude_km: f64,
    latitude_deg: f64,
    params: &LinkBudgetParams,
) -> f64 {
    detailed_budget(elevation_deg, altitude_km, latitude_deg, params).link_margin_db
}

/// Normalised link quality (0-1) from a margin
pub fn margin_score(margin_db: f64, params: &LinkBudgetParams) -> f64 {
    (margin_db / params.target_margin_db).clamp(0.0, 1.0)
}

/// Detailed link budget breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkBudgetBreakdown {
    pub elevation_deg: f64,
    pub slant_range_km: f64,
    pub eirp_dbw: f64,
    pub fspl_db: f64,
    pub atmospheric_loss_db: f64,
    pub weather_margin_db: f64,
    pub rx_gain_dbi: f64,
    pub rx_power_dbw: f64,
    pub rx_threshold_dbw: f64,
    pub link_margin_db: f64,
    pub link_viable: bool,
}

/// Get detailed breakdown
pub fn detailed_budget(
    elevation_deg: f64,
    altitude_km: f64,
    latitude_deg: f64,
    params: &LinkBudgetParams,
) -> LinkBudgetBreakdown {
    let range = transforms::slant_range_km(elevation_deg.max(0.0), altitude_km);
    let fspl = free_space_path_loss_db(range, params.frequency_ghz);
    let atm_loss = atmospheric_loss_db(elevation_deg, params.zenith_atmospheric_loss_db);
    let wx_margin = weather_margin_db(latitude_deg, params);

    let rx_power = params.satellite_eirp_dbw - fspl - atm_loss - wx_margin + params.ground_antenna_gain_dbi;
    let margin = if elevation_deg <= 0.0 {
        -100.0 // Below horizon
    } else {
        rx_power - params.rx_threshold_dbw
    };

    LinkBudgetBreakdown {
        elevation_deg,
        slant_range_km: range,
        eirp_dbw: params.satellite_eirp_dbw,
        fspl_db: fspl,
        atmospheric_loss_db: atm_loss,
        weather_margin_db: wx_margin,
        rx_gain_dbi: params.ground_antenna_gain_dbi,
        rx_power_dbw: rx_power,
        rx_threshold_dbw: params.rx_threshold_dbw,
        link_margin_db: margin,
        link_viable: margin > 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fspl_ku_band() {
        // 1000 km at 12 GHz ≈ 174 dB
        let loss = free_space_path_loss_db(1000.0, 12.0);
        assert!((loss - 174.03).abs() < 0.1, "FSPL: {}", loss);
    }

    #[test]
    fn test_leo_margin_good_conditions() {
        let params = LinkBudgetParams::default();
        let margin = link_margin_db(45.0, 550.0, -33.9, &params);
        assert!(margin > 0.0, "Link should be viable: {} dB", margin);
    }

    #[test]
    fn test_meo_margin_worse_than_leo() {
        let params = LinkBudgetParams::default();
        let leo = link_margin_db(45.0, 550.0, -33.9, &params);
        let meo = link_margin_db(45.0, 8000.0, -33.9, &params);
        assert!(meo < leo);
    }

    #[test]
    fn test_tropics_need_more_fade_margin() {
        let params = LinkBudgetParams::default();
        let tropical = link_margin_db(45.0, 550.0, -12.5, &params);
        let temperate = link_margin_db(45.0, 550.0, -33.9, &params);
        assert!(tropical < temperate);
    }

    #[test]
    fn test_below_horizon() {
        let params = LinkBudgetParams::default();
        let budget = detailed_budget(-2.0, 550.0, 0.0, &params);
        assert!(budget.link_margin_db < -50.0, "Should be below horizon");
        assert!(!budget.link_viable);
    }

    #[test]
    fn test_margin_score_clamped() {
        let params = LinkBudgetParams::default();
        assert_eq!(margin_score(-5.0, &params), 0.0);
        assert_eq!(margin_score(100.0, &params), 1.0);
        assert!((margin_score(10.0, &params) - 0.5).abs() < 1e-9);
    }
}
