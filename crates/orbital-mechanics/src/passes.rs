//! Pass statistics for a ground point under one orbital shell
//!
//! Circular orbits, spherical Earth, no Earth-rotation correction. The
//! visibility cone at the minimum elevation is intersected with the shell's
//! ground tracks at the observer's latitude:
//!
//! ```text
//! λ        = acos(Rₑ·cos ε / r) − ε          (coverage half-angle)
//! T_max    = (λ / π) · T                    (overhead pass duration)
//! passes/d = N · revs/d · crossings · min(1, λ / (π·cos φ))
//! ```

use crate::{transforms, OrbitalShell, EARTH_RADIUS_KM};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Visibility statistics of one shell from one ground point
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShellPassMetrics {
    pub shell: String,
    /// Passes above the minimum elevation per day, whole shell
    pub daily_passes: f64,
    /// Mean pass duration above the minimum elevation (minutes)
    pub avg_pass_duration_min: f64,
    /// Duration of an overhead pass (minutes)
    pub max_pass_duration_min: f64,
    /// Best achievable elevation angle (degrees)
    pub max_elevation_deg: f64,
    pub visible: bool,
}

/// Earth central angle (rad) of the visibility cone at `min_elevation_deg`
pub fn coverage_half_angle_rad(altitude_km: f64, min_elevation_deg: f64) -> f64 {
    let eps = min_elevation_deg.to_radians();
    let r = EARTH_RADIUS_KM + altitude_km;
    ((EARTH_RADIUS_KM * eps.cos() / r).clamp(-1.0, 1.0)).acos() - eps
}

/// Pass geometry of `shell` seen from latitude `latitude_deg`
pub fn shell_pass_metrics(shell: &OrbitalShell, latitude_deg: f64, min_elevation_deg: f64) -> ShellPassMetrics {
    let lambda = coverage_half_angle_rad(shell.altitude_km, min_elevation_deg).max(0.0);
    let lat = latitude_deg.abs().min(90.0).to_radians();
    let inclination = shell.effective_inclination_deg().to_radians();

    let max_pass_duration_min = lambda / PI * shell.period_s() / 60.0;

    // Angular gap between the observer and the highest latitude the ground track reaches
    let excess = (lat - inclination).max(0.0);
    let max_elevation_deg =
        transforms::elevation_from_central_angle_deg(excess, shell.orbital_radius_km()).max(0.0);

    if lambda <= 0.0 || excess >= lambda {
        return ShellPassMetrics {
            shell: shell.name.clone(),
            daily_passes: 0.0,
            avg_pass_duration_min: 0.0,
            max_pass_duration_min,
            max_elevation_deg,
            visible: false,
        };
    }

    // Share of the cone still reachable when the observer sits poleward of the tracks
    let reach = if excess > 0.0 { 1.0 - excess / lambda } else { 1.0 };

    // Fraction of longitudes swept by the visibility cone at each latitude crossing
    let cos_lat = lat.cos().max(0.05);
    let crossing_fraction = (lambda / (PI * cos_lat)).min(1.0);
    let crossings_per_rev = 2.0 * reach;

    let per_satellite = shell.revolutions_per_day() * crossings_per_rev * crossing_fraction;
    let daily_passes = per_satellite * shell.satellites as f64;

    // Mean chord through the visibility circle for uniformly distributed offsets
    let avg_pass_duration_min = max_pass_duration_min * (PI / 4.0) * reach;

    ShellPassMetrics {
        shell: shell.name.clone(),
        daily_passes,
        avg_pass_duration_min,
        max_pass_duration_min,
        max_elevation_deg,
        visible: true,
    }
}
