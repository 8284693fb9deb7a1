//! Land filter
//!
//! Cheap synchronous screen applied to every grid point before scoring. A point
//! is likely land when it lies inside the operating envelope and outside every
//! configured water body. Heuristic only; land-use detail comes later from the
//! land classifier.

use crate::regions::RegionTable;
use crate::GeoPoint;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LandFilter {
    regions: Arc<RegionTable>,
}

impl LandFilter {
    pub fn new(regions: Arc<RegionTable>) -> Self {
        Self { regions }
    }

    /// Never fails; non-finite input is not land
    pub fn is_likely_land(&self, longitude: f64, latitude: f64) -> bool {
        if !longitude.is_finite() || !latitude.is_finite() {
            return false;
        }

        let point = GeoPoint::new(longitude, latitude);
        self.regions.in_envelope(point) && self.regions.water_body_at(point).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> LandFilter {
        LandFilter::new(Arc::new(RegionTable::australia()))
    }

    #[test]
    fn test_inland_points_are_land() {
        let land = filter();
        assert!(land.is_likely_land(151.0, -33.8)); // Parramatta
        assert!(land.is_likely_land(149.13, -35.28)); // Canberra
        assert!(land.is_likely_land(133.88, -23.7)); // Alice Springs
        assert!(land.is_likely_land(144.96, -37.81)); // Melbourne
    }

    #[test]
    fn test_sea_points_are_not_land() {
        let land = filter();
        assert!(!land.is_likely_land(152.5, -34.0)); // Tasman Sea off Sydney
        assert!(!land.is_likely_land(139.0, -14.0)); // Gulf of Carpentaria
        assert!(!land.is_likely_land(130.0, -36.0)); // Great Australian Bight
    }

    #[test]
    fn test_outside_envelope() {
        let land = filter();
        assert!(!land.is_likely_land(0.0, 51.5));
        assert!(!land.is_likely_land(174.8, -41.3));
    }

    #[test]
    fn test_non_finite_input() {
        let land = filter();
        assert!(!land.is_likely_land(f64::NAN, -33.8));
        assert!(!land.is_likely_land(151.0, f64::INFINITY));
    }
}
