//! Adaptive candidate grid
//!
//! ```text
//! res₀  = base × tier(area)             (coarsest tier whose threshold ≤ area)
//! E     = ⌈w/res₀⌉ × ⌈h/res₀⌉
//! res   = max(res₀·√(E/C), r_cap)       if E > C, else res₀
//! r_cap = smallest r with (w/r + 1)(h/r + 1) ≤ C
//! ```
//!
//! The lattice starts at the south-west corner and is filtered through the
//! land filter, so the candidate count never exceeds C.

use crate::config::GridConfig;
use crate::land::LandFilter;
use crate::{BoundingBox, Candidate, GeoPoint, Result, SelectorError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Resolution chosen for one bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPlan {
    pub area_sq_deg: f64,
    pub tier_multiplier: f64,
    pub resolution_deg: f64,
    pub columns: usize,
    pub rows: usize,
    /// Resolution was coarsened to respect the candidate cap
    pub capped: bool,
}

impl GridPlan {
    pub fn lattice_points(&self) -> usize {
        self.columns.saturating_mul(self.rows)
    }
}

#[derive(Debug, Clone)]
pub struct CandidateGrid {
    pub plan: GridPlan,
    /// Land points only, in row-major order from the south-west corner
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone)]
pub struct GridGenerator {
    config: GridConfig,
    land: LandFilter,
}

impl GridGenerator {
    pub fn new(config: GridConfig, land: LandFilter) -> Self {
        Self { config, land }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Plan and walk the lattice for `bbox`
    pub fn generate(&self, bbox: &BoundingBox, base_resolution_deg: f64) -> Result<CandidateGrid> {
        let plan = self.plan(bbox, base_resolution_deg)?;

        let mut seen = HashSet::with_capacity(plan.lattice_points());
        let mut candidates = Vec::with_capacity(plan.lattice_points());

        for row in 0..plan.rows {
            let latitude = bbox.min_lat + row as f64 * plan.resolution_deg;
            for col in 0..plan.columns {
                let longitude = bbox.min_lon + col as f64 * plan.resolution_deg;
                if !self.land.is_likely_land(longitude, latitude) {
                    continue;
                }
                let candidate = Candidate::at(GeoPoint::new(longitude, latitude));
                if seen.insert(candidate.id.clone()) {
                    candidates.push(candidate);
                }
            }
        }

        info!(
            "Grid: {:.2} deg² at {:.4}° ({}x{}), {} land candidates{}",
            plan.area_sq_deg,
            plan.resolution_deg,
            plan.columns,
            plan.rows,
            candidates.len(),
            if plan.capped { " (capped)" } else { "" }
        );

        Ok(CandidateGrid { plan, candidates })
    }

    pub fn plan(&self, bbox: &BoundingBox, base_resolution_deg: f64) -> Result<GridPlan> {
        if !base_resolution_deg.is_finite() || base_resolution_deg <= 0.0 {
            return Err(SelectorError::InvalidResolution(base_resolution_deg));
        }

        let (width, height) = (bbox.width(), bbox.height());
        let area = bbox.area_sq_deg();
        let multiplier = tier_multiplier(&self.config, area);
        let tiered = base_resolution_deg * multiplier;

        let cap = self.config.max_candidates;
        // Kept in f64 so tiny resolutions cannot overflow before coarsening
        let expected = axis_span(width, tiered) * axis_span(height, tiered);

        let (resolution_deg, capped) = if expected > cap as f64 {
            let cap_res = cap_resolution(width, height, cap);
            let scaled = tiered * (expected / cap as f64).sqrt();
            let res = if scaled.is_finite() { scaled.max(cap_res) } else { cap_res };
            debug!(
                "Expected {:.0} points over cap {}, coarsening {:.4}° -> {:.4}°",
                expected, cap, tiered, res
            );
            (res, true)
        } else {
            (tiered, false)
        };

        Ok(GridPlan {
            area_sq_deg: area,
            tier_multiplier: multiplier,
            resolution_deg,
            columns: axis_steps(width, resolution_deg).min(cap.max(1)),
            rows: axis_steps(height, resolution_deg).min(cap.max(1)),
            capped,
        })
    }
}

/// Multiplier of the coarsest tier whose (inclusive) threshold the area reaches
pub fn tier_multiplier(config: &GridConfig, area_sq_deg: f64) -> f64 {
    config
        .tiers
        .iter()
        .filter(|t| area_sq_deg >= t.min_area_sq_deg)
        .map(|t| t.multiplier)
        .fold(1.0, f64::max)
}

/// Lattice points along one axis as a float, at least one
fn axis_span(span: f64, resolution: f64) -> f64 {
    let steps = (span / resolution - 1e-9).ceil();
    if steps.is_nan() || steps < 1.0 {
        1.0
    } else {
        steps
    }
}

/// Lattice points along one axis, at least one
pub fn axis_steps(span: f64, resolution: f64) -> usize {
    let steps = axis_span(span, resolution);
    if steps >= usize::MAX as f64 {
        usize::MAX
    } else {
        steps as usize
    }
}

/// Smallest resolution r with (w/r + 1)(h/r + 1) ≤ cap
pub fn cap_resolution(width: f64, height: f64, cap: usize) -> f64 {
    let c = cap as f64;
    if c <= 1.0 {
        return width.max(height) * (1.0 + 1e-9);
    }

    let wh = width * height;
    let sum = width + height;
    let r = if wh <= f64::EPSILON {
        if sum <= 0.0 {
            return 0.0;
        }
        sum / (c - 1.0)
    } else {
        // Largest x = 1/r solving wh·x² + (w+h)·x − (C−1) = 0
        let x = (-sum + (sum * sum + 4.0 * wh * (c - 1.0)).sqrt()) / (2.0 * wh);
        1.0 / x
    };

    r * (1.0 + 1e-9)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::RegionTable;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn generator() -> GridGenerator {
        GridGenerator::new(
            GridConfig::default(),
            LandFilter::new(Arc::new(RegionTable::australia())),
        )
    }

    fn square(side: f64) -> BoundingBox {
        BoundingBox {
            min_lon: 120.0,
            min_lat: -30.0,
            max_lon: 120.0 + side,
            max_lat: -30.0 + side,
        }
    }

    #[test]
    fn test_sydney_box_uses_x10_tier() {
        let bbox = BoundingBox::new(150.0, -35.0, 152.0, -33.0).unwrap();
        let grid = generator().generate(&bbox, 0.01).unwrap();

        assert_eq!(grid.plan.tier_multiplier, 10.0);
        assert!(!grid.plan.capped);
        assert!((grid.plan.resolution_deg - 0.1).abs() < 1e-12);
        assert_eq!(grid.plan.columns, 20);
        assert!(!grid.candidates.is_empty());
        // Sea points east of the coast are dropped
        assert!(grid.candidates.len() < grid.plan.lattice_points());
    }

    #[test]
    fn test_small_box_keeps_base_resolution() {
        let bbox = square(0.1);
        let plan = generator().plan(&bbox, 0.01).unwrap();
        assert_eq!(plan.tier_multiplier, 1.0);
        assert_eq!(plan.columns, 10);
        assert_eq!(plan.rows, 10);
    }

    #[test]
    fn test_large_box_respects_cap() {
        let bbox = BoundingBox::new(115.0, -35.0, 150.0, -20.0).unwrap();
        let grid = generator().generate(&bbox, 0.01).unwrap();
        assert_eq!(grid.plan.tier_multiplier, 50.0);
        assert!(grid.plan.lattice_points() <= 1000);
        assert!(grid.candidates.len() <= 1000);
    }

    #[test]
    fn test_degenerate_box_yields_corner() {
        let bbox = BoundingBox {
            min_lon: 133.88,
            min_lat: -23.7,
            max_lon: 133.88,
            max_lat: -23.7,
        };
        let grid = generator().generate(&bbox, 0.01).unwrap();
        assert_eq!(grid.candidates.len(), 1);
        assert_eq!(grid.candidates[0].id, "site_-23.7000_133.8800");
    }

    #[test]
    fn test_all_water_box_is_empty() {
        let bbox = BoundingBox::new(153.8, -36.0, 154.5, -35.0).unwrap();
        let grid = generator().generate(&bbox, 0.01).unwrap();
        assert!(grid.candidates.is_empty());
    }

    #[test]
    fn test_invalid_resolution() {
        let bbox = square(1.0);
        assert!(matches!(
            generator().plan(&bbox, 0.0),
            Err(SelectorError::InvalidResolution(_))
        ));
        assert!(generator().plan(&bbox, f64::NAN).is_err());
    }

    #[test]
    fn test_cap_resolution_bounds_ceiling_effects() {
        let r = cap_resolution(3.0, 7.0, 1000);
        let points = axis_steps(3.0, r) * axis_steps(7.0, r);
        assert!(points <= 1000);
        assert!((3.0 / r + 1.0) * (7.0 / r + 1.0) <= 1000.0 + 1e-6);
    }

    #[test]
    fn test_tiny_resolution_hint_is_coarsened() {
        let bbox = BoundingBox::new(120.0, -35.0, 140.0, -15.0).unwrap();
        let plan = generator().plan(&bbox, 1e-12).unwrap();
        assert!(plan.capped);
        assert!(plan.resolution_deg.is_finite());
        assert!(plan.lattice_points() <= 1000);

        let plan = generator().plan(&bbox, f64::MIN_POSITIVE).unwrap();
        assert!(plan.resolution_deg.is_finite());
        assert!(plan.lattice_points() <= 1000);
    }

    #[test]
    fn test_axis_steps_saturates() {
        assert_eq!(axis_steps(1.0, 0.25), 4);
        assert_eq!(axis_steps(0.0, 0.25), 1);
        assert_eq!(axis_steps(1e300, 1e-300), usize::MAX);
    }

    proptest! {
        #[test]
        fn prop_tiny_base_resolution_never_exceeds_cap(
            min_lon in -180.0f64..80.0,
            min_lat in -90.0f64..20.0,
            width in 10.0f64..100.0,
            height in 10.0f64..70.0,
            base in 1e-15f64..1e-3,
        ) {
            let bbox = BoundingBox {
                min_lon,
                min_lat,
                max_lon: min_lon + width,
                max_lat: min_lat + height,
            };
            let plan = generator().plan(&bbox, base).unwrap();
            prop_assert!(plan.resolution_deg.is_finite());
            prop_assert!(plan.lattice_points() <= 1000);
        }

        #[test]
        fn prop_grid_never_exceeds_cap(
            min_lon in -180.0f64..170.0,
            min_lat in -90.0f64..80.0,
            width in 0.001f64..100.0,
            height in 0.001f64..60.0,
            base in 0.001f64..0.5,
        ) {
            let bbox = BoundingBox {
                min_lon,
                min_lat,
                max_lon: min_lon + width,
                max_lat: min_lat + height,
            };
            let plan = generator().plan(&bbox, base).unwrap();
            prop_assert!(plan.lattice_points() <= 1000);
        }

        #[test]
        fn prop_resolution_monotone_for_squares(a in 0.01f64..40.0, b in 0.01f64..40.0) {
            let (small, large) = if a <= b { (a, b) } else { (b, a) };
            let grid = generator();
            let r_small = grid.plan(&square(small), 0.01).unwrap().resolution_deg;
            let r_large = grid.plan(&square(large), 0.01).unwrap().resolution_deg;
            prop_assert!(r_small <= r_large + 1e-12, "{} -> {}, {} -> {}", small, r_small, large, r_large);
        }
    }
}
