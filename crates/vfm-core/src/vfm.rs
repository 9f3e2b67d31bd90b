//! Variable fertilization map assembly.
//!
//! [`create_vfm`] runs the whole chain from sample points; [`update_vfm`]
//! re-runs only distribution and assembly over already-aggregated features
//! and is the one to call when just the rate parameters change. Both return
//! a fresh result; inputs are never mutated.
use serde::{Deserialize, Serialize};

use crate::distribution::{
    distribute_stepless, distribute_steps, factor_for, humus_area_map, NO_DATA_FACTOR,
};
use crate::geometry::FieldPolygon;
use crate::grid::{BaseGrid, GridCell};
use crate::humus::{aggregate_mean, AggregateOptions};
use crate::raster::HumusSamplePoint;

/// `[r, r/2, 0, -r/2, -r]` for `r = range_percent / 100`.
pub fn application_steps(range_percent: f64) -> [f64; 5] {
    let r = range_percent / 100.0;
    [r, r / 2.0, 0.0, -r / 2.0, -r]
}

/// Rate parameters. Changing only these is what [`update_vfm`] is for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VfmParams {
    /// Five discrete tiers when set, a continuous ramp otherwise.
    pub five_steps: bool,
    /// Tier multipliers, poorest soil first. The ramp spans `±factors[0]`.
    pub factors: [f64; 5],
    /// Baseline application in kg/10a.
    pub base_amount: f64,
    /// Give covered cells without a valid value the baseline rate instead of nothing.
    pub interpolate_missing: bool,
}

impl Default for VfmParams {
    fn default() -> Self {
        Self {
            five_steps: true,
            factors: application_steps(20.0),
            base_amount: 100.0,
            interpolate_missing: false,
        }
    }
}

/// One cell of the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VfmFeature {
    pub cell: GridCell,
    /// Rounded humus mean; `0` for cells with coverage but no valid value.
    pub humus_mean: i64,
    pub intersects: bool,
    pub in_field: bool,
    /// Multiplier actually applied.
    pub factor: f64,
    /// Application rate in kg/10a.
    pub unit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VfmResult {
    /// Sorted by ascending humus mean.
    pub features: Vec<VfmFeature>,
    /// Area in m² of the cells receiving a non-zero rate.
    pub area_sum: f64,
    /// Total amount in kg.
    pub amount_sum: f64,
}

/// Aggregate, distribute and assemble a map for `field` tiled by `grid`.
///
/// Cells with neither a valid mean nor any sample coverage are dropped.
/// Covered cells without a valid value are kept under the no-data key so
/// [`VfmParams::interpolate_missing`] can reach them.
pub fn create_vfm(
    field: &FieldPolygon,
    grid: &BaseGrid,
    points: &[HumusSamplePoint],
    opts: &AggregateOptions,
    params: &VfmParams,
) -> VfmResult {
    let features: Vec<VfmFeature> = aggregate_mean(field, grid, points, opts)
        .into_iter()
        .filter(|f| f.humus_mean.is_some() || f.intersects)
        .map(|f| VfmFeature {
            cell: f.cell,
            humus_mean: f.humus_mean.unwrap_or(0),
            intersects: f.intersects,
            in_field: f.in_field,
            factor: 0.0,
            unit: 0.0,
        })
        .collect();
    assemble(features, params)
}

/// Redistribute existing features under new rate parameters.
pub fn update_vfm(features: &[VfmFeature], params: &VfmParams) -> VfmResult {
    assemble(features.to_vec(), params)
}

fn assemble(mut features: Vec<VfmFeature>, params: &VfmParams) -> VfmResult {
    features.sort_by_key(|f| f.humus_mean);

    let areas = humus_area_map(features.iter().map(|f| (f.humus_mean, f.cell.area as f64)));
    let rates = if params.five_steps {
        distribute_steps(&areas, &params.factors)
    } else {
        distribute_stepless(&areas, params.factors[0])
    };

    let mut area_sum = 0.0;
    let mut amount_sum = 0.0;
    for f in &mut features {
        let factor = factor_for(&rates, f.humus_mean);
        let (factor, unit) = if factor == NO_DATA_FACTOR && f.intersects && params.interpolate_missing {
            (0.0, params.base_amount)
        } else {
            (factor, (params.base_amount * (1.0 + factor)).round().max(0.0))
        };
        f.factor = factor;
        f.unit = unit;

        let area = f.cell.area as f64;
        if unit != 0.0 {
            area_sum += area;
        }
        amount_sum += unit * area / 1000.0;
    }

    tracing::debug!(
        cells = features.len(),
        values = areas.len(),
        five_steps = params.five_steps,
        area_sum,
        amount_sum,
        "assembled vfm"
    );
    VfmResult { features, area_sum, amount_sum }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{BBox, LonLat};
    use approx::assert_abs_diff_eq;

    fn feature(humus_mean: i64, area: u64, intersects: bool) -> VfmFeature {
        VfmFeature {
            cell: GridCell {
                ring: BBox::new(141.0, 43.0, 141.001, 43.001).ring(),
                area,
            },
            humus_mean,
            intersects,
            in_field: true,
            factor: 0.0,
            unit: 0.0,
        }
    }

    #[test]
    fn steps_from_percentage() {
        assert_eq!(application_steps(20.0), [0.2, 0.1, 0.0, -0.1, -0.2]);
        assert_eq!(application_steps(0.0), [0.0; 5]);
    }

    #[test]
    fn units_follow_factors_and_totals_add_up() {
        let features: Vec<VfmFeature> = [65, 25, 45, 35, 55].iter().map(|&h| feature(h, 1000, true)).collect();
        let out = update_vfm(&features, &VfmParams::default());

        let humus: Vec<i64> = out.features.iter().map(|f| f.humus_mean).collect();
        assert_eq!(humus, vec![25, 35, 45, 55, 65], "sorted ascending");
        let units: Vec<f64> = out.features.iter().map(|f| f.unit).collect();
        assert_eq!(units, vec![120.0, 110.0, 100.0, 90.0, 80.0]);
        assert_eq!(out.area_sum, 5000.0);
        assert_abs_diff_eq!(out.amount_sum, 500.0, epsilon = 1e-9);
    }

    #[test]
    fn missing_data_interpolation_toggle() {
        let features = vec![feature(0, 400, true), feature(0, 300, false)];

        let off = update_vfm(&features, &VfmParams::default());
        for f in &off.features {
            assert_eq!(f.factor, NO_DATA_FACTOR);
            assert_eq!(f.unit, 0.0);
        }
        assert_eq!(off.area_sum, 0.0);
        assert_eq!(off.amount_sum, 0.0);

        let on = update_vfm(&features, &VfmParams { interpolate_missing: true, ..Default::default() });
        let covered = on.features.iter().find(|f| f.intersects).unwrap();
        assert_eq!((covered.factor, covered.unit), (0.0, 100.0));
        let uncovered = on.features.iter().find(|f| !f.intersects).unwrap();
        assert_eq!(uncovered.unit, 0.0, "no coverage, no interpolation");
        assert_eq!(on.area_sum, 400.0);
        assert_abs_diff_eq!(on.amount_sum, 40.0, epsilon = 1e-9);
    }

    #[test]
    fn unit_is_never_negative() {
        let params = VfmParams { factors: application_steps(300.0), ..Default::default() };
        let features = vec![feature(30, 100, true), feature(60, 100, true)];
        let out = update_vfm(&features, &params);
        assert!(out.features.iter().all(|f| f.unit >= 0.0));
        let rich = out.features.last().unwrap();
        assert_eq!(rich.unit, 0.0);
        assert_eq!(out.area_sum, 100.0, "zero-rate cell excluded from area");
    }

    #[test]
    fn update_is_idempotent() {
        let features: Vec<VfmFeature> = [(31, 200), (44, 900), (52, 350), (0, 80)]
            .iter()
            .map(|&(h, a)| feature(h, a, true))
            .collect();
        let params = VfmParams { five_steps: false, interpolate_missing: true, ..Default::default() };
        let first = update_vfm(&features, &params);
        let second = update_vfm(&first.features, &params);
        assert_eq!(first, second);
    }

    #[test]
    fn create_keeps_covered_cells_and_drops_empty_ones() {
        let field = FieldPolygon::new(BBox::new(141.0, 43.0, 141.002, 43.001).ring().to_vec()).unwrap();
        let cell = |lon0: f64| GridCell {
            ring: BBox::new(lon0, 43.0, lon0 + 0.001, 43.001).ring(),
            area: 100,
        };
        let grid = BaseGrid {
            cells: vec![cell(141.0), cell(141.001), cell(141.002)],
            rows: 1,
            columns: 3,
            origin: Default::default(),
            rotation_deg: 0.0,
        };
        let points = [
            HumusSamplePoint { position: LonLat::new(141.0005, 43.0005), value: 40.0 },
            HumusSamplePoint { position: LonLat::new(141.0015, 43.0005), value: 0.0 },
        ];
        let out = create_vfm(&field, &grid, &points, &AggregateOptions::default(), &VfmParams::default());
        assert_eq!(out.features.len(), 2, "third cell has neither mean nor coverage");
        assert_eq!(out.features[0].humus_mean, 0);
        assert_eq!(out.features[0].factor, NO_DATA_FACTOR);
        assert_eq!(out.features[1].humus_mean, 40);
    }
}
