//! Per-cell humus aggregation.
//!
//! Sample points go into an R*-tree once; each cell queries it with its
//! envelope and keeps the points that fall inside its ring (boundary
//! inclusive). Means exclude the no-data sentinel and non-finite values.
use geo::{Intersects, Point, Polygon};
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};

#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::coords::{BBox, LonLat};
use crate::geodesy::haversine_distance_m;
use crate::geometry::FieldPolygon;
use crate::grid::{BaseGrid, GridCell};
use crate::raster::{is_valid_value, HumusSamplePoint};

/// Search radius the nearest-point fallback is conventionally run with:
/// the half-diagonal of a 10 m cell.
pub const NEAREST_FALLBACK_M: f64 = 7.1;

const METRES_PER_DEG_LAT: f64 = 111_000.0;
const METRES_PER_DEG_LON_EQUATOR: f64 = 111_320.0;

/// Knobs for [`aggregate_mean`]. The default runs plain containment only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateOptions {
    /// Drop cells that do not touch the field polygon.
    pub clip_outside_field: bool,
    /// For cells without any sample point inside, take the nearest valid
    /// point within this many metres of the cell centroid.
    pub nearest_fallback_m: Option<f64>,
}

/// A grid cell annotated with its humus mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumusMeanFeature {
    pub cell: GridCell,
    /// Rounded mean of the valid points in the cell; `None` when there are none.
    pub humus_mean: Option<i64>,
    /// At least one sample point, valid or not, lies in the cell.
    pub intersects: bool,
    /// The cell touches the field polygon.
    pub in_field: bool,
}

type IndexedPoint = GeomWithData<[f64; 2], usize>;

struct PointIndex<'a> {
    tree: RTree<IndexedPoint>,
    points: &'a [HumusSamplePoint],
}

impl<'a> PointIndex<'a> {
    fn build(points: &'a [HumusSamplePoint]) -> Self {
        let entries = points
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new([p.position.lon, p.position.lat], i))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
            points,
        }
    }

    fn in_envelope(&self, min: [f64; 2], max: [f64; 2]) -> impl Iterator<Item = &'a HumusSamplePoint> + '_ {
        let points = self.points;
        self.tree
            .locate_in_envelope(&AABB::from_corners(min, max))
            .map(move |e| &points[e.data])
    }

    /// Points inside `polygon` (boundary inclusive); `b` is its envelope.
    fn in_polygon(&self, b: &BBox, polygon: &Polygon<f64>) -> Vec<&'a HumusSamplePoint> {
        self.in_envelope([b.min_lon, b.min_lat], [b.max_lon, b.max_lat])
            .filter(|p| polygon.intersects(&Point::from(p.position)))
            .collect()
    }

    fn nearest_valid(&self, centre: LonLat, radius_m: f64) -> Option<&'a HumusSamplePoint> {
        let d_lat = radius_m / METRES_PER_DEG_LAT;
        let d_lon = radius_m / (METRES_PER_DEG_LON_EQUATOR * centre.lat.to_radians().cos());
        self.in_envelope(
            [centre.lon - d_lon, centre.lat - d_lat],
            [centre.lon + d_lon, centre.lat + d_lat],
        )
        .filter(|p| is_valid_value(p.value))
        .map(|p| (p, haversine_distance_m(centre, p.position)))
        .filter(|&(_, d)| d <= radius_m)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(p, _)| p)
    }
}

fn rounded_mean(points: &[&HumusSamplePoint]) -> Option<i64> {
    let (sum, count) = points
        .iter()
        .filter(|p| is_valid_value(p.value))
        .fold((0.0, 0usize), |(s, n), p| (s + p.value, n + 1));
    (count > 0).then(|| (sum / count as f64).round() as i64)
}

fn aggregate_cell(
    field: &FieldPolygon,
    cell: &GridCell,
    index: &PointIndex<'_>,
    opts: &AggregateOptions,
) -> HumusMeanFeature {
    let polygon = cell.polygon();
    let contained = index.in_polygon(&cell.bbox(), &polygon);
    let intersects = !contained.is_empty();

    let humus_mean = match (intersects, opts.nearest_fallback_m) {
        (true, _) => rounded_mean(&contained),
        (false, Some(radius)) => index
            .nearest_valid(cell.centroid(), radius)
            .map(|p| p.value.round() as i64),
        (false, None) => None,
    };

    HumusMeanFeature {
        cell: cell.clone(),
        humus_mean,
        intersects,
        in_field: field.intersects(&polygon),
    }
}

/// Annotate every cell of `grid` with the humus mean of the points inside it.
///
/// Output order follows the grid. With `clip_outside_field`, cells that do
/// not touch the field are dropped.
pub fn aggregate_mean(
    field: &FieldPolygon,
    grid: &BaseGrid,
    points: &[HumusSamplePoint],
    opts: &AggregateOptions,
) -> Vec<HumusMeanFeature> {
    let index = PointIndex::build(points);

    #[cfg(feature = "threading")]
    let features: Vec<HumusMeanFeature> = grid
        .cells
        .par_iter()
        .map(|cell| aggregate_cell(field, cell, &index, opts))
        .collect();

    #[cfg(not(feature = "threading"))]
    let features: Vec<HumusMeanFeature> = grid
        .cells
        .iter()
        .map(|cell| aggregate_cell(field, cell, &index, opts))
        .collect();

    let before = features.len();
    let features: Vec<HumusMeanFeature> = if opts.clip_outside_field {
        features.into_iter().filter(|f| f.in_field).collect()
    } else {
        features
    };

    tracing::debug!(
        points = points.len(),
        cells = before,
        kept = features.len(),
        with_mean = features.iter().filter(|f| f.humus_mean.is_some()).count(),
        "aggregated humus means"
    );
    features
}
