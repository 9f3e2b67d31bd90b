//! Mesh generation over a field's bounding box.
//!
//! Cells are walked row-major from the anchor corner with great-circle
//! destination steps. The last column and the last row are snapped to the
//! opposite bounding-box edge instead of projected, so accumulated drift can
//! neither leave a gap nor overshoot: the cells always tile the bbox exactly.
use crate::coords::{BBox, LonLat};
use crate::error::{GeometryError, GridError};
use crate::geodesy::{destination, haversine_distance_m, ring_area_m2};
use crate::geometry::FieldPolygon;

use super::{BaseGrid, GridCell, GridOrigin};

/// Cell sizes below this are raised to it (metres).
pub const MIN_CELL_SIZE_M: f64 = 10.0;
/// Hard cap on the number of cells in one grid.
pub const MAX_GRID_CELLS: usize = 2000;

/// Walk direction and snap edges for one anchor corner.
struct Walk {
    start: LonLat,
    ew_bearing: f64,
    ns_bearing: f64,
    ew_snap_lon: f64,
    ns_snap_lat: f64,
}

impl Walk {
    fn for_origin(origin: GridOrigin, bbox: &BBox) -> Self {
        match origin {
            GridOrigin::NW => Self {
                start: bbox.nw(),
                ew_bearing: 90.0,
                ns_bearing: 180.0,
                ew_snap_lon: bbox.max_lon,
                ns_snap_lat: bbox.min_lat,
            },
            GridOrigin::SE => Self {
                start: bbox.se(),
                ew_bearing: 270.0,
                ns_bearing: 0.0,
                ew_snap_lon: bbox.min_lon,
                ns_snap_lat: bbox.max_lat,
            },
        }
    }

    /// Never step past the snap edge.
    fn clamp_lon(&self, origin: GridOrigin, lon: f64) -> f64 {
        match origin {
            GridOrigin::NW => lon.min(self.ew_snap_lon),
            GridOrigin::SE => lon.max(self.ew_snap_lon),
        }
    }

    fn clamp_lat(&self, origin: GridOrigin, lat: f64) -> f64 {
        match origin {
            GridOrigin::NW => lat.max(self.ns_snap_lat),
            GridOrigin::SE => lat.min(self.ns_snap_lat),
        }
    }
}

/// Number of `(rows, columns)` needed to cover `bbox` with cells of the given size.
pub fn grid_dimensions(bbox: &BBox, cell_ew_m: f64, cell_ns_m: f64) -> (usize, usize) {
    let ew = cell_ew_m.max(MIN_CELL_SIZE_M);
    let ns = cell_ns_m.max(MIN_CELL_SIZE_M);
    let columns = (haversine_distance_m(bbox.nw(), bbox.ne()) / ew).ceil() as usize;
    let rows = (haversine_distance_m(bbox.sw(), bbox.nw()) / ns).ceil() as usize;
    (rows, columns)
}

/// Closed ring `[SW, SE, NE, NW, SW]` of the cell spanned from the walk
/// position `(lon0, lat0)` to `(lon1, lat1)`.
fn cell_ring(origin: GridOrigin, lon0: f64, lat0: f64, lon1: f64, lat1: f64) -> [LonLat; 5] {
    let (west, east, south, north) = match origin {
        GridOrigin::NW => (lon0, lon1, lat1, lat0),
        GridOrigin::SE => (lon1, lon0, lat0, lat1),
    };
    let sw = LonLat::new(west, south);
    [sw, LonLat::new(east, south), LonLat::new(east, north), LonLat::new(west, north), sw]
}

/// Tile the bounding box of `field` with cells of `cell_ew_m` × `cell_ns_m`
/// metres, anchored at `origin`.
///
/// Sizes are raised to [`MIN_CELL_SIZE_M`]. Fails with
/// [`GridError::TooLarge`] when more than [`MAX_GRID_CELLS`] cells would be
/// needed; a partial grid is never returned.
pub fn generate_mesh(
    field: &FieldPolygon,
    cell_ew_m: f64,
    cell_ns_m: f64,
    origin: GridOrigin,
) -> Result<BaseGrid, GridError> {
    let ew = cell_ew_m.max(MIN_CELL_SIZE_M);
    let ns = cell_ns_m.max(MIN_CELL_SIZE_M);

    let bbox = field.bbox();
    if !bbox.is_valid() {
        return Err(GeometryError::Degenerate.into());
    }

    let (rows, columns) = grid_dimensions(&bbox, ew, ns);
    let count = rows * columns;
    if count > MAX_GRID_CELLS {
        return Err(GridError::TooLarge { count, max: MAX_GRID_CELLS });
    }
    if count == 0 {
        return Err(GeometryError::Degenerate.into());
    }

    let walk = Walk::for_origin(origin, &bbox);
    let mut cells = Vec::with_capacity(count);
    let mut row_lat = walk.start.lat;

    for row in 0..rows {
        let next_lat = if row + 1 < rows {
            let projected = destination(LonLat::new(walk.start.lon, row_lat), ns, walk.ns_bearing).lat;
            walk.clamp_lat(origin, projected)
        } else {
            walk.ns_snap_lat
        };

        let mut col_lon = walk.start.lon;
        for col in 0..columns {
            let next_lon = if col + 1 < columns {
                let projected = destination(LonLat::new(col_lon, row_lat), ew, walk.ew_bearing).lon;
                walk.clamp_lon(origin, projected)
            } else {
                walk.ew_snap_lon
            };

            let ring = cell_ring(origin, col_lon, row_lat, next_lon, next_lat);
            let area = ring_area_m2(&ring).round() as u64;
            cells.push(GridCell { ring, area });
            col_lon = next_lon;
        }
        row_lat = next_lat;
    }

    tracing::debug!(rows, columns, ew, ns, ?origin, "generated mesh");

    Ok(BaseGrid {
        cells,
        rows,
        columns,
        origin,
        rotation_deg: 0.0,
    })
}
