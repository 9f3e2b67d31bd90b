//! Base grid: rotation search, mesh generation, and the rotated grid a
//! field is actually tiled with.
pub mod mesh;
pub mod rotation;

use std::fmt;
use std::str::FromStr;

use geo::{Centroid, LineString, Polygon};
use serde::{Deserialize, Serialize};

use crate::coords::{BBox, LonLat};
use crate::error::GridError;
use crate::geodesy::rotate_point;
use crate::geometry::FieldPolygon;

pub use mesh::{generate_mesh, grid_dimensions, MAX_GRID_CELLS, MIN_CELL_SIZE_M};
pub use rotation::find_optimal_rotation;

/// Grids with at least this many cells are slow to turn into a map.
pub const DENSE_GRID_CELLS: usize = 1000;

/// Anchor corner and build direction of the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GridOrigin {
    /// Start at the north-west corner, walk east then south.
    #[default]
    NW,
    /// Start at the south-east corner, walk west then north.
    SE,
}

impl FromStr for GridOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NW" => Ok(Self::NW),
            "SE" => Ok(Self::SE),
            other => Err(format!("unknown grid origin {other:?} (expected NW or SE)")),
        }
    }
}

impl fmt::Display for GridOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NW => "NW",
            Self::SE => "SE",
        })
    }
}

/// One mesh cell: a closed `[SW, SE, NE, NW, SW]` ring (in the grid's own
/// rotated frame) and its geodesic area in whole square metres.
///
/// The ring is stored as a fixed array so a cell always has exactly four
/// corners; [`GridCell::polygon`] hands it to `geo` for predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub ring: [LonLat; 5],
    pub area: u64,
}

impl GridCell {
    pub fn polygon(&self) -> Polygon<f64> {
        let exterior: LineString<f64> = self.ring.iter().copied().collect();
        Polygon::new(exterior, vec![])
    }

    pub fn bbox(&self) -> BBox {
        // Five positions, never empty.
        BBox::from_points(&self.ring).unwrap_or(BBox::new(0.0, 0.0, 0.0, 0.0))
    }

    /// Area centroid, falling back to the bbox centre for a collapsed cell.
    pub fn centroid(&self) -> LonLat {
        self.polygon()
            .centroid()
            .map(LonLat::from)
            .unwrap_or_else(|| self.bbox().center())
    }

    fn rotated(&self, angle_deg: f64, pivot: LonLat) -> Self {
        Self {
            ring: self.ring.map(|p| rotate_point(p, pivot, angle_deg)),
            area: self.area,
        }
    }
}

/// The tiling of a field's bounding box. Immutable once built; any change of
/// field, cell size, origin or rotation means building a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseGrid {
    /// Row-major from the anchor corner.
    pub cells: Vec<GridCell>,
    pub rows: usize,
    pub columns: usize,
    pub origin: GridOrigin,
    /// Rotation the cells were generated at (0 for a north-up mesh).
    pub rotation_deg: f64,
}

impl BaseGrid {
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn is_dense(&self) -> bool {
        self.cells.len() >= DENSE_GRID_CELLS
    }

    pub fn total_area(&self) -> u64 {
        self.cells.iter().map(|c| c.area).sum()
    }

    /// Rotate every cell about `pivot`, keeping areas.
    pub fn rotated(&self, angle_deg: f64, pivot: LonLat) -> Self {
        Self {
            cells: self.cells.iter().map(|c| c.rotated(angle_deg, pivot)).collect(),
            rotation_deg: self.rotation_deg + angle_deg,
            ..self.clone()
        }
    }
}

/// Cell size, anchor and rotation for [`build_base_grid`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    pub ew_m: f64,
    pub ns_m: f64,
    pub origin: GridOrigin,
    /// Fixed rotation in degrees; `None` searches for the optimal one.
    pub rotation_deg: Option<f64>,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            ew_m: 20.0,
            ns_m: 20.0,
            origin: GridOrigin::NW,
            rotation_deg: None,
        }
    }
}

/// Build the grid a field is tiled with.
///
/// The field is rotated by the chosen angle about the centre of its
/// unrotated bounding box, meshed north-up, and the mesh is rotated back by
/// the opposite angle about the same pivot. The returned grid records the
/// angle it was generated at.
pub fn build_base_grid(field: &FieldPolygon, params: &GridParams) -> Result<BaseGrid, GridError> {
    let angle = params.rotation_deg.unwrap_or_else(|| find_optimal_rotation(field));
    let pivot = field.bbox().center();

    let rotated_field = field.rotated(angle, pivot);
    let mesh = generate_mesh(&rotated_field, params.ew_m, params.ns_m, params.origin)?;
    let mut grid = mesh.rotated(-angle, pivot);
    grid.rotation_deg = angle;

    tracing::debug!(angle, cells = grid.cell_count(), "built base grid");
    Ok(grid)
}
