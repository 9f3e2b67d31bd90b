//! GeoJSON at the boundary: field input, grid and map feature collections,
//! and the exported map document.
//!
//! Only what the engine exchanges is modelled: `Point` and `Polygon`
//! geometries, features with a typed properties bag, and collections of
//! them. Positions are `[lon, lat]`; extra ordinates are dropped on read.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coords::LonLat;
use crate::error::{GeoJsonError, GeometryError};
use crate::geometry::FieldPolygon;
use crate::grid::{BaseGrid, GridCell, GridOrigin};
use crate::vfm::{VfmFeature, VfmResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: LonLat },
    Polygon { coordinates: Vec<Vec<LonLat>> },
    /// Any other GeoJSON geometry; never produced, rejected where a polygon is needed.
    #[serde(other)]
    Unsupported,
}

impl Geometry {
    fn kind(&self) -> &'static str {
        match self {
            Self::Point { .. } => "Point",
            Self::Polygon { .. } => "Polygon",
            Self::Unsupported => "an unsupported geometry",
        }
    }

    fn into_outer_ring(self) -> Result<Vec<LonLat>, GeoJsonError> {
        match self {
            Self::Polygon { coordinates } => coordinates
                .into_iter()
                .next()
                .ok_or(GeoJsonError::Geometry(GeometryError::TooFewPoints(0))),
            other => Err(GeoJsonError::UnexpectedGeometry(other.kind())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeatureType {
    #[default]
    Feature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeatureCollectionType {
    #[default]
    FeatureCollection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature<P> {
    #[serde(rename = "type")]
    pub kind: FeatureType,
    pub geometry: Geometry,
    pub properties: P,
}

impl<P> Feature<P> {
    pub fn new(geometry: Geometry, properties: P) -> Self {
        Self {
            kind: FeatureType::Feature,
            geometry,
            properties,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection<P> {
    #[serde(rename = "type")]
    pub kind: FeatureCollectionType,
    pub features: Vec<Feature<P>>,
    /// Foreign members (`bbox`, vendor data, the `grid` description).
    #[serde(flatten)]
    pub foreign: Map<String, Value>,
}

impl<P> FeatureCollection<P> {
    pub fn new(features: Vec<Feature<P>>) -> Self {
        Self {
            kind: FeatureCollectionType::FeatureCollection,
            features,
            foreign: Map::new(),
        }
    }
}

fn polygon(ring: &[LonLat]) -> Geometry {
    Geometry::Polygon {
        coordinates: vec![ring.to_vec()],
    }
}

fn cell_ring(geometry: Geometry) -> Result<[LonLat; 5], GeoJsonError> {
    let ring = geometry.into_outer_ring()?;
    let len = ring.len();
    ring.try_into().map_err(|_| GeoJsonError::CellRing(len))
}

// ── Field ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum FieldInput {
    Collection(FeatureCollection<Value>),
    Feature(Feature<Value>),
    Geometry(Geometry),
}

/// Read a field boundary from a Polygon geometry, a Feature, or the first
/// feature of a FeatureCollection. Only the outer ring is used.
pub fn parse_field(json: &str) -> Result<FieldPolygon, GeoJsonError> {
    let geometry = match serde_json::from_str::<FieldInput>(json)? {
        FieldInput::Geometry(g) => g,
        FieldInput::Feature(f) => f.geometry,
        FieldInput::Collection(c) => {
            c.features
                .into_iter()
                .next()
                .ok_or(GeoJsonError::EmptyCollection)?
                .geometry
        }
    };
    Ok(FieldPolygon::new(geometry.into_outer_ring()?)?)
}

pub fn field_to_geojson(field: &FieldPolygon) -> Feature<Value> {
    Feature::new(polygon(&field.ring()), Value::Object(Map::new()))
}

// ── Base grid ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridProperties {
    pub area: u64,
}

/// Grid layout carried as the `grid` foreign member of a grid collection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct GridLayout {
    rows: usize,
    columns: usize,
    origin: GridOrigin,
    rotation_deg: f64,
}

pub fn grid_to_geojson(grid: &BaseGrid) -> FeatureCollection<GridProperties> {
    let features = grid
        .cells
        .iter()
        .map(|c| Feature::new(polygon(&c.ring), GridProperties { area: c.area }))
        .collect();
    let mut fc = FeatureCollection::new(features);
    let layout = GridLayout {
        rows: grid.rows,
        columns: grid.columns,
        origin: grid.origin,
        rotation_deg: grid.rotation_deg,
    };
    if let Ok(v) = serde_json::to_value(layout) {
        fc.foreign.insert("grid".to_owned(), v);
    }
    fc
}

/// Rebuild a grid from its collection. Without a `grid` member the layout
/// is taken as a single north-up row.
pub fn grid_from_geojson(fc: FeatureCollection<GridProperties>) -> Result<BaseGrid, GeoJsonError> {
    let layout = match fc.foreign.get("grid") {
        Some(v) => Some(GridLayout::deserialize(v)?),
        None => None,
    };
    let cells = fc
        .features
        .into_iter()
        .map(|f| {
            Ok(GridCell {
                ring: cell_ring(f.geometry)?,
                area: f.properties.area,
            })
        })
        .collect::<Result<Vec<_>, GeoJsonError>>()?;

    let layout = layout.unwrap_or(GridLayout {
        rows: 1,
        columns: cells.len(),
        origin: GridOrigin::NW,
        rotation_deg: 0.0,
    });
    Ok(BaseGrid {
        cells,
        rows: layout.rows,
        columns: layout.columns,
        origin: layout.origin,
        rotation_deg: layout.rotation_deg,
    })
}

// ── Map ──────────────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VfmProperties {
    pub area: u64,
    pub humus_mean: i64,
    pub intersects: bool,
    #[serde(default = "default_true")]
    pub in_field: bool,
    pub amount_fertilization_factor: f64,
    pub amount_fertilization_unit: f64,
}

pub fn vfm_to_geojson(features: &[VfmFeature]) -> FeatureCollection<VfmProperties> {
    FeatureCollection::new(
        features
            .iter()
            .map(|f| {
                Feature::new(
                    polygon(&f.cell.ring),
                    VfmProperties {
                        area: f.cell.area,
                        humus_mean: f.humus_mean,
                        intersects: f.intersects,
                        in_field: f.in_field,
                        amount_fertilization_factor: f.factor,
                        amount_fertilization_unit: f.unit,
                    },
                )
            })
            .collect(),
    )
}

pub fn vfm_from_geojson(fc: FeatureCollection<VfmProperties>) -> Result<Vec<VfmFeature>, GeoJsonError> {
    fc.features
        .into_iter()
        .map(|f| {
            let p = f.properties;
            Ok(VfmFeature {
                cell: GridCell {
                    ring: cell_ring(f.geometry)?,
                    area: p.area,
                },
                humus_mean: p.humus_mean,
                intersects: p.intersects,
                in_field: p.in_field,
                factor: p.amount_fertilization_factor,
                unit: p.amount_fertilization_unit,
            })
        })
        .collect()
}

/// Parse a feature collection with typed properties.
pub fn parse_collection<P: DeserializeOwned>(json: &str) -> Result<FeatureCollection<P>, GeoJsonError> {
    Ok(serde_json::from_str(json)?)
}

/// The exported map document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VfmMap {
    pub vfm: FeatureCollection<VfmProperties>,
    /// Base amount, kg/10a.
    pub amount_10a: f64,
    /// Total amount over the map, kg.
    pub total_amount: f64,
    /// Area receiving fertilizer, m².
    pub area: f64,
    /// Range of the rate adjustment, percent.
    pub fertilization_range: f64,
}

impl VfmMap {
    pub fn new(result: &VfmResult, base_amount: f64, range_percent: f64) -> Self {
        Self {
            vfm: vfm_to_geojson(&result.features),
            amount_10a: base_amount,
            total_amount: result.amount_sum,
            area: result.area_sum,
            fertilization_range: range_percent,
        }
    }
}
