//! Variable-rate fertilization map engine.
//!
//! A field polygon is tiled into a (possibly rotated) grid, a humus raster
//! sample is averaged per cell, and each cell gets an application rate
//! that is lower on humus-rich soil and higher on humus-poor soil, tiered
//! by equal shares of field area.
//!
//! Entry points: [`find_optimal_rotation`], [`generate_mesh`],
//! [`build_base_grid`], [`create_vfm`] and [`update_vfm`].
pub mod config;
pub mod coords;
pub mod debounce;
pub mod distribution;
pub mod error;
pub mod geodesy;
pub mod geojson;
pub mod geometry;
pub mod grid;
pub mod humus;
pub mod raster;
pub mod vfm;

pub use config::VfmConfig;
pub use coords::{BBox, LonLat};
pub use error::{GeoJsonError, GeometryError, GridError, RasterError, StatsError};
pub use geometry::FieldPolygon;
pub use grid::{build_base_grid, find_optimal_rotation, generate_mesh, BaseGrid, GridCell, GridOrigin, GridParams};
pub use humus::{aggregate_mean, AggregateOptions, HumusMeanFeature};
pub use raster::{query_bbox, GeoRaster, HumusSamplePoint, HumusStats, RasterSample, RasterSource};
pub use vfm::{application_steps, create_vfm, update_vfm, VfmFeature, VfmParams, VfmResult};
