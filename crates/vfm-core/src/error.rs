//! Error types for every fallible engine operation.
//!
//! Errors are plain values: the engine never logs them, retries, or
//! notifies anyone. Propagation is up to the caller.
use thiserror::Error;

/// Malformed input geometry, rejected before any computation starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("polygon ring needs at least 4 positions, got {0}")]
    TooFewPoints(usize),

    #[error("polygon ring is not closed (first position differs from last)")]
    NotClosed,

    #[error("polygon ring contains a non-finite coordinate")]
    NonFinite,

    #[error("polygon has a zero-extent bounding box")]
    Degenerate,
}

/// Base grid construction failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    /// The requested cell size would produce more cells than the cap.
    /// The user has to increase the cell size; never retried.
    #[error("grid count {count} exceeds the limit of {max} cells; increase the cell size")]
    TooLarge { count: usize, max: usize },

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Whole-sample humus statistics failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("raster sample contains no valid (non-zero, finite) values")]
    NoValidValues,

    #[error("humus statistics are not finite")]
    NotFinite,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RasterError {
    #[error("raster sample has {actual} values, expected {width}x{height}")]
    LengthMismatch {
        width: usize,
        height: usize,
        actual: usize,
    },

    #[error("raster has zero width or height")]
    Empty,

    #[error("raster bounding box is degenerate or non-finite")]
    InvalidBounds,

    #[error("requested window does not overlap the raster")]
    OutOfBounds,
}

/// Failures at the GeoJSON boundary.
#[derive(Debug, Error)]
pub enum GeoJsonError {
    #[error("invalid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a Polygon geometry, found {0}")]
    UnexpectedGeometry(&'static str),

    #[error("feature collection is empty")]
    EmptyCollection,

    #[error("grid cell ring must have exactly 5 positions, got {0}")]
    CellRing(usize),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}
