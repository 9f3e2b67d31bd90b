//! Humus raster samples and the point lattice derived from them.
//!
//! A sample is a north-up, row-major grid of scalar values over a
//! geographic bounding box: row 0 is the northernmost row, column 0 the
//! westernmost. The value `0` is the no-data sentinel.
use serde::{Deserialize, Serialize};

use crate::coords::{BBox, LonLat};
use crate::error::{GeometryError, RasterError, StatsError};
use crate::geodesy::{destination, rhumb_destination};
use crate::geometry::FieldPolygon;

/// Default growth of the raster query area around a field (metres).
pub const DEFAULT_RASTER_MARGIN_M: f64 = 10.0;

/// A valid humus value: non-zero and finite.
#[inline]
pub fn is_valid_value(v: f64) -> bool {
    v != 0.0 && v.is_finite()
}

/// One raster pixel turned into a positioned humus value. May carry the
/// no-data sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HumusSamplePoint {
    pub position: LonLat,
    pub value: f64,
}

/// Whole-sample humus statistics, rounded to whole humus units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HumusStats {
    pub mean: f64,
    pub std_dev: f64,
}

/// A rectangular scalar sample over a geographic bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSample")]
pub struct RasterSample {
    width: usize,
    height: usize,
    values: Vec<f64>,
    bbox: BBox,
}

#[derive(Deserialize)]
struct RawSample {
    width: usize,
    height: usize,
    values: Vec<f64>,
    bbox: BBox,
}

impl TryFrom<RawSample> for RasterSample {
    type Error = RasterError;

    fn try_from(raw: RawSample) -> Result<Self, Self::Error> {
        Self::new(raw.width, raw.height, raw.values, raw.bbox)
    }
}

impl RasterSample {
    pub fn new(width: usize, height: usize, values: Vec<f64>, bbox: BBox) -> Result<Self, RasterError> {
        if width == 0 || height == 0 {
            return Err(RasterError::Empty);
        }
        let mismatch = RasterError::LengthMismatch { width, height, actual: values.len() };
        if width.checked_mul(height) != Some(values.len()) {
            return Err(mismatch);
        }
        if !bbox.is_valid() {
            return Err(RasterError::InvalidBounds);
        }
        Ok(Self { width, height, values, bbox })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.width + col]
    }

    /// One point per pixel, at the pixel centre, row-major from the NW corner.
    pub fn to_points(&self) -> Vec<HumusSamplePoint> {
        let d_lon = self.bbox.width_deg() / self.width as f64;
        let d_lat = self.bbox.height_deg() / self.height as f64;

        let mut points = Vec::with_capacity(self.values.len());
        for row in 0..self.height {
            let lat = self.bbox.max_lat - d_lat * (row as f64 + 0.5);
            for col in 0..self.width {
                let lon = self.bbox.min_lon + d_lon * (col as f64 + 0.5);
                points.push(HumusSamplePoint {
                    position: LonLat::new(lon, lat),
                    value: self.get(row, col),
                });
            }
        }
        points
    }

    /// The points of [`Self::to_points`] that lie inside `field` grown by
    /// `margin_m` metres. Pixels in the corners of the query area, far from
    /// a non-rectangular field, are dropped.
    pub fn points_near(&self, field: &FieldPolygon, margin_m: f64) -> Result<Vec<HumusSamplePoint>, GeometryError> {
        let area = field.buffered(margin_m)?;
        let points: Vec<HumusSamplePoint> = self
            .to_points()
            .into_iter()
            .filter(|p| area.contains(p.position))
            .collect();
        tracing::debug!(kept = points.len(), pixels = self.values.len(), margin_m, "points near field");
        Ok(points)
    }

    /// Mean and standard deviation over the valid values of the sample.
    ///
    /// Variance is `E[x²] − E[x]²`, which can come out slightly negative for
    /// near-constant samples; that is reported as [`StatsError::NotFinite`]
    /// rather than turned into a NaN standard deviation.
    pub fn stats(&self) -> Result<HumusStats, StatsError> {
        let mut count = 0usize;
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        for &v in self.values.iter().filter(|&&v| is_valid_value(v)) {
            count += 1;
            sum += v;
            sum_sq += v * v;
        }
        if count == 0 {
            return Err(StatsError::NoValidValues);
        }

        let n = count as f64;
        let mean = sum / n;
        let variance = sum_sq / n - mean * mean;
        if !mean.is_finite() || !variance.is_finite() || variance < 0.0 {
            return Err(StatsError::NotFinite);
        }

        Ok(HumusStats {
            mean: mean.round(),
            std_dev: variance.sqrt().round(),
        })
    }
}

/// The area to request from a raster source for `field`: its bounding box
/// grown by `margin_m` on every side.
pub fn query_bbox(field: &FieldPolygon, margin_m: f64) -> BBox {
    let b = field.bbox();
    if margin_m <= 0.0 {
        return b;
    }
    let north = destination(b.nw(), margin_m, 0.0).lat;
    let south = destination(b.sw(), margin_m, 180.0).lat;
    // A parallel degree is shortest at the poleward edge.
    let east = rhumb_destination(b.ne(), margin_m, 90.0)
        .lon
        .max(rhumb_destination(b.se(), margin_m, 90.0).lon);
    let west = rhumb_destination(b.nw(), margin_m, 270.0)
        .lon
        .min(rhumb_destination(b.sw(), margin_m, 270.0).lon);
    BBox::new(west, south, east, north)
}

/// Anything that can produce a humus sample for a bounding box.
pub trait RasterSource {
    type Error: std::error::Error + Send + Sync + 'static;

    fn sample(&self, bbox: &BBox) -> Result<RasterSample, Self::Error>;
}

/// An in-memory north-up raster with geographic bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoRaster {
    /// Row-major values, row 0 north.
    pub data: Vec<f64>,
    pub width: usize,
    pub height: usize,
    pub bounds: BBox,
}

impl GeoRaster {
    pub fn new(width: usize, height: usize, data: Vec<f64>, bounds: BBox) -> Result<Self, RasterError> {
        // Same invariants as a sample.
        let checked = RasterSample::new(width, height, data, bounds)?;
        Ok(Self {
            data: checked.values,
            width,
            height,
            bounds,
        })
    }

    fn pixel_size(&self) -> (f64, f64) {
        (
            self.bounds.width_deg() / self.width as f64,
            self.bounds.height_deg() / self.height as f64,
        )
    }

    /// Crop to the pixels intersecting `bbox`. The returned sample's bbox is
    /// snapped outward to pixel edges.
    pub fn window(&self, bbox: &BBox) -> Result<RasterSample, RasterError> {
        let hit = self.bounds.intersection(bbox).ok_or(RasterError::OutOfBounds)?;
        let (dx, dy) = self.pixel_size();

        let col0 = ((hit.min_lon - self.bounds.min_lon) / dx).floor().max(0.0) as usize;
        let col1 = (((hit.max_lon - self.bounds.min_lon) / dx).ceil() as usize).min(self.width);
        let row0 = ((self.bounds.max_lat - hit.max_lat) / dy).floor().max(0.0) as usize;
        let row1 = (((self.bounds.max_lat - hit.min_lat) / dy).ceil() as usize).min(self.height);
        if col1 <= col0 || row1 <= row0 {
            return Err(RasterError::OutOfBounds);
        }

        let width = col1 - col0;
        let height = row1 - row0;
        let mut values = Vec::with_capacity(width * height);
        for row in row0..row1 {
            let start = row * self.width;
            values.extend_from_slice(&self.data[start + col0..start + col1]);
        }

        let snapped = BBox::new(
            self.bounds.min_lon + col0 as f64 * dx,
            self.bounds.max_lat - row1 as f64 * dy,
            self.bounds.min_lon + col1 as f64 * dx,
            self.bounds.max_lat - row0 as f64 * dy,
        );
        tracing::trace!(width, height, col0, row0, "raster window");
        RasterSample::new(width, height, values, snapped)
    }
}

impl RasterSource for GeoRaster {
    type Error = RasterError;

    fn sample(&self, bbox: &BBox) -> Result<RasterSample, Self::Error> {
        self.window(bbox)
    }
}
