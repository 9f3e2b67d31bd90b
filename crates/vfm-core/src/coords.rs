/// Geographic coordinate types and bounding boxes.
/// All coordinate math uses f64 for precision.
use geo::{Coord, Point, Rect};
use serde::{Deserialize, Serialize};

/// A geographic position. Serialises as a GeoJSON `[lon, lat]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 2]")]
pub struct LonLat {
    /// Longitude in degrees, -180 to +180.
    pub lon: f64,
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Convert to radians, `(lon, lat)`.
    pub fn to_radians(self) -> (f64, f64) {
        (self.lon.to_radians(), self.lat.to_radians())
    }

    pub fn is_finite(self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }
}

impl TryFrom<Vec<f64>> for LonLat {
    type Error = String;

    /// GeoJSON positions may carry an altitude; only the first two ordinates are kept.
    fn try_from(v: Vec<f64>) -> Result<Self, Self::Error> {
        match v.as_slice() {
            [lon, lat, ..] => Ok(Self::new(*lon, *lat)),
            _ => Err(format!("position needs at least 2 ordinates, got {}", v.len())),
        }
    }
}

impl From<LonLat> for [f64; 2] {
    fn from(p: LonLat) -> Self {
        [p.lon, p.lat]
    }
}

// geo works in x = lon, y = lat.

impl From<LonLat> for Coord<f64> {
    fn from(p: LonLat) -> Self {
        Coord { x: p.lon, y: p.lat }
    }
}

impl From<Coord<f64>> for LonLat {
    fn from(c: Coord<f64>) -> Self {
        Self::new(c.x, c.y)
    }
}

impl From<LonLat> for Point<f64> {
    fn from(p: LonLat) -> Self {
        Point::new(p.lon, p.lat)
    }
}

impl From<Point<f64>> for LonLat {
    fn from(p: Point<f64>) -> Self {
        Self::new(p.x(), p.y())
    }
}

/// An axis-aligned geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self { min_lon, min_lat, max_lon, max_lat }
    }

    /// Bounding box of a set of positions. `None` for an empty slice.
    pub fn from_points(points: &[LonLat]) -> Option<Self> {
        let first = points.first()?;
        let init = Self::new(first.lon, first.lat, first.lon, first.lat);
        Some(points.iter().skip(1).fold(init, |b, p| Self {
            min_lon: b.min_lon.min(p.lon),
            min_lat: b.min_lat.min(p.lat),
            max_lon: b.max_lon.max(p.lon),
            max_lat: b.max_lat.max(p.lat),
        }))
    }

    pub fn nw(&self) -> LonLat {
        LonLat::new(self.min_lon, self.max_lat)
    }

    pub fn ne(&self) -> LonLat {
        LonLat::new(self.max_lon, self.max_lat)
    }

    pub fn se(&self) -> LonLat {
        LonLat::new(self.max_lon, self.min_lat)
    }

    pub fn sw(&self) -> LonLat {
        LonLat::new(self.min_lon, self.min_lat)
    }

    /// Centre of the box (the centroid of its four corners).
    pub fn center(&self) -> LonLat {
        LonLat::new((self.min_lon + self.max_lon) / 2.0, (self.min_lat + self.max_lat) / 2.0)
    }

    pub fn width_deg(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height_deg(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Closed counter-clockwise ring `[SW, SE, NE, NW, SW]`.
    pub fn ring(&self) -> [LonLat; 5] {
        [self.sw(), self.se(), self.ne(), self.nw(), self.sw()]
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: LonLat) -> bool {
        p.lon >= self.min_lon && p.lon <= self.max_lon && p.lat >= self.min_lat && p.lat <= self.max_lat
    }

    /// Overlap of two boxes, `None` if they are disjoint.
    pub fn intersection(&self, other: &BBox) -> Option<BBox> {
        let b = BBox::new(
            self.min_lon.max(other.min_lon),
            self.min_lat.max(other.min_lat),
            self.max_lon.min(other.max_lon),
            self.max_lat.min(other.max_lat),
        );
        (b.min_lon < b.max_lon && b.min_lat < b.max_lat).then_some(b)
    }

    /// True when the box has positive, finite extent on both axes.
    pub fn is_valid(&self) -> bool {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat].iter().all(|v| v.is_finite())
            && self.min_lon < self.max_lon
            && self.min_lat < self.max_lat
    }
}

impl From<Rect<f64>> for BBox {
    fn from(r: Rect<f64>) -> Self {
        Self::new(r.min().x, r.min().y, r.max().x, r.max().y)
    }
}
