//! Field polygon, backed by a `geo` polygon.
//!
//! Containment and intersection are evaluated in plain lon/lat space, which
//! is accurate at field scale (hundreds of metres). Buffering goes through a
//! local metric frame so distances are in metres.
use geo::{Area, BoundingRect, Buffer, Coord, Intersects, LineString, MapCoords, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::coords::{BBox, LonLat};
use crate::error::GeometryError;
use crate::geodesy::{ring_area_m2, rotate_point, EARTH_RADIUS_M};

/// A single closed polygon ring (first position == last position),
/// validated on construction. Holes are not modelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LonLat>", into = "Vec<LonLat>")]
pub struct FieldPolygon {
    polygon: Polygon<f64>,
}

impl FieldPolygon {
    /// Validate and wrap a ring. Needs at least 4 finite positions, closed.
    pub fn new(ring: Vec<LonLat>) -> Result<Self, GeometryError> {
        if ring.len() < 4 {
            return Err(GeometryError::TooFewPoints(ring.len()));
        }
        if !ring.iter().all(|p| p.is_finite()) {
            return Err(GeometryError::NonFinite);
        }
        if ring.first() != ring.last() {
            return Err(GeometryError::NotClosed);
        }
        let exterior: LineString<f64> = ring.into_iter().collect();
        Ok(Self { polygon: Polygon::new(exterior, vec![]) })
    }

    /// Exterior ring, closed.
    pub fn ring(&self) -> Vec<LonLat> {
        self.polygon.exterior().coords().map(|&c| LonLat::from(c)).collect()
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    pub fn bbox(&self) -> BBox {
        // A validated ring is never empty.
        self.polygon
            .bounding_rect()
            .map(BBox::from)
            .unwrap_or(BBox::new(0.0, 0.0, 0.0, 0.0))
    }

    pub fn area_m2(&self) -> f64 {
        ring_area_m2(&self.ring())
    }

    /// Rotate every vertex about `pivot`; closure is preserved.
    pub fn rotated(&self, angle_deg: f64, pivot: LonLat) -> Self {
        Self {
            polygon: self
                .polygon
                .map_coords(|c| Coord::from(rotate_point(LonLat::from(c), pivot, angle_deg))),
        }
    }

    /// Point-in-polygon; points on the boundary count as inside.
    pub fn contains(&self, p: LonLat) -> bool {
        self.polygon.intersects(&Point::from(p))
    }

    /// True unless `other` is disjoint from the field. Touching counts.
    pub fn intersects(&self, other: &Polygon<f64>) -> bool {
        self.polygon.intersects(other)
    }

    /// The field grown (or, for a negative distance, shrunk) by `distance_m`
    /// metres. When buffering splits the field, the largest part is kept.
    pub fn buffered(&self, distance_m: f64) -> Result<Self, GeometryError> {
        if distance_m == 0.0 {
            return Ok(self.clone());
        }
        if !distance_m.is_finite() {
            return Err(GeometryError::NonFinite);
        }

        let frame = LocalFrame::new(self.bbox().center());
        let local = self.polygon.map_coords(|c| frame.to_local(c));
        let largest = local
            .buffer(distance_m)
            .0
            .into_iter()
            .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
            .ok_or(GeometryError::Degenerate)?;

        let exterior = largest.exterior().map_coords(|c| frame.to_geographic(c));
        Self::new(exterior.coords().map(|&c| LonLat::from(c)).collect())
    }
}

/// Equirectangular metres about an origin, accurate at field scale.
struct LocalFrame {
    origin: LonLat,
    metres_per_radian_lon: f64,
}

impl LocalFrame {
    fn new(origin: LonLat) -> Self {
        Self {
            origin,
            metres_per_radian_lon: EARTH_RADIUS_M * origin.lat.to_radians().cos(),
        }
    }

    fn to_local(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: (c.x - self.origin.lon).to_radians() * self.metres_per_radian_lon,
            y: (c.y - self.origin.lat).to_radians() * EARTH_RADIUS_M,
        }
    }

    fn to_geographic(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: self.origin.lon + (c.x / self.metres_per_radian_lon).to_degrees(),
            y: self.origin.lat + (c.y / EARTH_RADIUS_M).to_degrees(),
        }
    }
}

impl TryFrom<Vec<LonLat>> for FieldPolygon {
    type Error = GeometryError;

    fn try_from(ring: Vec<LonLat>) -> Result<Self, Self::Error> {
        Self::new(ring)
    }
}

impl From<FieldPolygon> for Vec<LonLat> {
    fn from(f: FieldPolygon) -> Self {
        f.ring()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::{haversine_distance_m, rhumb_destination};
    use approx::assert_relative_eq;

    fn square(x0: f64, y0: f64, size: f64) -> Vec<LonLat> {
        vec![
            LonLat::new(x0, y0),
            LonLat::new(x0 + size, y0),
            LonLat::new(x0 + size, y0 + size),
            LonLat::new(x0, y0 + size),
            LonLat::new(x0, y0),
        ]
    }

    fn cell(x0: f64, y0: f64, size: f64) -> Polygon<f64> {
        Polygon::new(square(x0, y0, size).into_iter().collect(), vec![])
    }

    /// 100 m square with its SW corner at (141.35°E, 43.06°N).
    fn hundred_metres() -> FieldPolygon {
        let sw = LonLat::new(141.35, 43.06);
        let east = rhumb_destination(sw, 100.0, 90.0).lon;
        let north = rhumb_destination(sw, 100.0, 0.0).lat;
        FieldPolygon::new(BBox::new(sw.lon, sw.lat, east, north).ring().to_vec()).unwrap()
    }

    #[test]
    fn rejects_malformed_rings() {
        let short = vec![LonLat::new(0.0, 0.0), LonLat::new(1.0, 0.0), LonLat::new(0.0, 0.0)];
        assert_eq!(FieldPolygon::new(short), Err(GeometryError::TooFewPoints(3)));

        let mut open = square(0.0, 0.0, 1.0);
        open.pop();
        open.push(LonLat::new(0.5, 0.5));
        assert_eq!(FieldPolygon::new(open), Err(GeometryError::NotClosed));

        let mut nan = square(0.0, 0.0, 1.0);
        nan[2] = LonLat::new(f64::NAN, 1.0);
        assert_eq!(FieldPolygon::new(nan), Err(GeometryError::NonFinite));

        let ok = FieldPolygon::new(square(0.0, 0.0, 1.0)).unwrap();
        assert_eq!(ok.ring(), square(0.0, 0.0, 1.0));
    }

    #[test]
    fn contains_interior_boundary_and_exterior() {
        let field = FieldPolygon::new(square(0.0, 0.0, 1.0)).unwrap();
        assert!(field.contains(LonLat::new(0.5, 0.5)));
        assert!(field.contains(LonLat::new(1.0, 0.5)), "edge counts as inside");
        assert!(field.contains(LonLat::new(0.0, 0.0)), "vertex counts as inside");
        assert!(!field.contains(LonLat::new(1.5, 0.5)));
    }

    #[test]
    fn concave_field_excludes_notch() {
        // U shape open to the north.
        let field = FieldPolygon::new(vec![
            LonLat::new(0.0, 0.0),
            LonLat::new(3.0, 0.0),
            LonLat::new(3.0, 3.0),
            LonLat::new(2.0, 3.0),
            LonLat::new(2.0, 1.0),
            LonLat::new(1.0, 1.0),
            LonLat::new(1.0, 3.0),
            LonLat::new(0.0, 3.0),
            LonLat::new(0.0, 0.0),
        ])
        .unwrap();
        assert!(!field.contains(LonLat::new(1.5, 2.0)));
        assert!(field.contains(LonLat::new(0.5, 2.0)));
        assert!(!field.intersects(&cell(1.25, 1.5, 0.5)), "cell inside the notch");
    }

    #[test]
    fn intersection_counts_touching() {
        let field = FieldPolygon::new(square(0.0, 0.0, 1.0)).unwrap();
        assert!(field.intersects(&cell(0.5, 0.5, 1.0)), "overlap");
        assert!(field.intersects(&cell(1.0, 0.0, 1.0)), "shared edge");
        assert!(field.intersects(&cell(0.25, 0.25, 0.5)), "containment");
        assert!(!field.intersects(&cell(2.0, 2.0, 1.0)), "disjoint");
    }

    #[test]
    fn buffer_grows_and_shrinks_in_metres() {
        let field = hundred_metres();
        let b = field.bbox();

        let grown = field.buffered(10.0).unwrap();
        let g = grown.bbox();
        assert_relative_eq!(haversine_distance_m(b.sw(), LonLat::new(b.min_lon, g.min_lat)), 10.0, max_relative = 1e-2);
        assert_relative_eq!(haversine_distance_m(b.sw(), LonLat::new(g.min_lon, b.min_lat)), 10.0, max_relative = 1e-2);
        assert!(grown.area_m2() > field.area_m2());
        assert!(grown.contains(LonLat::new(b.min_lon - 0.00005, b.center().lat)), "≈ 4 m west of the edge");

        let shrunk = field.buffered(-10.0).unwrap();
        assert_relative_eq!(shrunk.area_m2(), 80.0 * 80.0, max_relative = 1e-2);
        assert!(!shrunk.contains(b.sw()));

        assert_eq!(field.buffered(0.0).unwrap(), field);
        assert!(field.buffered(-60.0).is_err(), "nothing left");
    }
}
