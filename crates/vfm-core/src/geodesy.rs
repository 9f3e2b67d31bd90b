//! Spherical-earth geodesy used by the grid and the aggregator, on top of
//! `geo`'s metric spaces (mean earth radius 6 371 008.8 m).
//!
//! Distances and destinations follow great circles unless prefixed with
//! `rhumb_`, in which case they follow loxodromes (constant bearing lines).
//! Bearings are degrees clockwise from north.
use geo::{Bearing, ChamberlainDuquetteArea, Destination, Distance, Haversine, LineString, Point, Polygon, Rhumb};

use crate::coords::LonLat;

/// Mean earth radius in metres, the one `geo`'s spherical measures use.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance between two positions in metres.
pub fn haversine_distance_m(a: LonLat, b: LonLat) -> f64 {
    Haversine.distance(Point::from(a), Point::from(b))
}

/// Position reached by travelling `distance_m` from `origin` along the great
/// circle with initial bearing `bearing_deg`.
pub fn destination(origin: LonLat, distance_m: f64, bearing_deg: f64) -> LonLat {
    Haversine.destination(Point::from(origin), bearing_deg, distance_m).into()
}

/// Constant bearing from `start` to `end`, degrees.
pub fn rhumb_bearing_deg(start: LonLat, end: LonLat) -> f64 {
    Rhumb.bearing(Point::from(start), Point::from(end))
}

/// Length of the rhumb line between two positions in metres.
pub fn rhumb_distance_m(start: LonLat, end: LonLat) -> f64 {
    Rhumb.distance(Point::from(start), Point::from(end))
}

/// Position reached by travelling `distance_m` from `origin` at the constant
/// bearing `bearing_deg`.
pub fn rhumb_destination(origin: LonLat, distance_m: f64, bearing_deg: f64) -> LonLat {
    Rhumb.destination(Point::from(origin), bearing_deg, distance_m).into()
}

/// Rotate `p` about `pivot` by `angle_deg` (clockwise positive).
///
/// The point keeps its rhumb distance from the pivot while its rhumb bearing
/// is increased by the angle, which is a plane rotation in Mercator space.
pub fn rotate_point(p: LonLat, pivot: LonLat, angle_deg: f64) -> LonLat {
    if angle_deg == 0.0 || p == pivot {
        return p;
    }
    let distance = rhumb_distance_m(pivot, p);
    let bearing = rhumb_bearing_deg(pivot, p) + angle_deg;
    rhumb_destination(pivot, distance, bearing)
}

/// Spherical area of a ring in square metres. The ring may be open or
/// closed; winding does not matter.
pub fn ring_area_m2(ring: &[LonLat]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let exterior: LineString<f64> = ring.iter().copied().collect();
    Polygon::new(exterior, vec![]).chamberlain_duquette_unsigned_area()
}
