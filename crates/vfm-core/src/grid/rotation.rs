//! Rotation angle giving the tightest axis-aligned bounding box.
//!
//! The bounding-box area of a rotated polygon is assumed unimodal over
//! [0°, 90°] (a rectangle's bounding box repeats every quarter turn), so a
//! ternary search converges in O(log(90/ε)) evaluations. Strongly concave
//! fields can in principle present several local minima; the search then
//! settles on one of them.
use crate::geodesy::ring_area_m2;
use crate::geometry::FieldPolygon;

/// Search precision in degrees.
pub const ROTATION_EPSILON_DEG: f64 = 0.1;

/// Area in m² of the bounding box of `field` rotated by `angle_deg` about
/// the centre of its unrotated bounding box.
pub fn rotated_bbox_area(field: &FieldPolygon, angle_deg: f64) -> f64 {
    let pivot = field.bbox().center();
    let rotated = field.rotated(angle_deg, pivot);
    ring_area_m2(&rotated.bbox().ring())
}

/// Rotation in [0°, 90°] minimising the bounding-box area, rounded to one decimal.
pub fn find_optimal_rotation(field: &FieldPolygon) -> f64 {
    let mut lo = 0.0f64;
    let mut hi = 90.0f64;
    let mut evaluations = 0usize;

    while hi - lo > ROTATION_EPSILON_DEG {
        let mid1 = lo + (hi - lo) / 3.0;
        let mid2 = hi - (hi - lo) / 3.0;
        evaluations += 2;
        if rotated_bbox_area(field, mid1) < rotated_bbox_area(field, mid2) {
            hi = mid2;
        } else {
            lo = mid1;
        }
    }

    let angle = ((lo + hi) / 2.0 * 10.0).round() / 10.0;
    tracing::debug!(angle, evaluations, "optimal grid rotation");
    angle
}
