//! Plane geometry helpers used by steering and perception.

use crate::vector::Vector2;
use std::f64::consts::PI;

const ZERO_TOLERANCE: f64 = 1e-10;
const ON_SEGMENT_TOLERANCE: f64 = 1e-4;

fn is_zero(value: f64) -> bool {
    value.abs() < ZERO_TOLERANCE
}

/// Maps an angle from `[0, 2π)` to `(-π, π]`.
pub fn full_circle_to_signed_half_circle(rad: f64) -> f64 {
    if rad > PI {
        rad - 2.0 * PI
    } else if rad < -PI {
        rad + 2.0 * PI
    } else {
        rad
    }
}

/// Turns a vector expressed relative to the current heading into an absolute one.
///
/// The heading change is clamped to `max_angle` when one is given.
pub fn local_angle_to_absolute_angle_vec(
    current_heading: f64,
    vec: Vector2,
    max_angle: Option<f64>,
) -> Vector2 {
    let mut relative = full_circle_to_signed_half_circle(vec.angle());

    if let Some(max) = max_angle {
        if relative.abs() > max {
            relative = max.copysign(relative);
        }
    }

    vec.set_angle(current_heading + relative)
}

/// Result of a segment/segment intersection test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentIntersection {
    pub point: Vector2,
    pub intersects: bool,
    pub colinear: bool,
    pub parallel: bool,
}

impl SegmentIntersection {
    fn miss(colinear: bool, parallel: bool) -> Self {
        Self {
            point: Vector2::ZERO,
            intersects: false,
            colinear,
            parallel,
        }
    }
}

/// Intersection of segments `p→p2` and `q→q2`.
pub fn intersection_with_line_segment(
    p: Vector2,
    p2: Vector2,
    q: Vector2,
    q2: Vector2,
) -> SegmentIntersection {
    let r = p2 - p;
    let s = q2 - q;
    let rxs = r.cross(&s);
    let qp = q - p;
    let qpxr = qp.cross(&r);

    if is_zero(rxs) && is_zero(qpxr) {
        let q_on_r = qp.dot(&r);
        let p_on_s = (p - q).dot(&s);
        let overlapping =
            (0.0..=r.dot(&r)).contains(&q_on_r) || (0.0..=s.dot(&s)).contains(&p_on_s);

        return SegmentIntersection {
            point: Vector2::ZERO,
            intersects: overlapping,
            colinear: true,
            parallel: true,
        };
    }

    if is_zero(rxs) {
        return SegmentIntersection::miss(false, true);
    }

    let t = qp.cross(&s) / rxs;
    let u = qpxr / rxs;

    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        return SegmentIntersection {
            point: p + r.scale(t),
            intersects: true,
            colinear: false,
            parallel: false,
        };
    }

    SegmentIntersection::miss(false, true)
}

/// Points where the infinite line through `p1` and `p2` crosses the circle.
pub fn line_circle_intersection_points(
    p1: Vector2,
    p2: Vector2,
    center: Vector2,
    radius: f64,
) -> Vec<Vector2> {
    let local_p1 = p1 - center;
    let local_p2 = p2 - center;
    let d = local_p2 - local_p1;

    let a = d.mag_sq();
    if a == 0.0 {
        return Vec::new();
    }
    let b = 2.0 * d.dot(&local_p1);
    let c = local_p1.mag_sq() - radius * radius;

    let delta = b * b - 4.0 * a * c;
    if delta < 0.0 {
        return Vec::new();
    }

    if delta == 0.0 {
        let u = -b / (2.0 * a);
        return vec![p1 + d.scale(u)];
    }

    let root = delta.sqrt();
    let u1 = (-b + root) / (2.0 * a);
    let u2 = (-b - root) / (2.0 * a);
    vec![p1 + d.scale(u1), p1 + d.scale(u2)]
}

/// Whether `p` lies on segment `a→b`, within a small tolerance.
pub fn point_on_line_segment(p: Vector2, a: Vector2, b: Vector2) -> bool {
    let t = ON_SEGMENT_TOLERANCE;

    let zero = (b.x - a.x) * (p.y - a.y) - (p.x - a.x) * (b.y - a.y);
    if zero.abs() > t {
        return false;
    }

    if (a.x - b.x).abs() > t {
        let (lo, hi) = if a.x > b.x { (b.x, a.x) } else { (a.x, b.x) };
        return p.x + t > lo && p.x - t < hi;
    }

    let (lo, hi) = if a.y > b.y { (b.y, a.y) } else { (a.y, b.y) };
    p.y + t > lo && p.y - t < hi
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub lower: Vector2,
    pub upper: Vector2,
}

impl Aabb {
    pub fn from_points(points: &[Vector2]) -> Aabb {
        let mut lower = Vector2::new(f64::INFINITY, f64::INFINITY);
        let mut upper = Vector2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            lower.x = lower.x.min(p.x);
            lower.y = lower.y.min(p.y);
            upper.x = upper.x.max(p.x);
            upper.y = upper.y.max(p.y);
        }
        Aabb { lower, upper }
    }

    pub fn around(center: Vector2, radius: f64) -> Aabb {
        Aabb {
            lower: Vector2::new(center.x - radius, center.y - radius),
            upper: Vector2::new(center.x + radius, center.y + radius),
        }
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        !(other.lower.x > self.upper.x
            || other.upper.x < self.lower.x
            || other.lower.y > self.upper.y
            || other.upper.y < self.lower.y)
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            lower: Vector2::new(self.lower.x.min(other.lower.x), self.lower.y.min(other.lower.y)),
            upper: Vector2::new(self.upper.x.max(other.upper.x), self.upper.y.max(other.upper.y)),
        }
    }

    pub fn scale(&self, factor: f64) -> Aabb {
        Aabb::from_points(&[self.lower.scale(factor), self.upper.scale(factor)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_signed_half_circle() {
        assert_approx_eq!(full_circle_to_signed_half_circle(3.0 * PI / 2.0), -PI / 2.0);
        assert_approx_eq!(full_circle_to_signed_half_circle(PI / 4.0), PI / 4.0);
        assert_approx_eq!(full_circle_to_signed_half_circle(-3.0 * PI / 2.0), PI / 2.0);
    }

    #[test]
    fn test_local_to_absolute_clamps_turn() {
        // Asking for a hard right turn while heading north, limited to 15°
        let max = 15f64.to_radians();
        let v = local_angle_to_absolute_angle_vec(0.0, Vector2::new(1.0, 0.0), Some(max));
        assert_approx_eq!(v.angle(), max);
        assert_approx_eq!(v.mag(), 1.0);

        let left = local_angle_to_absolute_angle_vec(0.0, Vector2::new(-1.0, 0.0), Some(max));
        assert_approx_eq!(left.angle(), 2.0 * PI - max);

        let free = local_angle_to_absolute_angle_vec(PI, Vector2::new(0.0, 2.0), None);
        assert_approx_eq!(free.angle(), PI);
    }

    #[test]
    fn test_segment_intersection() {
        let hit = intersection_with_line_segment(
            Vector2::new(0.0, 0.0),
            Vector2::new(2.0, 2.0),
            Vector2::new(0.0, 2.0),
            Vector2::new(2.0, 0.0),
        );
        assert!(hit.intersects);
        assert!(!hit.colinear);
        assert_approx_eq!(hit.point.x, 1.0);
        assert_approx_eq!(hit.point.y, 1.0);

        let parallel = intersection_with_line_segment(
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
            Vector2::new(1.0, 1.0),
        );
        assert!(!parallel.intersects);
        assert!(parallel.parallel);

        let colinear = intersection_with_line_segment(
            Vector2::new(0.0, 0.0),
            Vector2::new(2.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(3.0, 0.0),
        );
        assert!(colinear.intersects);
        assert!(colinear.colinear);
    }

    #[test]
    fn test_line_circle_intersections() {
        let points = line_circle_intersection_points(
            Vector2::new(-5.0, 0.0),
            Vector2::new(5.0, 0.0),
            Vector2::ZERO,
            2.0,
        );
        assert_eq!(points.len(), 2);
        assert!(points.iter().any(|p| (p.x - 2.0).abs() < 1e-9));
        assert!(points.iter().any(|p| (p.x + 2.0).abs() < 1e-9));

        let miss = line_circle_intersection_points(
            Vector2::new(-5.0, 3.0),
            Vector2::new(5.0, 3.0),
            Vector2::ZERO,
            2.0,
        );
        assert!(miss.is_empty());
    }

    #[test]
    fn test_point_on_segment() {
        let a = Vector2::new(0.0, 0.0);
        let b = Vector2::new(4.0, 0.0);
        assert!(point_on_line_segment(Vector2::new(2.0, 0.0), a, b));
        assert!(!point_on_line_segment(Vector2::new(5.0, 0.0), a, b));
        assert!(!point_on_line_segment(Vector2::new(2.0, 0.1), a, b));
        assert!(point_on_line_segment(
            Vector2::new(0.0, 1.0),
            Vector2::new(0.0, 0.0),
            Vector2::new(0.0, 3.0)
        ));
    }

    #[test]
    fn test_aabb_overlap() {
        let a = Aabb::from_points(&[Vector2::new(0.0, 0.0), Vector2::new(2.0, 2.0)]);
        let b = Aabb::around(Vector2::new(3.0, 3.0), 1.5);
        let c = Aabb::around(Vector2::new(10.0, 10.0), 1.0);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert_eq!(a.union(&c).upper, Vector2::new(11.0, 11.0));
    }
}
