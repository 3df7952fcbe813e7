//! Line-of-sight filtering for a set of segments seen from a single light point.
//!
//! Segments are first split wherever they cross each other, then an angular
//! sweep around the light keeps, for every angular interval, only the segment
//! nearest to the light. The output is the list of visible sub-segments, each
//! tagged with the user data of the segment it was cut from.
//!
//! The sweep is the classic two-pass "open list" algorithm: endpoints are
//! sorted by angle (begin endpoints before end endpoints on ties), the first
//! pass primes the open list with segments straddling the starting ray, and the
//! second pass emits a visible piece each time the nearest segment changes.

use crate::vector::Vector2;
use std::cmp::Ordering;

const RESCALE_FACTOR: f64 = 10_000.0;
const EPSILON: f64 = 1e-6;
const SHORTEN_RATIO: f64 = 0.00001;

/// A segment taking part in the visibility computation.
#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleSegment<T> {
    pub points: [Vector2; 2],
    pub user_data: T,
}

impl<T> ObstacleSegment<T> {
    pub fn new(a: Vector2, b: Vector2, user_data: T) -> Self {
        Self {
            points: [a, b],
            user_data,
        }
    }
}

/// Returns the parts of `segments` actually visible from `light`.
pub fn only_visible<T: Clone>(light: Vector2, segments: &[ObstacleSegment<T>]) -> Vec<ObstacleSegment<T>> {
    let scaled: Vec<ObstacleSegment<T>> = segments
        .iter()
        .map(|s| ObstacleSegment {
            points: [s.points[0].scale(RESCALE_FACTOR), s.points[1].scale(RESCALE_FACTOR)],
            user_data: s.user_data.clone(),
        })
        .collect();

    let broken = break_intersections(&scaled);

    let mut processor = VisibilityProcessor::new(&broken);
    processor.set_light_location(light.scale(RESCALE_FACTOR));
    processor.sweep();

    processor
        .output
        .iter()
        .map(|visible| ObstacleSegment {
            points: [
                visible.p1.scale(1.0 / RESCALE_FACTOR),
                visible.p2.scale(1.0 / RESCALE_FACTOR),
            ],
            user_data: broken[visible.segment].user_data.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct EndPoint {
    point: Vector2,
    begin: bool,
    segment: usize,
    angle: f64,
}

#[derive(Debug, Clone, Copy)]
struct VisibleSegment {
    p1: Vector2,
    p2: Vector2,
    segment: usize,
}

struct VisibilityProcessor {
    /// Endpoint pairs, indexed like the input segments.
    segments: Vec<[Vector2; 2]>,
    end_points: Vec<EndPoint>,
    center: Vector2,
    output: Vec<VisibleSegment>,
}

impl VisibilityProcessor {
    fn new<T>(segments: &[ObstacleSegment<T>]) -> Self {
        let mut end_points = Vec::with_capacity(segments.len() * 2);
        for (index, segment) in segments.iter().enumerate() {
            for point in segment.points {
                end_points.push(EndPoint {
                    point,
                    begin: false,
                    segment: index,
                    angle: 0.0,
                });
            }
        }

        Self {
            segments: segments.iter().map(|s| s.points).collect(),
            end_points,
            center: Vector2::ZERO,
            output: Vec::new(),
        }
    }

    fn set_light_location(&mut self, center: Vector2) {
        self.center = center;

        for pair in self.end_points.chunks_mut(2) {
            let [p1, p2] = pair else { continue };

            p1.angle = (p1.point.y - center.y).atan2(p1.point.x - center.x);
            p2.angle = (p2.point.y - center.y).atan2(p2.point.x - center.x);

            let mut d_angle = p2.angle - p1.angle;
            if d_angle <= -std::f64::consts::PI {
                d_angle += 2.0 * std::f64::consts::PI;
            }
            if d_angle > std::f64::consts::PI {
                d_angle -= 2.0 * std::f64::consts::PI;
            }
            p1.begin = d_angle > 0.0;
            p2.begin = !p1.begin;
        }
    }

    fn sweep(&mut self) {
        self.output.clear();

        // Traverse in angle order; on ties begin nodes come before end nodes
        self.end_points.sort_by(|a, b| {
            a.angle
                .partial_cmp(&b.angle)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.begin.cmp(&a.begin))
        });

        let mut open: Vec<usize> = Vec::new();
        let mut begin_angle = 0.0;

        for pass in 0..2 {
            for index in 0..self.end_points.len() {
                let p = self.end_points[index];
                let current_old = open.first().copied();

                if p.begin {
                    let position = open
                        .iter()
                        .position(|&other| !self.segment_in_front_of(p.segment, other, self.center))
                        .unwrap_or(open.len());
                    open.insert(position, p.segment);
                } else if let Some(position) = open.iter().position(|&other| other == p.segment) {
                    open.remove(position);
                }

                let current_new = open.first().copied();

                if current_old != current_new {
                    if pass == 1 {
                        self.add_triangle(begin_angle, p.angle, current_old);
                    }
                    begin_angle = p.angle;
                }
            }
        }
    }

    /// Not anti-symmetric; only valid for the configurations the sweep produces.
    fn segment_in_front_of(&self, a: usize, b: usize, relative_to: Vector2) -> bool {
        let [a1, a2] = self.segments[a];
        let [b1, b2] = self.segments[b];

        let a_1 = left_of(a1, a2, interpolate(b1, b2, SHORTEN_RATIO));
        let a_2 = left_of(a1, a2, interpolate(b2, b1, SHORTEN_RATIO));
        let a_3 = left_of(a1, a2, relative_to);
        let b_1 = left_of(b1, b2, interpolate(a1, a2, SHORTEN_RATIO));
        let b_2 = left_of(b1, b2, interpolate(a2, a1, SHORTEN_RATIO));
        let b_3 = left_of(b1, b2, relative_to);

        if b_1 == b_2 && b_2 != b_3 {
            return true;
        }
        if a_1 == a_2 && a_2 == a_3 {
            return true;
        }
        if a_1 == a_2 && a_2 != a_3 {
            return false;
        }
        if b_1 == b_2 && b_2 == b_3 {
            return false;
        }

        // Crossing segments; break_intersections makes this rare
        false
    }

    fn add_triangle(&mut self, angle1: f64, angle2: f64, segment: Option<usize>) {
        let Some(segment) = segment else { return };

        let [s1, s2] = self.segments[segment];
        let ray1 = self.center + Vector2::new(angle1.cos(), angle1.sin());
        let ray2 = self.center + Vector2::new(angle2.cos(), angle2.sin());

        let (Some(p_begin), Some(p_end)) = (
            line_intersection(s1, s2, self.center, ray1),
            line_intersection(s1, s2, self.center, ray2),
        ) else {
            return;
        };

        self.output.push(VisibleSegment {
            p1: p_begin,
            p2: p_end,
            segment,
        });
    }
}

fn left_of(s1: Vector2, s2: Vector2, p: Vector2) -> bool {
    let cross = (s2.x - s1.x) * (p.y - s1.y) - (s2.y - s1.y) * (p.x - s1.x);
    cross < 0.0
}

fn interpolate(p: Vector2, q: Vector2, f: f64) -> Vector2 {
    Vector2::new(p.x * (1.0 - f) + q.x * f, p.y * (1.0 - f) + q.y * f)
}

/// Intersection of the infinite lines p1-p2 and p3-p4; `None` when parallel.
fn line_intersection(p1: Vector2, p2: Vector2, p3: Vector2, p4: Vector2) -> Option<Vector2> {
    let denominator = (p4.y - p3.y) * (p2.x - p1.x) - (p4.x - p3.x) * (p2.y - p1.y);
    if denominator == 0.0 {
        return None;
    }

    let s = ((p4.x - p3.x) * (p1.y - p3.y) - (p4.y - p3.y) * (p1.x - p3.x)) / denominator;
    let point = Vector2::new(p1.x + s * (p2.x - p1.x), p1.y + s * (p2.y - p1.y));
    (point.x.is_finite() && point.y.is_finite()).then_some(point)
}

fn distance_sq(a: Vector2, b: Vector2) -> f64 {
    (a - b).mag_sq()
}

fn same_point(a: Vector2, b: Vector2) -> bool {
    (a.x - b.x).abs() < EPSILON && (a.y - b.y).abs() < EPSILON
}

fn intersect_lines(a1: Vector2, a2: Vector2, b1: Vector2, b2: Vector2) -> Option<Vector2> {
    let db = b2 - b1;
    let da = a2 - a1;

    let u_b = db.y * da.x - db.x * da.y;
    if u_b == 0.0 {
        return None;
    }

    let ua = (db.x * (a1.y - b1.y) - db.y * (a1.x - b1.x)) / u_b;
    Some(Vector2::new(a1.x + ua * da.x, a1.y + ua * da.y))
}

fn is_on_segment(i: Vector2, j: Vector2, k: Vector2) -> bool {
    (i.x <= k.x || j.x <= k.x)
        && (k.x <= i.x || k.x <= j.x)
        && (i.y <= k.y || j.y <= k.y)
        && (k.y <= i.y || k.y <= j.y)
}

fn compute_direction(i: Vector2, j: Vector2, k: Vector2) -> i8 {
    let a = (k.x - i.x) * (j.y - i.y);
    let b = (j.x - i.x) * (k.y - i.y);
    match a.partial_cmp(&b) {
        Some(Ordering::Less) => -1,
        Some(Ordering::Greater) => 1,
        _ => 0,
    }
}

fn do_segments_intersect(p1: Vector2, p2: Vector2, p3: Vector2, p4: Vector2) -> bool {
    let d1 = compute_direction(p3, p4, p1);
    let d2 = compute_direction(p3, p4, p2);
    let d3 = compute_direction(p1, p2, p3);
    let d4 = compute_direction(p1, p2, p4);

    (((d1 > 0 && d2 < 0) || (d1 < 0 && d2 > 0)) && ((d3 > 0 && d4 < 0) || (d3 < 0 && d4 > 0)))
        || (d1 == 0 && is_on_segment(p3, p4, p1))
        || (d2 == 0 && is_on_segment(p3, p4, p2))
        || (d3 == 0 && is_on_segment(p1, p2, p3))
        || (d4 == 0 && is_on_segment(p1, p2, p4))
}

/// Splits every segment at the points where other segments cross it.
fn break_intersections<T: Clone>(segments: &[ObstacleSegment<T>]) -> Vec<ObstacleSegment<T>> {
    let mut output = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        let [start, end] = segment.points;
        let mut intersections: Vec<Vector2> = Vec::new();

        for (j, other) in segments.iter().enumerate() {
            if i == j {
                continue;
            }

            let [o1, o2] = other.points;
            if !do_segments_intersect(start, end, o1, o2) {
                continue;
            }

            if let Some(point) = intersect_lines(start, end, o1, o2) {
                if same_point(point, start) || same_point(point, end) {
                    continue;
                }
                intersections.push(point);
            }
        }

        let mut cursor = start;
        while !intersections.is_empty() {
            let mut nearest = 0;
            let mut nearest_distance = distance_sq(cursor, intersections[0]);
            for (k, point) in intersections.iter().enumerate().skip(1) {
                let distance = distance_sq(cursor, *point);
                if distance < nearest_distance {
                    nearest_distance = distance;
                    nearest = k;
                }
            }

            let cut = intersections.remove(nearest);
            output.push(ObstacleSegment::new(cursor, cut, segment.user_data.clone()));
            cursor = cut;
        }

        output.push(ObstacleSegment::new(cursor, end, segment.user_data.clone()));
    }

    output
}
