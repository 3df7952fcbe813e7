//! A small 2D rigid body world for the arena.
//!
//! The world holds two kinds of bodies:
//! - dynamic circles (agents, projectiles), which move with their velocity
//! - static edge loops (grounds, obstacles, sensors), built from map polygons
//!
//! Each [`PhysicsWorld::step`] runs these phases in order:
//! 1. Damping and a swept AABB broad phase.
//! 2. The user contact filter, then a time of impact search per pair.
//! 3. Advancing the bodies, then solving contacts over a number of velocity
//!    and position iterations.
//! 4. Recording contacts that just began; [`PhysicsWorld::drain_contacts`]
//!    hands them out.
//!
//! Everything is expressed in physical units.

use shared::trigo::Aabb;
use shared::Vector2;
use std::collections::{BTreeMap, BTreeSet};

/// Distance below which two shapes are considered touching.
const CONTACT_TOLERANCE: f64 = 1e-9;
/// Iterations of the ternary and bisection searches used for time of impact.
const SEARCH_ITERATIONS: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyHandle(u64);

/// What a body stands for in the game, stored as its user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyTag {
    Agent,
    Projectile,
    Obstacle,
    Ground,
    Sensor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyDescriptor {
    pub tag: BodyTag,
    pub entity: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle { radius: f64 },
    /// Closed loop of edges going from each vertex's predecessor to the vertex.
    EdgeLoop { vertices: Vec<Vector2> },
}

#[derive(Debug, Clone)]
pub struct Body {
    pub shape: Shape,
    pub position: Vector2,
    pub velocity: Vector2,
    pub angle: f64,
    pub linear_damping: f64,
    pub bullet: bool,
    pub sensor: bool,
    pub descriptor: BodyDescriptor,
    inverse_mass: f64,
}

impl Body {
    pub fn is_static(&self) -> bool {
        self.inverse_mass == 0.0
    }

    ///Returns the circle radius, or 0 for edge loops.
    pub fn radius(&self) -> f64 {
        match self.shape {
            Shape::Circle { radius } => radius,
            Shape::EdgeLoop { .. } => 0.0,
        }
    }

    /// Edges in world coordinates, in fixture order.
    pub fn edges(&self) -> Vec<(Vector2, Vector2)> {
        match &self.shape {
            Shape::Circle { .. } => Vec::new(),
            Shape::EdgeLoop { vertices } => {
                let mut edges = Vec::with_capacity(vertices.len());
                let mut prev = vertices.len().saturating_sub(1);
                for cur in 0..vertices.len() {
                    edges.push((self.position + vertices[prev], self.position + vertices[cur]));
                    prev = cur;
                }
                edges
            }
        }
    }

    pub fn aabb(&self) -> Aabb {
        match &self.shape {
            Shape::Circle { radius } => Aabb::around(self.position, *radius),
            Shape::EdgeLoop { vertices } => {
                let points: Vec<Vector2> = vertices.iter().map(|v| self.position + *v).collect();
                Aabb::from_points(&points)
            }
        }
    }

    fn swept_aabb(&self, dt: f64) -> Aabb {
        let start = self.aabb();
        let end = Aabb {
            lower: start.lower + self.velocity.scale(dt),
            upper: start.upper + self.velocity.scale(dt),
        };
        start.union(&end)
    }
}

/// Construction parameters for a body.
#[derive(Debug, Clone)]
pub struct BodyDef {
    pub shape: Shape,
    pub position: Vector2,
    pub velocity: Vector2,
    pub angle: f64,
    pub density: f64,
    pub linear_damping: f64,
    pub bullet: bool,
    pub sensor: bool,
    pub is_static: bool,
    pub descriptor: BodyDescriptor,
}

impl BodyDef {
    pub fn dynamic_circle(radius: f64, position: Vector2, descriptor: BodyDescriptor) -> Self {
        Self {
            shape: Shape::Circle { radius },
            position,
            velocity: Vector2::ZERO,
            angle: 0.0,
            density: 1.0,
            linear_damping: 0.0,
            bullet: false,
            sensor: false,
            is_static: false,
            descriptor,
        }
    }

    pub fn static_loop(vertices: Vec<Vector2>, descriptor: BodyDescriptor) -> Self {
        Self {
            shape: Shape::EdgeLoop { vertices },
            position: Vector2::ZERO,
            velocity: Vector2::ZERO,
            angle: 0.0,
            density: 0.0,
            linear_damping: 0.0,
            bullet: false,
            sensor: false,
            is_static: true,
            descriptor,
        }
    }
}

/// A contact that started during the last step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub descriptor_a: BodyDescriptor,
    pub descriptor_b: BodyDescriptor,
    /// World contact point, in physical units.
    pub point: Vector2,
    /// Unit normal pointing from A to B.
    pub normal: Vector2,
    /// Velocities of both bodies when they met, before the contact response.
    pub velocity_a: Vector2,
    pub velocity_b: Vector2,
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    a: BodyHandle,
    b: BodyHandle,
    toi: f64,
    point: Vector2,
    normal: Vector2,
    /// Edge of B touched by circle A, for circle vs loop pairs.
    edge: Option<(Vector2, Vector2)>,
    solid: bool,
    approaching: bool,
    velocity_a: Vector2,
    velocity_b: Vector2,
}

pub type ContactFilter<'a> = &'a dyn Fn(&BodyDescriptor, &BodyDescriptor) -> bool;

#[derive(Debug, Default)]
pub struct PhysicsWorld {
    bodies: BTreeMap<BodyHandle, Body>,
    next_handle: u64,
    touching: BTreeSet<(BodyHandle, BodyHandle)>,
    begin_contacts: Vec<Contact>,
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_body(&mut self, def: BodyDef) -> BodyHandle {
        let inverse_mass = match def.shape {
            Shape::Circle { radius } if !def.is_static => {
                let mass = def.density * std::f64::consts::PI * radius * radius;
                if mass > 0.0 {
                    1.0 / mass
                } else {
                    1.0
                }
            }
            _ => 0.0,
        };

        let handle = BodyHandle(self.next_handle);
        self.next_handle += 1;

        self.bodies.insert(
            handle,
            Body {
                shape: def.shape,
                position: def.position,
                velocity: if def.is_static { Vector2::ZERO } else { def.velocity },
                angle: def.angle,
                linear_damping: def.linear_damping,
                bullet: def.bullet,
                sensor: def.sensor,
                descriptor: def.descriptor,
                inverse_mass,
            },
        );

        handle
    }

    pub fn destroy_body(&mut self, handle: BodyHandle) -> Option<Body> {
        self.touching.retain(|(a, b)| *a != handle && *b != handle);
        self.begin_contacts
            .retain(|c| c.body_a != handle && c.body_b != handle);
        self.bodies.remove(&handle)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(&handle)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(&handle)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn position(&self, handle: BodyHandle) -> Vector2 {
        self.body(handle).map(|b| b.position).unwrap_or_default()
    }

    pub fn velocity(&self, handle: BodyHandle) -> Vector2 {
        self.body(handle).map(|b| b.velocity).unwrap_or_default()
    }

    pub fn angle(&self, handle: BodyHandle) -> f64 {
        self.body(handle).map(|b| b.angle).unwrap_or_default()
    }

    pub fn set_position(&mut self, handle: BodyHandle, position: Vector2) {
        if let Some(body) = self.body_mut(handle) {
            body.position = position;
        }
    }

    pub fn set_velocity(&mut self, handle: BodyHandle, velocity: Vector2) {
        if let Some(body) = self.body_mut(handle) {
            if !body.is_static() {
                body.velocity = velocity;
            }
        }
    }

    pub fn set_angle(&mut self, handle: BodyHandle, angle: f64) {
        if let Some(body) = self.body_mut(handle) {
            body.angle = angle;
        }
    }

    /// Contacts that began since the last drain, in detection order.
    pub fn drain_contacts(&mut self) -> Vec<Contact> {
        std::mem::take(&mut self.begin_contacts)
    }

    ///Returns the bodies with a shape (or, for loops, an edge) overlapping `aabb`.
    pub fn query_aabb(&self, aabb: &Aabb) -> Vec<BodyHandle> {
        self.bodies
            .iter()
            .filter(|(_, body)| match body.shape {
                Shape::Circle { .. } => body.aabb().overlaps(aabb),
                Shape::EdgeLoop { .. } => body
                    .edges()
                    .iter()
                    .any(|(a, b)| Aabb::from_points(&[*a, *b]).overlaps(aabb)),
            })
            .map(|(handle, _)| *handle)
            .collect()
    }

    /// Advances the world by `dt` seconds.
    ///
    /// `filter` is asked about every pair whose swept bounds overlap; pairs it
    /// refuses are never tested further and never produce contacts.
    pub fn step(
        &mut self,
        dt: f64,
        velocity_iterations: usize,
        position_iterations: usize,
        filter: ContactFilter,
    ) {
        for body in self.bodies.values_mut() {
            if !body.is_static() && body.linear_damping > 0.0 {
                body.velocity = body.velocity.scale(1.0 / (1.0 + dt * body.linear_damping));
            }
        }

        let hits = self.find_hits(dt, filter);

        // Every dynamic body stops at its earliest blocking impact
        let mut stop_at: BTreeMap<BodyHandle, f64> = BTreeMap::new();
        for hit in hits.iter().filter(|h| h.solid && h.approaching) {
            for handle in [hit.a, hit.b] {
                let entry = stop_at.entry(handle).or_insert(1.0);
                *entry = entry.min(hit.toi);
            }
        }

        for (handle, body) in self.bodies.iter_mut() {
            if body.is_static() {
                continue;
            }
            let fraction = stop_at.get(handle).copied().unwrap_or(1.0);
            body.position = body.position + body.velocity.scale(dt * fraction);
        }

        let solid: Vec<&Hit> = hits.iter().filter(|h| h.solid).collect();

        for _ in 0..velocity_iterations {
            for hit in &solid {
                self.solve_velocity(hit);
            }
        }

        for _ in 0..position_iterations {
            for hit in &solid {
                self.solve_position(hit);
            }
        }

        let mut touching = BTreeSet::new();
        for hit in &hits {
            let pair = (hit.a, hit.b);
            if !touching.insert(pair) || self.touching.contains(&pair) {
                continue;
            }

            let (Some(a), Some(b)) = (self.bodies.get(&hit.a), self.bodies.get(&hit.b)) else {
                continue;
            };

            self.begin_contacts.push(Contact {
                body_a: hit.a,
                body_b: hit.b,
                descriptor_a: a.descriptor,
                descriptor_b: b.descriptor,
                point: hit.point,
                normal: hit.normal,
                velocity_a: hit.velocity_a,
                velocity_b: hit.velocity_b,
            });
        }
        self.touching = touching;
    }

    /// Earliest impact per candidate pair, sorted by time of impact.
    fn find_hits(&self, dt: f64, filter: ContactFilter) -> Vec<Hit> {
        let handles: Vec<BodyHandle> = self.bodies.keys().copied().collect();
        let swept: Vec<Aabb> = handles
            .iter()
            .map(|h| self.bodies[h].swept_aabb(dt))
            .collect();

        let mut hits = Vec::new();
        for i in 0..handles.len() {
            for j in (i + 1)..handles.len() {
                let (a, b) = (&self.bodies[&handles[i]], &self.bodies[&handles[j]]);
                if a.is_static() && b.is_static() {
                    continue;
                }
                if !swept[i].overlaps(&swept[j]) {
                    continue;
                }
                if !filter(&a.descriptor, &b.descriptor) {
                    continue;
                }

                if let Some(hit) = time_of_impact(handles[i], a, handles[j], b, dt) {
                    hits.push(hit);
                }
            }
        }

        hits.sort_by(|x, y| x.toi.total_cmp(&y.toi));
        hits
    }

    fn solve_velocity(&mut self, hit: &Hit) {
        let (Some(a), Some(b)) = (self.bodies.get(&hit.a), self.bodies.get(&hit.b)) else {
            return;
        };
        let (ima, imb) = (a.inverse_mass, b.inverse_mass);
        if ima + imb == 0.0 {
            return;
        }

        let normal_velocity = (b.velocity - a.velocity).dot(&hit.normal);
        if normal_velocity >= 0.0 {
            return;
        }

        let impulse = -normal_velocity / (ima + imb);
        let (va, vb) = (
            a.velocity - hit.normal.scale(impulse * ima),
            b.velocity + hit.normal.scale(impulse * imb),
        );

        if let Some(a) = self.bodies.get_mut(&hit.a) {
            a.velocity = va;
        }
        if let Some(b) = self.bodies.get_mut(&hit.b) {
            b.velocity = vb;
        }
    }

    fn solve_position(&mut self, hit: &Hit) {
        let (Some(a), Some(b)) = (self.bodies.get(&hit.a), self.bodies.get(&hit.b)) else {
            return;
        };
        let (ima, imb) = (a.inverse_mass, b.inverse_mass);
        if ima + imb == 0.0 {
            return;
        }

        // Penetration depth and unit normal from A to B
        let (penetration, normal) = match (&a.shape, &b.shape, hit.edge) {
            (Shape::Circle { radius: ra }, Shape::Circle { radius: rb }, _) => {
                let delta = b.position - a.position;
                let distance = delta.mag();
                let normal = if distance > 0.0 {
                    delta.scale(1.0 / distance)
                } else {
                    hit.normal
                };
                (ra + rb - distance, normal)
            }
            (Shape::Circle { radius }, Shape::EdgeLoop { .. }, Some((p, q))) => {
                let closest = closest_point_on_segment(a.position, p, q);
                let delta = closest - a.position;
                let distance = delta.mag();
                let normal = if distance > 0.0 {
                    delta.scale(1.0 / distance)
                } else {
                    hit.normal
                };
                (radius - distance, normal)
            }
            (Shape::EdgeLoop { .. }, Shape::Circle { radius }, Some((p, q))) => {
                let closest = closest_point_on_segment(b.position, p, q);
                let delta = b.position - closest;
                let distance = delta.mag();
                let normal = if distance > 0.0 {
                    delta.scale(1.0 / distance)
                } else {
                    hit.normal
                };
                (radius - distance, normal)
            }
            _ => return,
        };

        if penetration <= 0.0 {
            return;
        }

        let share_a = penetration * ima / (ima + imb);
        let share_b = penetration * imb / (ima + imb);

        if let Some(a) = self.bodies.get_mut(&hit.a) {
            a.position = a.position - normal.scale(share_a);
        }
        if let Some(b) = self.bodies.get_mut(&hit.b) {
            b.position = b.position + normal.scale(share_b);
        }
    }
}

fn closest_point_on_segment(p: Vector2, a: Vector2, b: Vector2) -> Vector2 {
    let ab = b - a;
    let len_sq = ab.mag_sq();
    if len_sq == 0.0 {
        return a;
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    a + ab.scale(t)
}

/// First `t` in `[0, 1]` where the convex gap function `gap` drops to zero.
fn first_contact(gap: impl Fn(f64) -> f64) -> Option<f64> {
    if gap(0.0) <= CONTACT_TOLERANCE {
        return Some(0.0);
    }

    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    for _ in 0..SEARCH_ITERATIONS {
        let m1 = lo + (hi - lo) / 3.0;
        let m2 = hi - (hi - lo) / 3.0;
        if gap(m1) < gap(m2) {
            hi = m2;
        } else {
            lo = m1;
        }
    }

    let t_min = (lo + hi) / 2.0;
    if gap(t_min) > CONTACT_TOLERANCE {
        return None;
    }

    let (mut lo, mut hi) = (0.0_f64, t_min);
    for _ in 0..SEARCH_ITERATIONS {
        let mid = (lo + hi) / 2.0;
        if gap(mid) <= CONTACT_TOLERANCE {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    Some(hi)
}

fn time_of_impact(ha: BodyHandle, a: &Body, hb: BodyHandle, b: &Body, dt: f64) -> Option<Hit> {
    let solid = !a.sensor && !b.sensor;
    let da = a.velocity.scale(dt);
    let db = b.velocity.scale(dt);

    match (&a.shape, &b.shape) {
        (Shape::Circle { radius: ra }, Shape::Circle { radius: rb }) => {
            let gap = |t: f64| ((b.position + db.scale(t)) - (a.position + da.scale(t))).mag() - (ra + rb);
            let toi = first_contact(gap)?;

            let pa = a.position + da.scale(toi);
            let pb = b.position + db.scale(toi);
            let normal = (pb - pa).normalize();
            let normal = if normal.is_null() {
                Vector2::new(0.0, 1.0)
            } else {
                normal
            };

            Some(Hit {
                a: ha,
                b: hb,
                toi,
                point: pa + normal.scale(*ra),
                normal,
                edge: None,
                solid,
                approaching: (b.velocity - a.velocity).dot(&normal) < 0.0,
                velocity_a: a.velocity,
                velocity_b: b.velocity,
            })
        }
        (Shape::Circle { .. }, Shape::EdgeLoop { .. }) => {
            circle_against_loop(a, b, da).map(|(toi, point, normal, edge)| Hit {
                a: ha,
                b: hb,
                toi,
                point,
                normal,
                edge: Some(edge),
                solid,
                approaching: a.velocity.dot(&normal) > 0.0,
                velocity_a: a.velocity,
                velocity_b: b.velocity,
            })
        }
        (Shape::EdgeLoop { .. }, Shape::Circle { .. }) => {
            circle_against_loop(b, a, db).map(|(toi, point, normal, edge)| Hit {
                a: ha,
                b: hb,
                toi,
                point,
                normal: -normal,
                edge: Some(edge),
                solid,
                approaching: b.velocity.dot(&normal) > 0.0,
                velocity_a: a.velocity,
                velocity_b: b.velocity,
            })
        }
        _ => None,
    }
}

/// Earliest impact of a moving circle against the edges of a static loop.
///
/// The normal points from the circle towards the edge.
fn circle_against_loop(
    circle: &Body,
    edge_loop: &Body,
    displacement: Vector2,
) -> Option<(f64, Vector2, Vector2, (Vector2, Vector2))> {
    let radius = circle.radius();
    let path = Aabb::around(circle.position, radius)
        .union(&Aabb::around(circle.position + displacement, radius));

    let mut best: Option<(f64, Vector2, Vector2, (Vector2, Vector2))> = None;

    for (p, q) in edge_loop.edges() {
        if !Aabb::from_points(&[p, q]).overlaps(&path) {
            continue;
        }

        let gap = |t: f64| {
            let center = circle.position + displacement.scale(t);
            (closest_point_on_segment(center, p, q) - center).mag() - radius
        };

        let Some(toi) = first_contact(gap) else {
            continue;
        };

        if best.map_or(true, |(current, ..)| toi < current) {
            let center = circle.position + displacement.scale(toi);
            let point = closest_point_on_segment(center, p, q);
            let normal = (point - center).normalize();
            let normal = if normal.is_null() {
                (q - p).orthogonal_clockwise().normalize()
            } else {
                normal
            };
            best = Some((toi, point, normal, (p, q)));
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn descriptor(tag: BodyTag, entity: u32) -> BodyDescriptor {
        BodyDescriptor { tag, entity }
    }

    fn accept_all(_: &BodyDescriptor, _: &BodyDescriptor) -> bool {
        true
    }

    fn square(half: f64) -> Vec<Vector2> {
        vec![
            Vector2::new(-half, -half),
            Vector2::new(half, -half),
            Vector2::new(half, half),
            Vector2::new(-half, half),
        ]
    }

    #[test]
    fn test_free_body_moves_with_velocity() {
        let mut world = PhysicsWorld::new();
        let mut def = BodyDef::dynamic_circle(0.5, Vector2::ZERO, descriptor(BodyTag::Agent, 1));
        def.velocity = Vector2::new(2.0, 0.0);
        let body = world.create_body(def);

        world.step(0.5, 4, 2, &accept_all);

        assert_approx_eq!(world.position(body).x, 1.0);
        assert!(world.drain_contacts().is_empty());
    }

    #[test]
    fn test_damping_slows_body() {
        let mut world = PhysicsWorld::new();
        let mut def = BodyDef::dynamic_circle(0.5, Vector2::ZERO, descriptor(BodyTag::Agent, 1));
        def.velocity = Vector2::new(1.0, 0.0);
        def.linear_damping = 1.0;
        let body = world.create_body(def);

        world.step(1.0, 4, 2, &accept_all);

        assert_approx_eq!(world.velocity(body).x, 0.5);
    }

    #[test]
    fn test_fast_circle_does_not_tunnel_through_edge() {
        let mut world = PhysicsWorld::new();
        world.create_body(BodyDef::static_loop(
            vec![Vector2::new(5.0, -10.0), Vector2::new(5.0, 10.0)],
            descriptor(BodyTag::Obstacle, 2),
        ));

        let mut def = BodyDef::dynamic_circle(0.1, Vector2::ZERO, descriptor(BodyTag::Projectile, 1));
        def.velocity = Vector2::new(100.0, 0.0);
        def.bullet = true;
        let projectile = world.create_body(def);

        world.step(1.0, 4, 2, &accept_all);

        assert!(world.position(projectile).x <= 4.9 + 1e-6);
        let contacts = world.drain_contacts();
        assert_eq!(contacts.len(), 1);
        assert_approx_eq!(contacts[0].point.x, 5.0);
        assert_eq!(contacts[0].descriptor_a.entity, 2);
        assert_eq!(contacts[0].descriptor_b.entity, 1);
    }

    #[test]
    fn test_filter_rejects_pair() {
        let mut world = PhysicsWorld::new();
        world.create_body(BodyDef::dynamic_circle(0.5, Vector2::ZERO, descriptor(BodyTag::Agent, 1)));
        world.create_body(BodyDef::dynamic_circle(0.5, Vector2::new(0.5, 0.0), descriptor(BodyTag::Projectile, 2)));

        world.step(0.1, 4, 2, &|a, b| a.entity != 1 && b.entity != 1);

        assert!(world.drain_contacts().is_empty());
    }

    #[test]
    fn test_overlapping_circles_are_separated_and_reported_once() {
        let mut world = PhysicsWorld::new();
        let a = world.create_body(BodyDef::dynamic_circle(0.5, Vector2::ZERO, descriptor(BodyTag::Agent, 1)));
        let b = world.create_body(BodyDef::dynamic_circle(0.5, Vector2::new(0.6, 0.0), descriptor(BodyTag::Agent, 2)));

        world.step(0.1, 4, 2, &accept_all);
        assert_eq!(world.drain_contacts().len(), 1);
        assert!((world.position(b) - world.position(a)).mag() >= 1.0 - 1e-9);

        // Still touching: no new begin contact
        world.step(0.1, 4, 2, &accept_all);
        assert!(world.drain_contacts().is_empty());
    }

    #[test]
    fn test_sensor_reports_without_response() {
        let mut world = PhysicsWorld::new();
        let mut sensor = BodyDef::static_loop(square(1.0), descriptor(BodyTag::Sensor, 9));
        sensor.sensor = true;
        world.create_body(sensor);

        let mut def = BodyDef::dynamic_circle(0.1, Vector2::new(-3.0, 0.0), descriptor(BodyTag::Agent, 1));
        def.velocity = Vector2::new(3.0, 0.0);
        let agent = world.create_body(def);

        world.step(1.0, 4, 2, &accept_all);

        assert_approx_eq!(world.position(agent).x, 0.0);
        assert_eq!(world.drain_contacts().len(), 1);
    }

    #[test]
    fn test_query_aabb_and_destroy() {
        let mut world = PhysicsWorld::new();
        let wall = world.create_body(BodyDef::static_loop(square(1.0), descriptor(BodyTag::Obstacle, 3)));
        let far = world.create_body(BodyDef::dynamic_circle(0.5, Vector2::new(50.0, 50.0), descriptor(BodyTag::Agent, 4)));

        let found = world.query_aabb(&Aabb::around(Vector2::new(1.0, 0.0), 0.2));
        assert_eq!(found, vec![wall]);

        // Inside the square but away from every edge
        assert!(world.query_aabb(&Aabb::around(Vector2::ZERO, 0.2)).is_empty());

        assert!(world.destroy_body(far).is_some());
        assert_eq!(world.body_count(), 1);
    }
}
