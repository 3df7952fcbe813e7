//! What each agent perceives at the end of a tick.
//!
//! Vision is a cone centered on the agent's orientation. Everything is
//! expressed in agent space, relative to the agent and rotated so that its
//! heading points north. Obstacles are cut to the part of their edges lying
//! inside the cone, then the whole vision goes through an occlusion pass that
//! keeps only what is not hidden behind something closer.

use super::components::*;
use super::ecs::{ComponentSet, EntityManager};
use super::DeathmatchGame;
use crate::game::EntityId;
use crate::physics::{BodyDescriptor, BodyTag, PhysicsWorld};
use rayon::prelude::*;
use shared::trigo::{
    full_circle_to_signed_half_circle, intersection_with_line_segment,
    line_circle_intersection_points, point_on_line_segment, Aabb,
};
use shared::visibility::{only_visible, ObstacleSegment};
use shared::{AgentPerception, MailboxMessage, Vector2, VisionItem, VisionTag};
use std::collections::BTreeMap;
use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Agents closer to the edge of the vision circle than this are not seen.
const VISION_RADIUS_MARGIN_SQ: f64 = 0.5;
/// Tolerance used when re-joining the pieces of a split edge.
const MERGE_PRECISION: f64 = 1e-3;

const CARDINALS: [f64; 4] = [0.0, FRAC_PI_2, PI, 3.0 * FRAC_PI_2];

pub fn system_perception(game: &mut DeathmatchGame, mailboxes: &BTreeMap<EntityId, Vec<Notification>>) {
    let perceptors = game.manager.view(ComponentSet::PERCEPTION);

    let computed: Vec<(EntityId, AgentPerception)> = {
        let manager = &game.manager;
        let world = &game.world;
        let tick = game.tick;

        perceptors
            .par_iter()
            .map(|entity| {
                let messages = mailboxes.get(entity).map(Vec::as_slice).unwrap_or_default();
                (
                    *entity,
                    compute_agent_perception(manager, world, tick, *entity, messages),
                )
            })
            .collect()
    };

    for (entity, perception) in computed {
        if let Some(component) = game.manager.get_mut::<Perception>(entity) {
            component.perception = perception;
        }
    }
}

pub fn compute_agent_perception(
    manager: &EntityManager,
    world: &PhysicsWorld,
    tick: u32,
    entity: EntityId,
    messages: &[Notification],
) -> AgentPerception {
    let (Some(physical), Some(perception), Some(player)) = (
        manager.get::<PhysicalBody>(entity),
        manager.get::<Perception>(entity),
        manager.get::<Player>(entity),
    ) else {
        return AgentPerception::default();
    };

    let orientation = physical.orientation(world);
    let velocity = physical.velocity(world);

    let mut result = AgentPerception {
        score: player.score,
        velocity: velocity.set_angle(velocity.angle() - orientation),
        azimuth: orientation,
        messages: messages.iter().map(MailboxMessage::from).collect(),
        ..Default::default()
    };

    if let Some(health) = manager.get::<Health>(entity) {
        result.energy = health.life;
    }

    if let Some(shooting) = manager.get::<Shooting>(entity) {
        result.shootenergy = shooting.shoot_energy;
        result.shootcooldown = remaining_cooldown(shooting, tick);
    }

    result.vision = process_occlusions(compute_vision(manager, world, entity, physical, perception));
    result
}

///Returns the number of upcoming ticks during which a shot would still be refused.
fn remaining_cooldown(shooting: &Shooting, tick: u32) -> u32 {
    (shooting.last_shot + shooting.shoot_cooldown).saturating_sub(tick)
}

/// The vision cone of an agent, in agent space.
struct Cone {
    position: Vector2,
    orientation: f64,
    radius: f64,
    half_angle: f64,
    left: Vector2,
    right: Vector2,
    aabb: Aabb,
}

impl Cone {
    fn new(position: Vector2, orientation: f64, radius: f64, angle: f64) -> Self {
        let half_angle = angle / 2.0;
        let edge = |heading: f64| Vector2::new(1.0, 1.0).set_mag(radius).set_angle(heading % TAU);

        let left = edge(orientation - half_angle);
        let right = edge(orientation + half_angle);

        let mut notable = vec![position, position + left, position + right];
        for cardinal in CARDINALS {
            if full_circle_to_signed_half_circle(cardinal - orientation).abs() <= half_angle {
                notable.push(position + edge(cardinal));
            }
        }

        Self {
            position,
            orientation,
            radius,
            half_angle,
            left,
            right,
            aabb: Aabb::from_points(&notable),
        }
    }

    /// Whether the direction of `relative` falls inside the cone opening.
    fn in_angle(&self, relative: Vector2) -> bool {
        full_circle_to_signed_half_circle(relative.angle() - self.orientation).abs() <= self.half_angle
    }

    /// Rotates a vector relative to the agent into the agent's frame.
    fn to_local(&self, relative: Vector2) -> Vector2 {
        relative.set_angle(relative.angle() - self.orientation)
    }
}

fn compute_vision(
    manager: &EntityManager,
    world: &PhysicsWorld,
    entity: EntityId,
    physical: &PhysicalBody,
    perception: &Perception,
) -> Vec<VisionItem> {
    let cone = Cone::new(
        physical.position(world),
        physical.orientation(world),
        perception.vision_radius,
        perception.vision_angle,
    );
    let scale = physical.space.distance_scale_out;

    // One body per entity
    let mut in_range: BTreeMap<u32, BodyDescriptor> = BTreeMap::new();
    for handle in world.query_aabb(&cone.aabb.scale(1.0 / scale)) {
        if let Some(body) = world.body(handle) {
            in_range.insert(body.descriptor.entity, body.descriptor);
        }
    }

    let mut vision = Vec::new();
    for (other, descriptor) in in_range {
        let other = EntityId(other);
        if other == entity {
            continue;
        }

        match descriptor.tag {
            BodyTag::Agent => vision.extend(see_round_body(manager, world, &cone, other, VisionTag::Agent)),
            BodyTag::Projectile => {
                let own_shot = manager.get::<Owned>(other).map_or(false, |o| o.owner == entity);
                if !own_shot {
                    vision.extend(see_round_body(manager, world, &cone, other, VisionTag::Projectile));
                }
            }
            BodyTag::Obstacle | BodyTag::Ground => {
                vision.extend(see_edges(manager, world, &cone, other, scale));
            }
            BodyTag::Sensor => {}
        }
    }

    vision
}

fn see_round_body(
    manager: &EntityManager,
    world: &PhysicsWorld,
    cone: &Cone,
    other: EntityId,
    tag: VisionTag,
) -> Option<VisionItem> {
    let body = manager.get::<PhysicalBody>(other)?;

    let position = body.position(world);
    if position.equals(&cone.position) {
        return None;
    }

    let center = position - cone.position;
    if center.mag_sq() > cone.radius * cone.radius - VISION_RADIUS_MARGIN_SQ || !cone.in_angle(center) {
        return None;
    }

    let radius = body.radius(world);
    let near = center + center.orthogonal_counter_clockwise().normalize().scale(radius);
    let far = center + center.orthogonal_clockwise().normalize().scale(radius);

    Some(VisionItem {
        tag,
        nearedge: cone.to_local(near),
        center: cone.to_local(center),
        faredge: cone.to_local(far),
        velocity: cone.to_local(body.velocity(world)),
        entityid: other.0,
        segmentnum: 0,
    })
}

/// The parts of a static body's edges inside the cone, one item per edge.
fn see_edges(
    manager: &EntityManager,
    world: &PhysicsWorld,
    cone: &Cone,
    other: EntityId,
    scale: f64,
) -> Vec<VisionItem> {
    let Some(body) = manager
        .get::<PhysicalBody>(other)
        .and_then(|p| world.body(p.body))
    else {
        return Vec::new();
    };
    if body.sensor {
        return Vec::new();
    }

    let radius_sq = cone.radius * cone.radius;
    let mut items = Vec::new();

    for (segmentnum, (a, b)) in body.edges().into_iter().enumerate() {
        let (a, b) = (a.scale(scale), b.scale(scale));
        if !Aabb::from_points(&[a, b]).overlaps(&cone.aabb) {
            continue;
        }

        let rel_a = a - cone.position;
        let rel_b = b - cone.position;
        let mut points = Vec::with_capacity(2);

        for end in [rel_a, rel_b] {
            if end.mag_sq() <= radius_sq && cone.in_angle(end) {
                points.push(end);
            }
        }

        for side in [cone.left, cone.right] {
            let crossing = intersection_with_line_segment(Vector2::ZERO, side, rel_a, rel_b);
            if crossing.intersects && !crossing.colinear {
                points.push(crossing.point);
            }
        }

        for p in line_circle_intersection_points(rel_a, rel_b, Vector2::ZERO, cone.radius) {
            if point_on_line_segment(p, rel_a, rel_b) && cone.in_angle(p) {
                points.push(p);
            }
        }

        let [one, two] = points[..] else {
            continue;
        };

        let (near, far) = if two.mag_sq() > one.mag_sq() {
            (one, two)
        } else {
            (two, one)
        };

        items.push(VisionItem {
            tag: VisionTag::Obstacle,
            nearedge: cone.to_local(near),
            center: cone.to_local((one + two).scale(0.5)),
            faredge: cone.to_local(far),
            velocity: Vector2::ZERO,
            entityid: other.0,
            segmentnum,
        });
    }

    items
}

/// Drops whatever is hidden behind something closer to the agent.
///
/// Occlusion splits edges into pieces; the pieces of the same edge that touch
/// are joined back so that each visible edge is reported once.
pub fn process_occlusions(vision: Vec<VisionItem>) -> Vec<VisionItem> {
    let segments: Vec<ObstacleSegment<VisionItem>> = vision
        .into_iter()
        .map(|item| ObstacleSegment::new(item.nearedge, item.faredge, item))
        .collect();

    let mut by_edge: BTreeMap<(u32, usize), Vec<ObstacleSegment<VisionItem>>> = BTreeMap::new();
    for segment in only_visible(Vector2::ZERO, &segments) {
        by_edge
            .entry((segment.user_data.entityid, segment.user_data.segmentnum))
            .or_default()
            .push(segment);
    }

    let mut visible = Vec::new();
    for (_, mut pieces) in by_edge {
        merge_pieces(&mut pieces);

        for piece in pieces {
            let [a, b] = piece.points;
            let (near, far) = if a.mag_sq() <= b.mag_sq() { (a, b) } else { (b, a) };

            visible.push(VisionItem {
                nearedge: near,
                center: (a + b).scale(0.5),
                faredge: far,
                ..piece.user_data
            });
        }
    }

    visible
}

/// Joins consecutive pieces sharing an endpoint until none do; degenerate
/// pieces are dropped.
fn merge_pieces(pieces: &mut Vec<ObstacleSegment<VisionItem>>) {
    let same = |p: &Vector2, q: &Vector2| p.equals_with_precision(q, MERGE_PRECISION);

    'restart: loop {
        for i in 0..pieces.len() {
            let [a, b] = pieces[i].points;
            if same(&a, &b) {
                pieces.remove(i);
                continue 'restart;
            }

            let Some(next) = pieces.get(i + 1) else {
                break;
            };
            let [c, d] = next.points;
            if same(&c, &d) {
                pieces.remove(i + 1);
                continue 'restart;
            }

            let joined = if same(&a, &c) {
                Some([b, d])
            } else if same(&a, &d) {
                Some([b, c])
            } else if same(&b, &c) {
                Some([a, d])
            } else if same(&b, &d) {
                Some([a, c])
            } else {
                None
            };

            if let Some(points) = joined {
                pieces.remove(i + 1);
                let first = pieces.remove(i);
                pieces.push(ObstacleSegment {
                    points,
                    user_data: first.user_data,
                });
                continue 'restart;
            }
        }

        break;
    }
}
