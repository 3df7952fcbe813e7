//! Construction of the deathmatch entities: agents, projectiles and the
//! static map geometry.

use super::components::*;
use super::ecs::ComponentSet;
use super::events::GameEvent;
use super::DeathmatchGame;
use crate::config::{AgentDescriptor, MapPolygon, MAZE_EXIT_TAG};
use crate::game::EntityId;
use crate::physics::{BodyDef, BodyDescriptor, BodyTag, Shape};
use log::warn;
use rand::Rng;
use shared::Vector2;

// Agent specs, in agent space: metres, metres per tick, radians per tick.
pub const AGENT_BODY_RADIUS: f64 = 0.5;
pub const AGENT_DENSITY: f64 = 20.0;
pub const AGENT_MAX_SPEED: f64 = 1.25;
pub const AGENT_MAX_STEERING: f64 = 10000.0;
pub const AGENT_DRAG: f64 = 0.015;
pub const AGENT_MAX_ANGULAR_VELOCITY_DEG: f64 = 15.0;
pub const AGENT_VISION_RADIUS: f64 = 150.0;
pub const AGENT_VISION_ANGLE_DEG: f64 = 160.0;
pub const AGENT_MAX_LIFE: f64 = 1000.0;

pub const MAX_SHOOT_ENERGY: f64 = 1000.0;
/// Energy regained every tick; a full tank in 100 ticks.
pub const SHOOT_RECOVERY_RATE: f64 = 10.0;
/// Ticks to wait between two shots.
pub const SHOOT_COOLDOWN: u32 = 3;
pub const SHOOT_COST: f64 = 200.0;

pub const PROJECTILE_BODY_RADIUS: f64 = 0.3;
pub const PROJECTILE_DENSITY: f64 = 20.0;
pub const PROJECTILE_SPEED: f64 = 15.0;
pub const PROJECTILE_DAMAGE: f64 = 400.0;
pub const PROJECTILE_RANGE: f64 = 1200.0;

/// Seconds an agent stays dead before respawning.
pub const RESPAWN_DELAY_SECONDS: u32 = 5;

///Returns the number of ticks a projectile lives, from its range and speed.
pub fn projectile_ttl(range: f64, speed: f64) -> u32 {
    if speed > 0.0 {
        (range / speed).ceil() as u32
    } else {
        0
    }
}

/// Map polygons have their Y axis pointing down.
fn polygon_vertices(polygon: &MapPolygon) -> Vec<Vector2> {
    polygon
        .points
        .iter()
        .map(|p| Vector2::new(p[0], -p[1]))
        .collect()
}

impl DeathmatchGame {
    pub(super) fn create_agent(&mut self, agent: &AgentDescriptor, spawn: Vector2) -> EntityId {
        let entity = self.manager.new_entity();

        let mut def = BodyDef::dynamic_circle(
            AGENT_BODY_RADIUS / self.space.distance_scale_out,
            spawn,
            BodyDescriptor {
                tag: BodyTag::Agent,
                entity: entity.0,
            },
        );
        def.density = AGENT_DENSITY;
        def.linear_damping = AGENT_DRAG;
        let body = self.world.create_body(def);

        let mut physical = PhysicalBody::new(body, self.space);
        physical.max_speed = AGENT_MAX_SPEED;
        physical.max_angular_velocity = AGENT_MAX_ANGULAR_VELOCITY_DEG.to_radians();
        physical.drag_force = AGENT_DRAG;

        self.manager
            .add(entity, physical)
            .add(
                entity,
                Perception {
                    vision_radius: AGENT_VISION_RADIUS,
                    vision_angle: AGENT_VISION_ANGLE_DEG.to_radians(),
                    ..Perception::default()
                },
            )
            .add(entity, Health::new(AGENT_MAX_LIFE))
            .add(entity, Player::new(agent.clone()))
            .add(entity, Render::new("agent"))
            .add(
                entity,
                Shooting {
                    max_shoot_energy: MAX_SHOOT_ENERGY,
                    shoot_energy: MAX_SHOOT_ENERGY,
                    shoot_recovery_rate: SHOOT_RECOVERY_RATE,
                    shoot_cooldown: SHOOT_COOLDOWN,
                    shoot_cost: SHOOT_COST,
                    // Cannot shoot before the first cooldown elapsed
                    last_shot: 0,
                    projectile_speed: PROJECTILE_SPEED,
                    projectile_damage: PROJECTILE_DAMAGE,
                    projectile_range: PROJECTILE_RANGE,
                    pending: CommandQueue::default(),
                },
            )
            .add(
                entity,
                Steering {
                    max_steering_force: AGENT_MAX_STEERING,
                    pending: CommandQueue::default(),
                },
            )
            .add(
                entity,
                Collidable::new(
                    collision_group::AGENT,
                    collision_group::AGENT
                        | collision_group::OBSTACLE
                        | collision_group::PROJECTILE
                        | collision_group::GROUND,
                )
                .with_script(CollisionScript::Agent),
            )
            .add(
                entity,
                Lifecycle {
                    on_death: Some(DeathHook::StartRespawn),
                    ..Lifecycle::default()
                },
            )
            .add(entity, Respawn::default())
            .add(entity, Mailbox::default());

        entity
    }

    /// Fires a projectile for `owner` from `position` (agent space) with a
    /// physical `velocity`.
    pub(super) fn create_projectile(
        &mut self,
        owner: EntityId,
        position: Vector2,
        velocity: Vector2,
    ) -> Option<EntityId> {
        let shooting = self.manager.get::<Shooting>(owner)?;
        let speed = shooting.projectile_speed;
        let damage = shooting.projectile_damage;
        let ttl = projectile_ttl(shooting.projectile_range, speed);

        let entity = self.manager.new_entity();

        let mut def = BodyDef::dynamic_circle(
            PROJECTILE_BODY_RADIUS / self.space.distance_scale_out,
            self.space.position_to_physical(position),
            BodyDescriptor {
                tag: BodyTag::Projectile,
                entity: entity.0,
            },
        );
        def.velocity = velocity;
        def.angle = velocity.angle();
        def.density = PROJECTILE_DENSITY;
        def.bullet = true;
        let body = self.world.create_body(def);

        let mut physical = PhysicalBody::new(body, self.space);
        physical.max_speed = speed;
        physical.skip_this_turn = true;

        self.manager
            .add(entity, physical)
            .add(entity, Render::new("projectile"))
            .add(
                entity,
                Lifecycle {
                    tick_birth: self.tick,
                    max_age: ttl,
                    ..Lifecycle::default()
                },
            )
            .add(entity, Owned { owner })
            .add(entity, Impactor { damage })
            .add(
                entity,
                Collidable::new(
                    collision_group::PROJECTILE,
                    collision_group::AGENT | collision_group::OBSTACLE | collision_group::PROJECTILE,
                )
                .with_script(CollisionScript::Projectile),
            );

        Some(entity)
    }

    fn create_static(&mut self, polygon: &MapPolygon, tag: BodyTag, sensor: bool) -> EntityId {
        let entity = self.manager.new_entity();

        let mut def = BodyDef::static_loop(
            polygon_vertices(polygon),
            BodyDescriptor {
                tag,
                entity: entity.0,
            },
        );
        def.sensor = sensor;
        let body = self.world.create_body(def);

        let mut physical = PhysicalBody::new(body, self.space);
        physical.is_static = true;
        self.manager.add(entity, physical);

        entity
    }

    pub(super) fn create_ground(&mut self, polygon: &MapPolygon) -> EntityId {
        let entity = self.create_static(polygon, BodyTag::Ground, false);
        self.manager.add(
            entity,
            Collidable::new(collision_group::GROUND, collision_group::AGENT),
        );
        entity
    }

    pub(super) fn create_obstacle(&mut self, polygon: &MapPolygon) -> EntityId {
        let entity = self.create_static(polygon, BodyTag::Obstacle, false);
        self.manager.add(
            entity,
            Collidable::new(
                collision_group::OBSTACLE,
                collision_group::AGENT | collision_group::PROJECTILE,
            ),
        );
        entity
    }

    pub(super) fn create_maze_exit(&mut self, polygon: &MapPolygon) -> EntityId {
        let entity = self.create_static(polygon, BodyTag::Sensor, true);
        self.manager.add(
            entity,
            Collidable::new(collision_group::GROUND, collision_group::AGENT)
                .with_script(CollisionScript::MazeExit),
        );
        entity
    }

    /// Builds the static bodies of the map.
    pub(super) fn init_physical_world(&mut self) {
        let map = self.description.map.clone();

        for ground in &map.data.grounds {
            self.create_ground(&ground.polygon);
        }

        for obstacle in &map.data.obstacles {
            self.create_obstacle(&obstacle.polygon);
        }

        if map.is_maze() {
            for exit in map.data.otherpolygons.iter().filter(|p| p.has_tag(MAZE_EXIT_TAG)) {
                self.create_maze_exit(&exit.polygon);
            }
        }
    }

    pub(super) fn run_death_hook(&mut self, entity: EntityId, hook: DeathHook) {
        match hook {
            DeathHook::StartRespawn => {
                let countdown = i64::from(self.description.tps * RESPAWN_DELAY_SECONDS);

                if !self
                    .manager
                    .has(entity, ComponentSet::RESPAWN | ComponentSet::LIFECYCLE)
                {
                    return;
                }

                if let Some(lifecycle) = self.manager.get_mut::<Lifecycle>(entity) {
                    lifecycle.locked = true;
                }
                if let Some(respawn) = self.manager.get_mut::<Respawn>(entity) {
                    respawn.is_respawning = true;
                    respawn.respawning_countdown = countdown;
                }

                self.publish(GameEvent::EntityRespawning {
                    entity,
                    respawns_in: countdown,
                });
            }
        }
    }

    pub(super) fn run_respawn_hook(&mut self, entity: EntityId, hook: RespawnHook) {
        match hook {
            RespawnHook::RandomStart => {
                let starts = self.description.map.start_points();
                if starts.is_empty() {
                    warn!("No starting point to respawn entity {}", entity);
                    return;
                }
                let spawn = starts[self.rng.gen_range(0..starts.len())];

                let Some(physical) = self.manager.get::<PhysicalBody>(entity) else {
                    return;
                };
                physical.set_physical_position(&mut self.world, spawn);

                if let Some(lifecycle) = self.manager.get_mut::<Lifecycle>(entity) {
                    lifecycle.locked = false;
                }
                if let Some(health) = self.manager.get_mut::<Health>(entity) {
                    health.restore();
                }

                self.publish(GameEvent::EntityRespawned {
                    entity,
                    starting_point: spawn,
                });
            }
        }
    }

    pub(super) fn run_collision_script(
        &mut self,
        script: CollisionScript,
        entity: EntityId,
        other: EntityId,
        point: Vector2,
    ) {
        match script {
            CollisionScript::Agent => {
                if let Some(physical) = self.manager.get::<PhysicalBody>(entity) {
                    physical.set_velocity(&mut self.world, Vector2::ZERO);
                }
            }
            CollisionScript::Projectile => {
                let Some(physical) = self.manager.get::<PhysicalBody>(entity) else {
                    return;
                };
                physical.set_velocity(&mut self.world, Vector2::ZERO);
                physical.set_position(&mut self.world, point);

                let tick = self.tick;
                if let Some(lifecycle) = self.manager.get_mut::<Lifecycle>(entity) {
                    lifecycle.set_death(tick);
                }
            }
            CollisionScript::MazeExit => {
                self.publish(GameEvent::EntityExitedMaze {
                    entity: other,
                    exit: entity,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::deathmatch::tests::{arena_description, test_game};
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_projectile_ttl_rounds_up() {
        assert_eq!(projectile_ttl(1200.0, 15.0), 80);
        assert_eq!(projectile_ttl(100.0, 15.0), 7);
        assert_eq!(projectile_ttl(100.0, 0.0), 0);
    }

    #[test]
    fn test_agent_is_fully_composed() {
        let mut game = test_game(arena_description());
        let agent = game.create_agent(&AgentDescriptor::from_image("bot"), Vector2::new(0.5, 0.5));

        let all = ComponentSet::PHYSICAL_BODY
            | ComponentSet::PERCEPTION
            | ComponentSet::HEALTH
            | ComponentSet::PLAYER
            | ComponentSet::RENDER
            | ComponentSet::SHOOTING
            | ComponentSet::STEERING
            | ComponentSet::COLLIDABLE
            | ComponentSet::LIFECYCLE
            | ComponentSet::RESPAWN
            | ComponentSet::MAILBOX;
        assert!(game.manager.has(agent, all));

        let physical = game.manager.get::<PhysicalBody>(agent).unwrap();
        assert_approx_eq!(physical.radius(&game.world), AGENT_BODY_RADIUS);
        assert_approx_eq!(physical.position(&game.world).x, 50.0);
    }

    #[test]
    fn test_static_polygons_flip_y() {
        let mut game = test_game(arena_description());
        let polygon = MapPolygon {
            points: vec![[0.0, 1.0], [2.0, 1.0]],
        };
        let obstacle = game.create_obstacle(&polygon);

        let physical = game.manager.get::<PhysicalBody>(obstacle).unwrap();
        let body = game.world.body(physical.body).unwrap();
        let Shape::EdgeLoop { vertices } = &body.shape else {
            panic!("obstacle should be an edge loop");
        };
        assert_eq!(vertices[0], Vector2::new(0.0, -1.0));
        assert_eq!(body.edges().len(), 2);
        assert!(physical.is_static);
    }
}
