//! Deathmatch: agents roam an arena, shoot each other and respawn.
//!
//! The game is an entity-component world stepped by a fixed sequence of
//! systems, once per tick:
//!
//! 1. death of non-respawnable entities killed during the previous tick
//! 2. agent mutations
//! 3. shooting
//! 4. steering
//! 5. physics
//! 6. collisions
//! 7. health
//! 8. lifecycle
//! 9. death of respawnable entities
//! 10. respawn
//! 11. player stats
//! 12. score
//! 13. mailboxes
//! 14. perception
//! 15. deletion of dead entities
//!
//! then the visualisation frame of the tick is built. Projectiles die at the
//! start of the next tick so they stay visible where they hit for one frame.

pub mod components;
pub mod ecs;
pub mod entities;
pub mod events;
pub mod perception;
pub mod systems;

use self::components::*;
use self::ecs::{ComponentSet, EntityManager};
use self::events::EventBus;
use crate::config::{AgentDescriptor, GameDescription};
use crate::game::{AgentMutationBatch, EntityId, Game, GameOverCallback};
use crate::physics::PhysicsWorld;
use crate::viz::{PlayerInfo, VizEvent, VizInit, VizMessage, VizObject, VizScore};
use log::warn;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use shared::protocol::{AgentSpecs, GearSpecs, GunSpecs};
use std::collections::BTreeMap;

pub struct DeathmatchGame {
    tick: u32,
    description: GameDescription,
    manager: EntityManager,
    world: PhysicsWorld,
    bus: EventBus,
    space: SpaceTransform,
    rng: StdRng,
    viz_frame: Vec<u8>,
    game_over: Option<GameOverCallback>,
}

impl DeathmatchGame {
    pub fn new(description: GameDescription) -> Self {
        Self::with_rng(description, StdRng::from_entropy())
    }

    /// A game whose random choices (respawn points) are reproducible.
    pub fn with_seed(description: GameDescription, seed: u64) -> Self {
        Self::with_rng(description, StdRng::seed_from_u64(seed))
    }

    fn with_rng(description: GameDescription, rng: StdRng) -> Self {
        let space = SpaceTransform::new(description.tps);
        let is_maze = description.map.is_maze();

        let mut game = Self {
            tick: 0,
            description,
            manager: EntityManager::new(),
            world: PhysicsWorld::new(),
            bus: EventBus::default(),
            space,
            rng,
            viz_frame: Vec::new(),
            game_over: None,
        };

        game.init_physical_world();

        game.bus.subscribe(events::TOPIC_FRAGGED, events::on_entity_fragged);
        game.bus.subscribe(events::TOPIC_HIT, events::on_entity_hit);
        game.bus.subscribe(events::TOPIC_RESPAWNING, events::on_entity_respawning);
        game.bus.subscribe(events::TOPIC_RESPAWNED, events::on_entity_respawned);
        if is_maze {
            game.bus.subscribe(events::TOPIC_EXITED_MAZE, events::on_entity_exited_maze);
        }

        game
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn description(&self) -> &GameDescription {
        &self.description
    }

    pub fn manager(&self) -> &EntityManager {
        &self.manager
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    fn compute_viz_frame(&mut self, mailboxes: &BTreeMap<EntityId, Vec<Notification>>) {
        let mut frame = VizMessage {
            gameid: self.description.id.clone(),
            ..VizMessage::default()
        };

        for entity in self
            .manager
            .view(ComponentSet::RENDER | ComponentSet::PHYSICAL_BODY)
        {
            let (Some(render), Some(physical)) = (
                self.manager.get::<Render>(entity),
                self.manager.get::<PhysicalBody>(entity),
            ) else {
                continue;
            };

            // The viewer works in physical units
            let playerinfo = self.manager.get::<Player>(entity).map(|player| PlayerInfo {
                isalive: !self
                    .manager
                    .get::<Respawn>(entity)
                    .map_or(false, |r| r.is_respawning),
                playerid: entity.to_string(),
                playername: player.agent.manifest.name.clone(),
                score: VizScore {
                    value: player.score,
                },
            });

            frame.objects.push(VizObject {
                id: entity.to_string(),
                kind: render.render_type.clone(),
                position: physical.physical_position(&self.world),
                velocity: physical.physical_velocity(&self.world),
                radius: physical.physical_radius(&self.world),
                orientation: physical.orientation(&self.world),
                playerinfo,
            });

            frame.debugpoints.extend(
                render
                    .debug_points
                    .iter()
                    .map(|p| self.space.position_to_physical((*p).into()).to_array()),
            );
        }

        for (entity, notifications) in mailboxes {
            for notification in notifications {
                let payload = match notification {
                    Notification::BeenFragged { by } => {
                        json!({ "who": entity.to_string(), "by": by.to_string() })
                    }
                    Notification::Respawned | Notification::ExitedMaze => {
                        json!({ "who": entity.to_string() })
                    }
                    _ => continue,
                };

                frame.events.push(VizEvent {
                    subject: notification.subject().to_string(),
                    payload,
                });
            }
        }

        match serde_json::to_vec(&frame) {
            Ok(bytes) => self.viz_frame = bytes,
            Err(e) => warn!("Failed to serialize viz frame of tick {}: {}", self.tick, e),
        }
    }
}

impl Game for DeathmatchGame {
    fn step(&mut self, tick: u32, dt: f64, mutations: Vec<AgentMutationBatch>) {
        self.tick = tick;

        systems::system_death(self, false);
        systems::system_mutations(self, mutations);
        systems::system_shooting(self);
        systems::system_steering(self);
        systems::system_physics(self, dt);
        let collisions = systems::system_collisions(self);
        systems::system_health(self, &collisions);
        systems::system_lifecycle(self);
        systems::system_death(self, true);
        systems::system_respawn(self);
        systems::system_player_stats(self);
        systems::system_score(self);
        let mailboxes = systems::system_mailboxes(self);
        perception::system_perception(self, &mailboxes);
        systems::system_delete_entities(self);

        self.compute_viz_frame(&mailboxes);
    }

    fn new_entity_agent(&mut self, agent: &AgentDescriptor, spawn: shared::Vector2) -> EntityId {
        self.create_agent(agent, spawn)
    }

    fn remove_entity_agent(&mut self, entity: EntityId) {
        if !self.manager.dispose(entity, &mut self.world) {
            warn!("Cannot remove unknown entity {}", entity);
        }
    }

    fn agent_perception(&self, entity: EntityId) -> Vec<u8> {
        self.manager
            .get::<Perception>(entity)
            .and_then(|p| serde_json::to_vec(&p.perception).ok())
            .unwrap_or_default()
    }

    fn agent_welcome(&self, entity: EntityId) -> Vec<u8> {
        let (Some(physical), Some(steering), Some(shooting), Some(perception)) = (
            self.manager.get::<PhysicalBody>(entity),
            self.manager.get::<Steering>(entity),
            self.manager.get::<Shooting>(entity),
            self.manager.get::<Perception>(entity),
        ) else {
            return Vec::new();
        };

        let mut gear = BTreeMap::new();
        gear.insert(
            "gun".to_string(),
            GearSpecs {
                genre: "weapon".to_string(),
                kind: "gun".to_string(),
                specs: GunSpecs {
                    shootcost: shooting.shoot_cost,
                    shootcooldown: shooting.shoot_cooldown,
                    projectilespeed: shooting.projectile_speed,
                    projectiledamage: shooting.projectile_damage,
                    projectilerange: shooting.projectile_range,
                },
            },
        );

        let specs = AgentSpecs {
            maxspeed: physical.max_speed,
            maxsteeringforce: steering.max_steering_force,
            maxangularvelocity: physical.max_angular_velocity,
            visionradius: perception.vision_radius,
            visionangle: perception.vision_angle,
            bodyradius: physical.radius(&self.world),
            maxshootenergy: shooting.max_shoot_energy,
            shootrecoveryrate: shooting.shoot_recovery_rate,
            gear,
        };

        serde_json::to_vec(&specs).unwrap_or_default()
    }

    fn viz_frame_json(&self) -> Vec<u8> {
        self.viz_frame.clone()
    }

    fn viz_init_json(&self) -> Vec<u8> {
        serde_json::to_vec(&VizInit::new(&self.description)).unwrap_or_default()
    }

    fn set_game_over_callback(&mut self, callback: GameOverCallback) {
        self.game_over = Some(callback);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use crate::config::{MapContainer, MapData, MapMeta, MapPointObject, MapPolygon, MapPolygonObject};
    use serde_json::Value;
    use shared::{AgentAction, AgentPerception, Vector2};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    fn square(id: &str, half: f64) -> MapPolygonObject {
        MapPolygonObject {
            id: id.to_string(),
            name: id.to_string(),
            polygon: MapPolygon {
                points: vec![[-half, -half], [half, -half], [half, half], [-half, half]],
            },
            tags: Vec::new(),
        }
    }

    fn start(id: &str, point: [f64; 2]) -> MapPointObject {
        MapPointObject {
            id: id.to_string(),
            name: id.to_string(),
            point,
            tags: Vec::new(),
        }
    }

    /// A 20×20 walled arena with two starting points.
    pub(crate) fn arena_description() -> GameDescription {
        GameDescription {
            id: "test-game".to_string(),
            name: "Test arena".to_string(),
            tps: 10,
            agents: Vec::new(),
            map: MapContainer {
                meta: MapMeta {
                    kind: "deathmatch".to_string(),
                    maxcontestants: 2,
                    ..MapMeta::default()
                },
                data: MapData {
                    grounds: vec![square("ground", 10.0)],
                    starts: vec![start("s1", [0.0, 0.0]), start("s2", [1.0, 1.0])],
                    ..MapData::default()
                },
            },
        }
    }

    pub(crate) fn test_game(description: GameDescription) -> DeathmatchGame {
        DeathmatchGame::with_seed(description, 7)
    }

    fn maze_description() -> GameDescription {
        let mut description = arena_description();
        description.map.meta.variant = crate::config::MAZE_VARIANT.to_string();

        let mut exit = MapPolygonObject {
            id: "exit".to_string(),
            name: "exit".to_string(),
            polygon: MapPolygon {
                points: vec![[0.9, -0.1], [1.1, -0.1], [1.1, 0.1], [0.9, 0.1]],
            },
            tags: Vec::new(),
        };
        exit.tags.push(crate::config::MAZE_EXIT_TAG.to_string());
        description.map.data.otherpolygons.push(exit);
        description
    }

    fn bot() -> AgentDescriptor {
        AgentDescriptor::from_image("bot")
    }

    fn steer(entity: EntityId, v: Vector2) -> AgentMutationBatch {
        AgentMutationBatch {
            agent_proxy: Uuid::new_v4(),
            entity,
            mutations: vec![AgentAction::steer(v)],
            sequence: 0,
        }
    }

    #[test]
    fn test_map_builds_static_bodies() {
        let game = test_game(arena_description());
        assert_eq!(game.world().body_count(), 1);
        assert_eq!(game.manager().len(), 1);
    }

    #[test]
    fn test_welcome_describes_agent_in_agent_space() {
        let mut game = test_game(arena_description());
        let agent = game.new_entity_agent(&bot(), Vector2::ZERO);

        let welcome: AgentSpecs = serde_json::from_slice(&game.agent_welcome(agent)).unwrap();
        assert_eq!(welcome.maxspeed, entities::AGENT_MAX_SPEED);
        assert_approx_eq!(welcome.bodyradius, entities::AGENT_BODY_RADIUS);
        assert_eq!(welcome.gear["gun"].specs.shootcooldown, entities::SHOOT_COOLDOWN);
        assert_eq!(welcome.gear["gun"].genre, "weapon");

        assert!(game.agent_welcome(EntityId(999)).is_empty());
    }

    #[test]
    fn test_step_produces_perception_and_frame() {
        let mut game = test_game(arena_description());
        let a = game.new_entity_agent(&bot(), Vector2::ZERO);
        let b = game.new_entity_agent(&bot(), Vector2::new(0.0, 0.5));

        game.step(1, 0.1, vec![steer(a, Vector2::new(0.0, 1.0))]);

        let perception: AgentPerception = serde_json::from_slice(&game.agent_perception(a)).unwrap();
        assert_eq!(perception.energy, entities::AGENT_MAX_LIFE);
        assert!(perception.vision.iter().any(|item| item.entityid == b.0));

        let frame: Value = serde_json::from_slice(&game.viz_frame_json()).unwrap();
        assert_eq!(frame["gameid"], "test-game");
        let objects = frame["objects"].as_array().unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0]["type"], "agent");
        assert_eq!(objects[0]["playerinfo"]["isalive"], true);
        assert_eq!(objects[0]["playerinfo"]["playername"], "bot");
    }

    #[test]
    fn test_removed_agent_disappears() {
        let mut game = test_game(arena_description());
        let a = game.new_entity_agent(&bot(), Vector2::ZERO);

        game.remove_entity_agent(a);
        game.step(1, 0.1, Vec::new());

        assert!(game.agent_perception(a).is_empty());
        let frame: Value = serde_json::from_slice(&game.viz_frame_json()).unwrap();
        assert!(frame["objects"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_viz_init() {
        let game = test_game(arena_description());
        let init: Value = serde_json::from_slice(&game.viz_init_json()).unwrap();
        assert_eq!(init["type"], "init");
        assert_eq!(init["data"]["mapname"], "Test arena");
        assert_eq!(init["data"]["tps"], 10);
    }

    #[test]
    fn test_exiting_the_maze_ends_the_game() {
        let mut game = test_game(maze_description());
        let over = Arc::new(AtomicBool::new(false));
        let flag = over.clone();
        game.set_game_over_callback(Box::new(move || flag.store(true, Ordering::SeqCst)));

        // The exit sits 1 east of the agent; steer east at full speed
        let agent = game.new_entity_agent(&bot(), Vector2::ZERO);
        let body = game.manager.get::<PhysicalBody>(agent).unwrap().body;
        game.world.set_angle(body, std::f64::consts::FRAC_PI_2);

        for tick in 1..200 {
            game.step(tick, 0.1, vec![steer(agent, Vector2::new(0.0, 1.0))]);
            if over.load(Ordering::SeqCst) {
                break;
            }
        }

        assert!(over.load(Ordering::SeqCst));
    }

    #[test]
    fn test_exit_is_inert_outside_mazes() {
        let mut description = maze_description();
        description.map.meta.variant.clear();
        let game = test_game(description);

        // Only the ground: exits are not built
        assert_eq!(game.world().body_count(), 1);
    }
}
