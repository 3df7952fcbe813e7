//! Components of the deathmatch world.
//!
//! Components are plain data. Agent-facing values (positions, velocities,
//! radii) are exposed in agent space by [`PhysicalBody`], which converts from
//! and to the physical units of the [`PhysicsWorld`].

use crate::config::AgentDescriptor;
use crate::game::EntityId;
use crate::physics::{BodyHandle, PhysicsWorld};
use serde_json::{json, Value};
use shared::{AgentPerception, MailboxMessage, Vector2, PHYSICAL_TO_AGENT_SCALE};
use std::sync::Mutex;

/// Collision group bits.
pub mod collision_group {
    pub const AGENT: u8 = 1 << 0;
    pub const OBSTACLE: u8 = 1 << 1;
    pub const PROJECTILE: u8 = 1 << 2;
    pub const GROUND: u8 = 1 << 3;
}

/// Commands queued by the network side and drained by the tick driver.
#[derive(Debug)]
pub struct CommandQueue<T> {
    pending: Mutex<Vec<T>>,
}

impl<T> Default for CommandQueue<T> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
        }
    }
}

impl<T> CommandQueue<T> {
    pub fn push(&self, command: T) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command);
    }

    /// Takes every queued command, leaving the queue empty.
    pub fn pop_all(&self) -> Vec<T> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Conversion between physical units and agent space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceTransform {
    /// Agent distance per physical distance.
    pub distance_scale_out: f64,
    /// Ticks per second.
    pub time_scale_in: f64,
}

impl SpaceTransform {
    pub fn new(tps: u32) -> Self {
        Self {
            distance_scale_out: PHYSICAL_TO_AGENT_SCALE,
            time_scale_in: f64::from(tps.max(1)),
        }
    }

    pub fn position_to_agent(&self, physical: Vector2) -> Vector2 {
        physical.scale(self.distance_scale_out)
    }

    pub fn position_to_physical(&self, agent: Vector2) -> Vector2 {
        agent.scale(1.0 / self.distance_scale_out)
    }

    /// Physical velocity is per second, agent velocity is per tick.
    pub fn velocity_to_agent(&self, physical: Vector2) -> Vector2 {
        physical.scale(self.distance_scale_out / self.time_scale_in)
    }

    pub fn velocity_to_physical(&self, agent: Vector2) -> Vector2 {
        agent.scale(self.time_scale_in / self.distance_scale_out)
    }
}

#[derive(Debug, Clone)]
pub struct PhysicalBody {
    pub body: BodyHandle,
    pub max_speed: f64,
    pub max_angular_velocity: f64,
    pub drag_force: f64,
    pub is_static: bool,
    /// Set on projectiles so they keep their spawn orientation for one step.
    pub skip_this_turn: bool,
    pub space: SpaceTransform,
}

impl PhysicalBody {
    pub fn new(body: BodyHandle, space: SpaceTransform) -> Self {
        Self {
            body,
            max_speed: 0.0,
            max_angular_velocity: 0.0,
            drag_force: 0.0,
            is_static: false,
            skip_this_turn: false,
            space,
        }
    }

    pub fn position(&self, world: &PhysicsWorld) -> Vector2 {
        self.space.position_to_agent(world.position(self.body))
    }

    pub fn physical_position(&self, world: &PhysicsWorld) -> Vector2 {
        world.position(self.body)
    }

    pub fn set_position(&self, world: &mut PhysicsWorld, position: Vector2) {
        world.set_position(self.body, self.space.position_to_physical(position));
    }

    pub fn set_physical_position(&self, world: &mut PhysicsWorld, position: Vector2) {
        world.set_position(self.body, position);
    }

    pub fn velocity(&self, world: &PhysicsWorld) -> Vector2 {
        self.space.velocity_to_agent(world.velocity(self.body))
    }

    pub fn physical_velocity(&self, world: &PhysicsWorld) -> Vector2 {
        world.velocity(self.body)
    }

    pub fn set_velocity(&self, world: &mut PhysicsWorld, velocity: Vector2) {
        world.set_velocity(self.body, self.space.velocity_to_physical(velocity));
    }

    pub fn orientation(&self, world: &PhysicsWorld) -> f64 {
        world.angle(self.body)
    }

    pub fn set_orientation(&self, world: &mut PhysicsWorld, angle: f64) {
        world.set_angle(self.body, angle);
    }

    pub fn radius(&self, world: &PhysicsWorld) -> f64 {
        self.physical_radius(world) * self.space.distance_scale_out
    }

    pub fn physical_radius(&self, world: &PhysicsWorld) -> f64 {
        world.body(self.body).map(|b| b.radius()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Health {
    pub max_life: f64,
    pub life: f64,
}

impl Health {
    pub fn new(max_life: f64) -> Self {
        Self {
            max_life,
            life: max_life,
        }
    }

    /// Adds `amount` (negative for damage), keeping life within `[0, max_life]`.
    pub fn add_life(&mut self, amount: f64) {
        self.life = (self.life + amount).clamp(0.0, self.max_life);
    }

    pub fn restore(&mut self) {
        self.life = self.max_life;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerStats {
    pub distance_travelled: f64,
    pub nb_been_fragged: u32,
    pub nb_has_fragged: u32,
    pub nb_been_hit: u32,
    pub nb_has_hit: u32,
}

impl PlayerStats {
    pub fn score(&self) -> i64 {
        i64::from(self.nb_has_fragged) - i64::from(self.nb_been_fragged)
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub agent: AgentDescriptor,
    pub stats: PlayerStats,
    pub score: i64,
}

impl Player {
    pub fn new(agent: AgentDescriptor) -> Self {
        Self {
            agent,
            stats: PlayerStats::default(),
            score: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Render {
    pub render_type: String,
    pub debug_points: Vec<[f64; 2]>,
}

impl Render {
    pub fn new(render_type: &str) -> Self {
        Self {
            render_type: render_type.to_string(),
            debug_points: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Perception {
    pub vision_radius: f64,
    /// Full opening of the vision cone, in radians.
    pub vision_angle: f64,
    /// Last perception computed for this entity.
    pub perception: AgentPerception,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Owned {
    pub owner: EntityId,
}

#[derive(Debug, Default)]
pub struct Steering {
    pub max_steering_force: f64,
    pub pending: CommandQueue<Vector2>,
}

#[derive(Debug, Default)]
pub struct Shooting {
    pub max_shoot_energy: f64,
    pub shoot_energy: f64,
    pub shoot_recovery_rate: f64,
    pub shoot_cooldown: u32,
    pub shoot_cost: f64,
    pub last_shot: u32,
    pub projectile_speed: f64,
    pub projectile_damage: f64,
    pub projectile_range: f64,
    pub pending: CommandQueue<Vector2>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Impactor {
    pub damage: f64,
}

/// Reaction run on the entity when one of its contacts begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionScript {
    /// Stops the agent.
    Agent,
    /// Stops the projectile at the contact point and kills it.
    Projectile,
    /// Reports the other entity leaving the maze.
    MazeExit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collidable {
    pub group: u8,
    pub collides_with: u8,
    pub script: Option<CollisionScript>,
}

impl Collidable {
    pub fn new(group: u8, collides_with: u8) -> Self {
        Self {
            group,
            collides_with,
            script: None,
        }
    }

    pub fn with_script(mut self, script: CollisionScript) -> Self {
        self.script = Some(script);
        self
    }

    pub fn collides_with(&self, other: &Collidable) -> bool {
        self.collides_with & other.group != 0 && other.collides_with & self.group != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathHook {
    StartRespawn,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lifecycle {
    pub tick_birth: u32,
    pub tick_death: u32,
    pub death_processed: bool,
    /// Age in ticks after which the entity dies; 0 for no limit.
    pub max_age: u32,
    pub on_death: Option<DeathHook>,
    /// A locked entity ignores agent mutations and damage.
    pub locked: bool,
    pub delete: bool,
}

impl Lifecycle {
    pub fn set_death(&mut self, tick: u32) {
        self.tick_death = tick;
        self.death_processed = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespawnHook {
    /// Restores the agent at a random start point.
    RandomStart,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Respawn {
    pub is_respawning: bool,
    pub respawning_countdown: i64,
    pub respawn_count: u32,
    pub on_respawn: RespawnHook,
}

impl Default for Respawn {
    fn default() -> Self {
        Self {
            is_respawning: false,
            respawning_countdown: 0,
            respawn_count: 0,
            on_respawn: RespawnHook::RandomStart,
        }
    }
}

/// A message queued for an agent's next perception.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    BeenFragged { by: EntityId },
    HaveFragged { who: EntityId },
    BeenHit { coming_from: f64, damage: f64 },
    HaveHit { who: EntityId },
    Respawning { respawning_in: i64 },
    Respawned,
    ExitedMaze,
    Stats { distance_travelled: f64 },
    Score { value: i64 },
}

impl Notification {
    pub fn subject(&self) -> &'static str {
        match self {
            Notification::BeenFragged { .. } => "beenfragged",
            Notification::HaveFragged { .. } => "havefragged",
            Notification::BeenHit { .. } => "beenhit",
            Notification::HaveHit { .. } => "havehit",
            Notification::Respawning { .. } => "respawning",
            Notification::Respawned => "respawned",
            Notification::ExitedMaze => "exitedmaze",
            Notification::Stats { .. } => "stats",
            Notification::Score { .. } => "score",
        }
    }

    pub fn body(&self) -> Value {
        match self {
            Notification::BeenFragged { by } => json!({ "by": by.0 }),
            Notification::HaveFragged { who } => json!({ "who": who.0 }),
            Notification::BeenHit {
                coming_from,
                damage,
            } => json!({
                "kind": "projectile",
                "comingfrom": coming_from,
                "damage": damage,
            }),
            Notification::HaveHit { who } => json!({ "who": who.0 }),
            Notification::Respawning { respawning_in } => json!({ "respawningin": respawning_in }),
            Notification::Respawned | Notification::ExitedMaze => json!({}),
            Notification::Stats { distance_travelled } => {
                json!({ "distancetravelled": distance_travelled })
            }
            Notification::Score { value } => json!({ "value": value }),
        }
    }
}

impl From<&Notification> for MailboxMessage {
    fn from(notification: &Notification) -> Self {
        MailboxMessage {
            subject: notification.subject().to_string(),
            body: notification.body(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    pub messages: Vec<Notification>,
}

impl Mailbox {
    pub fn push(&mut self, notification: Notification) {
        self.messages.push(notification);
    }

    pub fn pop_messages(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.messages)
    }
}
