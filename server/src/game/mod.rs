//! Game modes plugged into the server core.
//!
//! The server only talks to a game through [`Game`]: it feeds each tick's
//! mutation batches in, and reads welcome, perception and visualisation
//! payloads out. Deathmatch is the only mode.

pub mod deathmatch;

use crate::config::AgentDescriptor;
use serde::{Deserialize, Serialize};
use shared::{AgentAction, Vector2};
use std::fmt;
use uuid::Uuid;

/// Opaque handle of a simulated object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The actions one agent submitted, attributed to its entity.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentMutationBatch {
    pub agent_proxy: Uuid,
    pub entity: EntityId,
    pub mutations: Vec<AgentAction>,
    /// Arrival order of this batch among the batches of the same agent.
    pub sequence: u64,
}

pub type GameOverCallback = Box<dyn Fn() + Send + Sync>;

pub trait Game: Send {
    /// Advances the world by one tick.
    fn step(&mut self, tick: u32, dt: f64, mutations: Vec<AgentMutationBatch>);

    /// Creates the agent entity at `spawn`, in physical units.
    fn new_entity_agent(&mut self, agent: &AgentDescriptor, spawn: Vector2) -> EntityId;

    fn remove_entity_agent(&mut self, entity: EntityId);

    ///Returns the last perception computed for `entity` as JSON, empty if unknown.
    fn agent_perception(&self, entity: EntityId) -> Vec<u8>;

    ///Returns the agent specs sent in the welcome message, empty if unknown.
    fn agent_welcome(&self, entity: EntityId) -> Vec<u8>;

    fn viz_frame_json(&self) -> Vec<u8>;

    fn viz_init_json(&self) -> Vec<u8>;

    /// Registers the callback run when the game decides by itself that it is over.
    fn set_game_over_callback(&mut self, callback: GameOverCallback);
}
