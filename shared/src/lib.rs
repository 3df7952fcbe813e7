//! Types and geometry shared by the arena server and the agents.

pub mod protocol;
pub mod trigo;
pub mod vector;
pub mod visibility;

pub use protocol::{
    AgentAction, AgentMessage, AgentPerception, AgentSpecs, MailboxMessage, ServerMessage,
    VisionItem, VisionTag,
};
pub use vector::Vector2;

/// Agent space is physical space times this factor.
pub const PHYSICAL_TO_AGENT_SCALE: f64 = 100.0;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TPS: u32 = 10;
