//! # Reference Arena Agent
//!
//! A small agent for the arena server. It is what the process orchestrator
//! runs in local games, and the codec the integration tests drive the server
//! with.
//!
//! - [`network`]: TCP connection, handshake and message decoding
//! - [`brain`]: turns a perception into steer and shoot actions

pub mod brain;
pub mod network;

pub use brain::Brain;
pub use network::{run_agent, AgentConnection, ServerEvent};
