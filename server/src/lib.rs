//! # Arena Server Library
//!
//! Authoritative server for tick based arena games played by autonomous agents.
//! Agents are separate processes that connect over TCP, send a handshake, and
//! then answer every perception with a list of actions.
//!
//! ## Layout
//!
//! - [`network`]: the comm server, newline delimited JSON over TCP
//! - [`agent_manager`]: agent proxies and the registry
//! - [`arena`]: the server core, with dispatch, tick loop, reload and teardown
//! - [`game`]: the [`game::Game`] interface and the deathmatch mode
//! - [`physics`]: the 2D world the game runs on
//! - [`orchestrator`]: agent processes
//! - [`viz`] and [`leaky_bucket`]: frames for viewers
//! - [`mq`]: lifecycle announcements
//!
//! ## Ticking
//!
//! Network tasks never touch the game. They push mutation batches into a
//! pending list which the tick loop swaps out at the start of every tick,
//! so each batch is applied exactly once.

pub mod agent_manager;
pub mod arena;
pub mod config;
pub mod error;
pub mod game;
pub mod leaky_bucket;
pub mod mq;
pub mod network;
pub mod orchestrator;
pub mod physics;
pub mod viz;

pub use arena::{ArenaConfig, ArenaServer};
pub use config::GameDescription;
pub use error::ServerError;
