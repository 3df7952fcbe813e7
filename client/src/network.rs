//! Agent side of the wire protocol
//!
//! [`AgentConnection`] speaks newline delimited JSON over TCP: it sends
//! [`AgentMessage`]s and yields the [`ServerMessage`]s the arena answers with.

use log::{debug, info, warn};
use shared::protocol::{
    decode_line, encode_line, AgentAction, AgentMessage, AgentPerception, AgentSpecs, ServerMessage,
    METHOD_PERCEPTION, METHOD_WELCOME, PROTOCOL_VERSION_CLEAR_V1,
};
use std::error::Error;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::brain::Brain;

/// A decoded server message
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Welcome(AgentSpecs),
    Perception(AgentPerception),
    Other(ServerMessage),
}

impl ServerEvent {
    pub fn from_message(message: ServerMessage) -> Result<Self, serde_json::Error> {
        match message.method.as_str() {
            METHOD_WELCOME => Ok(ServerEvent::Welcome(serde_json::from_value(message.payload)?)),
            METHOD_PERCEPTION => Ok(ServerEvent::Perception(serde_json::from_value(message.payload)?)),
            _ => Ok(ServerEvent::Other(message)),
        }
    }
}

pub struct AgentConnection {
    agent_id: Uuid,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    buffer: Vec<u8>,
}

impl AgentConnection {
    pub async fn connect(addr: SocketAddr, agent_id: Uuid) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, writer) = stream.into_split();

        Ok(Self {
            agent_id,
            reader: BufReader::new(read_half),
            writer,
            buffer: Vec::with_capacity(4096),
        })
    }

    pub fn agent_id(&self) -> Uuid {
        self.agent_id
    }

    pub async fn send(&mut self, message: &AgentMessage) -> Result<(), Box<dyn Error + Send + Sync>> {
        let line = encode_line(message)?;
        self.send_raw(&line).await
    }

    /// Writes bytes as they are, for protocol tests
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn handshake(&mut self, version: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        let message = AgentMessage::handshake(self.agent_id, version);
        self.send(&message).await
    }

    pub async fn send_actions(&mut self, actions: Vec<AgentAction>) -> Result<(), Box<dyn Error + Send + Sync>> {
        let message = AgentMessage::actions(self.agent_id, actions);
        self.send(&message).await
    }

    ///Returns the next server message, `None` once the server has closed the connection
    pub async fn recv(&mut self) -> Result<Option<ServerEvent>, Box<dyn Error + Send + Sync>> {
        loop {
            self.buffer.clear();
            if self.reader.read_until(b'\n', &mut self.buffer).await? == 0 {
                return Ok(None);
            }
            if self.buffer.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }

            let message: ServerMessage = decode_line(&self.buffer)?;
            return Ok(Some(ServerEvent::from_message(message)?));
        }
    }
}

/// Connects, handshakes, then answers every perception until the server leaves.
pub async fn run_agent(addr: SocketAddr, agent_id: Uuid, mut brain: Brain) -> Result<u64, Box<dyn Error + Send + Sync>> {
    info!("Agent {} connecting to {}", agent_id, addr);

    let mut connection = AgentConnection::connect(addr, agent_id).await?;
    connection.handshake(PROTOCOL_VERSION_CLEAR_V1).await?;

    let mut perceptions = 0u64;
    while let Some(event) = connection.recv().await? {
        match event {
            ServerEvent::Welcome(specs) => {
                info!("Welcomed; max speed {}, vision radius {}", specs.maxspeed, specs.visionradius);
                brain.set_specs(specs);
            }
            ServerEvent::Perception(perception) => {
                perceptions += 1;
                let actions = brain.decide(&perception);
                if let Err(e) = connection.send_actions(actions).await {
                    warn!("Failed to send actions; {}", e);
                    break;
                }
            }
            ServerEvent::Other(message) => debug!("Ignoring message {}", message.method),
        }
    }

    info!("Server closed the connection after {} perceptions", perceptions);
    Ok(perceptions)
}
