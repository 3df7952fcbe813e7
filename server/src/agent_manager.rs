//! Agent proxies and the registry of the agents taking part in a game
//!
//! A proxy stands for one agent on the server side. Network proxies forward
//! perceptions and the welcome message over their connection, local proxies
//! are driven in process and only count deliveries.

use crate::config::AgentDescriptor;
use crate::error::CommError;
use crate::game::EntityId;
use crate::network::Connection;
use crate::orchestrator::AgentContainer;
use log::info;
use shared::protocol::{ServerMessage, METHOD_PERCEPTION, METHOD_WELCOME};
use shared::Vector2;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NetworkAgentProxy {
    pub id: Uuid,
    pub entity: EntityId,
    pub connection: Option<Connection>,
}

#[derive(Debug, Clone)]
pub struct LocalAgentProxy {
    pub id: Uuid,
    pub entity: EntityId,
    delivered: Arc<AtomicU64>,
}

impl LocalAgentProxy {
    ///Returns how many perceptions were handed to this agent
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub enum AgentProxy {
    Network(NetworkAgentProxy),
    Local(LocalAgentProxy),
}

impl AgentProxy {
    pub fn network(entity: EntityId) -> Self {
        AgentProxy::Network(NetworkAgentProxy {
            id: Uuid::new_v4(),
            entity,
            connection: None,
        })
    }

    pub fn local(entity: EntityId) -> Self {
        AgentProxy::Local(LocalAgentProxy {
            id: Uuid::new_v4(),
            entity,
            delivered: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn id(&self) -> Uuid {
        match self {
            AgentProxy::Network(proxy) => proxy.id,
            AgentProxy::Local(proxy) => proxy.id,
        }
    }

    pub fn entity(&self) -> EntityId {
        match self {
            AgentProxy::Network(proxy) => proxy.entity,
            AgentProxy::Local(proxy) => proxy.entity,
        }
    }

    pub fn connection(&self) -> Option<&Connection> {
        match self {
            AgentProxy::Network(proxy) => proxy.connection.as_ref(),
            AgentProxy::Local(_) => None,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, AgentProxy::Local(_))
    }

    pub async fn set_perception(&self, perception: &[u8]) -> Result<(), CommError> {
        match self {
            AgentProxy::Network(proxy) => {
                send(proxy.connection.as_ref(), &ServerMessage::frame_raw(METHOD_PERCEPTION, perception)).await
            }
            AgentProxy::Local(proxy) => {
                proxy.delivered.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    pub async fn send_agent_welcome(&self, welcome: &[u8]) -> Result<(), CommError> {
        match self {
            AgentProxy::Network(proxy) => {
                send(proxy.connection.as_ref(), &ServerMessage::frame_raw(METHOD_WELCOME, welcome)).await
            }
            AgentProxy::Local(_) => Ok(()),
        }
    }
}

/// A proxy that has no connection yet drops what it is given
async fn send(connection: Option<&Connection>, bytes: &[u8]) -> Result<(), CommError> {
    match connection {
        Some(connection) => connection.send(bytes).await,
        None => Ok(()),
    }
}

impl fmt::Display for AgentProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentProxy::Network(proxy) => write!(f, "<NetAgent({})>", proxy.id),
            AgentProxy::Local(proxy) => write!(f, "<LocalAgent({})>", proxy.id),
        }
    }
}

/// Everything the server keeps about one agent
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub proxy: AgentProxy,
    pub descriptor: AgentDescriptor,
    /// Spawn point, in physical units
    pub spawn: Vector2,
    pub container: Option<AgentContainer>,
    pub handshaked: bool,
}

impl AgentRecord {
    pub fn name(&self) -> &str {
        &self.descriptor.manifest.name
    }
}

/// Registry of the agents, indexed by proxy id
#[derive(Debug, Default)]
pub struct AgentManager {
    agents: HashMap<Uuid, AgentRecord>,
}

impl AgentManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: AgentRecord) -> Uuid {
        let id = record.proxy.id();
        info!("Agent {} registered as {}", record.name(), record.proxy);
        self.agents.insert(id, record);
        id
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<AgentRecord> {
        let record = self.agents.remove(id);
        if let Some(record) = &record {
            info!("Agent {} removed", record.proxy);
        }
        record
    }

    pub fn get(&self, id: &Uuid) -> Option<&AgentRecord> {
        self.agents.get(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.agents.contains_key(id)
    }

    /// Attaches `connection` to a network proxy. Returns false for local or unknown agents.
    pub fn set_connection(&mut self, id: &Uuid, connection: Connection) -> bool {
        match self.agents.get_mut(id).map(|record| &mut record.proxy) {
            Some(AgentProxy::Network(proxy)) => {
                proxy.connection = Some(connection);
                true
            }
            _ => false,
        }
    }

    /// Marks the agent as handshaked; false if it already was, or is unknown.
    pub fn mark_handshaked(&mut self, id: &Uuid) -> bool {
        match self.agents.get_mut(id) {
            Some(record) if !record.handshaked => {
                record.handshaked = true;
                true
            }
            _ => false,
        }
    }

    pub fn set_container(&mut self, id: &Uuid, container: AgentContainer) {
        if let Some(record) = self.agents.get_mut(id) {
            record.container = Some(container);
        }
    }

    pub fn find_by_connection(&self, connection: &Connection) -> Option<Uuid> {
        self.agents
            .iter()
            .find(|(_, record)| record.proxy.connection() == Some(connection))
            .map(|(id, _)| *id)
    }

    pub fn find_by_entity(&self, entity: EntityId) -> Option<Uuid> {
        self.agents
            .iter()
            .find(|(_, record)| record.proxy.entity() == entity)
            .map(|(id, _)| *id)
    }

    pub fn proxies(&self) -> Vec<AgentProxy> {
        self.agents.values().map(|record| record.proxy.clone()).collect()
    }

    pub fn containers(&self) -> Vec<AgentContainer> {
        self.agents
            .values()
            .filter_map(|record| record.container.clone())
            .collect()
    }

    pub fn handshaked_count(&self) -> usize {
        self.agents.values().filter(|record| record.handshaked).count()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
