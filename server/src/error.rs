//! Error types for the arena server.
//!
//! Each layer has its own enum; [`ServerError`] wraps them when an error has
//! to travel across layers (reload, agent start).

use thiserror::Error;
use uuid::Uuid;

/// Connection level failures raised by the comm server.
#[derive(Debug, Error)]
pub enum CommError {
    #[error("comm server could not listen on {address}; {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("agent connection has been aborted; handshake timeout ({0:?})")]
    HandshakeTimeout(std::time::Duration),
    #[error("connection closed unexpectedly; {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed by peer")]
    Eof,
    #[error("connection is already closed")]
    Closed,
}

/// Reasons an agent message is refused by the server core.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("agentid {0} does not match any known agent in received agent message")]
    UnknownAgent(Uuid),
    #[error("received duplicate handshake from agent {0}")]
    DuplicateHandshake(Uuid),
    #[error("unsupported agent protocol; agent {agent}, protocol version {version}")]
    UnsupportedProtocol { agent: Uuid, version: String },
    #[error("unknown message type {0}")]
    UnknownMethod(String),
    #[error("failed to unmarshal {what} from agent {agent}; {source}")]
    BadPayload {
        what: &'static str,
        agent: Uuid,
        #[source]
        source: serde_json::Error,
    },
    #[error("handshake for agent {0} did not come from a network connection")]
    NotNetworked(Uuid),
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("container for agent {0} not found")]
    ContainerNotFound(Uuid),
    #[error("failed to spawn agent process {image}; {source}")]
    Spawn {
        image: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to determine arena host; {0}")]
    Host(String),
    #[error("agent process i/o failed; {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read game description {path}; {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid game description JSON; {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid game description; {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Comm(#[from] CommError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot spawn agent {image}; no starting point left ({starts} starts)")]
    NoStartingPoint { image: String, starts: usize },
    #[error("agent {agent}: {context}")]
    AgentLifecycle {
        agent: String,
        context: &'static str,
        #[source]
        source: Box<ServerError>,
    },
}

impl ServerError {
    /// Wraps `self` with the identity of the agent it happened to.
    pub fn for_agent(self, agent: impl Into<String>, context: &'static str) -> ServerError {
        ServerError::AgentLifecycle {
            agent: agent.into(),
            context,
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_unsupported_protocol_names_version() {
        let err = DispatchError::UnsupportedProtocol {
            agent: Uuid::nil(),
            version: "UNKNOWN".to_string(),
        };
        assert!(err.to_string().contains("UNKNOWN"));
    }

    #[test]
    fn test_agent_lifecycle_keeps_cause() {
        let err = ServerError::from(OrchestratorError::ContainerNotFound(Uuid::nil()))
            .for_agent("bot-a", "could not reload agent");

        assert!(err.to_string().contains("bot-a"));
        let cause = err.source().map(|e| e.to_string()).unwrap_or_default();
        assert!(cause.contains("not found"));
    }
}
