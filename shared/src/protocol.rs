//! Wire types exchanged between the arena server and the agents.
//!
//! Every message is a single JSON object terminated by `\n`. Agents send
//! [`AgentMessage`] envelopes (`handshake` then `actions`), the server answers
//! with [`ServerMessage`] envelopes (`welcome` once, then `perception` every tick).

use crate::vector::Vector2;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

pub const PROTOCOL_VERSION_CLEAR_BETA: &str = "clear_beta";
pub const PROTOCOL_VERSION_CLEAR_V1: &str = "clear_v1";
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 2] =
    [PROTOCOL_VERSION_CLEAR_BETA, PROTOCOL_VERSION_CLEAR_V1];
pub const UNKNOWN_PROTOCOL_VERSION: &str = "UNKNOWN";

pub const METHOD_HANDSHAKE: &str = "handshake";
pub const METHOD_ACTIONS: &str = "actions";
pub const METHOD_WELCOME: &str = "welcome";
pub const METHOD_PERCEPTION: &str = "perception";

pub const ACTION_SHOOT: &str = "shoot";
pub const ACTION_STEER: &str = "steer";
pub const ACTION_DEBUG_POINT: &str = "debugpoint";

pub fn is_supported_version(version: &str) -> bool {
    SUPPORTED_PROTOCOL_VERSIONS.contains(&version)
}

/// Envelope sent by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub agentid: Uuid,
    pub method: String,
    #[serde(default)]
    pub payload: Value,
}

impl AgentMessage {
    pub fn handshake(agent_id: Uuid, version: &str) -> Self {
        Self {
            agentid: agent_id,
            method: METHOD_HANDSHAKE.to_string(),
            payload: serde_json::json!({ "version": version }),
        }
    }

    pub fn actions(agent_id: Uuid, actions: Vec<AgentAction>) -> Self {
        let payload = ActionsPayload { actions };
        Self {
            agentid: agent_id,
            method: METHOD_ACTIONS.to_string(),
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }

    /// Method names are matched case-insensitively (`Handshake` and `handshake` are the same).
    pub fn normalized_method(&self) -> String {
        self.method.to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HandshakePayload {
    #[serde(default)]
    pub version: String,
}

impl HandshakePayload {
    ///Returns the version, with a missing one reported as `UNKNOWN`.
    pub fn normalized_version(&self) -> &str {
        if self.version.is_empty() {
            UNKNOWN_PROTOCOL_VERSION
        } else {
            &self.version
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionsPayload {
    #[serde(rename = "Actions", default)]
    pub actions: Vec<AgentAction>,
}

/// A single command inside an `actions` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl AgentAction {
    fn with_vector(method: &str, v: Vector2) -> Self {
        Self {
            method: method.to_string(),
            arguments: serde_json::json!([v.x, v.y]),
        }
    }

    pub fn steer(v: Vector2) -> Self {
        Self::with_vector(ACTION_STEER, v)
    }

    pub fn shoot(aim: Vector2) -> Self {
        Self::with_vector(ACTION_SHOOT, aim)
    }

    pub fn debug_point(point: Vector2) -> Self {
        Self::with_vector(ACTION_DEBUG_POINT, point)
    }

    /// Decodes the `[x, y]` argument shared by every known action.
    pub fn vector_argument(&self) -> Option<Vector2> {
        serde_json::from_value::<[f64; 2]>(self.arguments.clone())
            .ok()
            .map(Vector2::from)
    }
}

/// Envelope sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub method: String,
    pub payload: Value,
}

impl ServerMessage {
    /// Frames an already serialized payload without decoding it again.
    pub fn frame_raw(method: &str, payload: &[u8]) -> Vec<u8> {
        let mut line = Vec::with_capacity(payload.len() + method.len() + 32);
        line.extend_from_slice(b"{\"method\":\"");
        line.extend_from_slice(method.as_bytes());
        line.extend_from_slice(b"\",\"payload\":");
        if payload.is_empty() {
            line.extend_from_slice(b"null");
        } else {
            line.extend_from_slice(payload);
        }
        line.extend_from_slice(b"}\n");
        line
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GunSpecs {
    pub shootcost: f64,
    pub shootcooldown: u32,
    pub projectilespeed: f64,
    pub projectiledamage: f64,
    pub projectilerange: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GearSpecs {
    pub genre: String,
    pub kind: String,
    pub specs: GunSpecs,
}

/// Payload of the `welcome` message, in agent space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpecs {
    // Movements
    pub maxspeed: f64,
    pub maxsteeringforce: f64,
    pub maxangularvelocity: f64,
    pub visionradius: f64,
    pub visionangle: f64,

    // Body
    pub bodyradius: f64,

    // Shoot
    pub maxshootenergy: f64,
    pub shootrecoveryrate: f64,

    pub gear: BTreeMap<String, GearSpecs>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionTag {
    Agent,
    Obstacle,
    Projectile,
}

/// One visible thing, as an edge seen from the agent (agent-local frame).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionItem {
    pub tag: VisionTag,
    pub nearedge: Vector2,
    pub center: Vector2,
    pub faredge: Vector2,
    pub velocity: Vector2,
    pub entityid: u32,
    pub segmentnum: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailboxMessage {
    pub subject: String,
    #[serde(default)]
    pub body: Value,
}

/// Payload of the per-tick `perception` message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentPerception {
    pub score: i64,
    pub energy: f64,
    pub velocity: Vector2,
    pub azimuth: f64,
    pub vision: Vec<VisionItem>,
    pub shootenergy: f64,
    pub shootcooldown: u32,
    pub messages: Vec<MailboxMessage>,
}

/// Serializes `message` as one newline-terminated JSON line.
pub fn encode_line<T: Serialize>(message: &T) -> serde_json::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    Ok(line)
}

/// Parses one line, ignoring the trailing newline and surrounding whitespace.
pub fn decode_line<'a, T: Deserialize<'a>>(line: &'a [u8]) -> serde_json::Result<T> {
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    serde_json::from_slice(&line[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_version_allow_list() {
        assert!(is_supported_version("clear_beta"));
        assert!(is_supported_version("clear_v1"));
        assert!(!is_supported_version("clear_v2"));
        assert!(!is_supported_version(UNKNOWN_PROTOCOL_VERSION));

        let missing: HandshakePayload = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.normalized_version(), "UNKNOWN");
    }

    #[test]
    fn test_agent_message_wire_shape() {
        let id = Uuid::new_v4();
        let line = format!(
            "{{\"agentid\":\"{}\",\"method\":\"Actions\",\"payload\":{{\"Actions\":[{{\"method\":\"steer\",\"arguments\":[0.5,1]}}]}}}}\n",
            id
        );

        let message: AgentMessage = decode_line(line.as_bytes()).unwrap();
        assert_eq!(message.agentid, id);
        assert_eq!(message.normalized_method(), METHOD_ACTIONS);

        let payload: ActionsPayload = serde_json::from_value(message.payload).unwrap();
        assert_eq!(payload.actions.len(), 1);
        assert_eq!(payload.actions[0].method, ACTION_STEER);
        assert_eq!(
            payload.actions[0].vector_argument(),
            Some(Vector2::new(0.5, 1.0))
        );
    }

    #[test]
    fn test_bad_action_argument_is_none() {
        let action = AgentAction {
            method: ACTION_SHOOT.to_string(),
            arguments: serde_json::json!({"x": 1}),
        };
        assert_eq!(action.vector_argument(), None);
    }

    #[test]
    fn test_frame_raw_produces_valid_envelope() {
        let line = ServerMessage::frame_raw(METHOD_PERCEPTION, b"{\"score\":3}");
        assert_eq!(line.last(), Some(&b'\n'));

        let message: ServerMessage = decode_line(&line).unwrap();
        assert_eq!(message.method, "perception");
        assert_eq!(message.payload["score"], 3);
    }

    #[test]
    fn test_vision_item_uses_lowercase_tags() {
        let item = VisionItem {
            tag: VisionTag::Projectile,
            nearedge: Vector2::new(1.0, 2.0),
            center: Vector2::new(1.5, 2.0),
            faredge: Vector2::new(2.0, 2.0),
            velocity: Vector2::ZERO,
            entityid: 12,
            segmentnum: 0,
        };

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["tag"], "projectile");
        assert_eq!(json["entityid"], 12);
        assert_approx_eq!(json["center"][0].as_f64().unwrap(), 1.5);
    }
}
