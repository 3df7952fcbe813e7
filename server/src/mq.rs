//! Out of band status reporting.
//!
//! The server announces its lifecycle (`game`/`launched`, `game`/`stopped`)
//! through a [`MessageBroker`]. Publishing never blocks the tick loop.

use log::info;
use serde::Serialize;
use serde_json::{Map, Value};
use std::panic::Location;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

pub type MqPayload = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MqMessage {
    /// Milliseconds since the unix epoch
    pub date: u64,
    pub host: String,
    pub app: String,
    pub file: String,
    pub line: u32,
    pub message: String,
    pub payload: Option<MqPayload>,
    pub error: bool,
}

impl MqMessage {
    /// Stamps the message with the current time, host, and caller location.
    #[track_caller]
    pub fn new(app: &str, message: impl Into<String>) -> Self {
        let caller = Location::caller();

        Self {
            date: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            host: hostname(),
            app: app.to_string(),
            file: caller.file().to_string(),
            line: caller.line(),
            message: message.into(),
            payload: None,
            error: false,
        }
    }

    #[track_caller]
    pub fn new_error(app: &str, message: impl Into<String>) -> Self {
        Self {
            error: true,
            ..Self::new(app, message)
        }
    }

    pub fn with_payload(mut self, payload: MqPayload) -> Self {
        self.payload = Some(payload);
        self
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .unwrap_or_default()
}

pub trait MessageBroker: Send + Sync {
    fn publish(&self, channel: &str, topic: &str, message: &MqMessage) -> serde_json::Result<()>;
}

/// Writes every message to the log
#[derive(Debug, Default)]
pub struct LogBroker;

impl MessageBroker for LogBroker {
    fn publish(&self, channel: &str, topic: &str, message: &MqMessage) -> serde_json::Result<()> {
        let json = serde_json::to_string(message)?;
        info!("[mq] {}:{} {}", channel, topic, json);
        Ok(())
    }
}

/// Keeps every message in memory, in publication order
#[derive(Debug, Default)]
pub struct MemoryBroker {
    published: Mutex<Vec<(String, String, MqMessage)>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    ///Returns the (channel, topic) pairs published so far
    pub fn topics(&self) -> Vec<(String, String)> {
        self.messages()
            .into_iter()
            .map(|(channel, topic, _)| (channel, topic))
            .collect()
    }

    pub fn messages(&self) -> Vec<(String, String, MqMessage)> {
        match self.published.lock() {
            Ok(published) => published.clone(),
            Err(_) => Vec::new(),
        }
    }
}

impl MessageBroker for MemoryBroker {
    fn publish(&self, channel: &str, topic: &str, message: &MqMessage) -> serde_json::Result<()> {
        if let Ok(mut published) = self.published.lock() {
            published.push((channel.to_string(), topic.to_string(), message.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_records_caller() {
        let message = MqMessage::new("arena-server", "launched");
        assert!(message.file.ends_with("mq.rs"));
        assert!(message.line > 0);
        assert!(!message.error);
        assert!(message.date > 0);
    }

    #[test]
    fn test_payload_is_serialized() {
        let mut payload = MqPayload::new();
        payload.insert("id".into(), json!("game-1"));

        let message = MqMessage::new_error("arena-server", "boom").with_payload(payload);
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["payload"]["id"], "game-1");
        assert_eq!(value["error"], true);
    }

    #[test]
    fn test_memory_broker_keeps_order() {
        let broker = MemoryBroker::new();
        broker.publish("game", "launched", &MqMessage::new("a", "1")).unwrap();
        broker.publish("game", "stopped", &MqMessage::new("a", "2")).unwrap();

        assert_eq!(
            broker.topics(),
            vec![
                ("game".to_string(), "launched".to_string()),
                ("game".to_string(), "stopped".to_string())
            ]
        );
    }

    #[test]
    fn test_log_broker_accepts_messages() {
        assert!(LogBroker.publish("game", "launched", &MqMessage::new("a", "x")).is_ok());
    }
}
