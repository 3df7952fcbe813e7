//! Visualisation payloads and their streaming.
//!
//! Positions, velocities and radii are in physical units.

use crate::config::{AgentDescriptor, GameDescription};
use crate::leaky_bucket::{Batch, Bucket};
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use shared::Vector2;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VizScore {
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerInfo {
    pub isalive: bool,
    pub playerid: String,
    pub playername: String,
    pub score: VizScore,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VizObject {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub position: Vector2,
    pub velocity: Vector2,
    pub radius: f64,
    pub orientation: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playerinfo: Option<PlayerInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VizEvent {
    pub subject: String,
    pub payload: Value,
}

/// One tick of the arena, as seen by a viewer
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct VizMessage {
    pub gameid: String,
    pub objects: Vec<VizObject>,
    pub debugpoints: Vec<[f64; 2]>,
    pub events: Vec<VizEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VizInitData<'a> {
    pub mapname: &'a str,
    pub tps: u32,
    pub agents: &'a [AgentDescriptor],
}

/// First message a viewer gets, before any frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VizInit<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: VizInitData<'a>,
}

impl<'a> VizInit<'a> {
    pub fn new(description: &'a GameDescription) -> Self {
        Self {
            kind: "init",
            data: VizInitData {
                mapname: &description.name,
                tps: description.tps,
                agents: &description.agents,
            },
        }
    }
}

/// Broadcast by the server after every tick
#[derive(Debug, Clone)]
pub struct StateUpdate {
    pub tick: u32,
    pub frame: Arc<Vec<u8>>,
}

/// Feeds the per-tick frames into a [`Bucket`] and republishes full batches
pub struct VizStreamer {
    bucket: Arc<Mutex<Bucket>>,
    batches: broadcast::Sender<Batch>,
}

impl VizStreamer {
    pub fn new(frames_per_batch: usize, batches_to_keep: usize) -> Self {
        let (batches, _) = broadcast::channel(batches_to_keep.max(1) * 2);
        let sender = batches.clone();

        let bucket = Bucket::new(
            frames_per_batch,
            batches_to_keep,
            Box::new(move |batch: &Batch| {
                // No subscriber is fine
                let _ = sender.send(batch.clone());
            }),
        );

        Self {
            bucket: Arc::new(Mutex::new(bucket)),
            batches,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Batch> {
        self.batches.subscribe()
    }

    ///Returns the batches retained so far
    pub fn batches(&self) -> Vec<Batch> {
        match self.bucket.lock() {
            Ok(bucket) => bucket.batches(),
            Err(_) => Vec::new(),
        }
    }

    pub fn push_frame(&self, frame: &[u8]) {
        let payload = String::from_utf8_lossy(frame).into_owned();
        if let Ok(mut bucket) = self.bucket.lock() {
            bucket.add_frame(payload);
        }
    }

    /// Consumes state updates until the sender goes away
    pub fn spawn(self: &Arc<Self>, mut updates: broadcast::Receiver<StateUpdate>) -> JoinHandle<()> {
        let streamer = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => streamer.push_frame(&update.frame),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Viz streamer lagged behind; {} frames skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Viz streamer stopped");
        })
    }
}
