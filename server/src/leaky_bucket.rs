//! Frame batching for visualisation consumers
//!
//! Frames are numbered and timestamped as they come in, grouped in batches of
//! a fixed size, and only the last few batches are retained.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub num: u64,
    /// Milliseconds since the unix epoch
    pub time: u64,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    pub num: u64,
    pub fromframe: u64,
    pub toframe: u64,
    pub fromtime: u64,
    pub totime: u64,
    pub frames: Vec<Frame>,
}

impl Batch {
    fn new(num: u64, capacity: usize) -> Self {
        Self {
            num,
            fromframe: 0,
            toframe: 0,
            fromtime: 0,
            totime: 0,
            frames: Vec::with_capacity(capacity),
        }
    }

    fn add_frame(&mut self, frame: Frame) {
        if self.frames.is_empty() {
            self.fromframe = frame.num;
            self.fromtime = frame.time;
        }
        self.toframe = frame.num;
        self.totime = frame.time;
        self.frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

pub type BatchCallback = Box<dyn FnMut(&Batch) + Send>;

pub struct Bucket {
    frames_per_batch: usize,
    batches_to_keep: usize,
    batches: VecDeque<Batch>,
    next_frame: u64,
    next_batch: u64,
    in_the_making: Batch,
    on_batch: BatchCallback,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Bucket {
    pub fn new(frames_per_batch: usize, batches_to_keep: usize, on_batch: BatchCallback) -> Self {
        let frames_per_batch = frames_per_batch.max(1);

        Self {
            frames_per_batch,
            batches_to_keep,
            batches: VecDeque::with_capacity(batches_to_keep + 1),
            next_frame: 0,
            next_batch: 1,
            in_the_making: Batch::new(0, frames_per_batch),
            on_batch,
        }
    }

    pub fn add_frame(&mut self, payload: String) {
        self.in_the_making.add_frame(Frame {
            num: self.next_frame,
            time: now_millis(),
            payload,
        });
        self.next_frame += 1;

        if self.in_the_making.len() < self.frames_per_batch {
            return;
        }

        let done = std::mem::replace(
            &mut self.in_the_making,
            Batch::new(self.next_batch, self.frames_per_batch),
        );
        self.next_batch += 1;

        (self.on_batch)(&done);

        self.batches.push_back(done);
        while self.batches.len() > self.batches_to_keep {
            self.batches.pop_front();
        }
    }

    ///Returns a copy of the retained batches, oldest first
    pub fn batches(&self) -> Vec<Batch> {
        self.batches.iter().cloned().collect()
    }
}
