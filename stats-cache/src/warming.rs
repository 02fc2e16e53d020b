//! Warming queue: a binary heap of pending warm-ups ordered by priority.

use common::{CacheCategory, Producer};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

/// How eagerly the manager warms forecast keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WarmingStrategy {
    /// Warm on the second access to a key.
    Aggressive,
    /// Warm once a key is clearly popular.
    Moderate,
    /// No predictive warming; the worker is stopped.
    Conservative,
    /// Only explicitly added warming tasks run.
    Custom,
}

impl WarmingStrategy {
    /// Access count at which predictive warming kicks in; `None` disables it.
    pub fn warm_after_accesses(&self) -> Option<u64> {
        match self {
            WarmingStrategy::Aggressive => Some(2),
            WarmingStrategy::Moderate => Some(5),
            WarmingStrategy::Conservative => None,
            WarmingStrategy::Custom => None,
        }
    }
}

/// A queued warm-up: recompute one key's value before it is requested.
#[derive(Clone)]
pub struct WarmingTask {
    pub category: CacheCategory,
    /// Higher runs first.
    pub priority: u8,
    pub key_parts: Vec<String>,
    pub producer: Arc<dyn Producer>,
    pub ttl: Option<Duration>,
    pub deps: Vec<String>,
    /// Expected producer cost in seconds, informational.
    pub estimated_cost: f64,
    /// Access count of the key at enqueue time.
    pub access_frequency: u64,
    /// Insertion order, breaks priority ties FIFO.
    pub(crate) seq: u64,
}

impl PartialEq for WarmingTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for WarmingTask {}

impl PartialOrd for WarmingTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WarmingTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then earlier insertion.
        self.priority
            .cmp(&other.priority)
            .then(other.seq.cmp(&self.seq))
    }
}

/// Priority queue of warming tasks with a length cap.
pub(crate) struct WarmingQueue {
    heap: BinaryHeap<WarmingTask>,
    next_seq: u64,
    max_len: usize,
}

impl WarmingQueue {
    pub fn new(max_len: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            max_len,
        }
    }

    /// Enqueue a task; returns false (dropping the task) when full.
    pub fn push(&mut self, mut task: WarmingTask) -> bool {
        if self.heap.len() >= self.max_len {
            return false;
        }
        task.seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(task);
        true
    }

    pub fn pop(&mut self) -> Option<WarmingTask> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}
