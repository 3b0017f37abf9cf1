//! Per-job broadcast channels for progress snapshots
//!
//! Each job gets its own `tokio::sync::broadcast` channel, created on first
//! use. Any number of receivers may attach; dropping a receiver is the only
//! unsubscribe needed. Closing a job drops its sender, so every receiver sees
//! end-of-stream once it has drained the remaining snapshots.

use super::ProgressSnapshot;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Snapshots buffered per job before slow receivers start lagging
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Terminal snapshots kept for subscribers racing a job's end
pub const DEFAULT_FINISHED_RETENTION: usize = 1024;

#[derive(Debug, Default)]
struct HubState {
    channels: HashMap<i64, broadcast::Sender<ProgressSnapshot>>,
    /// Terminal snapshots of recently closed jobs, oldest evicted first
    finished: HashMap<i64, ProgressSnapshot>,
    finished_order: VecDeque<i64>,
}

impl HubState {
    fn remember(&mut self, snapshot: ProgressSnapshot, retention: usize) {
        let job_id = snapshot.job_id;
        if self.finished.insert(job_id, snapshot).is_none() {
            self.finished_order.push_back(job_id);
        }
        while self.finished_order.len() > retention {
            if let Some(oldest) = self.finished_order.pop_front() {
                self.finished.remove(&oldest);
            }
        }
    }

    /// Drops channels nobody listens to; they are recreated on demand
    fn prune_idle(&mut self) {
        self.channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}

/// In-process fan-out of progress snapshots, keyed by job id
///
/// Cloning is cheap; clones share the same channels. Only a bounded number
/// of terminal snapshots is retained; callers with a job store should
/// answer subscriptions to finished jobs from the store instead.
#[derive(Debug, Clone)]
pub struct ProgressHub {
    state: Arc<RwLock<HubState>>,
    capacity: usize,
    retention: usize,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_limits(capacity, DEFAULT_FINISHED_RETENTION)
    }

    /// Creates a hub with explicit channel capacity and terminal retention
    pub fn with_limits(capacity: usize, retention: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(HubState::default())),
            capacity: capacity.max(1),
            retention,
        }
    }

    /// A receiver that yields `snapshot` and then end-of-stream
    pub fn replay(snapshot: ProgressSnapshot) -> broadcast::Receiver<ProgressSnapshot> {
        let (tx, rx) = broadcast::channel(1);
        // rx is alive, so the send cannot fail
        let _ = tx.send(snapshot);
        rx
    }

    /// Subscribes to a job's snapshots
    ///
    /// Subscribing to a recently finished job yields its terminal snapshot
    /// followed by end-of-stream. A receiver that falls more than the
    /// channel capacity behind gets `RecvError::Lagged` and skips ahead.
    pub async fn subscribe(&self, job_id: i64) -> broadcast::Receiver<ProgressSnapshot> {
        let mut state = self.state.write().await;

        if let Some(last) = state.finished.get(&job_id) {
            return Self::replay(last.clone());
        }

        state.prune_idle();
        let capacity = self.capacity;
        state
            .channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe()
    }

    /// Sends a snapshot to the job's current subscribers
    ///
    /// No-op when nobody is listening.
    pub async fn publish(&self, snapshot: ProgressSnapshot) {
        let state = self.state.read().await;
        if let Some(tx) = state.channels.get(&snapshot.job_id) {
            // Err only means there are no receivers right now
            let _ = tx.send(snapshot);
        }
    }

    /// Publishes the terminal snapshot and closes the job's channel
    pub async fn finish(&self, snapshot: ProgressSnapshot) {
        let mut state = self.state.write().await;

        if let Some(tx) = state.channels.remove(&snapshot.job_id) {
            let _ = tx.send(snapshot.clone());
        }
        state.remember(snapshot, self.retention);
    }

    #[cfg(test)]
    async fn subscriber_count(&self, job_id: i64) -> usize {
        let state = self.state.read().await;
        state
            .channels
            .get(&job_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}
