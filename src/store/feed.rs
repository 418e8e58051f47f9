//! Change fan-out for store subscribers.
//!
//! Mirrors the snapshot-push model of a hosted document store: every
//! committed mutation publishes the *full current snapshot* of each touched
//! collection, not a delta. Delivery is at-least-once and a slow subscriber
//! may drop intermediate snapshots (broadcast lag); since every event is a
//! complete snapshot, the latest one always wins.

use tokio::sync::broadcast;

use crate::models::{Issue, Repository, Team};

/// A fresh full snapshot of one collection.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Teams(Vec<Team>),
    Issues(Vec<Issue>),
    Repositories(Vec<Repository>),
}

/// Buffered broadcast of [`ChangeEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Publish a snapshot. Having no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}
