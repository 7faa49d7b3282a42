//! Pending-request queue: priority order with per-id dedup.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::oneshot;

use crate::error::Result;

/// Sort key: higher priority first, then earlier enqueue first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueKey {
    pub priority: i32,
    pub sequence: u64,
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub(crate) struct QueueItem<D, O> {
    pub id: String,
    pub descriptor: D,
    pub priority: i32,
    pub sequence: u64,
    pub settle: oneshot::Sender<Result<O>>,
}

/// Queued (not yet dispatched) items plus the in-flight count.
///
/// Holds at most one item per id.
pub(crate) struct PendingQueue<D, O> {
    items: BTreeMap<QueueKey, QueueItem<D, O>>,
    by_id: HashMap<String, QueueKey>,
    next_sequence: u64,
    pub active: usize,
    pub stopped: bool,
}

impl<D, O> PendingQueue<D, O> {
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
            by_id: HashMap::new(),
            next_sequence: 0,
            active: 0,
            stopped: false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert a new item, returning the queued item it replaces (same id), if any.
    pub fn push(
        &mut self,
        id: String,
        descriptor: D,
        priority: i32,
        settle: oneshot::Sender<Result<O>>,
    ) -> Option<QueueItem<D, O>> {
        let replaced = self.remove(&id);

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let key = QueueKey { priority, sequence };

        self.by_id.insert(id.clone(), key);
        self.items.insert(
            key,
            QueueItem {
                id,
                descriptor,
                priority,
                sequence,
                settle,
            },
        );
        replaced
    }

    /// Pop the head if a concurrency slot is free, claiming the slot.
    pub fn pop_ready(&mut self, concurrency_limit: usize) -> Option<QueueItem<D, O>> {
        if self.active >= concurrency_limit {
            return None;
        }
        let (_, item) = self.items.pop_first()?;
        self.by_id.remove(&item.id);
        self.active += 1;
        Some(item)
    }

    pub fn remove(&mut self, id: &str) -> Option<QueueItem<D, O>> {
        let key = self.by_id.remove(id)?;
        self.items.remove(&key)
    }

    /// Take every queued item, in dispatch order.
    pub fn drain(&mut self) -> Vec<QueueItem<D, O>> {
        self.by_id.clear();
        std::mem::take(&mut self.items).into_values().collect()
    }

    /// Queued ids in dispatch order.
    #[cfg(test)]
    pub fn ids(&self) -> Vec<String> {
        self.items.values().map(|item| item.id.clone()).collect()
    }
}
