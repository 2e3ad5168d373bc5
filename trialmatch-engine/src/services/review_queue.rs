//! In-memory priority queue of pending review items
//!
//! Four buckets (critical, high, medium, low), each ordered by creation time.
//! One mutex guards all four; callers never hold it across I/O.

use std::collections::VecDeque;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{ReviewItem, ReviewPriority};

#[derive(Debug, Clone)]
struct QueuedItem {
    item: ReviewItem,
    /// Insertion counter, breaks ties between equal `created_at`
    seq: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    buckets: [VecDeque<QueuedItem>; 4],
    next_seq: u64,
}

impl QueueState {
    fn insert(&mut self, item: ReviewItem) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let bucket = &mut self.buckets[item.priority.index()];
        let position = bucket.partition_point(|queued| {
            (queued.item.created_at, queued.seq) <= (item.created_at, seq)
        });
        bucket.insert(position, QueuedItem { item, seq });
    }
}

#[derive(Debug, Default)]
pub struct ReviewQueue {
    state: Mutex<QueueState>,
}

impl ReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pending item at its FIFO position; an item already queued is replaced
    pub async fn enqueue(&self, item: ReviewItem) {
        let mut state = self.state.lock().await;
        for bucket in state.buckets.iter_mut() {
            bucket.retain(|queued| queued.item.id != item.id);
        }
        state.insert(item);
    }

    /// Take an item out of whichever bucket holds it
    pub async fn remove(&self, id: Uuid) -> Option<ReviewItem> {
        let mut state = self.state.lock().await;
        for bucket in state.buckets.iter_mut() {
            if let Some(position) = bucket.iter().position(|queued| queued.item.id == id) {
                return bucket.remove(position).map(|queued| queued.item);
            }
        }
        None
    }

    /// Oldest item of the most urgent non-empty bucket
    #[cfg(test)]
    pub async fn peek_next(&self) -> Option<ReviewItem> {
        let state = self.state.lock().await;
        state
            .buckets
            .iter()
            .find_map(|bucket| bucket.front().map(|queued| queued.item.clone()))
    }

    /// Items in service order, optionally limited to one priority and a filter
    pub async fn snapshot<F>(&self, priority: Option<ReviewPriority>, filter: F) -> Vec<ReviewItem>
    where
        F: Fn(&ReviewItem) -> bool,
    {
        let state = self.state.lock().await;
        ReviewPriority::ALL
            .iter()
            .filter(|p| priority.map_or(true, |wanted| wanted == **p))
            .flat_map(|p| state.buckets[p.index()].iter())
            .map(|queued| &queued.item)
            .filter(|item| filter(item))
            .cloned()
            .collect()
    }

    /// Pending count per priority, critical first
    pub async fn counts(&self) -> [usize; 4] {
        let state = self.state.lock().await;
        [
            state.buckets[0].len(),
            state.buckets[1].len(),
            state.buckets[2].len(),
            state.buckets[3].len(),
        ]
    }

    pub async fn len(&self) -> usize {
        self.counts().await.iter().sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
