//! Worklist with at-most-once admission per distinct tree shape

use crate::jnts::Jnts;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct QueueState {
    worklist: VecDeque<Jnts>,
    /// Signatures of every network ever admitted; never shrinks, so a shape
    /// that was already popped is still rejected.
    seen: HashSet<String>,
}

/// FIFO worklist that admits each canonical network shape once.
///
/// `try_enqueue` takes `&self`, so expansion workers can share one queue.
/// Membership test and insertion happen under one lock.
#[derive(Debug, Default)]
pub struct UniqueNetworkQueue {
    state: Mutex<QueueState>,
    enqueued: AtomicUsize,
    duplicates: AtomicUsize,
}

impl UniqueNetworkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `jnts` unless an equal network was admitted before.
    ///
    /// Returns whether it was admitted.
    pub fn try_enqueue(&self, jnts: Jnts) -> bool {
        let mut state = self.state.lock();
        if state.seen.contains(jnts.signature()) {
            drop(state);
            self.duplicates.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        state.seen.insert(jnts.signature().to_string());
        state.worklist.push_back(jnts);
        drop(state);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn pop(&self) -> Option<Jnts> {
        self.state.lock().worklist.pop_front()
    }

    /// Take every pending network, oldest first
    pub fn drain(&self) -> Vec<Jnts> {
        self.state.lock().worklist.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().worklist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().worklist.is_empty()
    }

    /// Networks admitted so far
    pub fn enqueued(&self) -> usize {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Networks rejected as duplicates so far
    pub fn duplicates(&self) -> usize {
        self.duplicates.load(Ordering::Relaxed)
    }
}
