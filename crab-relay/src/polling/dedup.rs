//! Processed-order cache
//!
//! Bounded, insertion-ordered set of order ids that have already been acted
//! on in this process. Once capacity is exceeded the oldest id is evicted.
//! Not persisted: after a restart the first-poll recency window stands in
//! for it.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_CAPACITY: usize = 500;
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Default)]
struct Inner {
    /// id → time it was marked seen
    seen: HashMap<String, Instant>,
    /// Insertion order, oldest first
    order: VecDeque<String>,
}

impl Inner {
    fn remove(&mut self, id: &str) -> bool {
        if self.seen.remove(id).is_some() {
            self.order.retain(|x| x != id);
            true
        } else {
            false
        }
    }
}

/// Deduplicator over order ids
#[derive(Debug)]
pub struct Deduplicator {
    inner: Mutex<Inner>,
    capacity: AtomicUsize,
    ttl: Duration,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Deduplicator {
    pub fn new(capacity: usize) -> Self {
        Self::with_ttl(capacity, DEFAULT_TTL)
    }

    pub fn with_ttl(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: AtomicUsize::new(capacity.max(1)),
            ttl,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::SeqCst)
    }

    /// Change the capacity, evicting the oldest ids if it shrank
    pub fn set_capacity(&self, capacity: usize) {
        let capacity = capacity.max(1);
        let mut inner = self.inner.lock();
        self.capacity.store(capacity, Ordering::SeqCst);
        Self::trim_locked(&mut inner, capacity);
    }

    pub fn is_new(&self, id: &str) -> bool {
        !self.inner.lock().seen.contains_key(id)
    }

    pub fn mark_seen(&self, id: &str) {
        let mut inner = self.inner.lock();
        self.insert_locked(&mut inner, id);
    }

    /// Atomically check and mark; `true` if `id` had not been seen
    pub fn check_and_mark(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.seen.contains_key(id) {
            return false;
        }
        self.insert_locked(&mut inner, id);
        true
    }

    fn insert_locked(&self, inner: &mut Inner, id: &str) {
        if inner.seen.insert(id.to_string(), Instant::now()).is_some() {
            return;
        }
        inner.order.push_back(id.to_string());
        Self::trim_locked(inner, self.capacity());
    }

    fn trim_locked(inner: &mut Inner, capacity: usize) {
        while inner.order.len() > capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
                tracing::trace!(order_id = %oldest, "Evicted from processed cache");
            }
        }
    }

    /// Forget an id so a later cycle reconsiders it
    pub fn release(&self, id: &str) -> bool {
        self.inner.lock().remove(id)
    }

    /// Drop entries older than the TTL, returns how many were removed
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let mut removed = 0;
        while let Some(oldest) = inner.order.front() {
            let expired = inner
                .seen
                .get(oldest)
                .is_none_or(|seen| now.duration_since(*seen) >= self.ttl);
            if !expired {
                break;
            }
            if let Some(id) = inner.order.pop_front() {
                inner.seen.remove(&id);
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.seen.clear();
        inner.order.clear();
    }

    /// Ids in insertion order, oldest first
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.lock().order.iter().cloned().collect()
    }
}
