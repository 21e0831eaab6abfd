//! Work queue of objects awaiting reconciliation.
//!
//! Keys are de-duplicated while pending: enqueuing a key that is already
//! waiting is a no-op, so a burst of notifications for the same operator
//! collapses into one reconcile. Order is first-enqueued, first-drained.
//!
//! This is an in-memory queue. Nothing is lost by a restart because every
//! reconcile re-derives its work from the store.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use natsauth_core::ObjectKey;

/// Thread-safe, de-duplicating queue of object keys.
///
/// Clones share the same underlying queue.
#[derive(Debug, Clone, Default)]
pub struct WorkQueue {
    inner: Arc<Mutex<QueueInner>>,
}

#[derive(Debug, Default)]
struct QueueInner {
    order: VecDeque<ObjectKey>,
    pending: HashSet<ObjectKey>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key. Returns `false` if it was already pending.
    pub fn enqueue(&self, key: ObjectKey) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.pending.insert(key.clone()) {
            return false;
        }
        inner.order.push_back(key);
        true
    }

    /// Take every pending key, in enqueue order.
    pub fn drain(&self) -> Vec<ObjectKey> {
        let mut inner = self.inner.lock().unwrap();
        inner.pending.clear();
        inner.order.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().order.len()
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.inner.lock().unwrap().pending.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_dedup_and_drain() {
        let queue = WorkQueue::new();

        assert!(queue.enqueue(ObjectKey::operator("root")));
        assert!(queue.enqueue(ObjectKey::account("prod")));
        assert!(!queue.enqueue(ObjectKey::operator("root")));
        assert_eq!(queue.len(), 2);
        assert!(queue.contains(&ObjectKey::account("prod")));

        let keys = queue.drain();
        assert_eq!(
            keys,
            vec![ObjectKey::operator("root"), ObjectKey::account("prod")]
        );
        assert!(queue.is_empty());

        // Drained keys can be enqueued again
        assert!(queue.enqueue(ObjectKey::operator("root")));
    }

    #[test]
    fn test_clones_share_state() {
        let queue = WorkQueue::new();
        let handle = queue.clone();
        handle.enqueue(ObjectKey::user("svc"));
        assert_eq!(queue.len(), 1);
    }
}
