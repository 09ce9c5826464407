//! Store observer trait and the multicast list stores notify through.

use std::sync::Arc;

use parking_lot::RwLock;

/// Observer for messages entering and leaving a [`MessageStore`](super::MessageStore).
///
/// Used as `Arc<dyn MessageStoreObserver>`.
pub trait MessageStoreObserver: Send + Sync {
    /// Called after a message is accepted by the store.
    fn message_added(&self, message_id: &str);

    /// Called after a message leaves the store (poll, remove, clear).
    fn message_removed(&self, message_id: &str);
}

/// Multicast list of observers. No ordering guarantee between observers.
///
/// Registration and removal may happen while notifications are in flight;
/// each notification works on a snapshot of the list.
#[derive(Default)]
pub struct ObserverList {
    observers: RwLock<Vec<Arc<dyn MessageStoreObserver>>>,
}

impl ObserverList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn MessageStoreObserver>) {
        self.observers.write().push(observer);
    }

    /// Removes `observer` by identity. Returns whether it was registered.
    pub fn unregister(&self, observer: &Arc<dyn MessageStoreObserver>) -> bool {
        let target = Arc::as_ptr(observer).cast::<()>();
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|o| Arc::as_ptr(o).cast::<()>() != target);
        observers.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn MessageStoreObserver>> {
        self.observers.read().clone()
    }
}

impl MessageStoreObserver for ObserverList {
    fn message_added(&self, message_id: &str) {
        for observer in self.snapshot() {
            observer.message_added(message_id);
        }
    }

    fn message_removed(&self, message_id: &str) {
        for observer in self.snapshot() {
            observer.message_removed(message_id);
        }
    }
}
