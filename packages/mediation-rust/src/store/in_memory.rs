//! In-memory FIFO [`MessageStore`] backed by a locked `VecDeque`.
//!
//! Offers append at the back and only removals shift positions, so an
//! indexed scan sees every message that was present when it started even
//! while producers keep offering.

use std::collections::VecDeque;
use std::sync::Arc;

use conduit_core::MessageContext;
use parking_lot::Mutex;
use tracing::debug;

use super::observer::{MessageStoreObserver, ObserverList};
use super::MessageStore;

struct StoredMessage {
    insertion_index: u64,
    message: MessageContext,
}

#[derive(Default)]
struct Entries {
    queue: VecDeque<StoredMessage>,
    next_insertion_index: u64,
}

impl Entries {
    fn position(&self, message_id: &str) -> Option<usize> {
        self.queue
            .iter()
            .position(|entry| entry.message.message_id() == message_id)
    }
}

/// FIFO message store held entirely in memory.
///
/// Rejects offers once `capacity` is reached and rejects duplicate message
/// ids. Observers are notified after the internal lock is released.
pub struct InMemoryMessageStore {
    name: String,
    capacity: Option<usize>,
    entries: Mutex<Entries>,
    observers: ObserverList,
}

impl InMemoryMessageStore {
    /// Creates an unbounded store.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: None,
            entries: Mutex::new(Entries::default()),
            observers: ObserverList::new(),
        }
    }

    /// Creates a store that rejects offers beyond `capacity` messages.
    #[must_use]
    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new(name)
        }
    }

    /// Monotonic insertion index assigned to a stored message.
    #[must_use]
    pub fn insertion_index(&self, message_id: &str) -> Option<u64> {
        let entries = self.entries.lock();
        entries
            .position(message_id)
            .map(|pos| entries.queue[pos].insertion_index)
    }

    fn removed(&self, entry: Option<StoredMessage>) -> Option<MessageContext> {
        let entry = entry?;
        self.observers.message_removed(entry.message.message_id());
        Some(entry.message)
    }
}

impl MessageStore for InMemoryMessageStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn offer(&self, msg: MessageContext) -> bool {
        let message_id = msg.message_id().to_string();
        {
            let mut entries = self.entries.lock();
            if self.capacity.is_some_and(|cap| entries.queue.len() >= cap) {
                debug!(store = %self.name, message_id = %message_id, "store full, offer rejected");
                return false;
            }
            if entries.position(&message_id).is_some() {
                debug!(store = %self.name, message_id = %message_id, "duplicate message id, offer rejected");
                return false;
            }
            let insertion_index = entries.next_insertion_index;
            entries.next_insertion_index += 1;
            entries.queue.push_back(StoredMessage {
                insertion_index,
                message: msg,
            });
        }
        self.observers.message_added(&message_id);
        true
    }

    fn poll(&self) -> Option<MessageContext> {
        let entry = self.entries.lock().queue.pop_front();
        self.removed(entry)
    }

    fn peek(&self) -> Option<MessageContext> {
        self.entries
            .lock()
            .queue
            .front()
            .map(|entry| entry.message.clone())
    }

    fn get(&self, index: usize) -> Option<MessageContext> {
        self.entries
            .lock()
            .queue
            .get(index)
            .map(|entry| entry.message.clone())
    }

    fn get_by_id(&self, message_id: &str) -> Option<MessageContext> {
        let entries = self.entries.lock();
        entries
            .position(message_id)
            .map(|pos| entries.queue[pos].message.clone())
    }

    fn remove(&self, message_id: &str) -> Option<MessageContext> {
        let entry = {
            let mut entries = self.entries.lock();
            entries
                .position(message_id)
                .and_then(|pos| entries.queue.remove(pos))
        };
        self.removed(entry)
    }

    fn remove_at(&self, index: usize) -> Option<MessageContext> {
        let entry = self.entries.lock().queue.remove(index);
        self.removed(entry)
    }

    fn clear(&self) {
        let drained: Vec<StoredMessage> = self.entries.lock().queue.drain(..).collect();
        for entry in drained {
            self.observers.message_removed(entry.message.message_id());
        }
    }

    fn size(&self) -> i64 {
        i64::try_from(self.entries.lock().queue.len()).unwrap_or(i64::MAX)
    }

    fn register_observer(&self, observer: Arc<dyn MessageStoreObserver>) {
        self.observers.register(observer);
    }

    fn unregister_observer(&self, observer: &Arc<dyn MessageStoreObserver>) -> bool {
        self.observers.unregister(observer)
    }
}
