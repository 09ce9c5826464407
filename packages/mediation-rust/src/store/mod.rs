//! Message stores: ordered, addressable holding areas for in-flight messages.
//!
//! - [`MessageStore`]: the contract every store implements
//! - [`MessageStoreObserver`] / [`ObserverList`]: add/remove notifications
//! - [`InMemoryMessageStore`]: FIFO store backed by a locked `VecDeque`

pub mod in_memory;
pub mod observer;

use std::sync::Arc;

use conduit_core::MessageContext;

pub use in_memory::InMemoryMessageStore;
pub use observer::{MessageStoreObserver, ObserverList};

/// An ordered, addressable holding area for in-flight messages.
///
/// The store owns a message between [`offer`](Self::offer) and
/// [`remove`](Self::remove)/[`poll`](Self::poll); reads hand out copies.
/// Each operation is individually atomic, nothing is atomic across calls.
///
/// Indexed iteration (`get(0)`, `get(1)`, ... until `None`) must observe
/// every message present when the scan started, even with concurrent
/// offers. Stores that cannot guarantee this must say so in their docs.
///
/// Used as `Arc<dyn MessageStore>`.
pub trait MessageStore: Send + Sync {
    fn name(&self) -> &str;

    /// Insert a message. Returns `false` if the store rejects it. Never blocks indefinitely.
    fn offer(&self, msg: MessageContext) -> bool;

    /// Remove and return the head under the store's ordering policy.
    fn poll(&self) -> Option<MessageContext>;

    /// Read the head without removing it.
    fn peek(&self) -> Option<MessageContext>;

    /// Positional lookup. Returns `None` once `index` runs past the contents.
    fn get(&self, index: usize) -> Option<MessageContext>;

    /// Keyed lookup by message id.
    fn get_by_id(&self, message_id: &str) -> Option<MessageContext>;

    /// Remove by message id. Absent ids are a no-op.
    fn remove(&self, message_id: &str) -> Option<MessageContext>;

    /// Remove by position. Out-of-range indexes are a no-op.
    fn remove_at(&self, index: usize) -> Option<MessageContext>;

    fn clear(&self);

    /// Current number of messages. Negative means "unknown", not an error.
    fn size(&self) -> i64;

    fn register_observer(&self, observer: Arc<dyn MessageStoreObserver>);

    /// Returns whether the observer was registered.
    fn unregister_observer(&self, observer: &Arc<dyn MessageStoreObserver>) -> bool;
}

/// Number of messages in `store`, counting by indexed scan when the store
/// reports its size as unknown.
#[must_use]
pub fn effective_size(store: &dyn MessageStore) -> usize {
    match usize::try_from(store.size()) {
        Ok(size) => size,
        Err(_) => (0..).take_while(|&index| store.get(index).is_some()).count(),
    }
}
