//! Named lookup tables for sequences, endpoints, and message stores.

use std::sync::Arc;

use conduit_core::{Endpoint, Mediator};
use dashmap::DashMap;

use crate::store::MessageStore;

/// Concurrent name-to-object tables the pipeline resolves references against.
///
/// Entries can be added or replaced while messages are in flight; a lookup
/// returns the entry current at the time of the call.
#[derive(Default)]
pub struct Configuration {
    sequences: DashMap<String, Arc<dyn Mediator>>,
    endpoints: DashMap<String, Arc<dyn Endpoint>>,
    stores: DashMap<String, Arc<dyn MessageStore>>,
}

impl Configuration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- sequences ----------------------------------------------------------

    /// Registers a sequence under `key`, returning the one it replaced.
    pub fn add_sequence(
        &self,
        key: impl Into<String>,
        sequence: Arc<dyn Mediator>,
    ) -> Option<Arc<dyn Mediator>> {
        self.sequences.insert(key.into(), sequence)
    }

    /// Resolves a sequence by key.
    #[must_use]
    pub fn sequence(&self, key: &str) -> Option<Arc<dyn Mediator>> {
        self.sequences.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove_sequence(&self, key: &str) -> Option<Arc<dyn Mediator>> {
        self.sequences.remove(key).map(|(_, sequence)| sequence)
    }

    #[must_use]
    pub fn sequence_keys(&self) -> Vec<String> {
        self.sequences.iter().map(|e| e.key().clone()).collect()
    }

    // -- endpoints ----------------------------------------------------------

    pub fn add_endpoint(
        &self,
        key: impl Into<String>,
        endpoint: Arc<dyn Endpoint>,
    ) -> Option<Arc<dyn Endpoint>> {
        self.endpoints.insert(key.into(), endpoint)
    }

    #[must_use]
    pub fn endpoint(&self, key: &str) -> Option<Arc<dyn Endpoint>> {
        self.endpoints.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove_endpoint(&self, key: &str) -> Option<Arc<dyn Endpoint>> {
        self.endpoints.remove(key).map(|(_, endpoint)| endpoint)
    }

    // -- message stores -----------------------------------------------------

    /// Registers a store under its own name, returning the one it replaced.
    pub fn add_store(&self, store: Arc<dyn MessageStore>) -> Option<Arc<dyn MessageStore>> {
        self.stores.insert(store.name().to_string(), store)
    }

    #[must_use]
    pub fn store(&self, name: &str) -> Option<Arc<dyn MessageStore>> {
        self.stores.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove_store(&self, name: &str) -> Option<Arc<dyn MessageStore>> {
        self.stores.remove(name).map(|(_, store)| store)
    }
}
