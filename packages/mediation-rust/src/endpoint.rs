//! In-process endpoint that hands message copies to a tokio channel.

use async_trait::async_trait;
use conduit_core::{Endpoint, MediationError, MessageContext};
use tokio::sync::mpsc;

/// Sends a copy of every message into a bounded mpsc channel.
///
/// Waits for channel capacity; fails once the receiving side is dropped.
pub struct ChannelEndpoint {
    name: String,
    tx: mpsc::Sender<MessageContext>,
}

impl ChannelEndpoint {
    /// Creates the endpoint and the receiver its messages arrive on.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<MessageContext>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                name: name.into(),
                tx,
            },
            rx,
        )
    }
}

#[async_trait]
impl Endpoint for ChannelEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, msg: &MessageContext) -> Result<(), MediationError> {
        self.tx
            .send(msg.clone())
            .await
            .map_err(|_| MediationError::Endpoint {
                endpoint: self.name.clone(),
                source: anyhow::anyhow!("channel closed"),
            })
    }
}

#[cfg(test)]
mod tests {
    use conduit_core::Value;

    use super::*;

    #[tokio::test]
    async fn delivers_copies_in_order() {
        let (endpoint, mut rx) = ChannelEndpoint::new("out", 8);
        for id in ["a", "b"] {
            endpoint
                .send(&MessageContext::with_id(id, Value::Null))
                .await
                .unwrap();
        }
        assert_eq!(rx.recv().await.unwrap().message_id(), "a");
        assert_eq!(rx.recv().await.unwrap().message_id(), "b");
    }

    #[tokio::test]
    async fn closed_receiver_is_an_endpoint_error() {
        let (endpoint, rx) = ChannelEndpoint::new("out", 1);
        drop(rx);
        let err = endpoint
            .send(&MessageContext::with_id("a", Value::Null))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ENDPOINT_FAILURE");
        assert!(err.to_string().starts_with("endpoint out failed"));
    }
}
