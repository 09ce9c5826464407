//! Run-time routing descriptor: where a message goes next.
//!
//! A [`Target`] names a sequence (inline or by key) and/or an endpoint
//! (inline or by key). Dangling references are tolerated here: an optional
//! leg that is missing from the configuration is skipped with a warning.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::{Endpoint, Environment, MediationError, Mediator, MessageContext};
use tracing::{debug, warn};

/// EIP routing descriptor.
///
/// Dispatch order:
/// 1. overwrite the destination address and action if set
/// 2. run the inline sequence, else the referenced sequence
/// 3. with no sequence configured, send to the inline endpoint, else the referenced one
/// 4. with nothing configured, re-inject into the main sequence
///
/// A sequence's continue/stop result becomes the target's result; every
/// other path continues.
#[derive(Default)]
pub struct Target {
    to: Option<String>,
    action: Option<String>,
    sequence: Option<Arc<dyn Mediator>>,
    sequence_ref: Option<String>,
    endpoint: Option<Arc<dyn Endpoint>>,
    endpoint_ref: Option<String>,
    asynchronous: bool,
}

impl Target {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to = Some(address.into());
        self
    }

    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    #[must_use]
    pub fn sequence(mut self, sequence: Arc<dyn Mediator>) -> Self {
        self.sequence = Some(sequence);
        self
    }

    #[must_use]
    pub fn sequence_ref(mut self, key: impl Into<String>) -> Self {
        self.sequence_ref = Some(key.into());
        self
    }

    #[must_use]
    pub fn endpoint(mut self, endpoint: Arc<dyn Endpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    #[must_use]
    pub fn endpoint_ref(mut self, key: impl Into<String>) -> Self {
        self.endpoint_ref = Some(key.into());
        self
    }

    /// Hand sequences a copy of the message on an independent task instead
    /// of running them on the caller. No result from that leg is observable.
    #[must_use]
    pub fn asynchronous(mut self, asynchronous: bool) -> Self {
        self.asynchronous = asynchronous;
        self
    }

    fn has_sequence(&self) -> bool {
        self.sequence.is_some() || self.sequence_ref.is_some()
    }

    fn has_endpoint(&self) -> bool {
        self.endpoint.is_some() || self.endpoint_ref.is_some()
    }

    async fn invoke(
        &self,
        sequence: Arc<dyn Mediator>,
        msg: &mut MessageContext,
        env: &dyn Environment,
    ) -> Result<bool, MediationError> {
        if self.asynchronous {
            env.inject_async(msg.clone(), sequence);
            Ok(true)
        } else {
            sequence.mediate(msg, env).await
        }
    }

    async fn send(
        endpoint: &dyn Endpoint,
        msg: &MessageContext,
    ) -> Result<(), MediationError> {
        debug!(endpoint = %endpoint.name(), message_id = %msg.message_id(), "sending to endpoint");
        endpoint.send(msg).await
    }

    /// Dispatch `msg` to this target.
    ///
    /// # Errors
    ///
    /// Propagates errors from a synchronously invoked sequence or from an
    /// endpoint send. Unresolved references are not errors.
    pub async fn dispatch(
        &self,
        msg: &mut MessageContext,
        env: &dyn Environment,
    ) -> Result<bool, MediationError> {
        if let Some(to) = &self.to {
            msg.set_to(to.clone());
        }
        if let Some(action) = &self.action {
            msg.set_action(action.clone());
        }

        let mut proceed = true;

        if let Some(sequence) = &self.sequence {
            proceed = self.invoke(Arc::clone(sequence), msg, env).await?;
        } else if let Some(key) = &self.sequence_ref {
            match env.sequence(key) {
                Some(sequence) => proceed = self.invoke(sequence, msg, env).await?,
                None => warn!(key = %key, message_id = %msg.message_id(), "target sequence cannot be found, skipping"),
            }
        } else if let Some(endpoint) = &self.endpoint {
            Self::send(endpoint.as_ref(), msg).await?;
        } else if let Some(key) = &self.endpoint_ref {
            match env.endpoint(key) {
                Some(endpoint) => Self::send(endpoint.as_ref(), msg).await?,
                None => warn!(key = %key, message_id = %msg.message_id(), "target endpoint cannot be found, skipping"),
            }
        }

        if !self.has_sequence() && !self.has_endpoint() {
            match env.main_sequence() {
                Some(main) => {
                    debug!(message_id = %msg.message_id(), "no destination, re-injecting into main sequence");
                    self.invoke(main, msg, env).await?;
                }
                None => warn!(message_id = %msg.message_id(), "no destination and no main sequence"),
            }
        }

        Ok(proceed)
    }
}

#[async_trait]
impl Mediator for Target {
    async fn mediate(
        &self,
        msg: &mut MessageContext,
        env: &dyn Environment,
    ) -> Result<bool, MediationError> {
        self.dispatch(msg, env).await
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("to", &self.to)
            .field("action", &self.action)
            .field("sequence", &self.sequence.is_some())
            .field("sequence_ref", &self.sequence_ref)
            .field("endpoint", &self.endpoint.as_ref().map(|e| e.name().to_string()))
            .field("endpoint_ref", &self.endpoint_ref)
            .field("asynchronous", &self.asynchronous)
            .finish()
    }
}
