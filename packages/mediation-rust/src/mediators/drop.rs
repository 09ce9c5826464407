use async_trait::async_trait;
use conduit_core::{Environment, MediationError, Mediator, MessageContext};
use tracing::debug;

/// Stops mediation of the current message.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropMediator;

#[async_trait]
impl Mediator for DropMediator {
    async fn mediate(
        &self,
        msg: &mut MessageContext,
        _env: &dyn Environment,
    ) -> Result<bool, MediationError> {
        debug!(message_id = %msg.message_id(), "message dropped");
        Ok(false)
    }
}
