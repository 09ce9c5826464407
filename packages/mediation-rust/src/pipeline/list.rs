use std::sync::Arc;

use conduit_core::{Environment, MediationError, Mediator, MessageContext};
use tracing::debug;

/// Runs `steps` in order against `msg`.
///
/// Stops and returns `Ok(false)` at the first step that returns `false`;
/// later steps are not invoked. A step error propagates immediately.
///
/// # Errors
///
/// Returns the first error raised by a step.
pub async fn mediate_steps(
    steps: &[Arc<dyn Mediator>],
    msg: &mut MessageContext,
    env: &dyn Environment,
) -> Result<bool, MediationError> {
    for (position, step) in steps.iter().enumerate() {
        if !step.mediate(msg, env).await? {
            debug!(message_id = %msg.message_id(), position, "step stopped mediation");
            return Ok(false);
        }
    }
    Ok(true)
}
