//! Dispatching errors to the fault handler on top of a message's stack.

use conduit_core::{Environment, MediationError, Mediator, MessageContext};
use tracing::{error, info, warn};

/// Property holding the [`MediationError::code`] of the dispatched error.
pub const ERROR_CODE: &str = "ERROR_CODE";
/// Property holding the error's display text.
pub const ERROR_MESSAGE: &str = "ERROR_MESSAGE";
/// Property holding the error's full source chain.
pub const ERROR_DETAIL: &str = "ERROR_DETAIL";

/// Display text followed by every cause not already part of it.
fn error_detail(err: &MediationError) -> String {
    let mut detail = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        let text = cause.to_string();
        if !detail.ends_with(&text) {
            detail.push_str(": ");
            detail.push_str(&text);
        }
        source = cause.source();
    }
    detail
}

/// Hands `msg` to the fault handler on top of its fault stack.
///
/// The handler is popped before it runs so a failure inside it is handled
/// by the next scope out. The error is recorded on the message under
/// [`ERROR_CODE`], [`ERROR_MESSAGE`], and [`ERROR_DETAIL`]. With an empty
/// stack the environment's fault sequence runs instead; with neither, the
/// message is dropped (`Ok(false)`).
///
/// # Errors
///
/// Returns whatever the handler itself fails with.
pub async fn dispatch_fault(
    msg: &mut MessageContext,
    env: &dyn Environment,
    err: &MediationError,
) -> Result<bool, MediationError> {
    msg.set_property(ERROR_CODE, err.code());
    msg.set_property(ERROR_MESSAGE, err.to_string());
    msg.set_property(ERROR_DETAIL, error_detail(err));

    if let Some(handler) = msg.fault_stack_mut().pop() {
        info!(
            message_id = %msg.message_id(),
            handler = handler.name().unwrap_or(conduit_core::ANONYMOUS_SEQUENCE),
            code = err.code(),
            "dispatching fault to handler"
        );
        return handler.mediator().mediate(msg, env).await;
    }

    match env.fault_sequence() {
        Some(fault_sequence) => {
            info!(message_id = %msg.message_id(), code = err.code(), "dispatching fault to fault sequence");
            fault_sequence.mediate(msg, env).await
        }
        None => {
            error!(
                message_id = %msg.message_id(),
                error = %err,
                "no fault handler or fault sequence, dropping message"
            );
            Ok(false)
        }
    }
}

/// Runs `mediator` and routes any error through [`dispatch_fault`].
///
/// # Errors
///
/// Returns an error only when fault handling itself fails.
pub async fn mediate_with_fault_handling(
    mediator: &dyn Mediator,
    msg: &mut MessageContext,
    env: &dyn Environment,
) -> Result<bool, MediationError> {
    match mediator.mediate(msg, env).await {
        Ok(proceed) => Ok(proceed),
        Err(err) => {
            warn!(message_id = %msg.message_id(), error = %err, "mediation failed");
            dispatch_fault(msg, env, &err).await
        }
    }
}
