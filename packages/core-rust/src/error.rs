//! Error taxonomy shared by every mediation component.

/// Failures raised while extracting a value from a message.
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    /// The expression did not select anything in the message.
    #[error("expression `{expression}` selected no value")]
    Missing { expression: String },
    /// The selected text is not an integer.
    #[error("value `{text}` is not an integer")]
    NotAnInteger { text: String },
}

/// Errors that abort the current mediation call.
///
/// Dropping a message is not an error: steps report it by returning
/// `Ok(false)`. Only genuinely exceptional conditions travel through here.
#[derive(Debug, thiserror::Error)]
pub enum MediationError {
    /// A sequence reference could not be resolved against the configuration.
    #[error("sequence named {key} cannot be found")]
    SequenceNotFound { key: String },
    #[error(transparent)]
    Expression(#[from] ExpressionError),
    /// An endpoint refused or failed to accept the message.
    #[error("endpoint {endpoint} failed: {source}")]
    Endpoint {
        endpoint: String,
        #[source]
        source: anyhow::Error,
    },
    /// A step failed for a reason of its own.
    #[error("mediation step failed: {0}")]
    Step(#[from] anyhow::Error),
}

impl MediationError {
    /// Short machine-readable code recorded on the message during fault dispatch.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::SequenceNotFound { .. } => "SEQUENCE_NOT_FOUND",
            Self::Expression(_) => "EXPRESSION_FAILURE",
            Self::Endpoint { .. } => "ENDPOINT_FAILURE",
            Self::Step(_) => "STEP_FAILURE",
        }
    }
}
