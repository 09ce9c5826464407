//! Conduit Core: message context, fault handler stack, and the seams that
//! mediators, endpoints, and expression evaluators plug into.

pub mod error;
pub mod expression;
pub mod fault;
pub mod message;
pub mod traits;
pub mod types;

pub use error::{ExpressionError, MediationError};
pub use expression::{Expression, PatternExpression, PayloadPathExpression, PropertyExpression};
pub use fault::{FaultHandler, FaultStack};
pub use message::MessageContext;
pub use traits::{Endpoint, Environment, Mediator, SpanKind, StatisticsCollector, StatisticsSpan};
pub use types::Value;

/// Name reported for sequences defined without a name.
pub const ANONYMOUS_SEQUENCE: &str = "anonymous";
