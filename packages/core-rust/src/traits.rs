use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::MediationError;
use crate::message::MessageContext;

/// A unit of message processing.
///
/// Returns `Ok(true)` to let mediation continue and `Ok(false)` to stop it
/// (drop semantics). `Err` is reserved for conditions that abort the call.
/// Implementations are shared read-only between concurrent messages.
#[async_trait]
pub trait Mediator: Send + Sync {
    /// Process `msg` within `env`.
    async fn mediate(
        &self,
        msg: &mut MessageContext,
        env: &dyn Environment,
    ) -> Result<bool, MediationError>;
}

/// A place a message can be sent. Fire-and-forget from the caller's view.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Name used for logging and configuration lookups.
    fn name(&self) -> &str;

    /// Hand the message to the endpoint.
    async fn send(&self, msg: &MessageContext) -> Result<(), MediationError>;
}

/// The hosting context every mediator runs in.
///
/// Resolves named sequences and endpoints, exposes the main and fault entry
/// points, the optional statistics collector, and asynchronous injection.
pub trait Environment: Send + Sync {
    /// Resolve a named sequence.
    fn sequence(&self, key: &str) -> Option<Arc<dyn Mediator>>;

    /// Resolve a named endpoint.
    fn endpoint(&self, key: &str) -> Option<Arc<dyn Endpoint>>;

    /// The main pipeline entry point.
    fn main_sequence(&self) -> Option<Arc<dyn Mediator>>;

    /// The fallback fault sequence, used when a message has no fault handler.
    fn fault_sequence(&self) -> Option<Arc<dyn Mediator>>;

    /// Statistics sink, if statistics collection is configured.
    fn statistics(&self) -> Option<Arc<dyn StatisticsCollector>>;

    /// Run `sequence` against `msg` on an independent worker and return immediately.
    fn inject_async(&self, msg: MessageContext, sequence: Arc<dyn Mediator>);
}

/// Which scope a statistics span covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    /// A sequence definition's execution.
    Sequence,
    /// The enclosing scope (proxy, request) the message entered through.
    ParentScope,
}

impl SpanKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequence => "sequence",
            Self::ParentScope => "parent_scope",
        }
    }
}

/// One timed scope reported to a [`StatisticsCollector`].
#[derive(Debug, Clone)]
pub struct StatisticsSpan {
    pub name: String,
    pub kind: SpanKind,
    /// `true` for request (in) flow, `false` for response (out) flow.
    pub inbound: bool,
    pub start: Instant,
    pub end: Instant,
    pub fault: bool,
}

impl StatisticsSpan {
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }
}

/// Sink for sequence and parent-scope timing statistics.
pub trait StatisticsCollector: Send + Sync {
    fn report_span(&self, span: &StatisticsSpan);
}
