//! Named and anonymous sequences, and references to them.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use conduit_core::{
    Environment, MediationError, Mediator, MessageContext, SpanKind, StatisticsCollector,
    StatisticsSpan, ANONYMOUS_SEQUENCE,
};
use tracing::{debug, error, warn, Instrument};

use super::list::mediate_steps;

// ---------------------------------------------------------------------------
// SequenceDefinition
// ---------------------------------------------------------------------------

/// A sequence that owns its steps.
///
/// Read-only once built; the same definition may run concurrently for
/// independent messages and recursively for the same one.
pub struct SequenceDefinition {
    name: Option<String>,
    steps: Vec<Arc<dyn Mediator>>,
    error_handler: Option<String>,
    statistics_enabled: bool,
}

impl SequenceDefinition {
    #[must_use]
    pub fn anonymous(steps: Vec<Arc<dyn Mediator>>) -> Self {
        Self {
            name: None,
            steps,
            error_handler: None,
            statistics_enabled: false,
        }
    }

    #[must_use]
    pub fn named(name: impl Into<String>, steps: Vec<Arc<dyn Mediator>>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::anonymous(steps)
        }
    }

    /// Install the sequence registered under `key` as this scope's fault handler.
    #[must_use]
    pub fn with_error_handler(mut self, key: impl Into<String>) -> Self {
        self.error_handler = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_statistics(mut self, enabled: bool) -> Self {
        self.statistics_enabled = enabled;
        self
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name used in logs and statistics.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(ANONYMOUS_SEQUENCE)
    }

    #[must_use]
    pub fn error_handler(&self) -> Option<&str> {
        self.error_handler.as_deref()
    }

    #[must_use]
    pub fn steps(&self) -> &[Arc<dyn Mediator>] {
        &self.steps
    }

    fn push_error_handler(&self, msg: &mut MessageContext, env: &dyn Environment) -> Option<u64> {
        let key = self.error_handler.as_deref()?;
        match env.sequence(key) {
            Some(handler) => Some(msg.fault_stack_mut().push(Some(key.to_string()), handler)),
            None => {
                warn!(
                    sequence = %self.display_name(),
                    key = %key,
                    "error handler sequence cannot be found, continuing without one"
                );
                None
            }
        }
    }

    async fn mediate_scoped(
        &self,
        msg: &mut MessageContext,
        env: &dyn Environment,
    ) -> Result<bool, MediationError> {
        let name = self.display_name();
        debug!(sequence = %name, message_id = %msg.message_id(), "entering sequence");

        let collector = if self.statistics_enabled {
            env.statistics()
        } else {
            None
        };
        let start = Instant::now();
        let inbound = !msg.is_response();
        let fault_on_entry = msg.is_fault();
        msg.enter_scope();

        let token = self.push_error_handler(msg, env);
        let result = mediate_steps(&self.steps, msg, env)
            .instrument(tracing::info_span!("sequence", name = %name))
            .await;

        if result.is_ok() {
            if let Some(token) = token {
                msg.fault_stack_mut().pop_if_top(token);
            }
        }

        let remaining = msg.exit_scope();
        if let Some(collector) = collector {
            let fault = fault_on_entry || result.is_err();
            report(collector.as_ref(), name, SpanKind::Sequence, inbound, start, fault);
            if remaining == 0 {
                if let Some(scope) = msg.parent_scope() {
                    report(
                        collector.as_ref(),
                        scope,
                        SpanKind::ParentScope,
                        inbound,
                        msg.received_at(),
                        fault,
                    );
                }
            }
        }

        debug!(sequence = %name, ok = result.is_ok(), "leaving sequence");
        result
    }
}

fn report(
    collector: &dyn StatisticsCollector,
    name: &str,
    kind: SpanKind,
    inbound: bool,
    start: Instant,
    fault: bool,
) {
    collector.report_span(&StatisticsSpan {
        name: name.to_string(),
        kind,
        inbound,
        start,
        end: Instant::now(),
        fault,
    });
}

impl fmt::Debug for SequenceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceDefinition")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .field("error_handler", &self.error_handler)
            .field("statistics_enabled", &self.statistics_enabled)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Sequence
// ---------------------------------------------------------------------------

/// A sequence is either a definition owning its steps or a reference to
/// one registered elsewhere, never both.
#[derive(Debug)]
pub enum Sequence {
    Definition(SequenceDefinition),
    /// Lookup key resolved against the environment on every call.
    Reference(String),
}

impl Sequence {
    #[must_use]
    pub fn reference(key: impl Into<String>) -> Self {
        Self::Reference(key.into())
    }
}

impl From<SequenceDefinition> for Sequence {
    fn from(definition: SequenceDefinition) -> Self {
        Self::Definition(definition)
    }
}

#[async_trait]
impl Mediator for Sequence {
    async fn mediate(
        &self,
        msg: &mut MessageContext,
        env: &dyn Environment,
    ) -> Result<bool, MediationError> {
        match self {
            Self::Definition(definition) => definition.mediate_scoped(msg, env).await,
            Self::Reference(key) => match env.sequence(key) {
                Some(sequence) => sequence.mediate(msg, env).await,
                None => {
                    error!(key = %key, message_id = %msg.message_id(), "sequence cannot be found");
                    Err(MediationError::SequenceNotFound { key: key.clone() })
                }
            },
        }
    }
}

#[async_trait]
impl Mediator for SequenceDefinition {
    async fn mediate(
        &self,
        msg: &mut MessageContext,
        env: &dyn Environment,
    ) -> Result<bool, MediationError> {
        self.mediate_scoped(msg, env).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use conduit_core::Value;
    use parking_lot::Mutex;

    use super::*;
    use crate::environment::MediationEnvironment;
    use crate::pipeline::testing::{trace, Outcome, StackProbe, Step};

    #[derive(Default)]
    struct RecordingCollector {
        spans: Mutex<Vec<(String, SpanKind, bool, bool)>>,
    }

    impl StatisticsCollector for RecordingCollector {
        fn report_span(&self, span: &StatisticsSpan) {
            self.spans
                .lock()
                .push((span.name.clone(), span.kind, span.inbound, span.fault));
        }
    }

    fn msg() -> MessageContext {
        MessageContext::with_id("m-1", Value::Null)
    }

    #[tokio::test]
    async fn stop_prevents_later_steps() {
        let env = MediationEnvironment::builder().build();
        let log = trace();
        let seq = SequenceDefinition::named(
            "main",
            vec![
                Step::arc("s1", Outcome::Continue, &log),
                Step::arc("s2", Outcome::Stop, &log),
                Step::arc("s3", Outcome::Continue, &log),
            ],
        );

        assert!(!seq.mediate(&mut msg(), &env).await.unwrap());
        assert_eq!(*log.lock(), vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn reference_delegates_to_resolved_sequence() {
        let env = MediationEnvironment::builder().build();
        let log = trace();
        env.configuration().add_sequence(
            "billing",
            Arc::new(SequenceDefinition::named(
                "billing",
                vec![Step::arc("bill", Outcome::Stop, &log)],
            )),
        );

        let seq = Sequence::reference("billing");
        assert!(!seq.mediate(&mut msg(), &env).await.unwrap());
        assert_eq!(*log.lock(), vec!["bill"]);
    }

    #[tokio::test]
    async fn unresolved_reference_is_fatal() {
        let env = MediationEnvironment::builder().build();
        let err = Sequence::reference("missing")
            .mediate(&mut msg(), &env)
            .await
            .unwrap_err();
        assert!(matches!(err, MediationError::SequenceNotFound { key } if key == "missing"));
    }

    #[tokio::test]
    async fn error_handler_is_pushed_for_scope_and_popped_on_return() {
        let env = MediationEnvironment::builder().build();
        let log = trace();
        env.configuration()
            .add_sequence("onError", Step::arc("handler", Outcome::Continue, &log));
        let depths = Arc::new(Mutex::new(Vec::new()));
        let seq = SequenceDefinition::named(
            "main",
            vec![Arc::new(StackProbe {
                depths: Arc::clone(&depths),
            })],
        )
        .with_error_handler("onError");

        let mut m = msg();
        assert!(seq.mediate(&mut m, &env).await.unwrap());

        assert_eq!(*depths.lock(), vec![1]);
        assert!(m.fault_stack().is_empty());
        assert!(log.lock().is_empty(), "handler is installed, not run");
    }

    #[tokio::test]
    async fn handler_is_popped_after_a_stop_too() {
        let env = MediationEnvironment::builder().build();
        let log = trace();
        env.configuration()
            .add_sequence("onError", Step::arc("handler", Outcome::Continue, &log));
        let seq = SequenceDefinition::anonymous(vec![Step::arc("drop", Outcome::Stop, &log)])
            .with_error_handler("onError");

        let mut m = msg();
        assert!(!seq.mediate(&mut m, &env).await.unwrap());
        assert!(m.fault_stack().is_empty());
    }

    #[tokio::test]
    async fn handler_stays_installed_when_a_step_fails() {
        let env = MediationEnvironment::builder().build();
        let log = trace();
        env.configuration()
            .add_sequence("onError", Step::arc("handler", Outcome::Continue, &log));
        let seq = SequenceDefinition::named("main", vec![Step::arc("boom", Outcome::Fail, &log)])
            .with_error_handler("onError");

        let mut m = msg();
        assert!(seq.mediate(&mut m, &env).await.is_err());
        assert_eq!(m.fault_stack().len(), 1);
        assert_eq!(m.fault_stack().peek().unwrap().name(), Some("onError"));
    }

    /// Pushes a handler of its own and leaves it on the stack.
    struct LeaveHandler;

    #[async_trait]
    impl Mediator for LeaveHandler {
        async fn mediate(
            &self,
            msg: &mut MessageContext,
            env: &dyn Environment,
        ) -> Result<bool, MediationError> {
            let handler = env.sequence("inner").ok_or(MediationError::SequenceNotFound {
                key: "inner".to_string(),
            })?;
            msg.fault_stack_mut().push(Some("inner".to_string()), handler);
            Ok(true)
        }
    }

    #[tokio::test]
    async fn never_pops_an_entry_installed_by_an_inner_scope() {
        let env = MediationEnvironment::builder().build();
        let log = trace();
        env.configuration()
            .add_sequence("outer", Step::arc("outer", Outcome::Continue, &log));
        env.configuration()
            .add_sequence("inner", Step::arc("inner", Outcome::Continue, &log));
        let seq = SequenceDefinition::named("main", vec![Arc::new(LeaveHandler)])
            .with_error_handler("outer");

        let mut m = msg();
        assert!(seq.mediate(&mut m, &env).await.unwrap());

        assert_eq!(m.fault_stack().len(), 2);
        assert_eq!(m.fault_stack().peek().unwrap().name(), Some("inner"));
    }

    #[tokio::test]
    async fn unresolved_error_handler_is_not_fatal() {
        let env = MediationEnvironment::builder().build();
        let log = trace();
        let seq = SequenceDefinition::named("main", vec![Step::arc("s1", Outcome::Continue, &log)])
            .with_error_handler("missing");

        let mut m = msg();
        assert!(seq.mediate(&mut m, &env).await.unwrap());
        assert_eq!(*log.lock(), vec!["s1"]);
        assert!(m.fault_stack().is_empty());
    }

    #[tokio::test]
    async fn statistics_report_sequence_and_outermost_parent_scope() {
        let collector = Arc::new(RecordingCollector::default());
        let env = MediationEnvironment::builder()
            .statistics(Arc::clone(&collector) as Arc<dyn StatisticsCollector>)
            .build();
        let log = trace();
        env.configuration().add_sequence(
            "inner",
            Arc::new(
                SequenceDefinition::named("inner", vec![Step::arc("s", Outcome::Continue, &log)])
                    .with_statistics(true),
            ),
        );
        let outer = SequenceDefinition::anonymous(vec![Arc::new(Sequence::reference("inner"))])
            .with_statistics(true);

        let mut m = msg();
        m.set_parent_scope("StockQuoteProxy");
        assert!(outer.mediate(&mut m, &env).await.unwrap());

        assert_eq!(
            *collector.spans.lock(),
            vec![
                ("inner".to_string(), SpanKind::Sequence, true, false),
                ("anonymous".to_string(), SpanKind::Sequence, true, false),
                ("StockQuoteProxy".to_string(), SpanKind::ParentScope, true, false),
            ]
        );
        assert_eq!(m.scope_depth(), 0);
    }

    #[tokio::test]
    async fn failed_scope_is_reported_as_fault() {
        let collector = Arc::new(RecordingCollector::default());
        let env = MediationEnvironment::builder()
            .statistics(Arc::clone(&collector) as Arc<dyn StatisticsCollector>)
            .build();
        let log = trace();
        let seq = SequenceDefinition::named("out", vec![Step::arc("boom", Outcome::Fail, &log)])
            .with_statistics(true);

        let mut m = msg();
        m.set_response(true);
        assert!(seq.mediate(&mut m, &env).await.is_err());

        assert_eq!(
            *collector.spans.lock(),
            vec![("out".to_string(), SpanKind::Sequence, false, true)]
        );
        assert_eq!(m.scope_depth(), 0, "scope closes on error");
    }

    #[tokio::test]
    async fn statistics_disabled_reports_nothing() {
        let collector = Arc::new(RecordingCollector::default());
        let env = MediationEnvironment::builder()
            .statistics(Arc::clone(&collector) as Arc<dyn StatisticsCollector>)
            .build();
        let log = trace();
        let seq = SequenceDefinition::named("quiet", vec![Step::arc("s", Outcome::Continue, &log)]);

        seq.mediate(&mut msg(), &env).await.unwrap();
        assert!(collector.spans.lock().is_empty());
    }

    #[test]
    fn display_name_falls_back_to_anonymous() {
        assert_eq!(SequenceDefinition::anonymous(Vec::new()).display_name(), "anonymous");
        assert_eq!(SequenceDefinition::named("main", Vec::new()).display_name(), "main");
    }
}
