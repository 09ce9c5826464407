use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::{Environment, MediationError, Mediator, MessageContext};
use tracing::debug;

use crate::store::MessageStore;

/// Offers a copy of the message to a message store and stops mediation.
///
/// The stored copy starts outside any scope, with depth zero and an empty
/// fault stack; handlers belong to the scope that was running when it was
/// stored. The message continues
/// later through whichever processor drains the store.
pub struct StoreMediator {
    store: Arc<dyn MessageStore>,
}

impl StoreMediator {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }
}

impl fmt::Debug for StoreMediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreMediator")
            .field("store", &self.store.name())
            .finish()
    }
}

#[async_trait]
impl Mediator for StoreMediator {
    async fn mediate(
        &self,
        msg: &mut MessageContext,
        _env: &dyn Environment,
    ) -> Result<bool, MediationError> {
        let mut copy = msg.clone();
        copy.reset_scope();

        if !self.store.offer(copy) {
            return Err(MediationError::Step(anyhow::anyhow!(
                "message store {} rejected message {}",
                self.store.name(),
                msg.message_id()
            )));
        }
        debug!(store = %self.store.name(), message_id = %msg.message_id(), "message stored");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use conduit_core::{SpanKind, StatisticsCollector, StatisticsSpan, Value};
    use parking_lot::Mutex;

    use super::*;
    use crate::environment::MediationEnvironment;
    use crate::pipeline::testing::{trace, Outcome, Step};
    use crate::pipeline::SequenceDefinition;
    use crate::store::InMemoryMessageStore;

    #[derive(Default)]
    struct SpanNames {
        spans: Mutex<Vec<(String, SpanKind)>>,
    }

    impl StatisticsCollector for SpanNames {
        fn report_span(&self, span: &StatisticsSpan) {
            self.spans.lock().push((span.name.clone(), span.kind));
        }
    }

    #[tokio::test]
    async fn stores_a_copy_and_stops() {
        let env = MediationEnvironment::builder().build();
        let store = Arc::new(InMemoryMessageStore::new("orders"));
        let log = trace();
        let mut msg = MessageContext::with_id("m-1", Value::from("body"));
        msg.fault_stack_mut()
            .push(None, Step::arc("handler", Outcome::Continue, &log));

        let proceed = StoreMediator::new(store.clone())
            .mediate(&mut msg, &env)
            .await
            .unwrap();

        assert!(!proceed);
        let stored = store.get_by_id("m-1").unwrap();
        assert_eq!(stored.payload(), &Value::from("body"));
        assert!(stored.fault_stack().is_empty());
        assert_eq!(msg.fault_stack().len(), 1, "caller's message is untouched");
    }

    #[tokio::test]
    async fn rejected_offer_is_an_error() {
        let env = MediationEnvironment::builder().build();
        let store = Arc::new(InMemoryMessageStore::with_capacity("orders", 0));
        let mut msg = MessageContext::with_id("m-1", Value::Null);

        let err = StoreMediator::new(store)
            .mediate(&mut msg, &env)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STEP_FAILURE");
    }

    #[tokio::test]
    async fn released_copy_reports_its_parent_scope() {
        let collector = Arc::new(SpanNames::default());
        let env = MediationEnvironment::builder()
            .statistics(Arc::clone(&collector) as Arc<dyn StatisticsCollector>)
            .build();
        let store = Arc::new(InMemoryMessageStore::new("orders"));
        let log = trace();

        let main = SequenceDefinition::named(
            "main",
            vec![Arc::new(StoreMediator::new(store.clone())) as Arc<dyn Mediator>],
        );
        let mut msg = MessageContext::with_id("m-1", Value::Null);
        msg.set_parent_scope("Proxy");
        assert!(!main.mediate(&mut msg, &env).await.unwrap());

        let mut stored = store.poll().unwrap();
        assert_eq!(stored.scope_depth(), 0);

        let deliver = SequenceDefinition::named(
            "deliver",
            vec![Step::arc("send", Outcome::Continue, &log)],
        )
        .with_statistics(true);
        assert!(deliver.mediate(&mut stored, &env).await.unwrap());

        assert_eq!(stored.scope_depth(), 0);
        assert_eq!(
            *collector.spans.lock(),
            vec![
                ("deliver".to_string(), SpanKind::Sequence),
                ("Proxy".to_string(), SpanKind::ParentScope),
            ]
        );
    }
}
