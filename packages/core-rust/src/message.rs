//! The in-flight message envelope.

use std::collections::HashMap;
use std::time::Instant;

use crate::fault::FaultStack;
use crate::types::Value;

/// An in-flight message owned by the caller for the duration of mediation.
///
/// Carries a unique identifier, a mutable property bag, a payload, the
/// request/response flag, addressing fields that routing steps overwrite,
/// and the message's [`FaultStack`].
#[derive(Debug, Clone)]
pub struct MessageContext {
    message_id: String,
    properties: HashMap<String, Value>,
    payload: Value,
    response: bool,
    fault: bool,
    to: Option<String>,
    action: Option<String>,
    parent_scope: Option<String>,
    received_at: Instant,
    scope_depth: usize,
    fault_stack: FaultStack,
}

impl MessageContext {
    /// Creates a request message with a freshly generated identifier.
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self::with_id(format!("urn:uuid:{}", uuid::Uuid::new_v4()), payload)
    }

    /// Creates a request message with an explicit identifier.
    #[must_use]
    pub fn with_id(message_id: impl Into<String>, payload: Value) -> Self {
        Self {
            message_id: message_id.into(),
            properties: HashMap::new(),
            payload,
            response: false,
            fault: false,
            to: None,
            action: None,
            parent_scope: None,
            received_at: Instant::now(),
            scope_depth: 0,
            fault_stack: FaultStack::new(),
        }
    }

    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Sets a property, returning the previous value.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.properties.insert(key.into(), value.into())
    }

    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        self.properties.remove(key)
    }

    #[must_use]
    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }

    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: Value) {
        self.payload = payload;
    }

    /// `true` for the response (out) flow.
    #[must_use]
    pub fn is_response(&self) -> bool {
        self.response
    }

    pub fn set_response(&mut self, response: bool) {
        self.response = response;
    }

    /// `true` once the payload carries a fault.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.fault
    }

    pub fn set_fault(&mut self, fault: bool) {
        self.fault = fault;
    }

    /// Destination address.
    #[must_use]
    pub fn to(&self) -> Option<&str> {
        self.to.as_deref()
    }

    pub fn set_to(&mut self, to: impl Into<String>) {
        self.to = Some(to.into());
    }

    #[must_use]
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn set_action(&mut self, action: impl Into<String>) {
        self.action = Some(action.into());
    }

    /// Name of the enclosing scope (proxy, request) the message entered through.
    #[must_use]
    pub fn parent_scope(&self) -> Option<&str> {
        self.parent_scope.as_deref()
    }

    pub fn set_parent_scope(&mut self, scope: impl Into<String>) {
        self.parent_scope = Some(scope.into());
    }

    #[must_use]
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Number of sequence definitions currently executing against this message.
    #[must_use]
    pub fn scope_depth(&self) -> usize {
        self.scope_depth
    }

    /// Enter a nested sequence scope, returning the new depth.
    pub fn enter_scope(&mut self) -> usize {
        self.scope_depth += 1;
        self.scope_depth
    }

    /// Leave a sequence scope, returning the remaining depth.
    pub fn exit_scope(&mut self) -> usize {
        self.scope_depth = self.scope_depth.saturating_sub(1);
        self.scope_depth
    }

    /// Detach the message from every running scope: depth back to zero and
    /// an empty fault stack. Used for copies that resume mediation later.
    pub fn reset_scope(&mut self) {
        self.scope_depth = 0;
        self.fault_stack = FaultStack::new();
    }

    #[must_use]
    pub fn fault_stack(&self) -> &FaultStack {
        &self.fault_stack
    }

    pub fn fault_stack_mut(&mut self) -> &mut FaultStack {
        &mut self.fault_stack
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::error::MediationError;
    use crate::traits::{Environment, Mediator};

    struct Noop;

    #[async_trait]
    impl Mediator for Noop {
        async fn mediate(
            &self,
            _msg: &mut MessageContext,
            _env: &dyn Environment,
        ) -> Result<bool, MediationError> {
            Ok(true)
        }
    }

    #[test]
    fn new_messages_get_distinct_ids() {
        let a = MessageContext::new(Value::Null);
        let b = MessageContext::new(Value::Null);
        assert_ne!(a.message_id(), b.message_id());
        assert!(a.message_id().starts_with("urn:uuid:"));
    }

    #[test]
    fn properties_round_trip() {
        let mut msg = MessageContext::with_id("m-1", Value::Null);
        assert!(msg.set_property("seq", 3_i64).is_none());
        assert_eq!(msg.set_property("seq", 4_i64), Some(Value::Int(3)));
        assert_eq!(msg.property("seq"), Some(&Value::Int(4)));
        assert_eq!(msg.remove_property("seq"), Some(Value::Int(4)));
        assert!(msg.property("seq").is_none());
    }

    #[test]
    fn defaults_describe_a_fresh_request() {
        let msg = MessageContext::with_id("m-1", Value::from("body"));
        assert!(!msg.is_response());
        assert!(!msg.is_fault());
        assert!(msg.to().is_none());
        assert!(msg.action().is_none());
        assert!(msg.parent_scope().is_none());
        assert!(msg.fault_stack().is_empty());
        assert_eq!(msg.payload(), &Value::from("body"));
    }

    #[test]
    fn scope_depth_tracks_nesting() {
        let mut msg = MessageContext::with_id("m-1", Value::Null);
        assert_eq!(msg.enter_scope(), 1);
        assert_eq!(msg.enter_scope(), 2);
        assert_eq!(msg.exit_scope(), 1);
        assert_eq!(msg.exit_scope(), 0);
        assert_eq!(msg.exit_scope(), 0, "unbalanced exit saturates");
    }

    #[test]
    fn reset_scope_clears_depth_and_handlers() {
        let mut msg = MessageContext::with_id("m-1", Value::Null);
        msg.enter_scope();
        msg.enter_scope();
        msg.fault_stack_mut().push(Some("onError".into()), Arc::new(Noop));
        msg.reset_scope();
        assert_eq!(msg.scope_depth(), 0);
        assert!(msg.fault_stack().is_empty());
    }

    #[test]
    fn addressing_fields_are_overwritten() {
        let mut msg = MessageContext::with_id("m-1", Value::Null);
        msg.set_to("http://a");
        msg.set_to("http://b");
        msg.set_action("urn:getQuote");
        assert_eq!(msg.to(), Some("http://b"));
        assert_eq!(msg.action(), Some("urn:getQuote"));
    }
}
