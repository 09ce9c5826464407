//! Per-message stack of recovery handlers.
//!
//! Pipeline scopes push a [`FaultHandler`] on entry and pop it on normal
//! exit. Each push returns a token so a scope only ever pops the entry it
//! installed itself, never one left behind by an inner scope.

use std::fmt;
use std::sync::Arc;

use crate::traits::Mediator;

/// A recovery step installed for the duration of a pipeline scope.
#[derive(Clone)]
pub struct FaultHandler {
    token: u64,
    name: Option<String>,
    mediator: Arc<dyn Mediator>,
}

impl FaultHandler {
    /// Token identifying the push that installed this handler.
    #[must_use]
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Name of the sequence wrapped by this handler, if it has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn mediator(&self) -> Arc<dyn Mediator> {
        Arc::clone(&self.mediator)
    }
}

impl fmt::Debug for FaultHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultHandler")
            .field("token", &self.token)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Last-in-first-out list of fault handlers attached to one message.
#[derive(Debug, Clone, Default)]
pub struct FaultStack {
    handlers: Vec<FaultHandler>,
    next_token: u64,
}

impl FaultStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a handler wrapping `mediator`, returning the token for [`pop_if_top`](Self::pop_if_top).
    pub fn push(&mut self, name: Option<String>, mediator: Arc<dyn Mediator>) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        self.handlers.push(FaultHandler {
            token,
            name,
            mediator,
        });
        token
    }

    pub fn pop(&mut self) -> Option<FaultHandler> {
        self.handlers.pop()
    }

    #[must_use]
    pub fn peek(&self) -> Option<&FaultHandler> {
        self.handlers.last()
    }

    /// Pop the top entry only if it is the one installed with `token`.
    ///
    /// Returns whether anything was removed.
    pub fn pop_if_top(&mut self, token: u64) -> bool {
        let Some(top) = self.peek() else {
            return false;
        };
        if top.token != token {
            tracing::debug!(
                token,
                top = top.token,
                handler = ?top.name,
                "fault handler not on top, leaving stack as is"
            );
            return false;
        }
        self.handlers.pop();
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::MediationError;
    use crate::message::MessageContext;
    use crate::traits::Environment;

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

    fn noop() -> Arc<dyn Mediator> {
        Arc::new(Noop)
    }

    #[test]
    fn push_pop_is_lifo() {
        let mut stack = FaultStack::new();
        stack.push(Some("outer".to_string()), noop());
        stack.push(Some("inner".to_string()), noop());

        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop().unwrap().name(), Some("inner"));
        assert_eq!(stack.pop().unwrap().name(), Some("outer"));
        assert!(stack.pop().is_none());
        assert!(stack.is_empty());
    }

    #[test]
    fn pop_if_top_removes_own_entry() {
        let mut stack = FaultStack::new();
        let token = stack.push(None, noop());

        assert!(stack.pop_if_top(token));
        assert!(stack.is_empty());
    }

    #[test]
    fn pop_if_top_leaves_inner_entry_untouched() {
        let mut stack = FaultStack::new();
        let outer = stack.push(Some("outer".to_string()), noop());
        let _inner = stack.push(Some("inner".to_string()), noop());

        assert!(!stack.pop_if_top(outer));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.peek().unwrap().name(), Some("inner"));
    }

    #[test]
    fn pop_if_top_after_inner_scope_replaced_entry() {
        let mut stack = FaultStack::new();
        let token = stack.push(Some("scope".to_string()), noop());
        // An inner scope consumed our handler and installed its own.
        stack.pop();
        stack.push(Some("scope".to_string()), noop());

        assert!(!stack.pop_if_top(token));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn pop_if_top_on_empty_stack_removes_nothing() {
        let mut stack = FaultStack::new();
        assert!(!stack.pop_if_top(0));
        assert!(stack.is_empty());
    }

    #[test]
    fn tokens_are_unique_per_stack() {
        let mut stack = FaultStack::new();
        let a = stack.push(None, noop());
        stack.pop();
        let b = stack.push(None, noop());
        assert_ne!(a, b);
    }
}
