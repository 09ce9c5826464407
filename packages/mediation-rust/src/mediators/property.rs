use async_trait::async_trait;
use conduit_core::{Environment, Expression, MediationError, Mediator, MessageContext, Value};
use tracing::debug;

/// What a [`PropertyMediator`] does to its property.
#[derive(Debug)]
pub enum PropertyAction {
    /// Set a literal value.
    Set(Value),
    /// Set the text an expression selects; a missing selection removes the property.
    Evaluate(Box<dyn Expression>),
    Remove,
}

/// Sets or removes one message property and continues.
#[derive(Debug)]
pub struct PropertyMediator {
    name: String,
    action: PropertyAction,
}

impl PropertyMediator {
    #[must_use]
    pub fn new(name: impl Into<String>, action: PropertyAction) -> Self {
        Self {
            name: name.into(),
            action,
        }
    }
}

#[async_trait]
impl Mediator for PropertyMediator {
    async fn mediate(
        &self,
        msg: &mut MessageContext,
        _env: &dyn Environment,
    ) -> Result<bool, MediationError> {
        match &self.action {
            PropertyAction::Set(value) => {
                msg.set_property(self.name.clone(), value.clone());
            }
            PropertyAction::Evaluate(expression) => match expression.string_value_of(msg) {
                Some(text) => {
                    msg.set_property(self.name.clone(), text);
                }
                None => {
                    debug!(property = %self.name, expression = expression.source(), "expression selected nothing");
                    msg.remove_property(&self.name);
                }
            },
            PropertyAction::Remove => {
                msg.remove_property(&self.name);
            }
        }
        Ok(true)
    }
}
