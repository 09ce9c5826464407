//! Expression evaluators that select text out of a message.
//!
//! The resequencer only needs one thing from an expression: the message's
//! application-level sequence number. [`Expression::extract_sequence_number`]
//! provides that on top of the text each evaluator selects.

use std::fmt;

use regex::Regex;

use crate::error::ExpressionError;
use crate::message::MessageContext;

/// Selects a text value from a message.
pub trait Expression: Send + Sync + fmt::Debug {
    /// Source form of the expression, for diagnostics.
    fn source(&self) -> &str;

    /// Evaluate against `msg`, `None` if nothing was selected.
    fn string_value_of(&self, msg: &MessageContext) -> Option<String>;

    /// Evaluate and parse the selected text as an integer.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::Missing`] when nothing was selected and
    /// [`ExpressionError::NotAnInteger`] when the text does not parse.
    fn extract_sequence_number(&self, msg: &MessageContext) -> Result<i64, ExpressionError> {
        let text = self
            .string_value_of(msg)
            .ok_or_else(|| ExpressionError::Missing {
                expression: self.source().to_string(),
            })?;
        text.trim()
            .parse::<i64>()
            .map_err(|_| ExpressionError::NotAnInteger { text })
    }
}

/// Reads a message property.
#[derive(Debug, Clone)]
pub struct PropertyExpression {
    key: String,
}

impl PropertyExpression {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Expression for PropertyExpression {
    fn source(&self) -> &str {
        &self.key
    }

    fn string_value_of(&self, msg: &MessageContext) -> Option<String> {
        msg.property(&self.key).and_then(crate::types::Value::as_text)
    }
}

/// Walks a slash-separated path into the payload (`/order/seq`).
#[derive(Debug, Clone)]
pub struct PayloadPathExpression {
    path: String,
}

impl PayloadPathExpression {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Expression for PayloadPathExpression {
    fn source(&self) -> &str {
        &self.path
    }

    fn string_value_of(&self, msg: &MessageContext) -> Option<String> {
        msg.payload()
            .lookup(&self.path)
            .and_then(crate::types::Value::as_text)
    }
}

/// Applies a regex to another expression's text and selects the first capture group.
///
/// Without a capture group the whole match is selected.
#[derive(Debug)]
pub struct PatternExpression {
    inner: Box<dyn Expression>,
    pattern: Regex,
    source: String,
}

impl PatternExpression {
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regex.
    pub fn new(inner: Box<dyn Expression>, pattern: &str) -> Result<Self, regex::Error> {
        let source = format!("{} =~ /{pattern}/", inner.source());
        Ok(Self {
            inner,
            pattern: Regex::new(pattern)?,
            source,
        })
    }
}

impl Expression for PatternExpression {
    fn source(&self) -> &str {
        &self.source
    }

    fn string_value_of(&self, msg: &MessageContext) -> Option<String> {
        let text = self.inner.string_value_of(msg)?;
        let captures = self.pattern.captures(&text)?;
        captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::types::Value;

    fn message_with_seq(seq: impl Into<Value>) -> MessageContext {
        let mut msg = MessageContext::with_id("m-1", Value::Null);
        msg.set_property("seq", seq);
        msg
    }

    #[test]
    fn property_expression_parses_integers() {
        let expr = PropertyExpression::new("seq");
        assert_eq!(expr.extract_sequence_number(&message_with_seq(7_i64)).unwrap(), 7);
        assert_eq!(expr.extract_sequence_number(&message_with_seq(" 12 ")).unwrap(), 12);
    }

    #[test]
    fn missing_property_is_missing_error() {
        let expr = PropertyExpression::new("seq");
        let msg = MessageContext::with_id("m-1", Value::Null);
        assert!(matches!(
            expr.extract_sequence_number(&msg),
            Err(ExpressionError::Missing { expression }) if expression == "seq"
        ));
    }

    #[test]
    fn non_integer_text_is_format_error() {
        let expr = PropertyExpression::new("seq");
        assert!(matches!(
            expr.extract_sequence_number(&message_with_seq("twelve")),
            Err(ExpressionError::NotAnInteger { text }) if text == "twelve"
        ));
    }

    #[test]
    fn payload_path_selects_nested_value() {
        let msg = MessageContext::with_id(
            "m-1",
            Value::from(json!({ "header": { "sequence": "41" } })),
        );
        let expr = PayloadPathExpression::new("/header/sequence");
        assert_eq!(expr.extract_sequence_number(&msg).unwrap(), 41);
    }

    #[test]
    fn pattern_selects_capture_group() {
        let expr = PatternExpression::new(
            Box::new(PropertyExpression::new("correlation")),
            r"batch-\d+-(\d+)",
        )
        .unwrap();
        let mut msg = MessageContext::with_id("m-1", Value::Null);
        msg.set_property("correlation", "batch-9-0042");

        assert_eq!(expr.extract_sequence_number(&msg).unwrap(), 42);
        assert_eq!(expr.source(), r"correlation =~ /batch-\d+-(\d+)/");
    }

    #[test]
    fn pattern_without_match_is_missing() {
        let expr =
            PatternExpression::new(Box::new(PropertyExpression::new("correlation")), r"(\d+)")
                .unwrap();
        let mut msg = MessageContext::with_id("m-1", Value::Null);
        msg.set_property("correlation", "none");
        assert!(matches!(
            expr.extract_sequence_number(&msg),
            Err(ExpressionError::Missing { .. })
        ));
    }

    proptest! {
        #[test]
        fn any_integer_property_round_trips(n in any::<i64>()) {
            let expr = PropertyExpression::new("seq");
            prop_assert_eq!(expr.extract_sequence_number(&message_with_seq(n)).unwrap(), n);
        }
    }
}
