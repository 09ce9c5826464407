use std::fmt::Write as _;
use std::str::FromStr;

use async_trait::async_trait;
use conduit_core::{Environment, MediationError, Mediator, MessageContext};
use tracing::{debug, error, info, trace, warn};

/// Level a [`LogMediator`] emits at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(()),
        }
    }
}

/// Logs a line about the message and continues.
#[derive(Debug, Clone, Default)]
pub struct LogMediator {
    level: LogLevel,
    text: Option<String>,
    properties: Vec<String>,
}

impl LogMediator {
    #[must_use]
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Fixed text included in every line.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Message properties to include, as `key=value`.
    #[must_use]
    pub fn with_properties(mut self, keys: Vec<String>) -> Self {
        self.properties = keys;
        self
    }

    fn render(&self, msg: &MessageContext) -> String {
        let mut line = self.text.clone().unwrap_or_default();
        for key in &self.properties {
            let value = msg
                .property(key)
                .and_then(conduit_core::Value::as_text)
                .unwrap_or_default();
            if !line.is_empty() {
                line.push_str(", ");
            }
            let _ = write!(line, "{key}={value}");
        }
        line
    }
}

#[async_trait]
impl Mediator for LogMediator {
    async fn mediate(
        &self,
        msg: &mut MessageContext,
        _env: &dyn Environment,
    ) -> Result<bool, MediationError> {
        let line = self.render(msg);
        let id = msg.message_id();
        match self.level {
            LogLevel::Trace => trace!(message_id = %id, "{line}"),
            LogLevel::Debug => debug!(message_id = %id, "{line}"),
            LogLevel::Info => info!(message_id = %id, "{line}"),
            LogLevel::Warn => warn!(message_id = %id, "{line}"),
            LogLevel::Error => error!(message_id = %id, "{line}"),
        }
        Ok(true)
    }
}
