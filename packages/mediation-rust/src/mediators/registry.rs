//! Step registry: configuration-time type tags mapped to step factories.
//!
//! Every step of a [`SequenceConfig`] is resolved once, when the sequence
//! is built, never per message.

use std::collections::HashMap;
use std::sync::Arc;

use conduit_core::{Mediator, Value};
use serde::Deserialize;

use super::{DropMediator, LogLevel, LogMediator, PropertyAction, PropertyMediator, StoreMediator};
use crate::config::parse_expression;
use crate::configuration::Configuration;
use crate::error::ConfigError;
use crate::pipeline::{Sequence, SequenceDefinition};
use crate::target::Target;

// ---------------------------------------------------------------------------
// Configuration types
// ---------------------------------------------------------------------------

/// One step of a sequence definition.
#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    /// Registry type tag (`log`, `property`, ...).
    pub kind: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// A sequence definition, or a reference to one when `key` is set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SequenceConfig {
    pub name: Option<String>,
    pub key: Option<String>,
    /// Key of the sequence installed as this scope's fault handler.
    pub on_error: Option<String>,
    #[serde(default)]
    pub statistics: bool,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// What factories may resolve against while building steps.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub configuration: &'a Configuration,
}

pub type StepFactory =
    Arc<dyn Fn(&StepConfig, &BuildContext<'_>) -> Result<Arc<dyn Mediator>, ConfigError> + Send + Sync>;

// ---------------------------------------------------------------------------
// StepRegistry
// ---------------------------------------------------------------------------

/// Maps step type tags to factories.
pub struct StepRegistry {
    factories: HashMap<String, StepFactory>,
}

impl StepRegistry {
    /// A registry without any step kinds.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with the built-in kinds: `log`, `property`, `drop`,
    /// `store`, `sequence`, and `target`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        let builtins: [(&str, StepFactory); 6] = [
            ("log", Arc::new(build_log)),
            ("property", Arc::new(build_property)),
            ("drop", Arc::new(build_drop)),
            ("store", Arc::new(build_store)),
            ("sequence", Arc::new(build_sequence_ref)),
            ("target", Arc::new(build_target)),
        ];
        for (kind, factory) in builtins {
            registry.factories.insert(kind.to_string(), factory);
        }
        registry
    }

    /// Adds a step kind.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateStepKind`] if `kind` is taken.
    pub fn register(&mut self, kind: impl Into<String>, factory: StepFactory) -> Result<(), ConfigError> {
        let kind = kind.into();
        if self.factories.contains_key(&kind) {
            return Err(ConfigError::DuplicateStepKind { kind });
        }
        self.factories.insert(kind, factory);
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Builds one step.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownStepKind`] or whatever the factory rejects.
    pub fn build_step(
        &self,
        config: &StepConfig,
        ctx: &BuildContext<'_>,
    ) -> Result<Arc<dyn Mediator>, ConfigError> {
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| ConfigError::UnknownStepKind {
                kind: config.kind.clone(),
            })?;
        factory(config, ctx)
    }

    /// Builds a sequence, resolving every step.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AmbiguousSequence`] when both `key` and
    /// `steps` are set, or the first step that fails to build.
    pub fn build_sequence(
        &self,
        config: &SequenceConfig,
        ctx: &BuildContext<'_>,
    ) -> Result<Sequence, ConfigError> {
        if let Some(key) = &config.key {
            if !config.steps.is_empty() {
                return Err(ConfigError::AmbiguousSequence {
                    name: config.name.clone().unwrap_or_else(|| key.clone()),
                });
            }
            return Ok(Sequence::reference(key.clone()));
        }

        let steps = config
            .steps
            .iter()
            .map(|step| self.build_step(step, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        let mut definition = match &config.name {
            Some(name) => SequenceDefinition::named(name.clone(), steps),
            None => SequenceDefinition::anonymous(steps),
        }
        .with_statistics(config.statistics);
        if let Some(on_error) = &config.on_error {
            definition = definition.with_error_handler(on_error.clone());
        }
        Ok(definition.into())
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ---------------------------------------------------------------------------
// Built-in factories
// ---------------------------------------------------------------------------

fn required<'a>(config: &'a StepConfig, name: &'static str) -> Result<&'a str, ConfigError> {
    config
        .params
        .get(name)
        .map(String::as_str)
        .ok_or(ConfigError::MissingParameter { name })
}

fn build_log(config: &StepConfig, _: &BuildContext<'_>) -> Result<Arc<dyn Mediator>, ConfigError> {
    let level = match config.params.get("level") {
        Some(raw) => raw.parse().map_err(|()| ConfigError::InvalidParameter {
            name: "level",
            value: raw.clone(),
        })?,
        None => LogLevel::default(),
    };
    let mut mediator = LogMediator::new(level);
    if let Some(text) = config.params.get("text") {
        mediator = mediator.with_text(text.clone());
    }
    if let Some(keys) = config.params.get("properties") {
        mediator = mediator.with_properties(
            keys.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
        );
    }
    Ok(Arc::new(mediator))
}

fn build_property(config: &StepConfig, _: &BuildContext<'_>) -> Result<Arc<dyn Mediator>, ConfigError> {
    let name = required(config, "name")?;
    let action = if config.params.get("action").is_some_and(|a| a == "remove") {
        PropertyAction::Remove
    } else if let Some(expression) = parse_expression(&config.params, "expression", "pattern")? {
        PropertyAction::Evaluate(expression)
    } else {
        PropertyAction::Set(Value::from(required(config, "value")?))
    };
    Ok(Arc::new(PropertyMediator::new(name, action)))
}

fn build_drop(_: &StepConfig, _: &BuildContext<'_>) -> Result<Arc<dyn Mediator>, ConfigError> {
    Ok(Arc::new(DropMediator))
}

fn build_store(config: &StepConfig, ctx: &BuildContext<'_>) -> Result<Arc<dyn Mediator>, ConfigError> {
    let name = required(config, "messageStore")?;
    let store = ctx
        .configuration
        .store(name)
        .ok_or_else(|| ConfigError::UnknownStore {
            name: name.to_string(),
        })?;
    Ok(Arc::new(StoreMediator::new(store)))
}

fn build_sequence_ref(config: &StepConfig, _: &BuildContext<'_>) -> Result<Arc<dyn Mediator>, ConfigError> {
    Ok(Arc::new(Sequence::reference(required(config, "key")?)))
}

fn build_target(config: &StepConfig, _: &BuildContext<'_>) -> Result<Arc<dyn Mediator>, ConfigError> {
    let params = &config.params;
    let mut target = Target::new();
    if let Some(to) = params.get("to") {
        target = target.to(to.clone());
    }
    if let Some(action) = params.get("action") {
        target = target.action(action.clone());
    }
    if let Some(key) = params.get("sequence") {
        target = target.sequence_ref(key.clone());
    }
    if let Some(key) = params.get("endpoint") {
        target = target.endpoint_ref(key.clone());
    }
    if params.get("async").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        target = target.asynchronous(true);
    }
    Ok(Arc::new(target))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
