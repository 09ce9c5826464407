//! Configuration for the mediation environment and its message processors.

use std::collections::HashMap;
use std::time::Duration;

use conduit_core::{Expression, PatternExpression, PayloadPathExpression, PropertyExpression};

use crate::error::ConfigError;
use crate::scheduler::Schedule;

/// Parameter keys understood by [`ResequencerConfig::from_params`].
pub mod keys {
    /// Fixed interval between job runs, in milliseconds.
    pub const INTERVAL: &str = "interval";
    /// Cron expression; takes precedence over `interval` when set.
    ///
    /// Only a cron-capable [`Scheduler`](crate::scheduler::Scheduler) can run
    /// it. The built-in [`TokioScheduler`](crate::scheduler::TokioScheduler)
    /// takes intervals only and fails the processor's `init` with
    /// [`SchedulerError::UnsupportedSchedule`](crate::error::SchedulerError::UnsupportedSchedule).
    pub const CRON_EXPRESSION: &str = "cronExpression";
    pub const MESSAGE_STORE: &str = "messageStore";
    /// Sequence that released messages are handed to.
    pub const NEXT_SEQUENCE: &str = "nextEsbSequence";
    pub const REQUIRED_INIT_MESSAGES: &str = "requiredInitMessages";
    pub const REQUIRED_INIT_MESSAGES_DELAY: &str = "requiredInitMessagesDelay";
    pub const DELETE_DUPLICATES: &str = "deleteDuplicateMessages";
    /// Wait between start-sequence selection attempts, in milliseconds.
    pub const INIT_DELAY: &str = "initDelay";
    pub const MAX_RELEASES_PER_CYCLE: &str = "maxReleasesPerCycle";
    /// Expression selecting each message's sequence number (`property:<key>` or `payload:<path>`).
    pub const SEQUENCE_NUMBER: &str = "sequenceNumber";
    /// Optional regex applied to the selected text; the first capture group wins.
    pub const SEQUENCE_NUMBER_PATTERN: &str = "sequenceNumberPattern";
}

/// Environment-level configuration.
#[derive(Debug, Clone)]
pub struct MediationConfig {
    /// Key of the main pipeline entry point.
    pub main_sequence: String,
    /// Key of the sequence used when a faulted message has no fault handler.
    pub fault_sequence: String,
}

impl Default for MediationConfig {
    fn default() -> Self {
        Self {
            main_sequence: "main".to_string(),
            fault_sequence: "fault".to_string(),
        }
    }
}

/// Configuration for one resequencing processor.
#[derive(Debug, Clone)]
pub struct ResequencerConfig {
    /// Unique processor name.
    pub name: String,
    /// Name of the message store the processor drains.
    pub store: String,
    /// Sequence that in-order messages are released into.
    pub target_sequence: String,
    pub schedule: Schedule,
    /// Store size to wait for before selecting the starting sequence number.
    pub required_initial_messages: usize,
    /// Bounded number of waits before falling back to waiting for any message.
    pub required_initial_delay_cycles: u32,
    /// Wait between start-sequence selection attempts.
    pub init_delay: Duration,
    /// Poll period of the unbounded wait for a non-empty store.
    pub wait_poll_interval: Duration,
    /// Delete entries numbered below the next expected number.
    pub delete_duplicates: bool,
    /// Cap on releases per job run. `None` drains the whole in-order backlog.
    pub max_releases_per_cycle: Option<usize>,
    /// Raw parameter map, handed to the job as job data.
    pub params: HashMap<String, String>,
}

impl Default for ResequencerConfig {
    fn default() -> Self {
        Self {
            name: "resequencer".to_string(),
            store: String::new(),
            target_sequence: String::new(),
            schedule: Schedule::Interval(Duration::from_secs(1)),
            required_initial_messages: 4,
            required_initial_delay_cycles: 5,
            init_delay: Duration::from_millis(6000),
            wait_poll_interval: Duration::from_millis(100),
            delete_duplicates: false,
            max_releases_per_cycle: None,
            params: HashMap::new(),
        }
    }
}

impl ResequencerConfig {
    /// Builds a configuration from a processor definition's string parameters.
    ///
    /// `messageStore` and `nextEsbSequence` are required; everything else
    /// falls back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingParameter`] for absent required keys and
    /// [`ConfigError::InvalidParameter`] for values that do not parse.
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let store = params
            .get(keys::MESSAGE_STORE)
            .cloned()
            .ok_or(ConfigError::MissingParameter {
                name: keys::MESSAGE_STORE,
            })?;
        let target_sequence = params
            .get(keys::NEXT_SEQUENCE)
            .cloned()
            .ok_or(ConfigError::MissingParameter {
                name: keys::NEXT_SEQUENCE,
            })?;

        let schedule = match params.get(keys::CRON_EXPRESSION) {
            Some(expr) => Schedule::Cron(expr.clone()),
            None => match parse_param::<u64>(params, keys::INTERVAL)? {
                Some(ms) => Schedule::Interval(Duration::from_millis(ms)),
                None => defaults.schedule,
            },
        };

        Ok(Self {
            name: name.into(),
            store,
            target_sequence,
            schedule,
            required_initial_messages: parse_param(params, keys::REQUIRED_INIT_MESSAGES)?
                .unwrap_or(defaults.required_initial_messages),
            required_initial_delay_cycles: parse_param(
                params,
                keys::REQUIRED_INIT_MESSAGES_DELAY,
            )?
            .unwrap_or(defaults.required_initial_delay_cycles),
            init_delay: parse_param::<u64>(params, keys::INIT_DELAY)?
                .map_or(defaults.init_delay, Duration::from_millis),
            wait_poll_interval: defaults.wait_poll_interval,
            delete_duplicates: params
                .get(keys::DELETE_DUPLICATES)
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            max_releases_per_cycle: parse_param(params, keys::MAX_RELEASES_PER_CYCLE)?,
            params: params.clone(),
        })
    }
}

/// Parses an expression parameter of the form `property:<key>` or `payload:<path>`,
/// optionally wrapped in the regex held under `pattern_name`.
///
/// Returns `Ok(None)` when `name` is absent.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidParameter`] for an unknown prefix or an
/// invalid pattern.
pub fn parse_expression(
    params: &HashMap<String, String>,
    name: &'static str,
    pattern_name: &'static str,
) -> Result<Option<Box<dyn Expression>>, ConfigError> {
    let Some(source) = params.get(name) else {
        return Ok(None);
    };
    let expression: Box<dyn Expression> = match source.split_once(':') {
        Some(("property", key)) if !key.is_empty() => Box::new(PropertyExpression::new(key)),
        Some(("payload", path)) => Box::new(PayloadPathExpression::new(path)),
        _ => {
            return Err(ConfigError::InvalidParameter {
                name,
                value: source.clone(),
            })
        }
    };
    match params.get(pattern_name) {
        Some(pattern) => PatternExpression::new(expression, pattern)
            .map(|e| Some(Box::new(e) as Box<dyn Expression>))
            .map_err(|_| ConfigError::InvalidParameter {
                name: pattern_name,
                value: pattern.clone(),
            }),
        None => Ok(Some(expression)),
    }
}

fn parse_param<T: std::str::FromStr>(
    params: &HashMap<String, String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    params
        .get(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidParameter {
                name,
                value: raw.clone(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_params() -> HashMap<String, String> {
        HashMap::from([
            (keys::MESSAGE_STORE.to_string(), "orders".to_string()),
            (keys::NEXT_SEQUENCE.to_string(), "deliver".to_string()),
        ])
    }

    #[test]
    fn mediation_config_defaults() {
        let config = MediationConfig::default();
        assert_eq!(config.main_sequence, "main");
        assert_eq!(config.fault_sequence, "fault");
    }

    #[test]
    fn resequencer_config_defaults() {
        let config = ResequencerConfig::default();
        assert_eq!(config.required_initial_messages, 4);
        assert_eq!(config.required_initial_delay_cycles, 5);
        assert_eq!(config.init_delay, Duration::from_millis(6000));
        assert!(!config.delete_duplicates);
        assert!(config.max_releases_per_cycle.is_none());
    }

    #[test]
    fn from_params_uses_defaults_for_optional_keys() {
        let config = ResequencerConfig::from_params("reseq", &base_params()).unwrap();
        assert_eq!(config.name, "reseq");
        assert_eq!(config.store, "orders");
        assert_eq!(config.target_sequence, "deliver");
        assert_eq!(config.required_initial_messages, 4);
        assert!(matches!(config.schedule, Schedule::Interval(d) if d == Duration::from_secs(1)));
        assert_eq!(config.params.len(), 2);
    }

    #[test]
    fn from_params_reads_every_tuning_key() {
        let mut params = base_params();
        params.insert(keys::INTERVAL.to_string(), "250".to_string());
        params.insert(keys::REQUIRED_INIT_MESSAGES.to_string(), "8".to_string());
        params.insert(keys::REQUIRED_INIT_MESSAGES_DELAY.to_string(), "3".to_string());
        params.insert(keys::DELETE_DUPLICATES.to_string(), "TRUE".to_string());
        params.insert(keys::INIT_DELAY.to_string(), "15".to_string());
        params.insert(keys::MAX_RELEASES_PER_CYCLE.to_string(), "100".to_string());

        let config = ResequencerConfig::from_params("reseq", &params).unwrap();
        assert!(matches!(config.schedule, Schedule::Interval(d) if d == Duration::from_millis(250)));
        assert_eq!(config.required_initial_messages, 8);
        assert_eq!(config.required_initial_delay_cycles, 3);
        assert!(config.delete_duplicates);
        assert_eq!(config.init_delay, Duration::from_millis(15));
        assert_eq!(config.max_releases_per_cycle, Some(100));
    }

    #[test]
    fn cron_expression_takes_precedence() {
        let mut params = base_params();
        params.insert(keys::INTERVAL.to_string(), "250".to_string());
        params.insert(keys::CRON_EXPRESSION.to_string(), "0/5 * * * * ?".to_string());

        let config = ResequencerConfig::from_params("reseq", &params).unwrap();
        assert!(matches!(config.schedule, Schedule::Cron(expr) if expr == "0/5 * * * * ?"));
    }

    #[test]
    fn missing_store_is_rejected() {
        let mut params = base_params();
        params.remove(keys::MESSAGE_STORE);
        assert!(matches!(
            ResequencerConfig::from_params("reseq", &params),
            Err(ConfigError::MissingParameter { name: "messageStore" })
        ));
    }

    #[test]
    fn non_numeric_value_is_rejected() {
        let mut params = base_params();
        params.insert(keys::REQUIRED_INIT_MESSAGES.to_string(), "four".to_string());
        assert!(matches!(
            ResequencerConfig::from_params("reseq", &params),
            Err(ConfigError::InvalidParameter { name: "requiredInitMessages", value }) if value == "four"
        ));
    }

    #[test]
    fn expressions_parse_by_prefix() {
        let mut msg = conduit_core::MessageContext::with_id(
            "m-1",
            conduit_core::Value::from(serde_json::json!({"order": {"id": "ORD-0042"}})),
        );
        msg.set_property("seq", 9_i64);

        let mut params = HashMap::from([(keys::SEQUENCE_NUMBER.to_string(), "property:seq".to_string())]);
        let expr = parse_expression(&params, keys::SEQUENCE_NUMBER, keys::SEQUENCE_NUMBER_PATTERN)
            .unwrap()
            .unwrap();
        assert_eq!(expr.extract_sequence_number(&msg).unwrap(), 9);

        params.insert(keys::SEQUENCE_NUMBER.to_string(), "payload:/order/id".to_string());
        params.insert(keys::SEQUENCE_NUMBER_PATTERN.to_string(), r"ORD-(\d+)".to_string());
        let expr = parse_expression(&params, keys::SEQUENCE_NUMBER, keys::SEQUENCE_NUMBER_PATTERN)
            .unwrap()
            .unwrap();
        assert_eq!(expr.extract_sequence_number(&msg).unwrap(), 42);
    }

    #[test]
    fn bad_expressions_are_rejected() {
        let absent = parse_expression(&HashMap::new(), keys::SEQUENCE_NUMBER, keys::SEQUENCE_NUMBER_PATTERN);
        assert!(absent.unwrap().is_none());

        let params = HashMap::from([(keys::SEQUENCE_NUMBER.to_string(), "xpath://seq".to_string())]);
        assert!(matches!(
            parse_expression(&params, keys::SEQUENCE_NUMBER, keys::SEQUENCE_NUMBER_PATTERN),
            Err(ConfigError::InvalidParameter { name: "sequenceNumber", .. })
        ));

        let params = HashMap::from([
            (keys::SEQUENCE_NUMBER.to_string(), "property:seq".to_string()),
            (keys::SEQUENCE_NUMBER_PATTERN.to_string(), "(".to_string()),
        ]);
        assert!(matches!(
            parse_expression(&params, keys::SEQUENCE_NUMBER, keys::SEQUENCE_NUMBER_PATTERN),
            Err(ConfigError::InvalidParameter { name: "sequenceNumberPattern", .. })
        ));
    }

    #[test]
    fn delete_duplicates_only_accepts_true() {
        let mut params = base_params();
        params.insert(keys::DELETE_DUPLICATES.to_string(), "yes".to_string());
        let config = ResequencerConfig::from_params("reseq", &params).unwrap();
        assert!(!config.delete_duplicates);
    }
}
