//! Error types for configuration, scheduling, and message processors.

/// Errors raised while turning configuration into runtime objects.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown step kind: {kind}")]
    UnknownStepKind { kind: String },
    #[error("step kind already registered: {kind}")]
    DuplicateStepKind { kind: String },
    #[error("missing required parameter `{name}`")]
    MissingParameter { name: &'static str },
    #[error("invalid value `{value}` for parameter `{name}`")]
    InvalidParameter { name: &'static str, value: String },
    #[error("message processor already registered: {name}")]
    DuplicateProcessor { name: String },
    #[error("unknown message store: {name}")]
    UnknownStore { name: String },
    /// A sequence was given both a reference key and its own steps.
    #[error("sequence {name} declares both a key and inline steps")]
    AmbiguousSequence { name: String },
}

/// Errors from registering or cancelling scheduled jobs.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("schedule not supported by this scheduler: {schedule}")]
    UnsupportedSchedule { schedule: String },
    #[error("job already scheduled: {key}")]
    AlreadyScheduled { key: String },
    #[error("scheduler has been shut down")]
    ShutDown,
    #[error("no async runtime available to run scheduled jobs")]
    NoRuntime,
}

/// Errors raised by message processors and their jobs.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("message store not found: {name}")]
    StoreNotFound { name: String },
    #[error("message store unavailable for processor {processor}")]
    StoreUnavailable { processor: String },
    #[error("downstream sequence not found: {key}")]
    SequenceNotFound { key: String },
    #[error("processor {processor} was destroyed while its job was running")]
    Cancelled { processor: String },
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}
