use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::Expression;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::job::{CycleOutcome, JobSettings, ResequencingJob};
use super::state::{Lifecycle, ResequencerState};
use crate::config::{keys, parse_expression, ResequencerConfig};
use crate::environment::MediationEnvironment;
use crate::error::{ConfigError, ProcessorError};
use crate::processor::MessageProcessor;
use crate::scheduler::{Job, JobData, Scheduler};
use crate::store::MessageStore;

/// Everything that exists only between `init` and `destroy`.
struct Running {
    job: Arc<ResequencingJob>,
    store: Arc<dyn MessageStore>,
    scheduler: Arc<dyn Scheduler>,
    cancel: CancellationToken,
}

/// Drains a message store in sequence-number order.
///
/// Messages are taken out of the store only when their number equals the
/// next expected one; everything else waits for the gap to close. The
/// number is read from each message by a configured [`Expression`].
pub struct ResequencingProcessor {
    config: ResequencerConfig,
    expression: Arc<dyn Expression>,
    state: Arc<ResequencerState>,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for ResequencingProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResequencingProcessor")
            .field("config", &self.config)
            .field("expression", &self.expression)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ResequencingProcessor {
    #[must_use]
    pub fn new(config: ResequencerConfig, expression: Arc<dyn Expression>) -> Self {
        let state = ResequencerState::new(
            config.required_initial_messages,
            config.required_initial_delay_cycles,
            config.delete_duplicates,
        );
        Self {
            config,
            expression,
            state: Arc::new(state),
            running: Mutex::new(None),
        }
    }

    /// Builds a processor from a definition's string parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingParameter`] when `sequenceNumber` or a
    /// required resequencer key is absent, and
    /// [`ConfigError::InvalidParameter`] for values that do not parse.
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let config = ResequencerConfig::from_params(name, params)?;
        let expression = parse_expression(params, keys::SEQUENCE_NUMBER, keys::SEQUENCE_NUMBER_PATTERN)?
            .ok_or(ConfigError::MissingParameter {
                name: keys::SEQUENCE_NUMBER,
            })?;
        Ok(Self::new(config, Arc::from(expression)))
    }

    #[must_use]
    pub fn config(&self) -> &ResequencerConfig {
        &self.config
    }

    /// Key the recurring job is scheduled under.
    #[must_use]
    pub fn job_key(&self) -> String {
        format!("{}-resequencing-job", self.config.name)
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lifecycle()
    }

    // -- administration -----------------------------------------------------

    /// Next sequence number to release, `None` until one is selected.
    #[must_use]
    pub fn next_sequence_number(&self) -> Option<i64> {
        self.state.next_sequence_number()
    }

    /// Overrides the next sequence number. Skips the start selection if it
    /// has not happened yet.
    pub fn set_next_sequence_number(&self, next: i64) {
        info!(processor = %self.config.name, next, "next sequence number set");
        self.state.set_next_sequence_number(next);
    }

    #[must_use]
    pub fn required_initial_messages(&self) -> usize {
        self.state.required_initial_messages()
    }

    pub fn set_required_initial_messages(&self, count: usize) {
        self.state.set_required_initial_messages(count);
    }

    #[must_use]
    pub fn required_initial_delay_cycles(&self) -> u32 {
        self.state.required_initial_delay_cycles()
    }

    pub fn set_required_initial_delay_cycles(&self, cycles: u32) {
        self.state.set_required_initial_delay_cycles(cycles);
    }

    #[must_use]
    pub fn delete_duplicates(&self) -> bool {
        self.state.delete_duplicates()
    }

    pub fn set_delete_duplicates(&self, enabled: bool) {
        self.state.set_delete_duplicates(enabled);
    }

    /// Bounded start-selection attempts made by the current or last run.
    #[must_use]
    pub fn initialization_attempts(&self) -> u32 {
        self.state.tried()
    }

    /// Store drained by this processor, while initialized.
    #[must_use]
    pub fn store(&self) -> Option<Arc<dyn MessageStore>> {
        self.running.lock().as_ref().map(|r| Arc::clone(&r.store))
    }

    /// Runs one resequencing cycle now, outside the schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::StoreUnavailable`] before `init` or after
    /// `destroy`, otherwise whatever the run returns.
    pub async fn run_once(&self) -> Result<CycleOutcome, ProcessorError> {
        let (job, store) = self
            .running
            .lock()
            .as_ref()
            .map(|r| (Arc::clone(&r.job), Arc::clone(&r.store)))
            .ok_or_else(|| ProcessorError::StoreUnavailable {
                processor: self.config.name.clone(),
            })?;
        job.run_cycle(Some(store.as_ref()), &self.config.target_sequence)
            .await
    }
}

#[async_trait]
impl MessageProcessor for ResequencingProcessor {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn init(&self, env: &MediationEnvironment) -> anyhow::Result<()> {
        if self.running.lock().is_some() {
            warn!(processor = %self.config.name, "already initialized");
            return Ok(());
        }

        let store = env.configuration().store(&self.config.store).ok_or_else(|| {
            ProcessorError::StoreNotFound {
                name: self.config.store.clone(),
            }
        })?;

        let cancel = CancellationToken::new();
        let job = Arc::new(ResequencingJob::new(
            self.config.name.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.expression),
            env.clone(),
            JobSettings {
                target_sequence: self.config.target_sequence.clone(),
                init_delay: self.config.init_delay,
                wait_poll_interval: self.config.wait_poll_interval,
                max_releases_per_cycle: self.config.max_releases_per_cycle,
            },
            cancel.clone(),
        ));

        // Messages stored before startup decide where ordering begins.
        let start = job.select_start_sequence(store.as_ref());
        self.state.mark_initialized();

        let scheduler = env.scheduler();
        let data = JobData {
            store: Some(Arc::clone(&store)),
            params: self.config.params.clone(),
        };
        if let Err(e) = scheduler.schedule_recurring(
            &self.job_key(),
            &self.config.schedule,
            Arc::clone(&job) as Arc<dyn Job>,
            data,
        ) {
            self.state.mark_destroyed();
            return Err(ProcessorError::from(e).into());
        }

        *self.running.lock() = Some(Running {
            job,
            store,
            scheduler,
            cancel,
        });
        self.state.activate();
        info!(
            processor = %self.config.name,
            store = %self.config.store,
            target = %self.config.target_sequence,
            schedule = %self.config.schedule,
            start = ?start,
            "resequencer started"
        );
        Ok(())
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        self.state.mark_destroyed();
        // Dropping the job breaks the processor -> job -> environment cycle.
        let Some(running) = self.running.lock().take() else {
            return Ok(());
        };
        running.cancel.cancel();
        running.scheduler.cancel(&self.job_key());
        info!(processor = %self.config.name, "resequencer destroyed");
        Ok(())
    }

    fn activate(&self) {
        if self.state.activate() {
            info!(processor = %self.config.name, "resequencer activated");
        }
    }

    fn deactivate(&self) {
        if self.state.deactivate() {
            info!(processor = %self.config.name, "resequencer deactivated");
        }
    }

    fn is_active(&self) -> bool {
        self.state.is_active()
    }
}
