//! The periodic resequencing run.
//!
//! One run: pick the starting sequence number if none is known yet, then
//! repeatedly scan the store for the message carrying the next expected
//! number and release it into the downstream sequence.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conduit_core::{Environment, Expression, Mediator, MessageContext};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use super::state::ResequencerState;
use crate::config::keys;
use crate::environment::MediationEnvironment;
use crate::error::ProcessorError;
use crate::pipeline::mediate_with_fault_handling;
use crate::scheduler::{Job, JobData};
use crate::store::{effective_size, MessageStore};

/// What a single run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The processor was inactive or had no store; nothing was touched.
    Skipped,
    /// No starting sequence number could be selected.
    NotInitialized,
    /// Number of messages released in order.
    Released(usize),
}

/// Scheduled job of a [`ResequencingProcessor`](super::ResequencingProcessor).
pub struct ResequencingJob {
    processor: String,
    state: Arc<ResequencerState>,
    expression: Arc<dyn Expression>,
    env: MediationEnvironment,
    target_sequence: String,
    init_delay: Duration,
    wait_poll_interval: Duration,
    max_releases_per_cycle: Option<usize>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ResequencingJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResequencingJob")
            .field("processor", &self.processor)
            .field("target_sequence", &self.target_sequence)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Timing and target settings copied from the processor configuration.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub target_sequence: String,
    pub init_delay: Duration,
    pub wait_poll_interval: Duration,
    pub max_releases_per_cycle: Option<usize>,
}

impl ResequencingJob {
    #[must_use]
    pub fn new(
        processor: impl Into<String>,
        state: Arc<ResequencerState>,
        expression: Arc<dyn Expression>,
        env: MediationEnvironment,
        settings: JobSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            processor: processor.into(),
            state,
            expression,
            env,
            target_sequence: settings.target_sequence,
            init_delay: settings.init_delay,
            wait_poll_interval: settings.wait_poll_interval,
            max_releases_per_cycle: settings.max_releases_per_cycle,
            cancel,
        }
    }

    /// Runs one resequencing cycle against `store`, releasing into `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::Cancelled`] if the processor is destroyed
    /// mid-run and [`ProcessorError::SequenceNotFound`] if an in-order
    /// message is found but `target` does not resolve. Downstream mediation
    /// failures are logged, not returned.
    pub async fn run_cycle(
        &self,
        store: Option<&dyn MessageStore>,
        target: &str,
    ) -> Result<CycleOutcome, ProcessorError> {
        let Some(store) = store else {
            warn!(processor = %self.processor, "message store unavailable, skipping run");
            return Ok(CycleOutcome::Skipped);
        };
        if !self.state.is_active() {
            debug!(processor = %self.processor, "processor inactive, skipping run");
            return Ok(CycleOutcome::Skipped);
        }

        if !self.state.is_initialized() {
            if !self.state.begin_selection() {
                return Ok(CycleOutcome::Skipped);
            }
            let selected = self.initialize(store).await;
            self.state.end_selection();
            selected?;
            if !self.state.is_initialized() {
                return Ok(CycleOutcome::NotInitialized);
            }
        }

        let released = self.release_in_order(store, target).await?;
        Ok(CycleOutcome::Released(released))
    }

    /// Adopts the smallest extractable sequence number in `store` as the
    /// next one if it is smaller than the current value.
    ///
    /// Entries whose number cannot be extracted are skipped.
    pub fn select_start_sequence(&self, store: &dyn MessageStore) -> Option<i64> {
        let mut index = 0;
        while let Some(msg) = store.get(index) {
            match self.expression.extract_sequence_number(&msg) {
                Ok(seq) => {
                    self.state.offer_start_candidate(seq);
                }
                Err(e) => {
                    warn!(processor = %self.processor, message_id = %msg.message_id(), error = %e, "cannot read sequence number");
                }
            }
            index += 1;
        }
        self.state.next_sequence_number()
    }

    /// Waits for enough messages to pick a starting number, falling back to
    /// an unbounded wait for any message once the bounded retries run out.
    async fn initialize(&self, store: &dyn MessageStore) -> Result<(), ProcessorError> {
        self.state.reset_tried();
        loop {
            self.sleep(self.init_delay).await?;
            if effective_size(store) >= self.state.required_initial_messages() {
                self.select_start_sequence(store);
                break;
            }
            let tried = self.state.increment_tried();
            debug!(processor = %self.processor, tried, "not enough messages to select starting sequence");
            if tried >= self.state.required_initial_delay_cycles() {
                break;
            }
        }

        if self.state.is_initialized() {
            info!(processor = %self.processor, next = ?self.state.next_sequence_number(), "starting sequence selected");
            return Ok(());
        }

        while effective_size(store) == 0 {
            self.sleep(self.wait_poll_interval).await?;
        }
        match self.select_start_sequence(store) {
            Some(next) => info!(processor = %self.processor, next, "starting sequence selected"),
            None => warn!(processor = %self.processor, "failed to select starting sequence number"),
        }
        Ok(())
    }

    /// Releases every message whose number matches the next expected one,
    /// restarting the scan after each release.
    async fn release_in_order(
        &self,
        store: &dyn MessageStore,
        target: &str,
    ) -> Result<usize, ProcessorError> {
        let mut released = 0;
        let mut index = 0;

        while let Some(msg) = store.get(index) {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled());
            }

            let seq = match self.expression.extract_sequence_number(&msg) {
                Ok(seq) => seq,
                Err(e) => {
                    warn!(processor = %self.processor, message_id = %msg.message_id(), error = %e, "cannot read sequence number, skipping");
                    index += 1;
                    continue;
                }
            };
            let next = self.state.next_sequence_raw();

            if seq < next && self.state.delete_duplicates() {
                store.remove(msg.message_id());
                debug!(processor = %self.processor, seq, next, "duplicate message deleted");
                continue;
            }
            if seq != next {
                index += 1;
                continue;
            }

            let Some(sequence) = self.env.sequence(target) else {
                error!(processor = %self.processor, sequence = %target, "downstream sequence not found");
                return Err(ProcessorError::SequenceNotFound {
                    key: target.to_string(),
                });
            };
            // Someone else removed it between get and remove; rescan.
            let Some(owned) = store.remove(msg.message_id()) else {
                index = 0;
                continue;
            };

            self.forward(sequence.as_ref(), owned, seq).await;
            self.state.advance_from(next);
            released += 1;

            if self.max_releases_per_cycle.is_some_and(|max| released >= max) {
                debug!(processor = %self.processor, released, "release cap reached");
                break;
            }
            tokio::task::yield_now().await;
            index = 0;
        }

        Ok(released)
    }

    async fn forward(
        &self,
        sequence: &dyn Mediator,
        mut msg: MessageContext,
        seq: i64,
    ) {
        let span = tracing::debug_span!("release", processor = %self.processor, seq);
        let result = mediate_with_fault_handling(sequence, &mut msg, &self.env)
            .instrument(span)
            .await;
        match result {
            Ok(_) => debug!(processor = %self.processor, seq, message_id = %msg.message_id(), "message released"),
            Err(e) => warn!(processor = %self.processor, seq, error = %e, "downstream mediation failed"),
        }
    }

    async fn sleep(&self, period: Duration) -> Result<(), ProcessorError> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(self.cancelled()),
            () = tokio::time::sleep(period) => Ok(()),
        }
    }

    fn cancelled(&self) -> ProcessorError {
        ProcessorError::Cancelled {
            processor: self.processor.clone(),
        }
    }
}

#[async_trait]
impl Job for ResequencingJob {
    async fn execute(&self, data: &JobData) -> anyhow::Result<()> {
        let target = data
            .params
            .get(keys::NEXT_SEQUENCE)
            .map_or(self.target_sequence.as_str(), String::as_str);
        let outcome = self.run_cycle(data.store.as_deref(), target).await?;
        debug!(processor = %self.processor, ?outcome, "resequencing run finished");
        Ok(())
    }
}
