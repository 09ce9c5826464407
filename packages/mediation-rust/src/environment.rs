//! The explicitly constructed hosting context every mediator runs in.

use std::sync::Arc;

use conduit_core::{Endpoint, Environment, Mediator, MessageContext, StatisticsCollector};
use tracing::{debug, warn, Instrument};

use crate::config::MediationConfig;
use crate::configuration::Configuration;
use crate::pipeline::mediate_with_fault_handling;
use crate::processor::ProcessorRegistry;
use crate::scheduler::{Scheduler, TokioScheduler};

struct Inner {
    config: MediationConfig,
    configuration: Configuration,
    statistics: Option<Arc<dyn StatisticsCollector>>,
    scheduler: Arc<dyn Scheduler>,
    processors: ProcessorRegistry,
}

/// Owns the configuration table, statistics collector, scheduler, and
/// message processors of one hosting process.
///
/// Cheap to clone; clones share the same state. Lifecycle is explicit:
/// [`init`](Self::init) starts processors in registration order and
/// [`shutdown`](Self::shutdown) destroys them in reverse before stopping
/// the scheduler.
#[derive(Clone)]
pub struct MediationEnvironment {
    inner: Arc<Inner>,
}

impl MediationEnvironment {
    #[must_use]
    pub fn builder() -> MediationEnvironmentBuilder {
        MediationEnvironmentBuilder::default()
    }

    #[must_use]
    pub fn config(&self) -> &MediationConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.inner.configuration
    }

    #[must_use]
    pub fn scheduler(&self) -> Arc<dyn Scheduler> {
        Arc::clone(&self.inner.scheduler)
    }

    #[must_use]
    pub fn processors(&self) -> &ProcessorRegistry {
        &self.inner.processors
    }

    /// Initialize every registered processor.
    ///
    /// # Errors
    ///
    /// Returns the first processor initialization failure.
    pub async fn init(&self) -> anyhow::Result<()> {
        self.inner.processors.init_all(self).await
    }

    /// Destroy every processor and stop the scheduler.
    ///
    /// # Errors
    ///
    /// Returns the first processor destruction failure; the scheduler is
    /// stopped regardless.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let result = self.inner.processors.destroy_all().await;
        self.inner.scheduler.shutdown().await;
        result
    }
}

impl Environment for MediationEnvironment {
    fn sequence(&self, key: &str) -> Option<Arc<dyn Mediator>> {
        self.inner.configuration.sequence(key)
    }

    fn endpoint(&self, key: &str) -> Option<Arc<dyn Endpoint>> {
        self.inner.configuration.endpoint(key)
    }

    fn main_sequence(&self) -> Option<Arc<dyn Mediator>> {
        self.sequence(&self.inner.config.main_sequence)
    }

    fn fault_sequence(&self) -> Option<Arc<dyn Mediator>> {
        self.sequence(&self.inner.config.fault_sequence)
    }

    fn statistics(&self) -> Option<Arc<dyn StatisticsCollector>> {
        self.inner.statistics.clone()
    }

    fn inject_async(&self, mut msg: MessageContext, sequence: Arc<dyn Mediator>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(message_id = %msg.message_id(), "no async runtime, injected message dropped");
            return;
        };
        let env = self.clone();
        let span = tracing::debug_span!("inject", message_id = %msg.message_id());
        runtime.spawn(
            async move {
                match mediate_with_fault_handling(sequence.as_ref(), &mut msg, &env).await {
                    Ok(proceed) => debug!(proceed, "injected mediation finished"),
                    Err(e) => warn!(error = %e, "injected mediation failed"),
                }
            }
            .instrument(span),
        );
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MediationEnvironmentBuilder {
    config: MediationConfig,
    statistics: Option<Arc<dyn StatisticsCollector>>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl MediationEnvironmentBuilder {
    #[must_use]
    pub fn config(mut self, config: MediationConfig) -> Self {
        self.config = config;
        self
    }

    /// Report sequence statistics to `collector`.
    #[must_use]
    pub fn statistics(mut self, collector: Arc<dyn StatisticsCollector>) -> Self {
        self.statistics = Some(collector);
        self
    }

    /// Use `scheduler` instead of an in-process [`TokioScheduler`].
    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    #[must_use]
    pub fn build(self) -> MediationEnvironment {
        MediationEnvironment {
            inner: Arc::new(Inner {
                config: self.config,
                configuration: Configuration::new(),
                statistics: self.statistics,
                scheduler: self
                    .scheduler
                    .unwrap_or_else(|| Arc::new(TokioScheduler::new())),
                processors: ProcessorRegistry::new(),
            }),
        }
    }
}
