//! Recurring job scheduling.
//!
//! Provides the [`Scheduler`] seam processors register their periodic jobs
//! through, and [`TokioScheduler`], an in-process implementation that runs
//! each job on its own tokio task.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::error::SchedulerError;
use crate::store::MessageStore;

// ---------------------------------------------------------------------------
// Schedule / JobData / Job
// ---------------------------------------------------------------------------

/// When a recurring job fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Fixed delay between the end of one run and the start of the next tick.
    Interval(Duration),
    /// Cron expression, for schedulers that understand one.
    Cron(String),
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval(d) => write!(f, "every {}ms", d.as_millis()),
            Self::Cron(expr) => write!(f, "cron `{expr}`"),
        }
    }
}

/// Data handed to a job on every run.
#[derive(Clone, Default)]
pub struct JobData {
    pub store: Option<Arc<dyn MessageStore>>,
    pub params: HashMap<String, String>,
}

impl fmt::Debug for JobData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobData")
            .field("store", &self.store.as_ref().map(|s| s.name().to_string()))
            .field("params", &self.params)
            .finish()
    }
}

/// A unit of periodic work.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Runs one cycle. Errors are logged by the scheduler; the job stays scheduled.
    async fn execute(&self, data: &JobData) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Scheduler trait
// ---------------------------------------------------------------------------

/// Registers and cancels recurring jobs addressed by a caller-chosen key.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Registers `job` to run on `schedule` with `data`.
    ///
    /// # Errors
    ///
    /// Fails if the key is taken, the schedule is unsupported, or the
    /// scheduler has shut down.
    fn schedule_recurring(
        &self,
        key: &str,
        schedule: &Schedule,
        job: Arc<dyn Job>,
        data: JobData,
    ) -> Result<(), SchedulerError>;

    /// Cancels future runs of `key`. Returns whether the key was scheduled.
    fn cancel(&self, key: &str) -> bool;

    /// Cancels every job and waits for in-flight runs to finish.
    async fn shutdown(&self);
}

// ---------------------------------------------------------------------------
// TokioScheduler
// ---------------------------------------------------------------------------

struct ScheduledJob {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// In-process scheduler: one tokio task per job.
///
/// Each task skips the interval's immediate first tick, then alternates
/// between waiting for the next tick and awaiting `execute`, so at most one
/// run per job is in flight. Cancellation stops the wait between runs; a run
/// already in progress is allowed to finish.
pub struct TokioScheduler {
    jobs: DashMap<String, ScheduledJob>,
    root: CancellationToken,
    shut_down: AtomicBool,
}

impl TokioScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
            root: CancellationToken::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Keys of all currently scheduled jobs.
    #[must_use]
    pub fn scheduled_keys(&self) -> Vec<String> {
        self.jobs.iter().map(|entry| entry.key().clone()).collect()
    }

    #[must_use]
    pub fn is_scheduled(&self, key: &str) -> bool {
        self.jobs.contains_key(key)
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_job(
    key: String,
    period: Duration,
    job: Arc<dyn Job>,
    data: JobData,
    cancel: CancellationToken,
) {
    let mut ticks = tokio::time::interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; jobs first run one period after registration.
    ticks.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticks.tick() => {
                if let Err(e) = job.execute(&data).await {
                    warn!(job = %key, error = %e, "scheduled job run failed");
                }
            }
        }
    }
    debug!(job = %key, "scheduled job stopped");
}

#[async_trait]
impl Scheduler for TokioScheduler {
    fn schedule_recurring(
        &self,
        key: &str,
        schedule: &Schedule,
        job: Arc<dyn Job>,
        data: JobData,
    ) -> Result<(), SchedulerError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(SchedulerError::ShutDown);
        }
        let period = match schedule {
            Schedule::Interval(period) if !period.is_zero() => *period,
            other => {
                return Err(SchedulerError::UnsupportedSchedule {
                    schedule: other.to_string(),
                })
            }
        };
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        match self.jobs.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(SchedulerError::AlreadyScheduled {
                key: key.to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let cancel = self.root.child_token();
                let span = tracing::info_span!("job", key = %key);
                let handle = runtime.spawn(
                    run_job(key.to_string(), period, job, data, cancel.clone()).instrument(span),
                );
                slot.insert(ScheduledJob { cancel, handle });
                info!(job = %key, schedule = %schedule, "job scheduled");
                Ok(())
            }
        }
    }

    fn cancel(&self, key: &str) -> bool {
        match self.jobs.remove(key) {
            Some((_, job)) => {
                job.cancel.cancel();
                info!(job = %key, "job cancelled");
                true
            }
            None => false,
        }
    }

    async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        self.root.cancel();

        let keys = self.scheduled_keys();
        for key in keys {
            if let Some((_, job)) = self.jobs.remove(&key) {
                let _ = job.handle.await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct CountingJob {
        runs: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl Job for CountingJob {
        async fn execute(&self, data: &JobData) -> anyhow::Result<()> {
            assert_eq!(data.params.get("k").map(String::as_str), Some("v"));
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    fn data() -> JobData {
        JobData {
            store: None,
            params: HashMap::from([("k".to_string(), "v".to_string())]),
        }
    }

    fn counting(fail: bool) -> (Arc<AtomicU32>, Arc<dyn Job>) {
        let runs = Arc::new(AtomicU32::new(0));
        let job = Arc::new(CountingJob {
            runs: Arc::clone(&runs),
            fail,
        });
        (runs, job)
    }

    #[tokio::test(start_paused = true)]
    async fn first_run_waits_one_period() {
        let scheduler = TokioScheduler::new();
        let (runs, job) = counting(false);
        scheduler
            .schedule_recurring("j", &Schedule::Interval(Duration::from_millis(100)), job, data())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(260)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failing_job_stays_scheduled() {
        let scheduler = TokioScheduler::new();
        let (runs, job) = counting(true);
        scheduler
            .schedule_recurring("j", &Schedule::Interval(Duration::from_millis(10)), job, data())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(55)).await;
        assert!(runs.load(Ordering::SeqCst) >= 3);
        assert!(scheduler.is_scheduled("j"));
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_future_runs() {
        let scheduler = TokioScheduler::new();
        let (runs, job) = counting(false);
        scheduler
            .schedule_recurring("j", &Schedule::Interval(Duration::from_millis(10)), job, data())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(scheduler.cancel("j"));
        let after_cancel = runs.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after_cancel);
        assert!(!scheduler.cancel("j"), "second cancel is a no-op");
    }

    #[tokio::test]
    async fn duplicate_key_is_rejected() {
        let scheduler = TokioScheduler::new();
        let (_, job) = counting(false);
        let schedule = Schedule::Interval(Duration::from_secs(60));
        scheduler
            .schedule_recurring("j", &schedule, Arc::clone(&job), data())
            .unwrap();

        let err = scheduler
            .schedule_recurring("j", &schedule, job, data())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::AlreadyScheduled { key } if key == "j"));
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn cron_and_zero_interval_are_unsupported() {
        let scheduler = TokioScheduler::new();
        let (_, job) = counting(false);

        let cron = scheduler.schedule_recurring(
            "c",
            &Schedule::Cron("0/5 * * * * ?".to_string()),
            Arc::clone(&job),
            data(),
        );
        assert!(matches!(cron, Err(SchedulerError::UnsupportedSchedule { .. })));

        let zero = scheduler.schedule_recurring("z", &Schedule::Interval(Duration::ZERO), job, data());
        assert!(matches!(zero, Err(SchedulerError::UnsupportedSchedule { .. })));
        assert!(scheduler.scheduled_keys().is_empty());
    }

    #[tokio::test]
    async fn schedule_after_shutdown_fails() {
        let scheduler = TokioScheduler::new();
        scheduler.shutdown().await;

        let (_, job) = counting(false);
        let result = scheduler.schedule_recurring(
            "j",
            &Schedule::Interval(Duration::from_secs(1)),
            job,
            data(),
        );
        assert!(matches!(result, Err(SchedulerError::ShutDown)));
    }

    #[test]
    fn scheduling_outside_runtime_fails() {
        let scheduler = TokioScheduler::new();
        let (_, job) = counting(false);
        let result = scheduler.schedule_recurring(
            "j",
            &Schedule::Interval(Duration::from_secs(1)),
            job,
            data(),
        );
        assert!(matches!(result, Err(SchedulerError::NoRuntime)));
    }

    #[test]
    fn schedule_display() {
        assert_eq!(Schedule::Interval(Duration::from_millis(250)).to_string(), "every 250ms");
        assert_eq!(Schedule::Cron("* * *".to_string()).to_string(), "cron `* * *`");
    }
}
