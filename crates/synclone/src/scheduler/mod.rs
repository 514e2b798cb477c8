//! Bounded worker pool that runs repository tasks.
//!
//! A fixed number of workers pull tasks from a shared queue. Each task goes
//! through the adaptive rate limiter, runs under a per-attempt timeout and is
//! retried with the shared [`RetryPolicy`] while its error is retryable.
//! The final outcome is written through the [`StateRecorder`] and
//! acknowledged before the worker takes its next task.
//!
//! Cancellation is cooperative: once the shutdown flag is set no worker
//! picks up a new task and no failed task is retried, but attempts already
//! running finish.

mod summary;

pub use summary::{PlannedTask, RunSummary, TaskFailure};

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::ConfigError;
use crate::executor::{ExecOutcome, RepoExecutor, Strategy, TaskError};
use crate::platform::{AdaptiveRateLimiter, RepositoryDescriptor, RepositoryKey};
use crate::progress::{ProgressCallback, SyncProgress, emit};
use crate::retry::{RetryPolicy, retry};
use crate::state::{StateRecorder, TaskOutcome};

/// Largest accepted worker count.
pub const MAX_CONCURRENCY: usize = 50;
/// Worker count used when none is configured.
pub const DEFAULT_CONCURRENCY: usize = 5;
/// Upper bound on a single task attempt.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// How often the coordinator checks the shutdown flag while waiting.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Reject worker counts outside `1..=MAX_CONCURRENCY`. Never clamps.
pub fn validate_concurrency(value: usize) -> Result<usize, ConfigError> {
    if (1..=MAX_CONCURRENCY).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Concurrency {
            value,
            max: MAX_CONCURRENCY,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub concurrency: usize,
    pub strategy: Strategy,
    pub retry: RetryPolicy,
    pub task_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            strategy: Strategy::default(),
            retry: RetryPolicy::default(),
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }
}

/// One repository to synchronize.
#[derive(Debug, Clone)]
pub struct Task {
    pub repo: RepositoryDescriptor,
    pub path: PathBuf,
    /// Retries already spent in earlier runs, when the repository failed before.
    pub prior_retries: Option<u32>,
}

impl Task {
    pub fn new(repo: RepositoryDescriptor, path: PathBuf) -> Self {
        Self {
            repo,
            path,
            prior_retries: None,
        }
    }
}

struct TaskReport {
    key: RepositoryKey,
    result: Result<ExecOutcome, TaskError>,
    attempts: u32,
}

enum WorkerMessage {
    Progress(SyncProgress),
    Finished(TaskReport),
}

type Outbox = mpsc::UnboundedSender<WorkerMessage>;

fn send_progress(outbox: &Outbox, event: SyncProgress) {
    // The coordinator outlives every worker, so a closed channel only
    // happens while the runtime is shutting down.
    let _ = outbox.send(WorkerMessage::Progress(event));
}

/// State shared by the workers of one run.
struct Shared {
    config: SchedulerConfig,
    executor: Arc<dyn RepoExecutor>,
    limiter: Option<AdaptiveRateLimiter>,
    recorder: Option<StateRecorder>,
    shutdown: Arc<AtomicBool>,
    queue: Mutex<VecDeque<Task>>,
    in_flight: AtomicUsize,
    rate_limit_signals: AtomicU64,
}

impl Shared {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn next_task(&self) -> Option<Task> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }

    async fn record(&self, key: &RepositoryKey, outcome: TaskOutcome, outbox: &Outbox) {
        let Some(ref recorder) = self.recorder else {
            return;
        };
        if let Err(e) = recorder.record(key.clone(), outcome).await {
            tracing::warn!(%key, error = %e, "Failed to record outcome");
            send_progress(
                outbox,
                SyncProgress::Warning {
                    message: format!("failed to record state for {key}: {e}"),
                },
            );
        }
    }

    /// One attempt: wait for the limiter, run under the timeout, feed the
    /// result back to the limiter.
    async fn attempt(&self, task: &Task, outbox: &Outbox) -> Result<ExecOutcome, TaskError> {
        if let Some(ref limiter) = self.limiter {
            limiter.wait().await;
        }

        let result = match tokio::time::timeout(
            self.config.task_timeout,
            self.executor
                .execute(&task.repo, &task.path, self.config.strategy),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TaskError::Timeout),
        };

        match result {
            Ok(_) => {
                if let Some(ref limiter) = self.limiter {
                    limiter.on_success();
                }
            }
            Err(TaskError::RateLimited { retry_after, .. }) => {
                self.rate_limit_signals.fetch_add(1, Ordering::SeqCst);
                if let Some(ref limiter) = self.limiter {
                    limiter.on_rate_limited(retry_after);
                    send_progress(
                        outbox,
                        SyncProgress::RateLimited {
                            current_rps: limiter.current_rps(),
                        },
                    );
                }
            }
            Err(_) => {}
        }
        result
    }

    async fn run_task(&self, task: Task, outbox: &Outbox) -> TaskReport {
        let key = task.repo.key();
        send_progress(outbox, SyncProgress::RepoStarted { key: key.to_string() });
        self.record(&key, TaskOutcome::Running, outbox).await;

        let mut attempts = 0u32;
        let result = retry(
            &self.config.retry,
            || {
                attempts += 1;
                self.attempt(&task, outbox)
            },
            |err: &TaskError| err.is_retryable() && !self.is_shutdown(),
            |err, delay, attempt| {
                tracing::warn!(%key, attempt, delay_ms = delay.as_millis() as u64, error = %err, "Task failed, retrying");
                send_progress(
                    outbox,
                    SyncProgress::TaskRetry {
                        key: key.to_string(),
                        reason: err.to_string(),
                        retry_after_ms: delay.as_millis() as u64,
                        attempt,
                    },
                );
            },
        )
        .await;

        let outcome = match &result {
            Ok(ExecOutcome::Synced(action)) => TaskOutcome::Success { action: *action },
            Ok(ExecOutcome::Skipped(reason)) => TaskOutcome::Skipped {
                reason: reason.clone(),
            },
            Err(err) => TaskOutcome::Failed {
                reason: err.to_string(),
                retry_count: match task.prior_retries {
                    Some(prior) => prior.saturating_add(attempts),
                    None => attempts.saturating_sub(1),
                },
            },
        };
        self.record(&key, outcome, outbox).await;

        TaskReport {
            key,
            result,
            attempts,
        }
    }
}

async fn worker(shared: Arc<Shared>, outbox: Outbox) {
    loop {
        if shared.is_shutdown() {
            break;
        }
        let Some(task) = shared.next_task() else {
            break;
        };

        shared.in_flight.fetch_add(1, Ordering::SeqCst);
        let report = shared.run_task(task, &outbox).await;
        shared.in_flight.fetch_sub(1, Ordering::SeqCst);

        if outbox.send(WorkerMessage::Finished(report)).is_err() {
            break;
        }
    }
}

/// Runs tasks on a bounded pool of workers.
pub struct Scheduler {
    config: SchedulerConfig,
    executor: Arc<dyn RepoExecutor>,
    limiter: Option<AdaptiveRateLimiter>,
    recorder: Option<StateRecorder>,
    shutdown: Arc<AtomicBool>,
}

impl Scheduler {
    /// Create a scheduler. Fails when the concurrency is out of range.
    pub fn new(config: SchedulerConfig, executor: Arc<dyn RepoExecutor>) -> Result<Self, ConfigError> {
        validate_concurrency(config.concurrency)?;
        Ok(Self {
            config,
            executor,
            limiter: None,
            recorder: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: AdaptiveRateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    #[must_use]
    pub fn with_recorder(mut self, recorder: StateRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    #[must_use]
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Run every task and return the tally.
    ///
    /// Consumes the scheduler so the recorder handle is released once the
    /// workers are done.
    #[tracing::instrument(skip_all, fields(tasks = tasks.len(), concurrency = self.config.concurrency))]
    pub async fn run(self, tasks: Vec<Task>, on_progress: Option<&ProgressCallback>) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::new(tasks.len());

        emit(
            on_progress,
            SyncProgress::SyncStarting {
                tasks: tasks.len(),
                concurrency: self.config.concurrency,
                dry_run: false,
            },
        );

        let worker_count = self.config.concurrency.min(tasks.len());
        let shared = Arc::new(Shared {
            config: self.config,
            executor: self.executor,
            limiter: self.limiter,
            recorder: self.recorder,
            shutdown: self.shutdown,
            queue: Mutex::new(tasks.into()),
            in_flight: AtomicUsize::new(0),
            rate_limit_signals: AtomicU64::new(0),
        });

        let (outbox, mut inbox) = mpsc::unbounded_channel();
        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            handles.push(tokio::spawn(worker(Arc::clone(&shared), outbox.clone())));
        }
        drop(outbox);

        let mut poll = tokio::time::interval(SHUTDOWN_POLL);
        let mut cancelling_reported = false;

        loop {
            tokio::select! {
                message = inbox.recv() => match message {
                    Some(WorkerMessage::Progress(event)) => emit(on_progress, event),
                    Some(WorkerMessage::Finished(report)) => {
                        summary.add(&report.key, &report.result, report.attempts);
                        let key = report.key.to_string();
                        let event = match report.result {
                            Ok(ExecOutcome::Synced(action)) => SyncProgress::RepoSynced { key, action },
                            Ok(ExecOutcome::Skipped(reason)) => SyncProgress::RepoSkipped { key, reason },
                            Err(err) => SyncProgress::RepoFailed { key, reason: err.to_string() },
                        };
                        emit(on_progress, event);
                    }
                    None => break,
                },
                _ = poll.tick(), if !cancelling_reported => {
                    if shared.is_shutdown() {
                        cancelling_reported = true;
                        let in_flight = shared.in_flight.load(Ordering::SeqCst);
                        tracing::warn!(in_flight, "Cancellation requested, finishing in-flight tasks");
                        emit(on_progress, SyncProgress::Cancelling { in_flight });
                    }
                }
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }

        summary.cancelled = shared.is_shutdown();
        summary.not_started = summary.total.saturating_sub(summary.finished());
        summary.throttled = match shared.limiter {
            Some(ref limiter) => limiter.throttled_count(),
            None => shared.rate_limit_signals.load(Ordering::SeqCst),
        };
        summary.duration = started.elapsed();
        summary.normalize();

        emit(
            on_progress,
            SyncProgress::SyncComplete {
                duration: summary.duration,
            },
        );
        tracing::info!(
            cloned = summary.cloned,
            updated = summary.updated,
            failed = summary.failed,
            skipped = summary.skipped,
            not_started = summary.not_started,
            "Sync finished"
        );
        summary
    }

    /// Dry run: report what each task would do without changing anything.
    pub async fn plan(self, tasks: Vec<Task>, on_progress: Option<&ProgressCallback>) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::new(tasks.len());
        summary.dry_run = true;

        emit(
            on_progress,
            SyncProgress::SyncStarting {
                tasks: tasks.len(),
                concurrency: self.config.concurrency,
                dry_run: true,
            },
        );

        for task in tasks {
            let key = task.repo.key();
            let planned = match self
                .executor
                .plan(&task.repo, &task.path, self.config.strategy)
                .await
            {
                Ok(ExecOutcome::Synced(action)) => PlannedTask {
                    key,
                    path: task.path,
                    action: Some(action),
                    note: None,
                },
                Ok(ExecOutcome::Skipped(reason)) => PlannedTask {
                    key,
                    path: task.path,
                    action: None,
                    note: Some(reason),
                },
                Err(err) => PlannedTask {
                    key,
                    path: task.path,
                    action: None,
                    note: Some(err.to_string()),
                },
            };

            if let Some(action) = planned.action {
                emit(
                    on_progress,
                    SyncProgress::Planned {
                        key: planned.key.to_string(),
                        action,
                        path: planned.path.display().to_string(),
                    },
                );
            }
            summary.planned.push(planned);
        }

        summary.duration = started.elapsed();
        summary.normalize();
        emit(
            on_progress,
            SyncProgress::SyncComplete {
                duration: summary.duration,
            },
        );
        summary
    }
}
