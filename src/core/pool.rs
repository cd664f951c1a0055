use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::matcher::MatchError;
use crate::models::{Admission, Job, JobOutcome};

/// Executes one job on behalf of a worker
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &Job) -> Result<(), MatchError>;
}

/// Worker pool sizing and per-job deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub concurrency: usize,
    pub queue_capacity: usize,
    pub job_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            queue_capacity: 100,
            job_timeout: Duration::from_secs(120),
        }
    }
}

/// Snapshot of the pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub accepted: u64,
    pub dropped: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: JobOutcome) {
        let counter = match outcome {
            JobOutcome::Completed => &self.completed,
            JobOutcome::Failed => &self.failed,
            JobOutcome::TimedOut => &self.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PoolStats {
        PoolStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

type SharedQueue = Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>;

/// Fixed set of workers draining one bounded job queue
///
/// Submission never blocks: when the queue is full the job is dropped and
/// counted. Each job runs under its own deadline; a failing, panicking or
/// timed out job never takes its worker down.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WorkerPool {
    /// Launch `config.concurrency` workers on the current tokio runtime
    pub fn start(processor: Arc<dyn JobProcessor>, config: PoolConfig) -> Self {
        let concurrency = config.concurrency.max(1);
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let queue: SharedQueue = Arc::new(tokio::sync::Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let workers = (0..concurrency)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&queue),
                    Arc::clone(&processor),
                    config.job_timeout,
                    Arc::clone(&counters),
                ))
            })
            .collect();

        info!(
            concurrency,
            queue_capacity = config.queue_capacity,
            job_timeout_secs = config.job_timeout.as_secs(),
            "Worker pool started"
        );

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            counters,
        }
    }

    /// Offer a job to the queue without waiting
    pub fn submit(&self, job: Job) -> Admission {
        let guard = lock(&self.sender);
        let Some(sender) = guard.as_ref() else {
            warn!(job_kind = %job.kind, target_id = %job.target_id, "Worker pool shut down, dropping job");
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return Admission::Dropped;
        };

        match sender.try_send(job) {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                Admission::Accepted
            }
            Err(TrySendError::Full(job)) => {
                warn!(job_kind = %job.kind, target_id = %job.target_id, "Job queue full, dropping job");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Admission::Dropped
            }
            Err(TrySendError::Closed(job)) => {
                warn!(job_kind = %job.kind, target_id = %job.target_id, "Job queue closed, dropping job");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Admission::Dropped
            }
        }
    }

    /// Close the queue and wait until every accepted job has finished
    pub async fn shutdown(&self) {
        let sender = lock(&self.sender).take();
        drop(sender);

        let workers = std::mem::take(&mut *lock(&self.workers));
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Worker task ended abnormally");
            }
        }

        let stats = self.stats();
        info!(
            completed = stats.completed,
            failed = stats.failed,
            timed_out = stats.timed_out,
            dropped = stats.dropped,
            "Worker pool shut down"
        );
    }

    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }
}

async fn run_worker(
    worker_id: usize,
    queue: SharedQueue,
    processor: Arc<dyn JobProcessor>,
    job_timeout: Duration,
    counters: Arc<Counters>,
) {
    info!(worker_id, "Worker started");

    loop {
        let next = queue.lock().await.recv().await;
        let Some(job) = next else {
            break;
        };

        let outcome = execute(worker_id, &processor, job, job_timeout).await;
        counters.record(outcome);
    }

    info!(worker_id, "Worker stopped");
}

/// Run a job on its own task under the deadline
///
/// On timeout the task is aborted; oracle calls still in flight are dropped
/// along with their results. Side effects already committed remain.
async fn execute(
    worker_id: usize,
    processor: &Arc<dyn JobProcessor>,
    job: Job,
    job_timeout: Duration,
) -> JobOutcome {
    let kind = job.kind;
    let target_id = job.target_id.clone();

    info!(job_kind = %kind, target_id = %target_id, worker_id, "Processing job");

    let task_processor = Arc::clone(processor);
    let mut task = tokio::spawn(async move { task_processor.process(&job).await });

    match tokio::time::timeout(job_timeout, &mut task).await {
        Ok(Ok(Ok(()))) => JobOutcome::Completed,
        Ok(Ok(Err(e))) => {
            error!(job_kind = %kind, target_id = %target_id, error = %e, "Job failed");
            JobOutcome::Failed
        }
        Ok(Err(e)) => {
            error!(job_kind = %kind, target_id = %target_id, error = %e, "Job panicked");
            JobOutcome::Failed
        }
        Err(_) => {
            task.abort();
            warn!(
                job_kind = %kind,
                target_id = %target_id,
                timeout_secs = job_timeout.as_secs(),
                "Job deadline exceeded"
            );
            JobOutcome::TimedOut
        }
    }
}
