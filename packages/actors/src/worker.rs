//! The per-worker loop: dequeue, claim, process, report.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use chrono::Utc;
use db::{DbError, JobStore};
use futures_util::FutureExt;
use queue_core::{JobEvent, JobId, JobPayload, JobRecord, JobResult, JobStatus, RetryPolicy};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::pool::PoolMetrics;
use crate::processor::{Processor, ProcessorError};
use crate::queue::JobQueue;
use crate::retry::write_with_retry;

/// One worker of a pool generation.
pub(crate) struct Worker<S: JobStore> {
    pub(crate) id: String,
    pub(crate) queue: Arc<JobQueue>,
    pub(crate) store: Arc<S>,
    pub(crate) processor: Arc<dyn Processor>,
    pub(crate) retry: RetryPolicy,
    pub(crate) metrics: Arc<PoolMetrics>,
    pub(crate) events: broadcast::Sender<JobEvent>,
}

/// Counts a job as in flight for as long as the guard lives.
struct InFlight<'a>(&'a PoolMetrics);

impl<'a> InFlight<'a> {
    fn enter(metrics: &'a PoolMetrics) -> Self {
        metrics.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(metrics)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<S: JobStore> Worker<S> {
    /// Serve jobs until `cancel` fires. The job in progress always finishes first.
    pub(crate) async fn run(self, cancel: CancellationToken) {
        tracing::info!(worker_id = %self.id, processor = self.processor.name(), "Worker started");

        while let Some(payload) = self.queue.dequeue(&cancel).await {
            let job_id = payload.id;
            let iteration = AssertUnwindSafe(self.handle(payload)).catch_unwind().await;

            if let Err(panic) = iteration {
                let crash = JobError::WorkerCrash {
                    worker_id: self.id.clone(),
                    message: panic_message(panic.as_ref()),
                };
                self.metrics.worker_crashes.fetch_add(1, Ordering::Relaxed);
                tracing::error!(worker_id = %self.id, %job_id, error = %crash, "Worker iteration panicked");

                // Don't leave the job claimed by a loop iteration that no longer exists.
                self.record_failure(job_id, &crash.to_string()).await;
            }
        }

        tracing::info!(worker_id = %self.id, "Worker stopped");
    }

    async fn handle(&self, payload: JobPayload) {
        let job_id = payload.id;

        match self.write(job_id, StoreWrite::Claim).await {
            Ok(_) => {}
            Err(DbError::InvalidTransition(e)) => {
                tracing::warn!(worker_id = %self.id, %job_id, error = %e, "Job is no longer pending, skipping");
                return;
            }
            Err(DbError::NotFound(_)) => {
                tracing::warn!(worker_id = %self.id, %job_id, "Dequeued job has no record, skipping");
                return;
            }
            Err(source) => {
                let err = JobError::StoreWriteFailure {
                    job_id,
                    operation: StoreWrite::Claim.name(),
                    source,
                };
                tracing::error!(worker_id = %self.id, %job_id, error = %err, "Could not claim job");
                self.record_failure(job_id, &format!("could not start job: {}", err))
                    .await;
                return;
            }
        }

        let _in_flight = InFlight::enter(&self.metrics);
        let _ = self.events.send(JobEvent::JobStarted {
            job_id,
            worker_id: self.id.clone(),
            timestamp: Utc::now(),
        });
        tracing::info!(worker_id = %self.id, %job_id, "Processing job");

        let started = Instant::now();
        let outcome = AssertUnwindSafe(async { self.processor.execute(&payload).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ProcessorError::Panicked(panic_message(panic.as_ref()))));
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                match self.write(job_id, StoreWrite::Result(&result)).await {
                    Ok(_) => {
                        self.metrics.completed.fetch_add(1, Ordering::Relaxed);
                        let _ = self.events.send(JobEvent::JobCompleted {
                            job_id,
                            worker_id: self.id.clone(),
                            duration_ms,
                            timestamp: Utc::now(),
                        });
                        tracing::info!(worker_id = %self.id, %job_id, duration_ms, "Job completed");
                    }
                    Err(source) => {
                        let err = JobError::StoreWriteFailure {
                            job_id,
                            operation: StoreWrite::Result(&result).name(),
                            source,
                        };
                        tracing::error!(worker_id = %self.id, %job_id, error = %err, "Result could not be saved");
                        // A result that never lands must not leave the job PROCESSING.
                        self.record_failure(job_id, &format!("could not save result: {}", err))
                            .await;
                    }
                }
            }
            Err(error) => {
                let message = error.to_string();
                let err = JobError::ProcessorFailure(error);
                tracing::warn!(worker_id = %self.id, %job_id, duration_ms, error = %err, "Job failed");
                self.record_failure(job_id, &message).await;
            }
        }
    }

    /// Mark a job FAILED, retrying transient store errors.
    async fn record_failure(&self, job_id: JobId, message: &str) {
        match self.write(job_id, StoreWrite::Error(message)).await {
            Ok(_) => {
                self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                let _ = self.events.send(JobEvent::JobFailed {
                    job_id,
                    worker_id: self.id.clone(),
                    error: message.to_string(),
                    timestamp: Utc::now(),
                });
            }
            Err(DbError::InvalidTransition(e)) => {
                tracing::debug!(worker_id = %self.id, %job_id, error = %e, "Job already terminal");
            }
            Err(source) => {
                let err = JobError::StoreWriteFailure {
                    job_id,
                    operation: StoreWrite::Error(message).name(),
                    source,
                };
                tracing::error!(worker_id = %self.id, %job_id, error = %err, "Failure could not be saved");
            }
        }
    }

    /// Run a store write under the retry policy.
    async fn write(&self, job_id: JobId, op: StoreWrite<'_>) -> Result<JobRecord, DbError> {
        write_with_retry(&self.retry, job_id, op.name(), || self.apply(job_id, op)).await
    }

    async fn apply(&self, job_id: JobId, op: StoreWrite<'_>) -> Result<JobRecord, DbError> {
        match op {
            StoreWrite::Claim => self.store.transition(job_id, JobStatus::Processing).await,
            StoreWrite::Result(result) => self.store.attach_result(job_id, result).await,
            StoreWrite::Error(message) => self.store.attach_error(job_id, message).await,
        }
    }
}

/// The lifecycle writes a worker makes.
#[derive(Clone, Copy)]
enum StoreWrite<'a> {
    Claim,
    Result(&'a JobResult),
    Error(&'a str),
}

impl StoreWrite<'_> {
    fn name(&self) -> &'static str {
        match self {
            StoreWrite::Claim => "claim",
            StoreWrite::Result(_) => "attach_result",
            StoreWrite::Error(_) => "attach_error",
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
