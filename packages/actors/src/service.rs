//! The job service: submission, status reads and pool lifecycle.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Utc;
use db::{DbError, JobFilter, JobStore};
use queue_core::{JobEvent, JobId, JobPayload, JobRecord, JobStatus, PoolState, QueueConfig, QueueStats};
use ractor::ActorRef;
use ractor::rpc::CallResult;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

use crate::error::{JobError, ServiceError, SubmitError};
use crate::messages::SupervisorMessage;
use crate::pool::{PoolHandle, WorkerPool};
use crate::processor::Processor;
use crate::queue::EnqueueError;
use crate::retry::write_with_retry;
use crate::supervisor::start_supervisor;

/// Error text recorded for payloads still queued at shutdown.
pub const SHUTDOWN_MESSAGE: &str = "service shut down before processing";

/// Bounded job queue with a worker pool in front of a [`JobStore`].
///
/// Construct one per process and share it as `Arc<JobService<S>>`. Each
/// instance owns its own queue, pool and supervisor.
pub struct JobService<S: JobStore> {
    store: Arc<S>,
    config: QueueConfig,
    pool: PoolHandle,
    supervisor: ActorRef<SupervisorMessage>,
    supervisor_task: Mutex<Option<JoinHandle<()>>>,
}

impl<S: JobStore> JobService<S> {
    /// Validate `config` and spawn the lifecycle supervisor. Workers are
    /// not started until [`JobService::start`].
    pub async fn new(config: QueueConfig, store: Arc<S>) -> Result<Self, ServiceError> {
        let pool = WorkerPool::new(config.clone(), store.clone())?;
        let handle = pool.handle();

        let (supervisor, supervisor_task) = start_supervisor(pool)
            .await
            .map_err(|e| ServiceError::Spawn(e.to_string()))?;

        tracing::info!(
            capacity = config.capacity,
            workers = config.workers,
            job_timeout_secs = config.job_timeout_secs,
            "Job service created"
        );

        Ok(Self {
            store,
            config,
            pool: handle,
            supervisor,
            supervisor_task: Mutex::new(Some(supervisor_task)),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Record a new job and queue it.
    ///
    /// The record is created PENDING before the payload is offered to the
    /// queue. A full or closed queue marks it FAILED straight away and
    /// returns the matching busy error; nothing waits for a free slot.
    pub async fn submit(&self, payload: JobPayload) -> Result<JobRecord, SubmitError> {
        let record = self.store.create(&JobRecord::pending(&payload)).await?;
        let job_id = record.id;

        match self.pool.queue.enqueue(payload) {
            Ok(()) => {
                let depth = self.pool.queue.size();
                self.pool.metrics.submitted.fetch_add(1, Ordering::Relaxed);
                self.pool.emit(JobEvent::JobSubmitted {
                    job_id,
                    depth,
                    timestamp: Utc::now(),
                });
                tracing::info!(%job_id, depth, "Job submitted");
                Ok(record)
            }
            Err(e) => {
                let reason = e.to_string();
                let err = match e {
                    EnqueueError::Full(_) => {
                        let capacity = self.pool.queue.capacity();
                        let rejection = JobError::SubmissionRejected { capacity };
                        tracing::warn!(%job_id, error = %rejection, "Job rejected");
                        SubmitError::QueueFull { job_id, capacity }
                    }
                    EnqueueError::Closed(_) => {
                        tracing::warn!(%job_id, "Job rejected, service is shut down");
                        SubmitError::Closed { job_id }
                    }
                };

                self.mark_failed(job_id, &reason).await;
                self.pool.metrics.rejected.fetch_add(1, Ordering::Relaxed);
                self.pool.emit(JobEvent::JobRejected {
                    job_id,
                    reason,
                    timestamp: Utc::now(),
                });
                Err(err)
            }
        }
    }

    /// Current record of a job.
    pub async fn get_status(&self, id: JobId) -> Result<Option<JobRecord>, DbError> {
        self.store.read(id).await
    }

    /// Stored jobs, newest first.
    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, DbError> {
        self.store.list(filter).await
    }

    pub async fn count_jobs(&self, status: Option<JobStatus>) -> Result<u64, DbError> {
        self.store.count(status).await
    }

    pub fn stats(&self) -> QueueStats {
        self.pool.stats()
    }

    pub fn state(&self) -> PoolState {
        self.pool.state()
    }

    /// Subscribe to job and pool events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.pool.events.subscribe()
    }

    /// Start a worker generation with `processor`. Returns `false` if the
    /// pool was already running.
    pub async fn start(&self, processor: Arc<dyn Processor>) -> Result<bool, ServiceError> {
        self.call(|reply| SupervisorMessage::Start { processor, reply })
            .await
    }

    /// Stop the workers once their current jobs finish. Queued payloads
    /// stay queued for the next [`JobService::start`]. Returns `false` if
    /// the pool was already stopped.
    pub async fn stop(&self) -> Result<bool, ServiceError> {
        self.call(|reply| SupervisorMessage::Stop { reply }).await
    }

    /// Stop the pool for good.
    ///
    /// Waits for in-flight jobs, closes the queue, marks every payload still
    /// queued FAILED and stops the supervisor. Later submissions are
    /// rejected with [`SubmitError::Closed`]. Calling it twice is harmless.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        let Some(task) = self.supervisor_task.lock().await.take() else {
            tracing::debug!("Job service already shut down");
            return Ok(());
        };

        tracing::info!("Shutting down job service");
        self.stop().await?;

        self.pool.queue.close().await;
        let leftovers = self.pool.queue.drain().await;
        let abandoned = leftovers.len();
        for payload in leftovers {
            if self.mark_failed(payload.id, SHUTDOWN_MESSAGE).await {
                self.pool.metrics.failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.supervisor.stop(None);
        task.await
            .map_err(|e| ServiceError::Supervisor(e.to_string()))?;

        tracing::info!(abandoned, "Job service shut down");
        Ok(())
    }

    /// Move a job that never reached a worker to FAILED, retrying transient
    /// store errors. Returns whether the write landed.
    async fn mark_failed(&self, job_id: JobId, message: &str) -> bool {
        let written = write_with_retry(&self.config.store_retry, job_id, "attach_error", || {
            self.store.attach_error(job_id, message)
        })
        .await;

        match written {
            Ok(_) => true,
            Err(source) => {
                let err = JobError::StoreWriteFailure {
                    job_id,
                    operation: "attach_error",
                    source,
                };
                tracing::error!(%job_id, error = %err, "Could not mark job as failed");
                false
            }
        }
    }

    async fn call<T, F>(&self, message: F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce(ractor::RpcReplyPort<T>) -> SupervisorMessage,
    {
        match ractor::rpc::call(&self.supervisor, message, None).await {
            Ok(CallResult::Success(value)) => Ok(value),
            Ok(CallResult::Timeout) => Err(ServiceError::Supervisor("request timed out".into())),
            Ok(CallResult::SenderError) => Err(ServiceError::Supervisor("supervisor dropped the request".into())),
            Err(e) => Err(ServiceError::Supervisor(e.to_string())),
        }
    }
}

impl<S: JobStore> Drop for JobService<S> {
    fn drop(&mut self) {
        // The supervisor stops its workers in post_stop.
        self.supervisor.stop(None);
    }
}
