//! Error types for the queue, workers and service boundary.

use db::DbError;
use queue_core::{ConfigError, JobId};

use crate::processor::ProcessorError;

/// Per-job failure taxonomy.
///
/// None of these escape a worker: they are resolved to a terminal status and
/// logged. The type exists so logs and events classify failures consistently.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The queue was at capacity when the job was submitted.
    #[error("submission rejected: queue is full ({capacity} jobs waiting)")]
    SubmissionRejected { capacity: usize },

    /// The processor returned an error or panicked.
    #[error("processor failed: {0}")]
    ProcessorFailure(#[from] ProcessorError),

    /// A status write kept failing after the retry budget was spent.
    #[error("store write failed for job {job_id} during {operation}: {source}")]
    StoreWriteFailure {
        job_id: JobId,
        operation: &'static str,
        #[source]
        source: DbError,
    },

    /// The worker loop itself panicked outside the processor call.
    #[error("worker {worker_id} crashed: {message}")]
    WorkerCrash { worker_id: String, message: String },
}

/// Why a submission did not make it into the queue.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Backpressure: the caller should report "busy" and may retry later.
    #[error("queue is full ({capacity} jobs waiting)")]
    QueueFull { job_id: JobId, capacity: usize },

    /// The service was shut down and no longer accepts work.
    #[error("queue is closed")]
    Closed { job_id: JobId },

    /// The job record could not be created; nothing was enqueued.
    #[error("could not record job: {0}")]
    Store(#[from] DbError),
}

impl SubmitError {
    /// Whether this is a transient "busy" rejection rather than a store fault.
    pub fn is_busy(&self) -> bool {
        matches!(self, SubmitError::QueueFull { .. } | SubmitError::Closed { .. })
    }

    /// The rejected job, when its record was created (and then marked FAILED).
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            SubmitError::QueueFull { job_id, .. } | SubmitError::Closed { job_id } => {
                Some(*job_id)
            }
            SubmitError::Store(_) => None,
        }
    }
}

/// Startup and shutdown failures, the only errors that reach the process supervisor.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to spawn supervisor: {0}")]
    Spawn(String),

    #[error("supervisor unavailable: {0}")]
    Supervisor(String),
}
