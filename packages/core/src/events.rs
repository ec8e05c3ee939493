//! Event types for observing the queue in real time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, PoolState};

/// Events emitted by the job service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    // Job events
    /// A payload was accepted into the queue.
    JobSubmitted {
        job_id: JobId,
        depth: usize,
        timestamp: DateTime<Utc>,
    },
    /// A submission was turned away; its record is FAILED.
    JobRejected {
        job_id: JobId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// A worker claimed a job.
    JobStarted {
        job_id: JobId,
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A job completed successfully.
    JobCompleted {
        job_id: JobId,
        worker_id: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job failed during processing.
    JobFailed {
        job_id: JobId,
        worker_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    // Pool events
    /// The pool changed state.
    PoolStateChanged {
        old_state: PoolState,
        new_state: PoolState,
        workers: usize,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobSubmitted { timestamp, .. } => *timestamp,
            JobEvent::JobRejected { timestamp, .. } => *timestamp,
            JobEvent::JobStarted { timestamp, .. } => *timestamp,
            JobEvent::JobCompleted { timestamp, .. } => *timestamp,
            JobEvent::JobFailed { timestamp, .. } => *timestamp,
            JobEvent::PoolStateChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobSubmitted { job_id, .. } => Some(*job_id),
            JobEvent::JobRejected { job_id, .. } => Some(*job_id),
            JobEvent::JobStarted { job_id, .. } => Some(*job_id),
            JobEvent::JobCompleted { job_id, .. } => Some(*job_id),
            JobEvent::JobFailed { job_id, .. } => Some(*job_id),
            JobEvent::PoolStateChanged { .. } => None,
        }
    }

    /// Whether this event marks a job reaching a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEvent::JobCompleted { .. } | JobEvent::JobFailed { .. } | JobEvent::JobRejected { .. }
        )
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobSubmitted { job_id, depth, .. } => {
                format!("Job {} queued (depth {})", job_id, depth)
            }
            JobEvent::JobRejected { job_id, reason, .. } => {
                format!("Job {} rejected: {}", job_id, reason)
            }
            JobEvent::JobStarted {
                job_id, worker_id, ..
            } => format!("Job {} started by {}", job_id, worker_id),
            JobEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", job_id, duration_ms),
            JobEvent::JobFailed { job_id, error, .. } => {
                format!("Job {} failed: {}", job_id, error)
            }
            JobEvent::PoolStateChanged {
                old_state,
                new_state,
                workers,
                ..
            } => format!("Pool {} -> {} ({} workers)", old_state, new_state, workers),
        }
    }
}
