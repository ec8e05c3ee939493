//! Job domain types and the job lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a job, using ULID for chronological sorting.
///
/// Ids are assigned by the submitter; the store rejects duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Ulid> for JobId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current status of a job in its lifecycle.
///
/// ```text
/// Pending ──► Processing ──► Completed
///    │             │
///    └─────────────┴───────► Failed
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Record created, payload waiting in the queue.
    #[default]
    Pending,
    /// Claimed by a worker; the processor is running.
    Processing,
    /// Processor finished successfully.
    Completed,
    /// Rejected at submission, failed in the processor, or abandoned at shutdown.
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    /// Get a simple status string for display and queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Returned when parsing a status string that names no known state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);

/// Error raised for an illegal lifecycle step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("job {job_id}: cannot move from {from} to {to}")]
pub struct TransitionError {
    pub job_id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Result of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Human-readable summary of the result.
    pub summary: String,
    /// Optional structured output data as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

impl JobResult {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            output: None,
        }
    }

    pub fn with_output(summary: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            summary: summary.into(),
            output: Some(output),
        }
    }
}

/// Work handed to the queue: the job id plus whatever the processor needs.
///
/// Moved into the queue on submission, so it cannot change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub id: JobId,
    pub params: serde_json::Value,
}

impl JobPayload {
    /// Create a payload with a fresh job id.
    pub fn new(params: serde_json::Value) -> Self {
        Self::with_id(JobId::new(), params)
    }

    /// Create a payload for a caller-assigned job id.
    pub fn with_id(id: JobId, params: serde_json::Value) -> Self {
        Self { id, params }
    }
}

/// Persisted view of a job: what callers poll for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    /// Copy of the submitted parameters.
    pub params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// New PENDING record for a payload that is about to be enqueued.
    pub fn pending(payload: &JobPayload) -> Self {
        let now = Utc::now();
        Self {
            id: payload.id,
            status: JobStatus::Pending,
            params: payload.params.clone(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Apply a bare status change, stamping the matching timestamp.
    pub fn transition(&mut self, to: JobStatus, at: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                job_id: self.id,
                from: self.status,
                to,
            });
        }

        self.status = to;
        self.updated_at = at;
        match to {
            JobStatus::Processing => self.started_at = Some(at),
            JobStatus::Completed | JobStatus::Failed => self.completed_at = Some(at),
            JobStatus::Pending => {}
        }
        Ok(())
    }

    /// PROCESSING → COMPLETED with the processor output attached.
    pub fn complete(&mut self, result: JobResult, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Completed, at)?;
        self.result = Some(result);
        Ok(())
    }

    /// PENDING/PROCESSING → FAILED with an error message attached.
    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed, at)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Time spent in PROCESSING, once the job has finished.
    pub fn processing_time(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some(completed - started),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> JobRecord {
        JobRecord::pending(&JobPayload::new(json!({ "index": 3 })))
    }

    #[test]
    fn allowed_transitions() {
        use JobStatus::*;
        let allowed = [
            (Pending, Processing),
            (Pending, Failed),
            (Processing, Completed),
            (Processing, Failed),
        ];
        for from in [Pending, Processing, Completed, Failed] {
            for to in [Pending, Processing, Completed, Failed] {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn pending_cannot_complete_directly() {
        let mut job = record();
        let err = job
            .complete(JobResult::new("done"), Utc::now())
            .expect_err("pending -> completed must be rejected");
        assert_eq!(err.from, JobStatus::Pending);
        assert_eq!(err.to, JobStatus::Completed);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.result.is_none());
    }

    #[test]
    fn full_lifecycle_stamps_timestamps() {
        let mut job = record();
        let started = Utc::now();
        job.transition(JobStatus::Processing, started).unwrap();
        assert_eq!(job.started_at, Some(started));

        let finished = started + chrono::Duration::milliseconds(250);
        job.complete(JobResult::new("ok"), finished).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.completed_at, Some(finished));
        assert_eq!(job.processing_time(), Some(chrono::Duration::milliseconds(250)));
    }

    #[test]
    fn terminal_states_are_immutable() {
        let mut job = record();
        job.fail("queue is full", Utc::now()).unwrap();
        assert!(job.status.is_terminal());
        assert!(job.transition(JobStatus::Processing, Utc::now()).is_err());
        assert!(job.fail("again", Utc::now()).is_err());
        assert_eq!(job.error.as_deref(), Some("queue is full"));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>(), Ok(status));
        }
        assert!("running".parse::<JobStatus>().is_err());
    }
}
