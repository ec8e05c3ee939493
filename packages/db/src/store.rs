//! The job store contract used by the queue core.

use std::future::Future;

use queue_core::{JobId, JobRecord, JobResult, JobStatus};

use crate::DbError;

/// Filter options for listing jobs.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl JobFilter {
    /// Only jobs in the given status.
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// One page of results, `page` starting at 1.
    pub fn page(mut self, page: usize, page_size: usize) -> Self {
        self.offset = Some(page.saturating_sub(1) * page_size);
        self.limit = Some(page_size);
        self
    }
}

/// Durable record of each job's status and outcome.
///
/// Every method is atomic for a single job id: readers never observe a
/// status change without its timestamps and result/error. Transitions are
/// validated against [`JobStatus::can_transition_to`]; an illegal step fails
/// with [`DbError::InvalidTransition`] and leaves the record untouched.
pub trait JobStore: Send + Sync + 'static {
    /// Insert a new record. Fails with [`DbError::AlreadyExists`] on a duplicate id.
    fn create(&self, record: &JobRecord) -> impl Future<Output = Result<JobRecord, DbError>> + Send;

    /// Move a job to `to` without attaching an outcome.
    fn transition(
        &self,
        id: JobId,
        to: JobStatus,
    ) -> impl Future<Output = Result<JobRecord, DbError>> + Send;

    /// PROCESSING → COMPLETED with the processor result.
    fn attach_result(
        &self,
        id: JobId,
        result: &JobResult,
    ) -> impl Future<Output = Result<JobRecord, DbError>> + Send;

    /// PENDING/PROCESSING → FAILED with an error message.
    fn attach_error(
        &self,
        id: JobId,
        error: &str,
    ) -> impl Future<Output = Result<JobRecord, DbError>> + Send;

    /// Fetch a record by id.
    fn read(&self, id: JobId) -> impl Future<Output = Result<Option<JobRecord>, DbError>> + Send;

    /// List records, newest first.
    fn list(&self, filter: &JobFilter) -> impl Future<Output = Result<Vec<JobRecord>, DbError>> + Send;

    /// Count records, optionally restricted to one status.
    fn count(&self, status: Option<JobStatus>) -> impl Future<Output = Result<u64, DbError>> + Send;
}
