//! In-process job store backed by a locked map.

use std::collections::HashMap;

use chrono::Utc;
use queue_core::{JobId, JobRecord, JobResult, JobStatus};
use tokio::sync::RwLock;

use crate::{DbError, JobFilter, JobStore};

/// Job store that keeps records in memory.
///
/// Every mutation runs under the write lock, which makes each update atomic
/// per job. Records do not survive the process.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, id: JobId, apply: F) -> Result<JobRecord, DbError>
    where
        F: FnOnce(&mut JobRecord) -> Result<(), queue_core::TransitionError>,
    {
        let mut jobs = self.jobs.write().await;
        let current = jobs
            .get(&id)
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))?;

        // Apply to a copy so a rejected transition leaves nothing behind.
        let mut next = current.clone();
        apply(&mut next)?;
        jobs.insert(id, next.clone());
        Ok(next)
    }
}

impl JobStore for MemoryJobStore {
    async fn create(&self, record: &JobRecord) -> Result<JobRecord, DbError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&record.id) {
            return Err(DbError::AlreadyExists(format!("Job {}", record.id)));
        }
        jobs.insert(record.id, record.clone());
        Ok(record.clone())
    }

    async fn transition(&self, id: JobId, to: JobStatus) -> Result<JobRecord, DbError> {
        self.update(id, |job| job.transition(to, Utc::now())).await
    }

    async fn attach_result(&self, id: JobId, result: &JobResult) -> Result<JobRecord, DbError> {
        let result = result.clone();
        self.update(id, move |job| job.complete(result, Utc::now()))
            .await
    }

    async fn attach_error(&self, id: JobId, error: &str) -> Result<JobRecord, DbError> {
        self.update(id, |job| job.fail(error, Utc::now())).await
    }

    async fn read(&self, id: JobId) -> Result<Option<JobRecord>, DbError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, DbError> {
        let jobs = self.jobs.read().await;
        let mut records: Vec<JobRecord> = jobs
            .values()
            .filter(|j| filter.status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        drop(jobs);

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(records
            .into_iter()
            .skip(filter.offset.unwrap_or(0))
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn count(&self, status: Option<JobStatus>) -> Result<u64, DbError> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .count() as u64)
    }
}
