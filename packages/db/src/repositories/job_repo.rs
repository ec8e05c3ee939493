//! SurrealDB-backed job store.

use chrono::{DateTime, Utc};
use queue_core::{JobId, JobRecord, JobResult, JobStatus, TransitionError};
use serde::{Deserialize, Serialize};

use crate::{Database, DbError, JobFilter, JobStore, init_schema};

/// Repository for job persistence operations.
///
/// Updates are optimistic: the record is read, the lifecycle step is applied
/// in memory, and the write only lands if the stored status is still the one
/// that was read. A lost race surfaces as [`DbError::Conflict`].
#[derive(Clone)]
pub struct JobRepository {
    db: Database,
}

/// Internal record type for SurrealDB.
///
/// The record id is `job:<ulid>`; the ulid is duplicated in `job_id` so rows
/// can be decoded without parsing the record id.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobRow {
    job_id: String,
    status: JobStatus,
    #[serde(default)]
    params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    created_at: DateTime<Utc>,
    created_ms: i64,
    updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
}

impl From<&JobRecord> for JobRow {
    fn from(job: &JobRecord) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status,
            params: job.params.clone(),
            result: job.result.clone(),
            error: job.error.clone(),
            created_at: job.created_at,
            created_ms: job.created_at.timestamp_millis(),
            updated_at: job.updated_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

impl JobRow {
    fn into_record(self) -> Result<JobRecord, DbError> {
        let id = JobId::parse(&self.job_id)
            .map_err(|e| DbError::Serialization(format!("bad job id {}: {}", self.job_id, e)))?;
        Ok(JobRecord {
            id,
            status: self.status,
            params: self.params,
            result: self.result,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(Deserialize)]
struct CountRow {
    count: i64,
}

impl JobRepository {
    /// Wrap an open connection. Call [`JobRepository::init`] once before use.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn connect(config: &crate::DbConfig) -> Result<Self, DbError> {
        let repo = Self::new(crate::connect(config).await?);
        repo.init().await?;
        Ok(repo)
    }

    /// Create the job table and indexes if missing.
    pub async fn init(&self) -> Result<(), DbError> {
        init_schema(&self.db).await
    }

    /// Access the underlying connection.
    pub fn db(&self) -> &Database {
        &self.db
    }

    async fn update_with<F>(&self, id: JobId, apply: F) -> Result<JobRecord, DbError>
    where
        F: FnOnce(&mut JobRecord) -> Result<(), TransitionError> + Send,
    {
        let mut job = self
            .read(id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))?;
        let expected = job.status;
        apply(&mut job)?;

        let mut response = self
            .db
            .query(
                r#"
                UPDATE type::thing("job", $id) CONTENT $row
                WHERE status = $expected
                RETURN AFTER
                "#,
            )
            .bind(("id", id.to_string()))
            .bind(("row", JobRow::from(&job)))
            .bind(("expected", expected.as_str()))
            .await?;

        let rows: Vec<JobRow> = response.take(0)?;

        match rows.into_iter().next() {
            Some(row) => row.into_record(),
            None => Err(DbError::Conflict(format!(
                "Job {} left {} while being updated",
                id, expected
            ))),
        }
    }
}

impl JobStore for JobRepository {
    async fn create(&self, record: &JobRecord) -> Result<JobRecord, DbError> {
        if self.read(record.id).await?.is_some() {
            return Err(DbError::AlreadyExists(format!("Job {}", record.id)));
        }

        let created: Option<JobRow> = self
            .db
            .create(("job", record.id.to_string()))
            .content(JobRow::from(record))
            .await?;

        created
            .ok_or_else(|| DbError::Query("Failed to create job".into()))?
            .into_record()
    }

    async fn transition(&self, id: JobId, to: JobStatus) -> Result<JobRecord, DbError> {
        self.update_with(id, |job| job.transition(to, Utc::now()))
            .await
    }

    async fn attach_result(&self, id: JobId, result: &JobResult) -> Result<JobRecord, DbError> {
        let result = result.clone();
        self.update_with(id, move |job| job.complete(result, Utc::now()))
            .await
    }

    async fn attach_error(&self, id: JobId, error: &str) -> Result<JobRecord, DbError> {
        let error = error.to_string();
        self.update_with(id, move |job| job.fail(error, Utc::now()))
            .await
    }

    async fn read(&self, id: JobId) -> Result<Option<JobRecord>, DbError> {
        let row: Option<JobRow> = self.db.select(("job", id.to_string())).await?;
        row.map(JobRow::into_record).transpose()
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, DbError> {
        let where_clause = if filter.status.is_some() {
            "WHERE status = $status"
        } else {
            ""
        };

        let limit_clause = filter
            .limit
            .map(|l| format!("LIMIT {}", l))
            .unwrap_or_default();

        let offset_clause = filter
            .offset
            .map(|o| format!("START {}", o))
            .unwrap_or_default();

        let query = format!(
            "SELECT * FROM job {} ORDER BY created_ms DESC, job_id DESC {} {}",
            where_clause, limit_clause, offset_clause
        );

        let mut result = self.db.query(query);
        if let Some(status) = filter.status {
            result = result.bind(("status", status.as_str()));
        }

        let mut response = result.await?;
        let rows: Vec<JobRow> = response.take(0)?;

        rows.into_iter().map(JobRow::into_record).collect()
    }

    async fn count(&self, status: Option<JobStatus>) -> Result<u64, DbError> {
        let mut response = match status {
            Some(status) => {
                self.db
                    .query("SELECT count() AS count FROM job WHERE status = $status GROUP ALL")
                    .bind(("status", status.as_str()))
                    .await?
            }
            None => {
                self.db
                    .query("SELECT count() AS count FROM job GROUP ALL")
                    .await?
            }
        };

        let counts: Vec<CountRow> = response.take(0)?;

        Ok(counts.first().map_or(0, |c| c.count.max(0) as u64))
    }
}
