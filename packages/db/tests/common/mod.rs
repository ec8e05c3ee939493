use db::repositories::JobRepository;
use db::{DbConfig, DbError};
use queue_core::{JobPayload, JobRecord};
use serde_json::json;

/// Fresh SurrealDB store on its own in-memory datastore.
pub async fn surreal_store() -> Result<JobRepository, DbError> {
    JobRepository::connect(&DbConfig::memory().with_namespace("test")).await
}

pub fn pending_record(index: u64) -> JobRecord {
    JobRecord::pending(&JobPayload::new(json!({ "index": index })))
}
