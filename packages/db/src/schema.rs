//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// This creates the job table and its indexes.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(JOB_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job table schema.
///
/// Timestamps are stored as written by the client; `created_ms` exists so
/// listings order numerically instead of by timestamp text.
const JOB_SCHEMA: &str = r#"
-- Job records, one per submitted job
DEFINE TABLE IF NOT EXISTS job SCHEMALESS;

-- Indexes for status polling and listings
DEFINE INDEX IF NOT EXISTS job_id ON job FIELDS job_id UNIQUE;
DEFINE INDEX IF NOT EXISTS job_status ON job FIELDS status;
DEFINE INDEX IF NOT EXISTS job_created ON job FIELDS created_ms;
"#;
