//! Connecting to the job database.

use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect as connect_any};
use surrealdb::opt::auth::Root;
use thiserror::Error;

use queue_core::TransitionError;

/// Handle to an open SurrealDB datastore, local or remote.
pub type Database = Surreal<Any>;

/// Root login for a secured server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Where job records live.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Any SurrealDB endpoint: `mem://`, `rocksdb://<dir>`, `ws://host:port`.
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub credentials: Option<Credentials>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_endpoint("mem://")
    }
}

impl DbConfig {
    /// Throwaway in-process datastore.
    pub fn memory() -> Self {
        Self::default()
    }

    /// On-disk datastore in `dir`. Needs the `rocksdb` feature.
    pub fn rocksdb(dir: impl AsRef<str>) -> Self {
        Self::from_endpoint(format!("rocksdb://{}", dir.as_ref()))
    }

    pub fn from_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace: "jobs".to_string(),
            database: "queue".to_string(),
            credentials: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Sign in as root after connecting.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Whether records are lost when the process exits.
    pub fn is_memory(&self) -> bool {
        self.endpoint.starts_with("mem:")
    }
}

/// Errors raised by job stores.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Connection(#[from] surrealdb::Error),
    #[error("query failed: {0}")]
    Query(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error("concurrent update: {0}")]
    Conflict(String),
    #[error("malformed record: {0}")]
    Serialization(String),
}

impl DbError {
    /// Whether repeating the same write could succeed.
    ///
    /// Lifecycle violations and missing records never heal on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::Connection(_) | DbError::Query(_) | DbError::Conflict(_)
        )
    }
}

/// Open a connection and select the configured namespace and database.
///
/// There is no process-wide handle: every call opens its own, and each
/// `mem://` connection is a separate empty datastore.
pub async fn connect(config: &DbConfig) -> Result<Database, DbError> {
    tracing::info!(endpoint = %config.endpoint, "Connecting to job database");

    let db = connect_any(config.endpoint.as_str()).await?;

    if let Some(Credentials { username, password }) = &config.credentials {
        db.signin(Root { username, password }).await?;
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await?;

    tracing::info!(
        namespace = %config.namespace,
        database = %config.database,
        persistent = !config.is_memory(),
        "Job database ready"
    );
    Ok(db)
}
