//! Job persistence for the queue system.
//!
//! This crate defines the [`JobStore`] contract the worker pool writes
//! through, and ships two implementations:
//!
//! - [`repositories::JobRepository`]: SurrealDB-backed store
//! - [`MemoryJobStore`]: in-process map, for tests and embedding
//!
//! # Features
//!
//! - `rocksdb`: Use RocksDB for persistent file-based storage. The `mem://`
//!   engine is always compiled in.

mod connection;
mod memory;
mod schema;
mod store;
pub mod repositories;

pub use connection::{Credentials, Database, DbConfig, DbError, connect};
pub use memory::MemoryJobStore;
pub use schema::init_schema;
pub use store::{JobFilter, JobStore};
